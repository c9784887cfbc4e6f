//! blacksmith - terminal client for a model-building backend.
//!
//! Submits a prompt, polls the backend's stage endpoint and shows each stage
//! as an animated card.

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod retry;
pub mod session;
pub mod ui;
