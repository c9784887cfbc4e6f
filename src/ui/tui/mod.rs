//! Ratatui-based interactive client.
//!
//! - [`typewriter`] and [`card`] are time-driven animation state machines
//! - [`conversation`] owns the screen state and reacts to keys and sessions
//! - [`app`] runs the event loop and draws the [`widgets`]

pub mod animation;
pub mod app;
pub mod card;
pub mod conversation;
pub mod typewriter;
pub mod widgets;

pub use animation::AnimationState;
pub use app::{run, App};
pub use card::{CardPhase, CardTimings, StageCard};
pub use conversation::{Conversation, Intent, Phase, ResponseSlot};
pub use typewriter::Typewriter;
