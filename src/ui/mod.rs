//! Terminal front ends: the interactive ratatui client and plain line output.

mod colors;
mod display;
pub mod keyboard;
pub mod tui;

pub use colors::Theme;
pub use display::PlainDisplay;
pub use keyboard::{KeyAction, KeyBindings, KeyboardListener};
