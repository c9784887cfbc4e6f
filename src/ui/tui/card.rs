//! Animated stage card.
//!
//! A card reveals its text a few characters per tick, holds it, collapses it
//! to a one-line preview and then reports completion. It is a plain state
//! machine advanced by elapsed time; hiding the card drops all progress.

use std::time::Duration;

use super::animation::{ease_out, progress};
use super::typewriter::char_prefix;
use crate::backend::Stage;
use crate::config::AnimationConfig;

/// Where a card is in its animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardPhase {
    Hidden,
    Revealing,
    Holding,
    Collapsing,
    Collapsed,
}

/// Timings of one card animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardTimings {
    pub tick: Duration,
    pub chars_per_tick: usize,
    pub hold: Duration,
    pub collapse: Duration,
    pub preview_chars: usize,
}

impl From<&AnimationConfig> for CardTimings {
    fn from(config: &AnimationConfig) -> Self {
        Self {
            tick: config.reveal_tick(),
            chars_per_tick: config.reveal_chars_per_tick.max(1),
            hold: config.hold(),
            collapse: config.collapse(),
            preview_chars: config.preview_chars,
        }
    }
}

impl Default for CardTimings {
    fn default() -> Self {
        Self::from(&AnimationConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct StageCard {
    stage: Stage,
    timings: CardTimings,
    phase: CardPhase,
    /// Text captured when the card became visible
    text: String,
    total_chars: usize,
    shown_chars: usize,
    until_next: Duration,
    phase_elapsed: Duration,
    /// Set on activation, cleared when hidden
    animated: bool,
}

impl StageCard {
    pub fn new(stage: Stage, timings: CardTimings) -> Self {
        Self {
            stage,
            timings,
            phase: CardPhase::Hidden,
            text: String::new(),
            total_chars: 0,
            shown_chars: 0,
            until_next: timings.tick,
            phase_elapsed: Duration::ZERO,
            animated: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn header(&self) -> &'static str {
        self.stage.header()
    }

    pub fn phase(&self) -> CardPhase {
        self.phase
    }

    pub fn is_visible(&self) -> bool {
        self.phase != CardPhase::Hidden
    }

    /// Follow the visibility flag.
    ///
    /// Becoming visible starts a reveal of `content` as it is right now.
    /// Staying visible never restarts the animation.
    pub fn sync(&mut self, visible: bool, content: &str) {
        if !visible {
            if self.animated || self.phase != CardPhase::Hidden {
                self.hide();
            }
            return;
        }
        if !self.animated {
            self.activate(content);
        }
    }

    fn activate(&mut self, content: &str) {
        self.animated = true;
        self.text = content.to_string();
        self.total_chars = self.text.chars().count();
        self.shown_chars = 0;
        self.until_next = self.timings.tick;
        self.phase_elapsed = Duration::ZERO;
        self.phase = if self.total_chars == 0 {
            CardPhase::Holding
        } else {
            CardPhase::Revealing
        };
    }

    fn hide(&mut self) {
        self.phase = CardPhase::Hidden;
        self.animated = false;
        self.text.clear();
        self.total_chars = 0;
        self.shown_chars = 0;
        self.until_next = self.timings.tick;
        self.phase_elapsed = Duration::ZERO;
    }

    /// Move time forward by `dt`.
    ///
    /// Returns the card's stage on the call that finishes the collapse; the
    /// same activation never reports twice.
    pub fn advance(&mut self, dt: Duration) -> Option<Stage> {
        let mut remaining = dt;
        loop {
            match self.phase {
                CardPhase::Hidden | CardPhase::Collapsed => return None,
                CardPhase::Revealing => {
                    if remaining < self.until_next {
                        self.until_next -= remaining;
                        return None;
                    }
                    remaining -= self.until_next;
                    self.until_next = self.timings.tick;
                    self.shown_chars =
                        (self.shown_chars + self.timings.chars_per_tick).min(self.total_chars);
                    if self.shown_chars == self.total_chars {
                        self.enter(CardPhase::Holding);
                    }
                }
                CardPhase::Holding => {
                    let left = self.timings.hold.saturating_sub(self.phase_elapsed);
                    if remaining < left {
                        self.phase_elapsed += remaining;
                        return None;
                    }
                    remaining -= left;
                    self.enter(CardPhase::Collapsing);
                }
                CardPhase::Collapsing => {
                    let left = self.timings.collapse.saturating_sub(self.phase_elapsed);
                    if remaining < left {
                        self.phase_elapsed += remaining;
                        return None;
                    }
                    self.enter(CardPhase::Collapsed);
                    tracing::debug!(stage = %self.stage, "card collapsed");
                    return Some(self.stage);
                }
            }
        }
    }

    fn enter(&mut self, phase: CardPhase) {
        self.phase = phase;
        self.phase_elapsed = Duration::ZERO;
    }

    /// The captured text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text revealed so far.
    pub fn displayed(&self) -> &str {
        char_prefix(&self.text, self.shown_chars)
    }

    /// One-line form shown once collapsed.
    pub fn preview(&self) -> String {
        let limit = self.timings.preview_chars;
        if self.total_chars > limit {
            format!("{}...", char_prefix(&self.text, limit))
        } else {
            self.text.clone()
        }
    }

    /// Eased collapse progress from 0.0 (expanded) to 1.0 (collapsed).
    pub fn collapse_progress(&self) -> f64 {
        match self.phase {
            CardPhase::Collapsing => {
                ease_out(progress(self.phase_elapsed, self.timings.collapse))
            }
            CardPhase::Collapsed => 1.0,
            _ => 0.0,
        }
    }
}
