//! Conversation controller.
//!
//! Owns everything the screen shows: the input buffer, the transcript, the
//! four response slots with their visibility flags and cards. Session events
//! and key presses come in; intents for the app loop and card completions
//! for the session go out.

use std::time::Duration;

use super::card::{CardTimings, StageCard};
use super::typewriter::Typewriter;
use crate::backend::Stage;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::{SessionEvent, SessionMessage};
use crate::ui::keyboard::KeyAction;

/// Title revealed on start.
pub const TITLE: &str = "blacksmith";

/// Controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingFirstResponse,
    Polling(Stage),
    Done,
    Failed,
}

/// What the app loop should do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Start a session for `prompt`, tagged with `generation`.
    Submit { prompt: String, generation: u64 },
    Reset,
    Quit,
}

/// One of the four fixed response records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSlot {
    pub header: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    HideInput,
    Show(usize),
}

#[derive(Debug, Clone)]
struct Pending {
    remaining: Duration,
    timer: Timer,
}

#[derive(Debug)]
pub struct Conversation {
    input: String,
    transcript: Vec<String>,
    minimized: bool,
    input_hidden: bool,
    input_focused: bool,
    slots: [ResponseSlot; 4],
    visibility: [bool; 4],
    cards: [StageCard; 4],
    current_index: Option<usize>,
    phase: Phase,
    generation: u64,
    plan_note: Option<String>,
    status: Option<String>,
    error: Option<ClientError>,
    timers: Vec<Pending>,
    title: Typewriter,
    input_hide_delay: Duration,
    reshow_delay: Duration,
}

fn empty_slots() -> [ResponseSlot; 4] {
    Stage::ALL.map(|stage| ResponseSlot {
        header: stage.header(),
        content: String::new(),
    })
}

impl Conversation {
    pub fn new(config: &ClientConfig) -> Self {
        let timings = CardTimings::from(&config.animation);
        Self {
            input: String::new(),
            transcript: Vec::new(),
            minimized: false,
            input_hidden: false,
            input_focused: true,
            slots: empty_slots(),
            visibility: [false; 4],
            cards: Stage::ALL.map(|stage| StageCard::new(stage, timings)),
            current_index: None,
            phase: Phase::Idle,
            generation: 0,
            plan_note: None,
            status: None,
            error: None,
            timers: Vec::new(),
            title: Typewriter::new(TITLE, config.animation.title_char_delay()),
            input_hide_delay: config.polling.input_hide_delay(),
            reshow_delay: config.polling.reshow_delay(),
        }
    }

    /// Apply a classified key press.
    pub fn handle_key(&mut self, action: KeyAction) -> Option<Intent> {
        match action {
            KeyAction::Quit => Some(Intent::Quit),
            KeyAction::Reset => Some(Intent::Reset),
            KeyAction::Submit => self.submit(),
            KeyAction::Newline => {
                self.edit(|input| input.push('\n'));
                None
            }
            KeyAction::Insert(c) => {
                self.edit(|input| input.push(c));
                None
            }
            KeyAction::Backspace => {
                self.edit(|input| {
                    input.pop();
                });
                None
            }
            KeyAction::Ignore => None,
        }
    }

    fn edit(&mut self, f: impl FnOnce(&mut String)) {
        if self.accepts_input() {
            f(&mut self.input);
        }
    }

    fn accepts_input(&self) -> bool {
        self.input_focused && !self.input_hidden && self.phase == Phase::Idle
    }

    /// Submit the input buffer.
    ///
    /// Whitespace-only input does nothing. Otherwise the untrimmed text goes
    /// to the transcript and the trimmed text to the backend.
    pub fn submit(&mut self) -> Option<Intent> {
        if !self.accepts_input() {
            return None;
        }
        let prompt = self.input.trim().to_string();
        if prompt.is_empty() {
            return None;
        }

        self.transcript.push(std::mem::take(&mut self.input));
        self.minimized = true;
        self.schedule(self.input_hide_delay, Timer::HideInput);
        self.phase = Phase::AwaitingFirstResponse;
        self.generation += 1;
        tracing::debug!(generation = self.generation, "prompt submitted");

        Some(Intent::Submit {
            prompt,
            generation: self.generation,
        })
    }

    /// Apply a session message. Returns false for a message of an older session.
    pub fn apply(&mut self, message: SessionMessage) -> bool {
        if message.generation != self.generation {
            tracing::debug!(
                stale = message.generation,
                current = self.generation,
                "dropping stale session event"
            );
            return false;
        }

        match message.event {
            SessionEvent::PlanReceived(plan) => {
                self.plan_note = plan.annotation();
                self.slots[0].content = plan.webscraping_prompt;
                self.current_index = Some(0);
                self.visibility[0] = true;
                self.phase = Phase::Polling(Stage::Parsing);
            }
            SessionEvent::StageUpdated(report) => {
                let index = report.stage.index();
                self.slots[index].content = report.summary;
                self.visibility[index] = false;
                self.schedule(self.reshow_delay, Timer::Show(index));
                self.current_index = Some(index);
                self.phase = Phase::Polling(report.stage);
                self.status = None;
            }
            SessionEvent::Retrying {
                attempt,
                delay,
                error,
            } => {
                self.status = Some(format!(
                    "{} (retry {} in {:.1}s)",
                    error,
                    attempt,
                    delay.as_secs_f64()
                ));
            }
            SessionEvent::Finished => {
                self.phase = Phase::Done;
                self.status = None;
            }
            SessionEvent::Failed(error) => {
                self.phase = Phase::Failed;
                self.status = None;
                self.error = Some(error);
            }
        }
        self.sync_cards();
        true
    }

    /// Move all animations forward by `dt`.
    ///
    /// Returns the stages whose cards finished collapsing.
    pub fn advance(&mut self, dt: Duration) -> Vec<Stage> {
        self.title.advance(dt);

        let completed: Vec<Stage> = self
            .cards
            .iter_mut()
            .filter_map(|card| card.advance(dt))
            .collect();

        let mut fired = Vec::new();
        self.timers.retain_mut(|pending| {
            if pending.remaining > dt {
                pending.remaining -= dt;
                true
            } else {
                fired.push(pending.timer);
                false
            }
        });
        for timer in fired {
            match timer {
                Timer::HideInput => {
                    self.input_hidden = true;
                    self.input_focused = false;
                }
                Timer::Show(index) => self.visibility[index] = true,
            }
        }
        self.sync_cards();

        completed
    }

    /// Return to the initial screen. Any running session must already be
    /// cancelled; its late events are dropped by generation.
    pub fn reset(&mut self) {
        self.input.clear();
        self.transcript.clear();
        self.minimized = false;
        self.input_hidden = false;
        self.input_focused = true;
        self.slots = empty_slots();
        self.visibility = [false; 4];
        self.current_index = None;
        self.phase = Phase::Idle;
        self.plan_note = None;
        self.status = None;
        self.error = None;
        self.timers.clear();
        self.generation += 1;
        self.sync_cards();
    }

    fn schedule(&mut self, after: Duration, timer: Timer) {
        self.timers.retain(|pending| pending.timer != timer);
        self.timers.push(Pending {
            remaining: after,
            timer,
        });
    }

    fn sync_cards(&mut self) {
        for index in 0..self.cards.len() {
            let visible = self.is_card_visible(index);
            self.cards[index].sync(visible, &self.slots[index].content);
        }
    }

    /// A card shows when the current index has reached it and its flag is on.
    pub fn is_card_visible(&self, index: usize) -> bool {
        self.current_index.is_some_and(|current| current >= index)
            && self.visibility.get(index).copied().unwrap_or(false)
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn is_input_hidden(&self) -> bool {
        self.input_hidden
    }

    pub fn is_input_focused(&self) -> bool {
        self.input_focused
    }

    pub fn slots(&self) -> &[ResponseSlot; 4] {
        &self.slots
    }

    pub fn visibility(&self) -> [bool; 4] {
        self.visibility
    }

    pub fn cards(&self) -> &[StageCard; 4] {
        &self.cards
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn plan_note(&self) -> Option<&str> {
        self.plan_note.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    pub fn title(&self) -> &str {
        self.title.visible()
    }

    pub fn title_done(&self) -> bool {
        self.title.is_done()
    }
}
