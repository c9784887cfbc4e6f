//! Keyboard input for the interactive client.
//!
//! A background thread reads crossterm key events and forwards them to the
//! UI loop over a tokio channel. [`KeyBindings::classify`] turns raw events
//! into the handful of actions the conversation understands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

/// What a key press means to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Enter without Shift/Alt
    Submit,
    /// Shift+Enter or Alt+Enter
    Newline,
    /// A printable character
    Insert(char),
    /// Delete the last character
    Backspace,
    /// Return to the initial screen
    Reset,
    /// Leave the application
    Quit,
    /// Anything else
    Ignore,
}

/// Key bindings for the non-text controls.
#[derive(Debug, Clone, Copy)]
pub struct KeyBindings {
    /// Reset without modifiers
    pub reset: KeyCode,
    /// Reset with Ctrl held
    pub reset_ctrl: char,
    /// Quit with Ctrl held (Ctrl+C always quits as well)
    pub quit_ctrl: char,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            reset: KeyCode::Esc,
            reset_ctrl: 'r',
            quit_ctrl: 'q',
        }
    }
}

impl KeyBindings {
    /// Map a key event onto a [`KeyAction`].
    pub fn classify(&self, key: &KeyEvent) -> KeyAction {
        if key.kind == KeyEventKind::Release {
            return KeyAction::Ignore;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl {
            return match key.code {
                KeyCode::Char('c') => KeyAction::Quit,
                KeyCode::Char(c) if c == self.quit_ctrl => KeyAction::Quit,
                KeyCode::Char(c) if c == self.reset_ctrl => KeyAction::Reset,
                _ => KeyAction::Ignore,
            };
        }

        match key.code {
            KeyCode::Enter
                if key
                    .modifiers
                    .intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) =>
            {
                KeyAction::Newline
            }
            KeyCode::Enter => KeyAction::Submit,
            KeyCode::Backspace => KeyAction::Backspace,
            KeyCode::Tab => KeyAction::Insert(' '),
            KeyCode::Char(c) => KeyAction::Insert(c),
            code if code == self.reset => KeyAction::Reset,
            _ => KeyAction::Ignore,
        }
    }
}

/// Reads terminal key events on a background thread.
pub struct KeyboardListener {
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl Default for KeyboardListener {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardListener {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Check if the listener is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start forwarding key presses into `sender`.
    ///
    /// The terminal must already be in raw mode. The thread exits when the
    /// returned handle is dropped or the receiver goes away.
    pub fn start(&self, sender: mpsc::UnboundedSender<KeyEvent>) -> ListenerHandle {
        let running = Arc::clone(&self.running);
        let poll_interval = self.poll_interval;
        running.store(true, Ordering::Relaxed);

        let handle = thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                if !event::poll(poll_interval).unwrap_or(false) {
                    continue;
                }
                match event::read() {
                    Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => {
                        if sender.send(key).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read terminal event");
                        break;
                    }
                }
            }
            running.store(false, Ordering::Relaxed);
        });

        ListenerHandle {
            running: Arc::clone(&self.running),
            _handle: handle,
        }
    }
}

/// Handle to a running keyboard listener.
pub struct ListenerHandle {
    running: Arc<AtomicBool>,
    _handle: thread::JoinHandle<()>,
}

impl ListenerHandle {
    /// Stop the listener.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
