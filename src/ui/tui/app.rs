//! TUI application state and event loop.
//!
//! The app owns the [`Conversation`], starts and cancels sessions, forwards
//! card completions to the running session, and draws a frame on every tick.

use std::io::{self, stdout, Stdout};
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::KeyEvent,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use super::animation::AnimationState;
use super::conversation::{Conversation, Intent, Phase};
use super::widgets::{
    InputWidget, StageCardWidget, StatusWidget, TitleWidget, TranscriptWidget,
};
use crate::backend::StageBackend;
use crate::config::ClientConfig;
use crate::session::{SessionHandle, SessionMessage};
use crate::ui::keyboard::{KeyBindings, KeyboardListener};

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// The interactive application.
pub struct App {
    conversation: Conversation,
    config: ClientConfig,
    backend: Arc<dyn StageBackend>,
    session: Option<SessionHandle>,
    events: mpsc::UnboundedSender<SessionMessage>,
    animation: AnimationState,
    bindings: KeyBindings,
    running: bool,
}

impl App {
    /// Create an app whose sessions report into `events`.
    pub fn new(
        config: ClientConfig,
        backend: Arc<dyn StageBackend>,
        events: mpsc::UnboundedSender<SessionMessage>,
    ) -> Self {
        Self {
            conversation: Conversation::new(&config),
            config,
            backend,
            session: None,
            events,
            animation: AnimationState::new(),
            bindings: KeyBindings::default(),
            running: true,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Check if should continue running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn handle_key(&mut self, key: &KeyEvent) {
        let action = self.bindings.classify(key);
        match self.conversation.handle_key(action) {
            Some(Intent::Submit { prompt, generation }) => self.start_session(prompt, generation),
            Some(Intent::Reset) => self.reset(),
            Some(Intent::Quit) => self.quit(),
            None => {}
        }
    }

    fn start_session(&mut self, prompt: String, generation: u64) {
        self.cancel_session();
        tracing::info!(generation, "starting session");
        self.session = Some(SessionHandle::spawn(
            Arc::clone(&self.backend),
            &self.config,
            prompt,
            generation,
            self.events.clone(),
        ));
    }

    fn cancel_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
        }
    }

    /// Cancel the session first so none of its waits survive the reset.
    pub fn reset(&mut self) {
        self.cancel_session();
        self.conversation.reset();
    }

    pub fn quit(&mut self) {
        self.cancel_session();
        self.running = false;
    }

    pub fn handle_session(&mut self, message: SessionMessage) {
        if !self.conversation.apply(message) {
            return;
        }
        if matches!(self.conversation.phase(), Phase::Done | Phase::Failed) {
            self.session = None;
        }
    }

    /// Advance animations by `dt` and report finished cards to the session.
    pub fn tick(&mut self, dt: Duration) {
        self.animation.tick(dt);
        for stage in self.conversation.advance(dt) {
            if let Some(session) = &self.session {
                session.card_completed(stage);
            }
        }
    }

    /// Render to a ratatui frame.
    pub fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        let inner = Rect {
            x: area.x + 1,
            y: area.y + 1,
            width: area.width.saturating_sub(2),
            height: area.height.saturating_sub(2),
        };
        let width = inner.width;
        let conversation = &self.conversation;
        let cursor = self.animation.cursor_visible();
        let spinner = self.animation.spinner_char(SPINNER);

        let title = TitleWidget::new(conversation.title())
            .minimized(conversation.is_minimized())
            .cursor(cursor);
        let status = StatusWidget::new(conversation.status(), conversation.error())
            .done(conversation.phase() == &Phase::Done);

        if !conversation.is_minimized() {
            let input_height = InputWidget::height(conversation.input(), width);
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(3), Constraint::Length(input_height)])
                .split(inner);
            frame.render_widget(title, chunks[0]);
            if !conversation.is_input_hidden() {
                frame.render_widget(
                    InputWidget::new(conversation.input())
                        .focused(conversation.is_input_focused())
                        .cursor(cursor),
                    chunks[1],
                );
            }
            return;
        }

        let mut constraints = vec![
            Constraint::Length(TitleWidget::height(true)),
            Constraint::Length(TranscriptWidget::height(conversation.transcript(), width)),
        ];
        let mut cards = Vec::new();
        for (index, card) in conversation.cards().iter().enumerate() {
            let note = if index == 0 { conversation.plan_note() } else { None };
            let height = StageCardWidget::height(card, note, width);
            if height > 0 {
                constraints.push(Constraint::Length(height));
                cards.push(StageCardWidget::new(card).note(note).spinner(spinner));
            }
        }
        let show_status = !status.is_empty();
        if show_status {
            constraints.push(Constraint::Length(1));
        }
        let show_input = !conversation.is_input_hidden();
        if show_input {
            constraints.push(Constraint::Length(InputWidget::height(
                conversation.input(),
                width,
            )));
        }
        constraints.push(Constraint::Min(0));

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(inner);
        let mut slots = chunks.iter().copied();

        if let Some(area) = slots.next() {
            frame.render_widget(title, area);
        }
        if let Some(area) = slots.next() {
            frame.render_widget(TranscriptWidget::new(conversation.transcript()), area);
        }
        for card in cards {
            if let Some(area) = slots.next() {
                frame.render_widget(card, area);
            }
        }
        if show_status {
            if let Some(area) = slots.next() {
                frame.render_widget(status, area);
            }
        }
        if show_input {
            if let Some(area) = slots.next() {
                frame.render_widget(
                    InputWidget::new(conversation.input())
                        .focused(conversation.is_input_focused())
                        .cursor(cursor),
                    area,
                );
            }
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.cancel_session();
    }
}

/// Initialize terminal for TUI mode.
pub fn init_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restore terminal from TUI mode.
pub fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

/// Run the interactive client until the user quits.
///
/// The terminal is restored on every exit path, including draw errors.
pub async fn run(config: ClientConfig, backend: Arc<dyn StageBackend>) -> io::Result<()> {
    let mut terminal = init_terminal()?;
    let result = event_loop(&mut terminal, config, backend).await;
    let restored = restore_terminal(&mut terminal);
    result.and(restored)
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    config: ClientConfig,
    backend: Arc<dyn StageBackend>,
) -> io::Result<()> {
    let (keys_tx, mut keys_rx) = mpsc::unbounded_channel();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let _listener = KeyboardListener::new().start(keys_tx);

    let mut frames = tokio::time::interval(config.animation.frame_interval());
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut app = App::new(config, backend, events_tx);
    let mut last_frame = Instant::now();

    while app.is_running() {
        tokio::select! {
            _ = frames.tick() => {
                let now = Instant::now();
                app.tick(now - last_frame);
                last_frame = now;
                terminal.draw(|frame| app.render(frame))?;
            }
            Some(key) = keys_rx.recv() => app.handle_key(&key),
            Some(message) = events_rx.recv() => app.handle_session(message),
        }
    }

    tracing::info!("leaving interactive mode");
    Ok(())
}
