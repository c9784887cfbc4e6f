//! Plain line output for headless sessions.
//!
//! Stage updates go to stdout as `[<stage>] <summary>`; retries, failures and
//! the waiting spinner go to stderr.

use std::io::{self, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use crate::backend::{Stage, StageReport};
use crate::session::SessionEvent;
use crate::ui::colors::Theme;

/// Renders session events as lines.
pub struct PlainDisplay<W: Write> {
    out: W,
    theme: Theme,
    colors_enabled: bool,
    spinner: Option<ProgressBar>,
}

impl PlainDisplay<io::Stdout> {
    /// Display on stdout with a spinner on stderr.
    pub fn stdout(colors_enabled: bool) -> Self {
        let mut display = Self::new(io::stdout(), colors_enabled);
        display.spinner = Some(waiting_spinner());
        display
    }
}

impl<W: Write> PlainDisplay<W> {
    /// Display into `out` without a spinner.
    pub fn new(out: W, colors_enabled: bool) -> Self {
        Self {
            out,
            theme: Theme::default(),
            colors_enabled,
            spinner: None,
        }
    }

    /// Whether colors should be on, given a `--no-color` flag and `NO_COLOR`.
    pub fn detect_color_support(no_color_flag: bool) -> bool {
        !no_color_flag && std::env::var_os("NO_COLOR").is_none()
    }

    pub fn into_inner(self) -> W {
        if let Some(spinner) = &self.spinner {
            spinner.finish_and_clear();
        }
        self.out
    }

    /// Show one session event.
    pub fn show(&mut self, event: &SessionEvent) -> io::Result<()> {
        match event {
            SessionEvent::PlanReceived(plan) => {
                let line = self.stage_line(Stage::Parsing, &plan.webscraping_prompt);
                self.println(&line)?;
                if let Some(note) = plan.annotation() {
                    let note = if self.colors_enabled {
                        note.color(self.theme.muted).to_string()
                    } else {
                        note
                    };
                    self.println(&format!("  {}", note))?;
                }
                self.wait("polling for the next stage");
            }
            SessionEvent::StageUpdated(report) => {
                let line = self.report_line(report);
                self.println(&line)?;
                if !report.stage.is_terminal() {
                    self.wait("polling for the next stage");
                }
            }
            SessionEvent::Retrying {
                attempt,
                delay,
                error,
            } => {
                let message = format!(
                    "⚠ {} (retry {} in {:.1}s)",
                    error,
                    attempt,
                    delay.as_secs_f64()
                );
                self.eprintln(&message, self.theme.warning);
            }
            SessionEvent::Finished => {
                self.clear_spinner();
                self.eprintln("✓ model deployed", self.theme.success);
            }
            SessionEvent::Failed(error) => {
                self.clear_spinner();
                self.eprintln(&format!("✗ {}", error), self.theme.error);
            }
        }
        Ok(())
    }

    /// `[<stage>] <summary>` for a report.
    pub fn report_line(&self, report: &StageReport) -> String {
        self.stage_line(report.stage, &report.summary)
    }

    fn stage_line(&self, stage: Stage, text: &str) -> String {
        let label = format!("[{}]", stage);
        if self.colors_enabled {
            format!("{} {}", label.color(self.theme.stage_color(stage)).bold(), text)
        } else {
            format!("{} {}", label, text)
        }
    }

    fn println(&mut self, line: &str) -> io::Result<()> {
        match &self.spinner {
            Some(spinner) => {
                let out = &mut self.out;
                spinner.suspend(|| {
                    writeln!(out, "{}", line)?;
                    out.flush()
                })
            }
            None => {
                writeln!(self.out, "{}", line)?;
                self.out.flush()
            }
        }
    }

    fn eprintln(&self, line: &str, color: owo_colors::Rgb) {
        let line = if self.colors_enabled {
            line.color(color).to_string()
        } else {
            line.to_string()
        };
        match &self.spinner {
            Some(spinner) => spinner.suspend(|| eprintln!("{}", line)),
            None => eprintln!("{}", line),
        }
    }

    fn wait(&self, message: &'static str) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(message);
            spinner.enable_steady_tick(Duration::from_millis(100));
        }
    }

    fn clear_spinner(&self) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_and_clear();
        }
    }
}

fn waiting_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
        .template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message("submitting prompt");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
