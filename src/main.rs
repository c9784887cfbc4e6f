use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::mpsc;

use blacksmith::backend::{HttpBackend, StageBackend};
use blacksmith::config::ClientConfig;
use blacksmith::logging::{init_logging, LogDestination, LoggingConfig};
use blacksmith::session::{SessionEvent, SessionHandle, SessionOutcome};
use blacksmith::ui::{self, PlainDisplay};

#[derive(Parser, Debug)]
#[command(name = "blacksmith")]
#[command(version)]
#[command(about = "Describe a model, watch it get built")]
struct Cli {
    /// Configuration file (default: ./blacksmith.toml if present)
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend base URL (overrides configuration)
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Disable colors (also respects NO_COLOR environment variable)
    #[arg(long, global = true)]
    no_color: bool,

    /// Write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive terminal UI (default)
    Tui,
    /// Submit a prompt and print stage updates as lines
    Request {
        /// The model description; words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
}

mod exit_codes {
    use std::process::ExitCode;

    /// The session reached its last stage
    pub fn done() -> ExitCode {
        ExitCode::SUCCESS
    }

    /// The session stopped on an error
    pub fn failed() -> ExitCode {
        ExitCode::from(1)
    }

    /// Bad input or configuration
    pub fn usage() -> ExitCode {
        ExitCode::from(2)
    }

    /// Interrupted with Ctrl+C
    pub fn interrupted() -> ExitCode {
        ExitCode::from(130)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut cli = Cli::parse();
    let command = cli.command.take().unwrap_or(Commands::Tui);

    let destination = match (&cli.log_file, &command) {
        (Some(path), _) => LogDestination::File(path.clone()),
        (None, Commands::Tui) => LogDestination::Disabled,
        (None, Commands::Request { .. }) => LogDestination::Stderr,
    };
    let colors = PlainDisplay::<std::io::Stdout>::detect_color_support(cli.no_color);
    let logging = LoggingConfig::from_verbosity(cli.verbose, cli.quiet)
        .with_destination(destination)
        .with_ansi(colors);
    if let Err(e) = init_logging(logging) {
        eprintln!("error: cannot open log file: {}", e);
        return Ok(exit_codes::usage());
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {}", message);
            return Ok(exit_codes::usage());
        }
    };
    let backend = match HttpBackend::new(&config.base_url, config.request_timeout()) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(exit_codes::usage());
        }
    };
    tracing::debug!(base_url = %backend.base_url(), "backend configured");

    match command {
        Commands::Tui => {
            ui::tui::run(config, backend).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Request { prompt } => Ok(run_request(config, backend, &prompt, colors).await?),
    }
}

fn load_config(cli: &Cli) -> Result<ClientConfig, String> {
    let mut config = ClientConfig::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url.clone());
        config.validate().map_err(|e| e.to_string())?;
    }
    Ok(config)
}

/// Run one session without the interactive UI.
async fn run_request(
    config: ClientConfig,
    backend: Arc<HttpBackend>,
    words: &[String],
    colors: bool,
) -> std::io::Result<ExitCode> {
    let prompt = words.join(" ").trim().to_string();
    if prompt.is_empty() {
        eprintln!("error: the prompt must not be empty");
        return Ok(exit_codes::usage());
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let backend: Arc<dyn StageBackend> = backend;
    let session = SessionHandle::spawn(backend, &config, prompt, 1, events_tx);

    let (interrupt_tx, mut interrupt_rx) = mpsc::unbounded_channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    }) {
        tracing::warn!(error = %e, "could not install Ctrl+C handler");
    }

    let mut display = PlainDisplay::stdout(colors);
    loop {
        tokio::select! {
            message = events_rx.recv() => {
                let Some(message) = message else { break };
                display.show(&message.event)?;
                match &message.event {
                    // Nothing animates here, so every card is done at once.
                    SessionEvent::StageUpdated(report) => session.card_completed(report.stage),
                    SessionEvent::Finished | SessionEvent::Failed(_) => break,
                    _ => {}
                }
            }
            _ = interrupt_rx.recv() => {
                tracing::info!("interrupted");
                session.cancel();
                break;
            }
        }
    }
    display.into_inner();

    Ok(match session.join().await {
        SessionOutcome::Finished => exit_codes::done(),
        SessionOutcome::Failed(_) => exit_codes::failed(),
        SessionOutcome::Cancelled => exit_codes::interrupted(),
    })
}
