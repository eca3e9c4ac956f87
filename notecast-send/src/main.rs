//! notecast-send - Background daemon for publishing scheduled notes
//!
//! Monitors the note queue and publishes due notes to X and Nostr
//! at their scheduled time.

use clap::Parser;
use libnotecast::logging::{LogFormat, LoggingConfig};
use libnotecast::{Config, Database, Dispatcher, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "notecast-send")]
#[command(version)]
#[command(about = "Background daemon for publishing scheduled notes")]
#[command(long_about = "\
notecast-send - Background daemon for publishing scheduled notes

DESCRIPTION:
    notecast-send is a long-running daemon that monitors the Notecast
    database and publishes scheduled notes at the right time.

    It polls the database at regular intervals, selects notes that are
    due, resolves each author's platform credentials, publishes with
    retries and backoff, and updates note status afterwards. Notes are
    processed per user so one user's failure cannot block another's.

USAGE:
    # Run in foreground (logs to stderr)
    notecast-send

    # Run with custom poll interval
    notecast-send --poll-interval 30

    # Publish everything currently due, then exit
    notecast-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current pass)

CONFIGURATION:
    Configuration file: ~/.config/notecast/config.toml
    Database location: ~/.local/share/notecast/notes.db

    [dispatch]
    poll_interval = 60      # seconds between polls
    max_attempts = 3        # publish attempts per platform
    backoff_base_secs = 2   # base of the exponential backoff

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Authentication error
    3 - Invalid input

For more information, visit: https://github.com/notecast/notecast
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for due notes (default: 60)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run once and exit
    #[arg(long)]
    #[arg(help = "Publish due notes once and exit")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let dispatcher = Dispatcher::new(db, &config);

    info!("notecast-send daemon starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli.poll_interval.unwrap_or(config.dispatch.poll_interval);
    info!("Poll interval: {}s", poll_interval);

    if cli.once {
        let summary = dispatcher.run_summary().await?;
        println!("{}", summary);
    } else {
        run_daemon_loop(&dispatcher, poll_interval, shutdown).await?;
    }

    info!("notecast-send daemon stopped");
    Ok(())
}

/// Initialize logging based on verbosity level
///
/// Honors `NOTECAST_LOG_FORMAT` and `NOTECAST_LOG_LEVEL`; `--verbose` raises
/// the level to debug.
fn init_logging(verbose: bool) {
    if verbose {
        let format = std::env::var("NOTECAST_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);
        LoggingConfig::new(format, "debug".to_string(), true).init();
    } else {
        libnotecast::logging::init_default();
    }
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libnotecast::NotecastError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    // Spawn thread to handle signals
    let shutdown_clone = shutdown.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown_clone.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

/// Main daemon loop
async fn run_daemon_loop(
    dispatcher: &Dispatcher,
    poll_interval: u64,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        match dispatcher.run().await {
            Ok(published) if published > 0 => {
                info!("Published {} note(s)", published);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error publishing notes: {}", e);
            }
        }

        // Sleep until next poll (check shutdown every second)
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }

    Ok(())
}
