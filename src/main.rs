//! Check-in kiosk - scan QR codes, check members in, show the result
//!
//! Module structure:
//! - `domain/` - Core types (scan events, check-in contracts, screen state)
//! - `io/` - External interfaces (backend HTTP, scanners, console, Prometheus)
//! - `services/` - Decision logic (coordinator, debounce, presenter, sessions, sync)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use checkin_kiosk::domain::types::ResultStyle;
use checkin_kiosk::infra::{Config, Metrics};
use checkin_kiosk::io::{console, scanner, BackendClient};
use checkin_kiosk::services::{ScanCoordinator, SessionSelector, SyncOutcome, SyncTrigger};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Check-in kiosk - QR scanner front end for member check-in
#[derive(Parser, Debug)]
#[command(name = "checkin-kiosk", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/kiosk.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the backend base URL from the config file
    #[arg(long)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the kiosk (default)
    Run {
        /// Session class attached to every check-in
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Prompt for the sync password and sync the member roster once
    Sync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(Config::resolve_config_path);
    let mut config = Config::load_from_path(&config_path);
    if let Some(url) = &args.backend_url {
        config = config.with_backend_url(url);
    }

    info!(git_hash = env!("GIT_HASH"), "checkin-kiosk starting");
    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        backend_url = %config.backend_url(),
        scanner = %config.scanner_source().as_str(),
        policy = %config.debounce_policy().as_str(),
        session_required = %config.session_required(),
        sessions = ?config.session_options(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    match args.command.unwrap_or(Command::Run { session: None }) {
        Command::Run { session } => run_kiosk(config, session).await,
        Command::Sync => run_sync(config).await,
    }
}

async fn run_kiosk(config: Config, session: Option<String>) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new());
    let client = Arc::new(BackendClient::new(&config).context("failed to build HTTP client")?);

    let sessions = SessionSelector::new(&config);
    if let Some(session) = session {
        sessions.select(&session).context("invalid --session")?;
    }

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let coordinator = ScanCoordinator::new(&config, client, sessions.subscribe(), metrics.clone());
    tokio::spawn(console::run_console(coordinator.subscribe()));

    // Start the configured scanner
    let (event_tx, event_rx) = mpsc::channel(256);
    let source = scanner::from_config(&config);
    let settings = config.scan_settings().clone();
    let scanner_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        source.start(settings, event_tx, scanner_shutdown).await;
    });

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_shutdown = shutdown_rx.clone();
        let site_id = config.site_id().to_string();
        tokio::spawn(async move {
            if let Err(e) = checkin_kiosk::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                site_id,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    coordinator.run(event_rx, shutdown_rx).await;

    metrics.report().log();
    info!("checkin-kiosk shutdown complete");
    Ok(())
}

async fn run_sync(config: Config) -> anyhow::Result<()> {
    if !config.sync_enabled() {
        anyhow::bail!("sync is disabled in {}", config.config_file());
    }

    let client = Arc::new(BackendClient::new(&config).context("failed to build HTTP client")?);
    let trigger = SyncTrigger::new(client, Arc::new(Metrics::new()));

    let password = tokio::task::spawn_blocking(read_password)
        .await
        .context("password prompt task failed")?
        .context("failed to read password")?;

    eprintln!("Syncing…");
    match trigger.trigger(password.as_deref()).await {
        SyncOutcome::Skipped => {
            eprintln!("No password entered, sync cancelled.");
            Ok(())
        }
        SyncOutcome::Completed(view) => {
            println!("{}", view.message);
            if view.style == ResultStyle::Failure {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Effect of one key press on the password being typed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKey {
    Continue,
    Submit,
    Cancel,
}

fn apply_password_key(password: &mut String, key: KeyEvent) -> PromptKey {
    if key.kind != KeyEventKind::Press {
        return PromptKey::Continue;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return PromptKey::Cancel;
    }
    match key.code {
        KeyCode::Enter => PromptKey::Submit,
        KeyCode::Esc => PromptKey::Cancel,
        KeyCode::Backspace => {
            password.pop();
            PromptKey::Continue
        }
        KeyCode::Char(c) => {
            password.push(c);
            PromptKey::Continue
        }
        _ => PromptKey::Continue,
    }
}

/// Prompt on stderr. A terminal gets masked input in raw mode; piped stdin
/// is read as one line. `None` means cancelled or end of input.
fn read_password() -> io::Result<Option<String>> {
    let mut stderr = io::stderr();
    write!(stderr, "Sync password: ")?;
    stderr.flush()?;

    if !io::stdin().is_terminal() {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(len);
        return Ok(Some(line));
    }

    terminal::enable_raw_mode()?;
    let result = read_masked(&mut stderr);
    let restored = terminal::disable_raw_mode();
    write!(stderr, "\r\n")?;
    restored?;
    result
}

fn read_masked(out: &mut impl Write) -> io::Result<Option<String>> {
    let mut password = String::new();
    loop {
        let Event::Key(key) = event::read()? else { continue };
        let before = password.chars().count();
        match apply_password_key(&mut password, key) {
            PromptKey::Submit => return Ok(Some(password)),
            PromptKey::Cancel => return Ok(None),
            PromptKey::Continue => {
                let after = password.chars().count();
                if after > before {
                    write!(out, "*")?;
                } else if after < before {
                    write!(out, "\x08 \x08")?;
                }
                out.flush()?;
            }
        }
    }
}
