//! # otg-runner
//!
//! Main entry point of the trade gateway session host.
//!
//! Loads a JSON configuration file, creates one session engine per
//! configured entry, starts each with its login request and relays the
//! outbound payloads to stdout. Lines read from stdin are fed to one
//! session as inbound messages.
//!
//! # Usage
//!
//! ```bash
//! otg-runner config.json --log-level info --stdin-session sim-1
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use otg_td::SessionEngine;
use otg_td::sim::SimDriver;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Trade Gateway Session Runner.
#[derive(Parser)]
#[command(name = "otg-runner", about = "Trade Gateway Session Runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output (overrides the config file).
    #[arg(long)]
    log_dir: Option<String>,

    /// Session receiving stdin lines; the first configured one by default.
    #[arg(long)]
    stdin_session: Option<String>,
}

/// Write every queued payload to stdout as `<label>\t<json>`.
fn drain_outputs(engines: &[Arc<SessionEngine>]) {
    for engine in engines {
        let ctx = engine.context();
        for payload in ctx.output().drain() {
            println!("{}\t{payload}", ctx.label());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = otg_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    otg_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name());
    info!(
        "otg-runner starting: config={}, log_level={}, {} session(s)",
        cli.config.display(),
        cli.log_level,
        config.sessions.len()
    );

    // 3. Create and start one engine per session entry
    let wake = Arc::new(Notify::new());
    let mut engines: Vec<Arc<SessionEngine>> = Vec::new();
    for (idx, entry) in config.sessions.iter().enumerate() {
        let driver = match SimDriver::from_value(&entry.driver) {
            Ok(driver) => driver,
            Err(e) => {
                error!("session[{idx}] '{}': bad driver config: {e:#}", entry.label);
                continue;
            }
        };
        let notify = Arc::clone(&wake);
        let engine = SessionEngine::new(
            entry.label.clone(),
            driver,
            Arc::new(move || notify.notify_one()),
            entry.session.clone(),
        );
        match engine.start(entry.login.clone()) {
            Ok(()) => {
                info!("session[{idx}] '{}' started", entry.label);
                engines.push(Arc::new(engine));
            }
            Err(e) => error!("session[{idx}] '{}': start failed: {e}", entry.label),
        }
    }
    if engines.is_empty() {
        anyhow::bail!("no session could be started");
    }

    // 4. Relay outbound payloads whenever a session signals
    let relay = {
        let engines = engines.clone();
        let wake = Arc::clone(&wake);
        tokio::spawn(async move {
            loop {
                wake.notified().await;
                drain_outputs(&engines);
            }
        })
    };

    // 5. Feed stdin lines to the chosen session
    let target = match &cli.stdin_session {
        Some(label) => engines.iter().find(|e| e.context().label() == label).cloned(),
        None => engines.first().cloned(),
    };
    match target {
        Some(target) => {
            info!("stdin feeds session '{}'", target.context().label());
            tokio::spawn(async move {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) if !line.trim().is_empty() => target.push_input(line),
                        Ok(Some(_)) => {}
                        Ok(None) => break,
                        Err(e) => {
                            warn!("stdin read failed: {e}");
                            break;
                        }
                    }
                }
                info!("stdin closed");
            });
        }
        None => warn!("stdin session {:?} not configured; stdin ignored", cli.stdin_session),
    }

    info!("all {} session(s) running, press Ctrl+C to stop", engines.len());

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 7. Stop every session; `stop` joins a worker thread
    for engine in &engines {
        let engine = Arc::clone(engine);
        tokio::task::spawn_blocking(move || engine.stop()).await?;
    }
    relay.abort();
    drain_outputs(&engines);

    info!("all sessions stopped, goodbye");
    Ok(())
}
