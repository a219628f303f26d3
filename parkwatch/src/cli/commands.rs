//! CLI command execution.

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Config;
use crate::controller::{occupancy_lines, Controller, Outcome};
use crate::ledger::SessionLedger;
use crate::mirror::{spawn_replication, HttpMirror};
use crate::models::{format_timestamp, normalize_plate};
use crate::provider::{CommandCapture, CommandRecognizer};
use crate::store::CsvStore;

use super::{Cli, Commands};

pub async fn execute(cli: Cli) -> Result<()> {
    let config = Config::from_cli(&cli)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_console(&config).await,
        Commands::Entry { plate } => record_entry(&config, &plate.join(" ")).await,
        Commands::Exit { plate } => record_exit(&config, &plate.join(" ")).await,
        Commands::Status => show_status(&config),
        Commands::History { plate, limit } => show_history(&config, plate.as_deref(), limit),
    }
}

/// Open the ledger for writing and attach the mirror if one is configured.
///
/// The returned handle finishes once the ledger is dropped and every
/// queued change has been sent.
fn open_ledger(config: &Config) -> Result<(SessionLedger, Option<JoinHandle<()>>)> {
    let store = CsvStore::open(&config.ledger_path)
        .with_context(|| format!("Failed to open ledger {}", config.ledger_path.display()))?;
    let ledger = SessionLedger::open(store, config.max_slots)
        .with_context(|| format!("Failed to load ledger {}", config.ledger_path.display()))?;

    let Some(mirror) = &config.mirror else {
        return Ok((ledger, None));
    };

    let client = HttpMirror::new(&mirror.url, mirror.auth.clone(), mirror.timeout)?;
    let (sink, handle) = spawn_replication(client);
    Ok((ledger.with_sink(sink), Some(handle)))
}

/// Open the ledger without taking the writer lock.
fn read_ledger(config: &Config) -> Result<SessionLedger> {
    SessionLedger::open(CsvStore::read_only(&config.ledger_path), config.max_slots)
        .with_context(|| format!("Failed to load ledger {}", config.ledger_path.display()))
}

async fn finish_replication(handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        if let Err(e) = handle.await {
            warn!("replication task ended abnormally: {e}");
        }
    }
}

async fn run_console(config: &Config) -> Result<()> {
    let capture_cmd = config
        .capture_cmd
        .as_deref()
        .context("No capture command configured (--capture-cmd or PARKWATCH_CAPTURE_CMD)")?;
    let recognize_cmd = config
        .recognize_cmd
        .as_deref()
        .context("No recognizer configured (--recognize-cmd or PARKWATCH_RECOGNIZE_CMD)")?;

    let capture = CommandCapture::new(capture_cmd, config.provider_timeout)?;
    let recognizer = CommandRecognizer::new(recognize_cmd, config.provider_timeout)?;
    let (ledger, replication) = open_ledger(config)?;

    println!("\n=== Parking Gate ===");
    println!(
        "Ledger: {} ({} of {} slots free)",
        config.ledger_path.display(),
        ledger.available_slots().len(),
        ledger.max_slots()
    );
    if let Some(mirror) = &config.mirror {
        println!("Mirror: {}", mirror.url);
    }
    println!();

    let mut console = Controller::new(ledger, capture, recognizer);
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let result = console.run(stdin, &mut stdout).await;
    debug!(
        state = ?console.state(),
        parked = console.ledger().open_sessions().len(),
        "console closed"
    );

    drop(console);
    finish_replication(replication).await;
    result
}

async fn record_entry(config: &Config, plate: &str) -> Result<()> {
    let (mut ledger, replication) = open_ledger(config)?;
    let result = ledger.allocate(plate);
    drop(ledger);
    finish_replication(replication).await;

    let slot = result?;
    println!(
        "{}",
        Outcome::Entered {
            plate: normalize_plate(plate),
            slot
        }
    );
    Ok(())
}

async fn record_exit(config: &Config, plate: &str) -> Result<()> {
    let (mut ledger, replication) = open_ledger(config)?;
    let result = ledger.close(plate);
    drop(ledger);
    finish_replication(replication).await;

    let slot = result?;
    println!(
        "{}",
        Outcome::Exited {
            plate: normalize_plate(plate),
            slot
        }
    );
    Ok(())
}

fn show_status(config: &Config) -> Result<()> {
    let ledger = read_ledger(config)?;
    for line in occupancy_lines(ledger.max_slots(), &ledger.open_sessions()) {
        println!("{line}");
    }
    Ok(())
}

fn show_history(config: &Config, plate: Option<&str>, limit: usize) -> Result<()> {
    let ledger = read_ledger(config)?;
    let plate = plate.map(normalize_plate);

    let sessions: Vec<_> = ledger
        .sessions()
        .iter()
        .rev()
        .filter(|s| plate.as_deref().is_none_or(|p| s.plate == p))
        .take(limit)
        .collect();

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<12} {:<6} {:<20} {:<20} {:<8}",
        "PLATE", "SLOT", "ENTRY", "EXIT", "STATUS"
    );
    println!("{}", "-".repeat(70));

    for session in sessions {
        let exit = session
            .exit_time
            .map_or_else(|| "-".to_string(), format_timestamp);
        println!(
            "{:<12} {:<6} {:<20} {:<20} {:<8}",
            session.plate,
            session.slot,
            format_timestamp(session.entry_time),
            exit,
            session.status().as_str(),
        );
    }

    Ok(())
}
