//! Logs command - inspect the wallet's event log

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;

use roundup_core::services::{EntryPoint, LogEntry, LoggingService};

use super::{confirm, get_wallet_dir};
use crate::output;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent events
    List {
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        /// Only events that carry an error
        #[arg(long)]
        errors: bool,
        /// Only this event (e.g. monitor_completed)
        #[arg(long, conflicts_with = "errors")]
        event: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Delete events older than the retention period
    Prune {
        /// Retention in days
        #[arg(long, default_value = "30")]
        keep_days: i64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Event counts and monitor health
    Stats {
        #[arg(long)]
        json: bool,
    },
}

fn open_log() -> Result<LoggingService> {
    let wallet_dir = get_wallet_dir()?;
    std::fs::create_dir_all(&wallet_dir)?;
    LoggingService::new(&wallet_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))
}

fn when(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Command, method, network and count joined for the table
fn detail(entry: &LogEntry) -> String {
    let mut parts: Vec<String> = [&entry.command, &entry.method, &entry.network]
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    if let Some(count) = entry.count {
        parts.push(format!("{} found", count));
    }
    parts.join(" · ")
}

fn list(service: &LoggingService, limit: usize, errors: bool, event: Option<String>, json: bool) -> Result<()> {
    let entries = if let Some(event) = event {
        service.get_by_event(&event, limit)?
    } else if errors {
        service.get_errors(limit)?
    } else {
        service.get_recent(limit)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        output::info("Log is empty.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["When", "From", "Event", "Detail", "Error"]);
    for entry in &entries {
        let event = if entry.error_message.is_some() {
            entry.event.red().to_string()
        } else {
            entry.event.clone()
        };
        table.add_row(vec![
            when(entry.timestamp),
            entry.entry_point.clone(),
            event,
            detail(entry),
            entry.error_message.clone().unwrap_or_default(),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn prune(service: &LoggingService, keep_days: i64, force: bool) -> Result<()> {
    let cutoff = Utc::now() - Duration::days(keep_days.max(0));
    if !force && !confirm(&format!("Delete events recorded before {}?", cutoff.format("%Y-%m-%d")))? {
        println!("Cancelled.");
        return Ok(());
    }
    let deleted = service.delete_before(cutoff.timestamp_millis())?;
    output::success(&format!("Pruned {} events", deleted));
    Ok(())
}

fn stats(service: &LoggingService, json: bool) -> Result<()> {
    let by_event = service.count_by_event()?;
    let last_run = service.get_by_event("monitor_completed", 1)?.into_iter().next();
    let last_failure = service.get_by_event("monitor_failed", 1)?.into_iter().next();

    if json {
        let events: serde_json::Map<String, serde_json::Value> = by_event
            .iter()
            .map(|(event, n)| (event.clone(), (*n).into()))
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "events": events,
                "lastMonitorRun": last_run.map(|e| e.timestamp),
                "lastMonitorFailure": last_failure.map(|e| e.timestamp),
                "path": service.db_path().to_string_lossy(),
            })
        );
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Event", "Count"]);
    for (event, n) in &by_event {
        table.add_row(vec![event.clone(), n.to_string()]);
    }
    println!("{}", table);

    match last_run {
        Some(run) => println!("Last monitor run:     {}", when(run.timestamp)),
        None => println!("Last monitor run:     {}", "never".dimmed()),
    }
    if let Some(failure) = last_failure {
        println!(
            "Last monitor failure: {} ({})",
            when(failure.timestamp),
            failure.error_message.unwrap_or_default().red()
        );
    }
    println!("Log file: {}", service.db_path().display());
    Ok(())
}

pub fn run(command: LogsCommands) -> Result<()> {
    let service = open_log()?;
    match command {
        LogsCommands::List { limit, errors, event, json } => list(&service, limit, errors, event, json),
        LogsCommands::Prune { keep_days, force } => prune(&service, keep_days, force),
        LogsCommands::Stats { json } => stats(&service, json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LogEntry {
        LogEntry {
            id: 1,
            timestamp: 0,
            entry_point: "monitor".into(),
            app_version: "0.1.0".into(),
            platform: "linux".into(),
            event: "monitor_completed".into(),
            network: Some("test".into()),
            method: None,
            command: None,
            count: Some(2),
            error_message: None,
        }
    }

    #[test]
    fn test_detail_joins_present_fields() {
        assert_eq!(detail(&entry()), "test · 2 found");
    }

    #[test]
    fn test_when_formats_utc() {
        assert_eq!(when(0), "1970-01-01 00:00:00");
    }
}
