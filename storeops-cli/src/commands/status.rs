//! `storage-ops status` — schedule visibility.

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use storeops_core::schedule::{is_due_at, next_due};
use storeops_core::state::{self, unix_now};
use storeops_core::{Config, Interval, LastRunState, OperationId, RuntimePaths};

use super::format_age;

/// Arguments for `storage-ops status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, paths: &RuntimePaths) -> Result<i32> {
        let config = storeops_core::config::load(paths).context("failed to load configuration")?;
        let last_run = state::load_at(&paths.state_file).context("failed to load last-run state")?;

        let rows = build_rows(&config, &last_run, unix_now());
        if self.json {
            print_json(&config, &rows)?;
        } else {
            print_table(&config, rows);
        }
        Ok(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStatus {
    pub kind: &'static str,
    pub id: String,
    pub target: String,
    pub interval: String,
    pub last_run: Option<f64>,
    pub next_due: Option<f64>,
    pub due: bool,
    /// Scrubs and fast passes never run until seeded.
    pub seeded: bool,
}

#[derive(Serialize)]
struct StatusJson<'a> {
    host: &'a str,
    due: usize,
    operations: &'a [OperationStatus],
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "target")]
    target: String,
    #[tabled(rename = "interval")]
    interval: String,
    #[tabled(rename = "last run")]
    last_run: String,
    #[tabled(rename = "next due")]
    next_due: String,
}

pub fn build_rows(config: &Config, last_run: &LastRunState, now: f64) -> Vec<OperationStatus> {
    let row = |kind, id: OperationId, target: String, interval: Interval, first_run| {
        OperationStatus {
            kind,
            target,
            interval: interval.to_string(),
            last_run: last_run.get(&id),
            next_due: next_due(last_run, &id, interval),
            due: is_due_at(last_run, &id, interval, first_run, now),
            seeded: first_run || last_run.contains(&id),
            id: id.0,
        }
    };

    let mut rows = Vec::new();
    for spec in &config.sync_specs {
        rows.push(row(
            "sync",
            spec.operation_id(),
            format!("{} -> {}", spec.source.display(), spec.destination.display()),
            spec.interval,
            true,
        ));
    }
    for spec in &config.scrub_specs {
        let target = spec.directory.display().to_string();
        rows.push(row("scrub", spec.scrub_id(), target.clone(), spec.interval, false));
        rows.push(row(
            "parity",
            spec.parity_id(),
            target,
            spec.interval.fast_parity(),
            false,
        ));
    }
    rows
}

fn print_json(config: &Config, rows: &[OperationStatus]) -> Result<()> {
    let payload = StatusJson {
        host: &config.friendly_name,
        due: rows.iter().filter(|r| r.due).count(),
        operations: rows,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(config: &Config, rows: Vec<OperationStatus>) {
    let due = rows.iter().filter(|r| r.due).count();
    println!(
        "storage-ops v{} | {} | {} operations | {} due",
        env!("CARGO_PKG_VERSION"),
        config.friendly_name,
        rows.len(),
        due,
    );
    if rows.is_empty() {
        println!("No sync or scrub specs configured.");
        return;
    }

    let now = unix_now();
    let unseeded = rows.iter().filter(|r| !r.seeded).count();
    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            kind: row.kind.to_string(),
            target: row.target,
            interval: row.interval,
            last_run: row
                .last_run
                .filter(|t| *t > 0.0)
                .map(|t| format!("{} ago", format_age(now, t)))
                .unwrap_or_else(|| "never".to_string()),
            next_due: if !row.seeded {
                "not seeded".bright_black().to_string()
            } else if row.due {
                "now".yellow().bold().to_string()
            } else {
                row.next_due.map(format_timestamp).unwrap_or_default()
            },
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if unseeded > 0 {
        println!("Run 'storage-ops seed' to schedule unseeded scrubs.");
    }
}

fn format_timestamp(unix: f64) -> String {
    Local
        .timestamp_opt(unix as i64, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
