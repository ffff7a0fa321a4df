//! redzone_log - reader and checker for the red-zone event log
//!
//! Proves, without running the monitor:
//! - Every line of the log is a well-formed ENTER or LEAVE record
//! - Events alternate ENTER, LEAVE, ENTER, ... starting with ENTER
//! - Each ENTER lists at least one object
//! - Optionally, each ENTER has its snapshot on disk

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use redzone_monitor::eventlog::{read_log, snapshot_file_name, verify_alternation, EventTag};
use redzone_monitor::SnapshotFormat;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "redzone_log", about = "Check a red-zone event log")]
struct Args {
    /// Event log to read
    #[arg(long, default_value = "yolo_redzone_log.txt", value_name = "PATH")]
    log: PathBuf,

    /// Check that every ENTER has a snapshot in this directory
    #[arg(long, value_name = "DIR")]
    snapshots: Option<PathBuf>,

    /// Snapshot image format to look for
    #[arg(long, default_value = "jpg", value_name = "FORMAT")]
    snapshot_format: String,

    /// Print every record
    #[arg(short, long)]
    verbose: bool,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto)]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let ui = ui::Ui::new(
        args.ui,
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );

    let records = {
        let mut stage = ui.stage("Read event log");
        match read_log(&args.log) {
            Ok(records) => {
                stage.detail(format!("{} records", records.len()));
                records
            }
            Err(err) => {
                stage.fail();
                return Err(err);
            }
        }
    };

    println!("redzone_log: checking {}", args.log.display());
    if args.verbose {
        for record in &records {
            match (&record.event, &record.objects) {
                (EventTag::Entered, Some(objects)) => {
                    let names: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();
                    println!("  {} ENTER {}", record.timestamp, names.join(", "));
                }
                _ => println!("  {} LEAVE", record.timestamp),
            }
        }
    }

    let summary = {
        let mut stage = ui.stage("Verify ENTER/LEAVE alternation");
        verify_alternation(&records).inspect_err(|_| stage.fail())?
    };
    println!(
        "verified {} entries and {} exits",
        summary.entries, summary.exits
    );
    if summary.open_at_end {
        println!("zone still occupied at end of log");
    }

    if let Some(dir) = &args.snapshots {
        let format = SnapshotFormat::parse(&args.snapshot_format)?;
        let mut stage = ui.stage("Check snapshots");
        let missing: Vec<PathBuf> = records
            .iter()
            .filter(|record| record.event == EventTag::Entered)
            .map(|record| dir.join(snapshot_file_name(record.timestamp, format)))
            .filter(|path| !path.exists())
            .collect();
        if !missing.is_empty() {
            stage.fail();
            for path in &missing {
                println!("missing snapshot: {}", path.display());
            }
            return Err(anyhow!("{} snapshots missing", missing.len()));
        }
        stage.detail(format!("{} present", summary.entries));
    }

    println!("OK");
    Ok(())
}
