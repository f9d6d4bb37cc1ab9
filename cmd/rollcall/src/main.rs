//! rollcall - voice-verified attendance from the command line.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use rollcall_attendance::{AttendanceService, ServiceConfig};
use rollcall_kv::RedbStore;

/// Voice-verified attendance tracking.
#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(about = "Voice-verified attendance tracking")]
struct Args {
    /// Database file
    #[arg(long, default_value = "rollcall.redb")]
    db: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enroll a new identity from an audio file (wav/mp3/m4a)
    Enroll {
        identity: String,
        name: String,
        audio: PathBuf,
    },
    /// Verify a voice sample against an enrolled identity
    Verify { identity: String, audio: PathBuf },
    /// Mark today's attendance from a voice sample
    Attend { identity: String, audio: PathBuf },
    /// Show attendance for a date (default: today)
    Report {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show recent security events
    Events {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// List enrolled identities
    Roster,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let store = RedbStore::open(&args.db)
        .with_context(|| format!("open database {}", args.db.display()))?;
    let service = AttendanceService::new(Arc::new(store), ServiceConfig::default());

    match args.cmd {
        Command::Enroll {
            identity,
            name,
            audio,
        } => {
            let bytes = read_audio(&audio)?;
            let outcome = service.enroll(&identity, &name, &bytes);
            println!("{}", outcome.message());
            Ok(exit_for(outcome.success()))
        }
        Command::Verify { identity, audio } => {
            let bytes = read_audio(&audio)?;
            let outcome = service.verify(&identity, &bytes);
            println!("{}", outcome.message());
            Ok(exit_for(outcome.success()))
        }
        Command::Attend { identity, audio } => {
            let bytes = read_audio(&audio)?;
            let outcome = service.mark_attendance(&identity, &bytes);
            println!("{}", outcome.message());
            if let Some(similarity) = outcome.similarity() {
                println!("similarity: {similarity:.4}");
            }
            Ok(exit_for(outcome.success()))
        }
        Command::Report { date } => {
            let date = date.unwrap_or_else(|| service.today());
            let entries = service
                .attendance_for_date(date)
                .map_err(|r| anyhow::anyhow!("{r}"))?;
            if entries.is_empty() {
                println!("no attendance recorded for {date}");
            }
            for (identity, entry) in entries {
                println!(
                    "{identity}  {}  {}  {:.4}",
                    entry.display_name,
                    entry.timestamp.format("%H:%M:%S"),
                    entry.similarity
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Events { days } => {
            for event in service.security_events(days) {
                println!(
                    "{}  {}  {}  {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.kind,
                    event.identity.as_deref().unwrap_or("-"),
                    event.details
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Roster => {
            for (identity, name) in service
                .enrolled_identities()
                .map_err(|r| anyhow::anyhow!("{r}"))?
            {
                println!("{identity}  {name}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read_audio(path: &PathBuf) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read audio file {}", path.display()))
}

fn exit_for(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
