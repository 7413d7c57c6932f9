//! `bloqueos` CLI: expand, export and conflict-check resource blocks offline.
//!
//! Blocks and appointments are read as JSON in the engine's own model
//! (snake_case fields, `SALA`/`PROFESIONAL` or `ROOM`/`PRACTITIONER`).
//!
//! ## Usage
//!
//! ```sh
//! # Occurrences of a block (stdin → stdout)
//! cat bloqueo.json | bloqueos expand --tz America/Santiago
//!
//! # Only occurrences inside a window, as JSON
//! bloqueos expand -i bloqueo.json --from 2025-03-01T00:00:00Z --to 2025-04-01T00:00:00Z --json
//!
//! # RFC 5545 rendering, with the first dates an iCalendar client would produce
//! bloqueos rrule -i bloqueo.json --dates 5
//!
//! # Conflict check against exported appointments (exit code 2 on conflict)
//! bloqueos check -i bloqueo.json --appointments citas.json
//! ```

use std::io::{self, Read};
use std::process;

use anyhow::{Context, Result};
use block_engine::ical::{block_rrule_text, export_starts, rrule_set};
use block_engine::{
    expand, Appointment, BlockDefinition, BlockDraft, ConflictDetector, ConflictReport, DstPolicy,
    EngineConfig, HorizonCap, IntervalIndex, Occurrence, TimeWindow, TimeZones,
};
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Exit status when `check` finds a conflict.
const EXIT_CONFLICT: i32 = 2;

#[derive(Parser)]
#[command(name = "bloqueos", version, about = "Recurring resource block tools")]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EngineArgs {
    /// Time zone for sites without an entry in --site-tz
    #[arg(long, global = true, default_value = "UTC", value_parser = parse_tz)]
    tz: Tz,
    /// Per-site zones as site=Area/City, comma separated
    #[arg(long, global = true)]
    site_tz: Option<String>,
    /// How occurrences falling in a DST gap are placed
    #[arg(long, global = true, value_enum, default_value_t = DstArg::WallClock)]
    dst: DstArg,
    /// Maximum occurrences generated per block
    #[arg(long, global = true)]
    max_occurrences: Option<u32>,
    /// Maximum years after the base date
    #[arg(long, global = true)]
    max_years: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DstArg {
    Skip,
    ShiftForward,
    WallClock,
}

impl From<DstArg> for DstPolicy {
    fn from(arg: DstArg) -> Self {
        match arg {
            DstArg::Skip => DstPolicy::Skip,
            DstArg::ShiftForward => DstPolicy::ShiftForward,
            DstArg::WallClock => DstPolicy::WallClock,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the occurrences of a block
    Expand {
        /// Block JSON file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
        /// Only occurrences ending after this instant (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Only occurrences starting before this instant (RFC 3339)
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        /// Print at most this many occurrences
        #[arg(long)]
        limit: Option<usize>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the block's recurrence as an RFC 5545 RRULE
    Rrule {
        /// Block JSON file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Also print the first N start dates, expanded by the `rrule` crate
        #[arg(long)]
        dates: Option<u16>,
    },
    /// Check a block against appointments; exits with status 2 on conflict
    Check {
        /// Block JSON file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// JSON array of appointments
        #[arg(short, long)]
        appointments: String,
        /// Days past the block start to check (default 365)
        #[arg(long)]
        horizon_days: Option<u32>,
        /// Stop at the first conflicting occurrence
        #[arg(long)]
        first: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = engine_config(&cli.engine)?;

    match cli.command {
        Commands::Expand {
            input,
            output,
            from,
            to,
            limit,
            json,
        } => {
            let definition = read_block(input.as_deref(), &config)?;
            let open = TimeWindow::unbounded();
            let window = TimeWindow::new(from.unwrap_or(open.start), to.unwrap_or(open.end));

            let occurrences = expand(None, &definition, window, &config.context())
                .take(limit.unwrap_or(usize::MAX))
                .collect::<Result<Vec<Occurrence>, _>>()
                .context("Failed to expand block")?;

            let rendered = if json {
                serde_json::to_string_pretty(&occurrences)?
            } else {
                let tz = config.tz(&definition.site_id);
                occurrences
                    .iter()
                    .map(|o| occurrence_line(o, &tz))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            write_output(output.as_deref(), &rendered)?;
        }
        Commands::Rrule { input, dates } => {
            let definition = read_block(input.as_deref(), &config)?;
            println!("{}", block_rrule_text(&definition, &config.zones));

            if let Some(limit) = dates {
                let set = rrule_set(&definition, &config.zones)
                    .context("The rrule crate rejected the exported rule")?;
                for start in export_starts(&set, limit) {
                    println!("{}", start.to_rfc3339_opts(SecondsFormat::Secs, true));
                }
            }
        }
        Commands::Check {
            input,
            appointments,
            horizon_days,
            first,
            json,
        } => {
            if let Some(days) = horizon_days {
                config.conflict_horizon_days = days;
            }
            let definition = read_block(input.as_deref(), &config)?;
            let raw = read_input(Some(&appointments))?;
            let appointments: Vec<Appointment> =
                serde_json::from_str(&raw).context("Failed to parse appointments JSON")?;

            let index = IntervalIndex::from_parts(appointments, Vec::new());
            let detector = ConflictDetector::new(&index, &config, config.context());
            let report = if first {
                detector.check_first(None, &definition)
            } else {
                detector.check(None, &definition)
            }
            .context("Failed to expand block")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            if report.has_conflict {
                process::exit(EXIT_CONFLICT);
            }
        }
    }

    Ok(())
}

fn parse_tz(raw: &str) -> Result<Tz, String> {
    raw.parse()
        .map_err(|_| format!("'{raw}' is not an IANA time zone"))
}

fn engine_config(args: &EngineArgs) -> Result<EngineConfig> {
    let mut zones = TimeZones::new(args.tz);
    if let Some(raw) = &args.site_tz {
        zones.sites = TimeZones::parse_sites(raw).map_err(anyhow::Error::msg)?;
    }
    let defaults = HorizonCap::default();
    Ok(EngineConfig {
        dst: args.dst.into(),
        cap: HorizonCap {
            max_occurrences: args.max_occurrences.unwrap_or(defaults.max_occurrences),
            max_years: args.max_years.unwrap_or(defaults.max_years),
        },
        ..EngineConfig::with_zones(zones)
    })
}

/// Parse and validate a block draft; full-day windows come back normalized.
fn read_block(path: Option<&str>, config: &EngineConfig) -> Result<BlockDefinition> {
    let raw = read_input(path)?;
    let draft: BlockDraft = serde_json::from_str(&raw).context("Failed to parse block JSON")?;
    let valid = draft
        .validate(&config.zones, None)
        .context("Invalid block")?;
    Ok(valid.definition().clone())
}

fn occurrence_line(occurrence: &Occurrence, tz: &Tz) -> String {
    let local = occurrence.window.start.with_timezone(tz);
    format!(
        "{:>4}  {}  {}  {}",
        occurrence.index,
        occurrence.window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        occurrence.window.end.to_rfc3339_opts(SecondsFormat::Secs, true),
        local.format("%a %Y-%m-%d %H:%M %Z"),
    )
}

fn print_report(report: &ConflictReport) {
    if !report.has_conflict {
        println!("No conflicts");
        return;
    }
    for conflict in &report.conflicts {
        println!(
            "occurrence {} {} conflicts with {}",
            conflict.occurrence.index,
            conflict.occurrence.window,
            conflict.conflicting_appointment_ids.join(", "),
        );
    }
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&str>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
