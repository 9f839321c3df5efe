use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

use intervalrs::config::AppConfig;
use intervalrs::import::{ImportManager, JustRideSource, WorkoutSource};
use intervalrs::logging::init_logging;
use intervalrs::models::{Metric, Workout};
use intervalrs::playback::{self, PlaybackEngine, PlaybackSnapshot, PlaybackState};
use intervalrs::telemetry;
use intervalrs::zones::{zone_span_label, HeartRateZone, PowerZone, Zone, MISSING_VALUE};

/// intervalrs - Structured indoor cycling workouts
///
/// Parses workout scripts, decodes smart-trainer telemetry and plays
/// interval sessions in the terminal.
#[derive(Parser)]
#[command(name = "intervalrs")]
#[command(version)]
#[command(about = "Structured indoor cycling workout player", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an Indoor Bike Data frame given as hex
    Decode {
        /// Frame bytes, e.g. "44 02 f6 09 b4 00 c8 00"
        hex: String,
    },

    /// Parse a workout file and list its intervals
    Parse {
        /// Workout file (.zwo or .json)
        file: PathBuf,

        /// Print the parsed workout as JSON
        #[arg(long)]
        json: bool,
    },

    /// List every workout file in a directory
    Library {
        /// Directory containing .zwo and .json workouts
        dir: PathBuf,
    },

    /// Show power and heart-rate zone tables
    Zones {
        /// FTP in watts (defaults to the configured value)
        #[arg(long)]
        ftp: Option<i32>,

        /// Max heart rate in bpm (defaults to the configured value)
        #[arg(long = "max-hr")]
        max_hr: Option<i32>,
    },

    /// Play a workout in real time; Ctrl-C finishes the session
    Play {
        /// Workout file, or "just-ride" for a free ride
        source: String,

        /// Length of a just-ride session in minutes (open-ended if omitted)
        #[arg(long)]
        minutes: Option<f64>,

        /// Feed a constant power reading to the average
        #[arg(long, value_name = "WATTS")]
        simulate_power: Option<i32>,
    },

    /// Configure application settings
    Config {
        /// List all configuration options
        #[arg(short, long)]
        list: bool,

        /// Set a configuration value (KEY=VALUE)
        #[arg(short, long)]
        set: Option<String>,

        /// Get a configuration value
        #[arg(short, long)]
        get: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(AppConfig::default_config_path);
    let mut config = AppConfig::load_or_default(&config_path);

    let mut log_config = config.logging.clone();
    log_config.level = log_config.level.raised_by(cli.verbose);
    init_logging(&log_config)?;

    match cli.command {
        Commands::Decode { hex } => decode_frame(&hex),
        Commands::Parse { file, json } => parse_file(&file, json, &config),
        Commands::Library { dir } => list_library(&dir),
        Commands::Zones { ftp, max_hr } => {
            show_zones(ftp.or(config.athlete.ftp_watts), max_hr.or(config.athlete.max_hr));
            Ok(())
        }
        Commands::Play {
            source,
            minutes,
            simulate_power,
        } => play(&source, minutes, simulate_power, &config),
        Commands::Config { list, set, get } => {
            manage_config(&mut config, &config_path, list, set, get)
        }
    }
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let digits: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();

    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        bail!("Invalid hex digit: {}", bad);
    }
    if digits.len() % 2 != 0 {
        bail!("Hex input has an odd number of digits");
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("Invalid hex byte: {}", &digits[i..i + 2]))
        })
        .collect()
}

fn decode_frame(hex: &str) -> Result<()> {
    let bytes = parse_hex(hex)?;
    let Some(metrics) = telemetry::decode(&bytes) else {
        println!(
            "{}",
            format!("Frame too short ({} bytes), ignored", bytes.len()).yellow()
        );
        return Ok(());
    };

    let show = |value: Option<String>| value.unwrap_or_else(|| MISSING_VALUE.to_string());
    println!("{}", "Indoor Bike Data".green().bold());
    println!("  Speed:      {}", show(metrics.speed_kph.map(|v| format!("{:.2} km/h", v))));
    println!("  Cadence:    {}", show(metrics.cadence_rpm.map(|v| format!("{:.1} rpm", v))));
    println!("  Power:      {}", show(metrics.power_watts.map(|v| format!("{} W", v))));
    println!("  Heart rate: {}", show(metrics.heart_rate_bpm.map(|v| format!("{} bpm", v))));
    Ok(())
}

fn format_clock(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

#[derive(Tabled)]
struct IntervalRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Watts")]
    watts: String,
}

fn parse_file(file: &Path, json: bool, config: &AppConfig) -> Result<()> {
    let workout = ImportManager::new()
        .import_file(file)
        .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workout)?);
        return Ok(());
    }

    println!("{}", workout.name.green().bold());
    if let Some(description) = &workout.description {
        println!("{}", description.dimmed());
    }
    println!(
        "Total: {}  Intervals: {}",
        format_clock(workout.total_duration()),
        workout.intervals.len()
    );

    let ftp = config.athlete.ftp_watts;
    let rows: Vec<IntervalRow> = workout
        .intervals
        .iter()
        .enumerate()
        .map(|(i, interval)| {
            let target = interval.power_target;
            IntervalRow {
                index: i + 1,
                name: interval.name.clone(),
                kind: format!("{:?}", interval.interval_type),
                duration: format_clock(interval.duration_secs),
                target: target
                    .and_then(|t| zone_span_label(&t.zones()))
                    .unwrap_or_else(|| MISSING_VALUE.to_string()),
                watts: match (target, ftp) {
                    (Some(t), Some(ftp)) => t
                        .watts(ftp)
                        .map(|(lo, hi)| format!("{}–{} W", lo, hi))
                        .unwrap_or_else(|| MISSING_VALUE.to_string()),
                    (Some(_), None) => "Set FTP".to_string(),
                    (None, _) => MISSING_VALUE.to_string(),
                },
            }
        })
        .collect();

    if !rows.is_empty() {
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
    Ok(())
}

#[derive(Tabled)]
struct LibraryRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Intervals")]
    intervals: usize,
    #[tabled(rename = "Duration")]
    duration: String,
}

fn list_library(dir: &Path) -> Result<()> {
    let workouts = ImportManager::new().import_directory(dir)?;
    if workouts.is_empty() {
        println!("{}", format!("No workouts found in {}", dir.display()).yellow());
        return Ok(());
    }

    let rows: Vec<LibraryRow> = workouts
        .iter()
        .map(|workout| LibraryRow {
            id: workout.id.clone(),
            name: workout.name.clone(),
            intervals: workout.intervals.len(),
            duration: format_clock(workout.total_duration()),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}

#[derive(Tabled)]
struct ZoneRow {
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Range")]
    range: String,
    #[tabled(rename = "Absolute")]
    absolute: String,
}

fn percent(fraction: f64) -> String {
    format!("{:.0}%", fraction * 100.0)
}

fn show_zones(ftp: Option<i32>, max_hr: Option<i32>) {
    let power_rows: Vec<ZoneRow> = PowerZone::ALL
        .iter()
        .map(|zone| {
            let (lower, upper) = zone.range();
            ZoneRow {
                zone: zone.short_name(),
                name: zone.name().to_string(),
                range: match upper {
                    Some(upper) => format!("{}–{}", percent(lower), percent(upper)),
                    None => format!("{}+", percent(lower)),
                },
                absolute: ftp
                    .filter(|ftp| *ftp > 0)
                    .map(|ftp| zone.watt_range_label(ftp))
                    .unwrap_or_else(|| "Set FTP".to_string()),
            }
        })
        .collect();

    println!("{}", "Power zones (% FTP)".cyan().bold());
    println!("{}", Table::new(power_rows).with(Style::rounded()));

    let hr_rows: Vec<ZoneRow> = HeartRateZone::ALL
        .iter()
        .map(|zone| {
            let (lower, upper) = zone.range();
            ZoneRow {
                zone: zone.short_name(),
                name: zone.label().to_string(),
                range: format!("{}–{}", percent(lower), percent(upper)),
                absolute: max_hr
                    .filter(|hr| *hr > 0)
                    .map(|hr| zone.bpm_range_label(hr))
                    .unwrap_or_else(|| "Set max HR".to_string()),
            }
        })
        .collect();

    println!("{}", "Heart-rate zones (% max HR)".magenta().bold());
    println!("{}", Table::new(hr_rows).with(Style::rounded()));
}

fn workout_source(source: &str, minutes: Option<f64>) -> Result<Box<dyn WorkoutSource>> {
    if source == Workout::JUST_RIDE_ID {
        return Ok(Box::new(match minutes {
            Some(minutes) => JustRideSource::timed(minutes * 60.0),
            None => JustRideSource::open_ended(),
        }));
    }
    ImportManager::new()
        .source_for_file(Path::new(source))
        .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))
}

fn status_line(snapshot: &PlaybackSnapshot) -> String {
    let average = snapshot
        .average_power
        .map(|w| format!("{} W", w))
        .unwrap_or_else(|| MISSING_VALUE.to_string());

    if snapshot.open_ended {
        return format!(
            "{}  elapsed {}  avg {}",
            snapshot.workout_name.as_deref().unwrap_or_default(),
            format_clock(snapshot.total_elapsed),
            average
        );
    }

    let remaining = snapshot
        .remaining_in_interval
        .map(format_clock)
        .unwrap_or_else(|| MISSING_VALUE.to_string());
    let label = match &snapshot.interval_name {
        Some(name) => format!(
            "[{}/{}] {}",
            snapshot.interval_index + 1,
            snapshot.interval_count,
            name
        ),
        None => snapshot.workout_name.clone().unwrap_or_default(),
    };
    format!(
        "{}  remaining {}  progress {:.0}%  avg {}",
        label,
        remaining,
        snapshot.progress * 100.0,
        average
    )
}

fn print_summary(workout: &Workout, snapshot: &PlaybackSnapshot) {
    println!();
    println!("{}", "Workout finished".green().bold());
    println!("  Time: {}", format_clock(snapshot.total_elapsed));
    for metric in workout.finished_display_metrics() {
        match metric {
            Metric::AveragePower => println!(
                "  Average power: {}",
                snapshot
                    .average_power
                    .map(|w| format!("{} W", w))
                    .unwrap_or_else(|| MISSING_VALUE.to_string())
            ),
            // No live sensor in the terminal player
            other => println!("  {:?}: {}", other, MISSING_VALUE),
        }
    }
}

fn play(source: &str, minutes: Option<f64>, simulate_power: Option<i32>, config: &AppConfig) -> Result<()> {
    let source = workout_source(source, minutes)?;

    let mut engine = PlaybackEngine::new(&config.playback);
    engine
        .load(source.as_ref())
        .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;
    if let Some(watts) = simulate_power {
        engine.set_average_source(Box::new(move || Some(watts)));
    }
    let workout = engine
        .workout()
        .cloned()
        .context("No workout loaded")?;

    println!("{}", format!("Playing {}", workout.name).green().bold());
    if workout.is_open_ended() {
        println!("{}", "Press Ctrl-C to finish".dimmed());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let last = runtime.block_on(async {
        let (handle, mut snapshots, task) = playback::spawn(engine, &config.playback);
        handle.start().await?;

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interrupted = false;
        let mut shown_index = None;
        let mut last = snapshots.borrow().clone();

        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    last = snapshots.borrow_and_update().clone();

                    if shown_index != Some(last.interval_index) && last.interval_name.is_some() {
                        shown_index = Some(last.interval_index);
                        if let Some(message) = &last.interval_message {
                            println!("\r{}", message.cyan());
                        }
                    }
                    print!("\r{:<80}", status_line(&last));
                    std::io::stdout().flush()?;

                    if last.state == PlaybackState::Finished {
                        break;
                    }
                }
                result = &mut ctrl_c, if !interrupted => {
                    interrupted = true;
                    result?;
                    handle.finish().await?;
                }
            }
        }

        handle.shutdown().await?;
        task.await?;
        anyhow::Ok(last)
    })?;

    print_summary(&workout, &last);
    Ok(())
}

fn manage_config(
    config: &mut AppConfig,
    path: &Path,
    list: bool,
    set: Option<String>,
    get: Option<String>,
) -> Result<()> {
    if let Some(assignment) = set {
        config.apply_assignment(&assignment)?;
        config.save_to_file(path)?;
        println!("{} {}", "✓ Updated".green(), path.display());
    } else if let Some(key) = get {
        println!("{}", config.get_value(&key)?);
    } else if list {
        println!("{}", format!("Configuration ({})", path.display()).white().bold());
        for key in AppConfig::KEYS {
            println!("  {} = {}", key.cyan(), config.get_value(key)?);
        }
    } else {
        println!("Use --list, --get KEY or --set KEY=VALUE");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_accepts_separators() {
        let bytes = parse_hex("0x44:00 F6-09 b4 00 c8 00").unwrap();
        assert_eq!(bytes, vec![0x44, 0x00, 0xF6, 0x09, 0xB4, 0x00, 0xC8, 0x00]);
    }

    #[test]
    fn test_parse_hex_rejects_non_hex_characters() {
        assert!(parse_hex("aé0").is_err());
        assert!(parse_hex("éé").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_parse_hex_rejects_odd_length() {
        assert!(parse_hex("440").is_err());
    }
}
