//! `info` command implementation.

use serde::Serialize;
use tracing::info;

use concentrator::frame_periods;
use config_loader::{ConcentratorBlueprint, ConfigLoader};
use contracts::ConcentratorConfig;

use crate::cli::InfoArgs;
use crate::error::{CliError, Result};

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    concentrator: ConcentratorConfig,
    ticks_per_frame: f64,
    timer: TimerInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<SourceInfo>,
}

#[derive(Serialize)]
struct TimerInfo {
    /// Distinct wait lengths (ms) and how often each occurs per second
    distribution: Vec<(u32, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    periods: Option<Vec<u32>>,
}

#[derive(Serialize)]
struct SourceInfo {
    id: String,
    signals: usize,
    rate_hz: f64,
    clock_offset_ms: f64,
    jitter_ms: f64,
    bad_timestamp_ratio: f64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()));
    }

    let blueprint = ConfigLoader::load_from_path(&args.config)?;
    let info = build_config_info(&blueprint, args.periods);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

/// Run-length encode the wait periods of one second
fn period_distribution(periods: &[u32]) -> Vec<(u32, usize)> {
    let mut distribution: Vec<(u32, usize)> = Vec::new();
    for &period in periods {
        match distribution.iter_mut().find(|(p, _)| *p == period) {
            Some((_, count)) => *count += 1,
            None => distribution.push((period, 1)),
        }
    }
    distribution.sort_unstable();
    distribution
}

fn build_config_info(blueprint: &ConcentratorBlueprint, with_periods: bool) -> ConfigInfo {
    let config = blueprint.concentrator;
    let periods = frame_periods(config.frames_per_second);

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        concentrator: config,
        ticks_per_frame: config.ticks_per_frame(),
        timer: TimerInfo {
            distribution: period_distribution(&periods),
            periods: with_periods.then_some(periods),
        },
        sources: blueprint
            .sources
            .iter()
            .map(|s| SourceInfo {
                id: s.id.clone(),
                signals: s.signals,
                rate_hz: s.rate_hz,
                clock_offset_ms: s.clock_offset_ms,
                jitter_ms: s.jitter_ms,
                bad_timestamp_ratio: s.bad_timestamp_ratio,
            })
            .collect(),
    }
}

fn print_config_info(info: &ConfigInfo) {
    let config = &info.concentrator;
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Concentrator Configuration                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Concentrator");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Frames per second: {}", config.frames_per_second);
    println!("   ├─ Ticks per frame: {:.3}", info.ticks_per_frame);
    println!("   ├─ Lag time: {} s", config.lag_time);
    println!("   ├─ Lead time: {} s", config.lead_time);
    if config.round_to_nearest_timestamp {
        println!("   ├─ Time resolution: nearest frame");
    } else if config.time_resolution_ticks > 1 {
        println!("   ├─ Time resolution: {} ticks", config.time_resolution_ticks);
    } else {
        println!("   ├─ Time resolution: raw timestamps");
    }
    println!("   ├─ Sort by arrival: {}", config.allow_sorts_by_arrival);
    println!("   ├─ Ignore bad timestamps: {}", config.ignore_bad_timestamps);
    println!("   ├─ Local clock as real time: {}", config.use_local_clock_as_real_time);
    println!(
        "   ├─ Timestamp reasonability check: {}",
        config.perform_timestamp_reasonability_check
    );
    println!("   ├─ Track latest values: {}", config.track_latest_values);
    println!("   ├─ Down-sampling method: {}", config.downsampling_method);
    println!("   ├─ Process by received time: {}", config.process_by_received_timestamp);
    if config.allow_preemptive_publishing && config.expected_samples > 0 {
        println!(
            "   └─ Preemptive publishing: at {} samples",
            config.expected_samples
        );
    } else {
        println!("   └─ Preemptive publishing: off");
    }

    println!("\n⏱  Frame timer");
    for (i, (period, count)) in info.timer.distribution.iter().enumerate() {
        let prefix = if i == info.timer.distribution.len() - 1 {
            "└─"
        } else {
            "├─"
        };
        println!("   {prefix} {count} × {period} ms");
    }
    if let Some(periods) = &info.timer.periods {
        println!("   Periods: {periods:?}");
    }

    if !info.sources.is_empty() {
        println!("\n📡 Sources ({})", info.sources.len());
        for (i, source) in info.sources.iter().enumerate() {
            let prefix = if i == info.sources.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            println!(
                "   {} {} ({} signals, {} Hz, offset {} ms, jitter {} ms)",
                prefix,
                source.id,
                source.signals,
                source.rate_hz,
                source.clock_offset_ms,
                source.jitter_ms
            );
        }
    }

    println!();
}
