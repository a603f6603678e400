//! `validate` command implementation.

use serde::Serialize;
use tracing::info;

use config_loader::ConcentratorBlueprint;

use crate::cli::ValidateArgs;
use crate::error::{CliError, Result};

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    frames_per_second: u32,
    lag_time: f64,
    lead_time: f64,
    source_count: usize,
    signal_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        Err(CliError::config_validation(
            result.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            let config = &blueprint.concentrator;

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    frames_per_second: config.frames_per_second,
                    lag_time: config.lag_time,
                    lead_time: config.lead_time,
                    source_count: blueprint.sources.len(),
                    signal_count: signal_count(&blueprint),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

fn signal_count(blueprint: &ConcentratorBlueprint) -> usize {
    blueprint.sources.iter().map(|s| s.signals).sum()
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &ConcentratorBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let config = &blueprint.concentrator;

    if blueprint.sources.is_empty() {
        warnings.push("No sources configured - `run` will publish empty frames".to_string());
    }

    if config.frames_per_second > concentrator::MAX_TIMER_RATE {
        warnings.push(format!(
            "frames_per_second ({}) exceeds the timer resolution; publication is capped at {} waits per second",
            config.frames_per_second,
            concentrator::MAX_TIMER_RATE
        ));
    }

    let signals = signal_count(blueprint);
    if config.allow_preemptive_publishing
        && config.expected_samples > 0
        && !blueprint.sources.is_empty()
        && config.expected_samples > signals
    {
        warnings.push(format!(
            "expected_samples ({}) exceeds the {} configured signals - frames will never publish early",
            config.expected_samples, signals
        ));
    }

    for source in &blueprint.sources {
        if source.rate_hz < f64::from(config.frames_per_second) {
            warnings.push(format!(
                "Source '{}' reports at {} Hz, below {} frames per second - some frames will miss it",
                source.id, source.rate_hz, config.frames_per_second
            ));
        }
        if source.clock_offset_ms.abs() / 1000.0 > config.lag_time {
            warnings.push(format!(
                "Source '{}' clock offset ({} ms) exceeds the lag time - its samples will be discarded",
                source.id, source.clock_offset_ms
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Frames per second: {}", summary.frames_per_second);
            println!("  Lag time: {} s", summary.lag_time);
            println!("  Lead time: {} s", summary.lead_time);
            println!("  Sources: {}", summary.source_count);
            println!("  Signals: {}", summary.signal_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {warning}");
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {error}");
        }
    }
}
