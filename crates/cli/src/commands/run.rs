//! `run` command implementation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use concentrator::Concentrator;
use config_loader::ConfigLoader;
use contracts::{ConcentratorBlueprint, ConcentratorEvent, Sample};
use ingestion::{IngestionPipeline, MockSampleSource};
use observability::{record_statistics, PublicationAggregator};
use tracing::{debug, error, info, warn};

use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::publisher::LogPublisher;

/// How often derived statistics are exported while running
const STATISTICS_INTERVAL: Duration = Duration::from_secs(1);

/// Execute the `run` command
pub async fn run_concentrator(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()));
    }

    let mut blueprint = ConfigLoader::load_from_path(&args.config)?;
    apply_overrides(&mut blueprint, args)?;

    let config = &blueprint.concentrator;
    info!(
        frames_per_second = config.frames_per_second,
        lag_time = config.lag_time,
        lead_time = config.lead_time,
        sources = blueprint.sources.len(),
        "Configuration loaded"
    );

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let aggregator = Arc::new(Mutex::new(PublicationAggregator::new()));
    let concentrator = Arc::new(
        Concentrator::builder(blueprint.concentrator)
            .publisher(LogPublisher::new(aggregator.clone()))
            .on_event(log_event)
            .build()?,
    );

    let mut ingestion = IngestionPipeline::new();
    for source in &blueprint.sources {
        ingestion.register_source(Box::new(MockSampleSource::new(source.clone())?))?;
    }
    if ingestion.source_count() == 0 {
        warn!("No sources configured - published frames will be empty");
    }

    concentrator.start()?;
    let sink = concentrator.clone();
    ingestion.start_all(Arc::new(move |batch: Vec<Sample>| sink.sort(batch)));

    info!(
        sources = ingestion.source_count(),
        duration_secs = args.duration,
        "Concentrator running"
    );

    wait_for_shutdown(args.duration, &concentrator).await;

    info!("Shutting down...");
    ingestion.stop_all();
    concentrator.stop();

    let statistics = concentrator.statistics();
    record_statistics(&statistics);

    let ingested = ingestion.metrics().snapshot();
    info!(
        batches = ingested.batches_received,
        samples = ingested.samples_received,
        bad_timestamps = ingested.bad_timestamps,
        published_frames = statistics.published_frames,
        "Concentrator finished"
    );

    println!("\n{}", concentrator.status());
    let summary = aggregator
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .summary();
    println!("{summary}");

    Ok(())
}

/// Apply command-line overrides to the loaded configuration
fn apply_overrides(blueprint: &mut ConcentratorBlueprint, args: &RunArgs) -> Result<()> {
    let config = &mut blueprint.concentrator;
    if let Some(frames_per_second) = args.frames_per_second {
        info!(frames_per_second, "Overriding frames per second from CLI");
        config.frames_per_second = frames_per_second;
    }
    if let Some(lag_time) = args.lag_time {
        info!(lag_time, "Overriding lag time from CLI");
        config.lag_time = lag_time;
    }
    if let Some(lead_time) = args.lead_time {
        info!(lead_time, "Overriding lead time from CLI");
        config.lead_time = lead_time;
    }
    config.validate()?;
    Ok(())
}

/// Log concentrator notifications
fn log_event(event: ConcentratorEvent) {
    match &event {
        // The engine already warns about a growing backlog
        ConcentratorEvent::UnpublishedSamples { seconds } => {
            debug!(seconds, "{event}");
        }
        ConcentratorEvent::ProcessException { source, message } => {
            error!(source = %source, message = %message, "concentrator exception");
        }
        ConcentratorEvent::DiscardingSamples(samples) => {
            debug!(count = samples.len(), "{event}");
        }
    }
}

/// Export statistics until Ctrl-C, SIGTERM or the run duration elapses
async fn wait_for_shutdown(duration_secs: u64, concentrator: &Concentrator) {
    let deadline = async {
        if duration_secs == 0 {
            std::future::pending::<()>().await;
        } else {
            tokio::time::sleep(Duration::from_secs(duration_secs)).await;
        }
    };
    tokio::pin!(deadline);

    let signal = shutdown_signal();
    tokio::pin!(signal);

    let mut ticker = tokio::time::interval(STATISTICS_INTERVAL);
    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!(duration_secs, "Run duration elapsed");
                break;
            }
            _ = &mut signal => {
                warn!("Received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                record_statistics(&concentrator.statistics());
            }
        }
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn args(config: PathBuf) -> RunArgs {
        RunArgs {
            config,
            duration: 1,
            frames_per_second: None,
            lag_time: None,
            lead_time: None,
            metrics_port: 0,
        }
    }

    #[test]
    fn test_overrides_are_validated() {
        let mut blueprint = ConcentratorBlueprint::default();
        let mut run_args = args(PathBuf::from("unused.toml"));
        run_args.frames_per_second = Some(60);
        apply_overrides(&mut blueprint, &run_args).unwrap();
        assert_eq!(blueprint.concentrator.frames_per_second, 60);

        run_args.lag_time = Some(-1.0);
        let err = apply_overrides(&mut blueprint, &run_args).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let err = run_concentrator(&args(PathBuf::from("/nonexistent/concentrator.toml")))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::ConfigNotFound { .. }));
    }

    #[tokio::test]
    async fn test_short_run_with_mock_source() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(
            br#"
[concentrator]
frames_per_second = 10
lag_time = 0.2
lead_time = 0.5

[[sources]]
id = "PMU_A"
signals = 2
rate_hz = 10.0
"#,
        )
        .unwrap();

        run_concentrator(&args(file.path().to_path_buf()))
            .await
            .unwrap();
    }
}
