//! moodmix - command-line entry point
//!
//! Loads configuration, builds the recommendation model once and answers a
//! single query, printing JSON to stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moodmix_common::config::{self, LoggingConfig, TomlConfig, CONFIG_ENV_VAR, DATASET_ENV_VAR};
use moodmix_engine::enrich::MetadataEnricher;
use moodmix_engine::metrics;
use moodmix_engine::{ModelHandle, QueryOrchestrator, RecommendationModel};

/// Command-line arguments for moodmix
#[derive(Parser, Debug)]
#[command(name = "moodmix")]
#[command(about = "Mood-based song recommendations from audio features")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Path to the track dataset (CSV)
    #[arg(short, long, env = DATASET_ENV_VAR)]
    dataset: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find tracks by title
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Recommend tracks similar to a named track
    Recommend {
        track: String,
        #[arg(short = 'n', long)]
        top_n: Option<usize>,
        /// Skip artwork and preview lookups
        #[arg(long)]
        no_enrich: bool,
    },
    /// Recommend tracks close to a raw feature vector (schema order, comma separated)
    SimilarTo {
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        features: Vec<f64>,
        #[arg(short = 'n', long)]
        top_n: Option<usize>,
        #[arg(long)]
        no_enrich: bool,
    },
    /// Print cluster sizes and mood labels
    Clusters,
    /// Evaluate ranking quality using cluster membership as relevance
    Evaluate {
        #[arg(long, default_value = "200")]
        samples: usize,
        #[arg(short = 'n', long)]
        top_n: Option<usize>,
        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Write the effective configuration to a TOML file
    InitConfig { path: PathBuf },
}

#[derive(Serialize)]
struct ClusterOutput {
    k: usize,
    iterations: usize,
    converged: bool,
    inertia: f64,
    silhouette: Option<f64>,
    clusters: Vec<moodmix_engine::model::ClusterSummary>,
}

fn init_tracing(logging: &LoggingConfig, override_level: Option<&str>) -> Result<()> {
    let level = override_level.unwrap_or(&logging.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("moodmix={level},moodmix_engine={level},moodmix_common={level}").into()
    });

    // File when configured, stderr otherwise; stdout carries the JSON output
    let (file_layer, stderr_layer) = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

/// Exit status for a query error answered on stderr rather than as a failure
const QUERY_REJECTED: u8 = 2;

fn query_exit_status(err: &moodmix_common::Error) -> Option<u8> {
    err.is_recoverable().then_some(QUERY_REJECTED)
}

/// Print a query answer; "not found" and bad arguments exit with status 2
fn emit<T: Serialize>(result: moodmix_common::Result<T>) -> Result<ExitCode> {
    match result {
        Ok(value) => print_json(&value).map(|_| ExitCode::SUCCESS),
        Err(e) => match query_exit_status(&e) {
            Some(status) => {
                eprintln!("{}", e);
                Ok(ExitCode::from(status))
            }
            None => Err(e).context("Query failed"),
        },
    }
}

fn orchestrator(
    config: &TomlConfig,
    model: ModelHandle,
    no_enrich: bool,
) -> Result<QueryOrchestrator> {
    if no_enrich {
        let enricher = MetadataEnricher::disabled(config.enrichment.placeholder_artwork.clone());
        return Ok(QueryOrchestrator::new(
            model,
            Arc::new(enricher),
            config.search.fuzzy_cutoff,
        ));
    }
    QueryOrchestrator::from_config(config, model).context("Failed to set up metadata enrichment")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let source = config::locate_config(args.config.as_deref());
    let config = source.load().context("Failed to load configuration")?;
    init_tracing(&config.logging, args.log_level.as_deref())?;
    source.log();

    if let Command::InitConfig { path } = &args.command {
        let mut effective = config.clone();
        if let Some(dataset) = &args.dataset {
            effective.dataset_path = Some(dataset.clone());
        }
        config::write_toml_config(&effective, path)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        info!("Wrote configuration to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let build_config = config.clone();
    let dataset = args.dataset.clone();
    let model = tokio::task::spawn_blocking(move || {
        RecommendationModel::from_config(&build_config, dataset.as_deref())
    })
    .await
    .context("Model build task failed")?
    .context("Failed to build recommendation model")?;
    let handle = ModelHandle::new(model);

    match args.command {
        Command::Search { query, limit } => {
            let orchestrator = orchestrator(&config, handle, true)?;
            let limit = limit.unwrap_or(config.search.default_limit);
            emit(orchestrator.search(&query, limit).await)
        }
        Command::Recommend {
            track,
            top_n,
            no_enrich,
        } => {
            let orchestrator = orchestrator(&config, handle, no_enrich)?;
            let top_n = top_n.unwrap_or(config.search.default_top_n);
            emit(orchestrator.recommend(&track, top_n).await)
        }
        Command::SimilarTo {
            features,
            top_n,
            no_enrich,
        } => {
            let orchestrator = orchestrator(&config, handle, no_enrich)?;
            let top_n = top_n.unwrap_or(config.search.default_top_n);
            emit(orchestrator.recommend_for_features(&features, top_n).await)
        }
        Command::Clusters => {
            let model = handle.snapshot().await;
            let clusters = model.clusters();
            print_json(&ClusterOutput {
                k: clusters.k(),
                iterations: clusters.iterations,
                converged: clusters.converged,
                inertia: clusters.inertia,
                silhouette: model.silhouette(
                    config.clustering.silhouette_sample,
                    config.clustering.seed,
                ),
                clusters: model.cluster_report(),
            })?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Evaluate {
            samples,
            top_n,
            seed,
        } => {
            let model = handle.snapshot().await;
            let top_n = top_n.unwrap_or(config.search.default_top_n);
            emit(metrics::evaluate(&model, samples, top_n, seed))
        }
        Command::InitConfig { .. } => Ok(ExitCode::SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodmix_common::Error;

    #[test]
    fn test_rejected_queries_exit_with_status_2() {
        assert_eq!(
            query_exit_status(&Error::NotFound("Track A".into())),
            Some(2)
        );
        assert_eq!(
            query_exit_status(&Error::InvalidArgument("top_n must be positive".into())),
            Some(2)
        );
        assert_eq!(query_exit_status(&Error::Data("empty dataset".into())), None);
        assert_eq!(query_exit_status(&Error::Internal("panicked".into())), None);
    }

    #[test]
    fn test_emit_success_and_rejection() {
        assert!(emit(Ok(vec![1, 2, 3])).is_ok());
        assert!(emit::<()>(Err(Error::NotFound("nope".into()))).is_ok());
        assert!(emit::<()>(Err(Error::Config("bad".into()))).is_err());
    }
}
