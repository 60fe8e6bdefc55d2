//! OEE Engine operator CLI
//!
//! Reads observation / anomaly records from JSON files, runs one engine
//! operation and prints the decision object as pretty JSON.
//!
//! # Usage
//!
//! ```bash
//! # Train both models and persist them to the configured store
//! oee-engine train --observations data/oee.json
//!
//! # Seven-day OEE forecast
//! oee-engine forecast --observations data/oee.json --days 7
//!
//! # Speed sweet spot for one line, or every line
//! oee-engine optimize-speed --product Fond_Plat --line L1
//! oee-engine optimize-speed --product Fond_Plat
//!
//! # Remedy for a symptom
//! oee-engine suggest --anomalies data/anomalies.json --symptom "belt slipping"
//! ```
//!
//! # Environment Variables
//!
//! - `OEE_ENGINE_CONFIG`: Path to the engine TOML config
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use oee_engine::config::{self, defaults, EngineConfig};
use oee_engine::types::{AnomalyRecord, ObservationRecord};
use oee_engine::{
    derive_active_alerts, AnomalyExpert, BundleStore, EnsembleForecaster, EngineError,
    LineRecommender, ModelStorage, SpeedOptimizer,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "oee-engine")]
#[command(about = "Predictive-optimization decision engine for manufacturing lines")]
#[command(version)]
struct CliArgs {
    /// Engine config file (TOML). Defaults to the standard search order.
    #[arg(long, global = true, env = defaults::CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Train the OEE forecaster and the speed optimizer and persist both
    Train {
        /// JSON array of observation records
        #[arg(long)]
        observations: PathBuf,
        /// Skip the OEE forecaster
        #[arg(long)]
        skip_forecaster: bool,
        /// Skip the speed optimizer
        #[arg(long)]
        skip_speed: bool,
    },

    /// Daily OEE forecast per line
    Forecast {
        #[arg(long)]
        observations: PathBuf,
        #[arg(long, default_value_t = defaults::DEFAULT_FORECAST_DAYS)]
        days: usize,
        /// Restrict to one line and include summary statistics
        #[arg(long)]
        line: Option<String>,
    },

    /// Speed sweet spot for a product
    OptimizeSpeed {
        #[arg(long)]
        product: String,
        /// Single line; every configured line when omitted
        #[arg(long)]
        line: Option<String>,
        /// Grid step (pieces/hour)
        #[arg(long)]
        step: Option<f64>,
        /// Compare against this speed instead of the line's reference speed
        #[arg(long, requires = "line")]
        current_speed: Option<f64>,
    },

    /// Historical anomalies similar to a description
    Similar {
        /// JSON array of anomaly records
        #[arg(long)]
        anomalies: PathBuf,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "")]
        machine: String,
    },

    /// Suggested remedy for a symptom
    Suggest {
        #[arg(long)]
        anomalies: PathBuf,
        #[arg(long)]
        symptom: String,
        #[arg(long, default_value = "")]
        machine: String,
    },

    /// Active alerts over the most recent observations
    Alerts {
        #[arg(long)]
        observations: PathBuf,
    },

    /// Line ranking for a production job
    Recommend {
        #[arg(long)]
        observations: PathBuf,
        #[arg(long, default_value = "standard")]
        product: String,
        #[arg(long, default_value_t = defaults::DEFAULT_JOB_QUANTITY)]
        quantity: u64,
        /// Per-line scenario comparison instead of a single recommendation
        #[arg(long, conflicts_with = "best_line")]
        scenarios: bool,
        /// Overall best line from last week's performance
        #[arg(long)]
        best_line: bool,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

// ============================================================================
// Helpers
// ============================================================================

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to encode output")?);
    Ok(())
}

fn open_store(config: &EngineConfig) -> Result<Arc<dyn BundleStore>> {
    let path = &config.storage.path;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let storage = ModelStorage::open(path)
        .with_context(|| format!("Failed to open model store at {}", path.display()))?;
    Ok(Arc::new(storage))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load_from_file(p)
            .with_context(|| format!("Invalid engine config {}", p.display())),
        None => Ok(EngineConfig::load()),
    }
}

fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    config::init(load_config(args.config.as_deref())?);
    let config = config::get();

    match args.command {
        SubCommand::Train {
            observations,
            skip_forecaster,
            skip_speed,
        } => {
            let records: Vec<ObservationRecord> = read_json(&observations)?;
            let store = open_store(config)?;
            info!(rows = records.len(), "Training on {}", observations.display());

            if !skip_forecaster {
                let forecaster = EnsembleForecaster::new(config).with_store(Arc::clone(&store));
                match forecaster.train(&records) {
                    Ok(report) => print_json(&report)?,
                    Err(e @ EngineError::BelowQualityThreshold { .. }) => {
                        warn!(error = %e, "Forecaster not installed");
                    }
                    Err(e) => return Err(e).context("Forecaster training failed"),
                }
            }
            if !skip_speed {
                let optimizer = SpeedOptimizer::new(config).with_store(Arc::clone(&store));
                let report = optimizer.train(&records).context("Speed optimizer training failed")?;
                print_json(&report)?;
            }
        }

        SubCommand::Forecast {
            observations,
            days,
            line,
        } => {
            let records: Vec<ObservationRecord> = read_json(&observations)?;
            let forecaster = EnsembleForecaster::new(config).with_store(open_store(config)?);
            match line {
                Some(line_id) => match forecaster.predict_line(&records, &line_id, days)? {
                    Some(forecast) => print_json(&forecast)?,
                    None => bail!("No recent history for line '{line_id}'"),
                },
                None => print_json(&forecaster.predict_next_days(&records, days)?)?,
            }
        }

        SubCommand::OptimizeSpeed {
            product,
            line,
            step,
            current_speed,
        } => {
            let optimizer = SpeedOptimizer::new(config).with_store(open_store(config)?);
            match line {
                Some(line_id) => {
                    let result =
                        optimizer.find_optimal_speed_from(&line_id, &product, step, current_speed)?;
                    print_json(&result)?;
                }
                None => print_json(&optimizer.get_speed_recommendations_all_lines(&product))?,
            }
        }

        SubCommand::Similar {
            anomalies,
            description,
            machine,
        } => {
            let mut expert = AnomalyExpert::new(&config.anomaly);
            expert.load_knowledge_base(read_json::<Vec<AnomalyRecord>>(&anomalies)?);
            print_json(&expert.find_similar(&description, &machine))?;
        }

        SubCommand::Suggest {
            anomalies,
            symptom,
            machine,
        } => {
            let mut expert = AnomalyExpert::new(&config.anomaly);
            expert.load_knowledge_base(read_json::<Vec<AnomalyRecord>>(&anomalies)?);
            print_json(&expert.suggest_solution(&symptom, &machine))?;
        }

        SubCommand::Alerts { observations } => {
            let records: Vec<ObservationRecord> = read_json(&observations)?;
            let alerts = derive_active_alerts(&records, &config.line_ids(), &config.alerts, now());
            print_json(&alerts)?;
        }

        SubCommand::Recommend {
            observations,
            product,
            quantity,
            scenarios,
            best_line,
        } => {
            let records: Vec<ObservationRecord> = read_json(&observations)?;
            let recommender = LineRecommender::new(config);

            if best_line {
                print_json(&recommender.get_best_line(&records)?)?;
                return Ok(());
            }

            let forecaster = EnsembleForecaster::new(config).with_store(open_store(config)?);
            let forecasts = match forecaster.predict_next_days(&records, 1) {
                Ok(f) => Some(f),
                Err(e) => {
                    warn!(error = %e, "No forecast available, ranking from recent history");
                    None
                }
            };

            if scenarios {
                let report = recommender.simulate_scenarios(
                    &records,
                    forecasts.as_ref(),
                    &product,
                    quantity,
                    now(),
                )?;
                print_json(&report)?;
            } else {
                let rec = recommender.recommend(&records, forecasts.as_ref(), &product, quantity, now())?;
                print_json(&rec)?;
            }
        }

        SubCommand::ShowConfig => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
