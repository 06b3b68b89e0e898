//! HARHN CLI
//!
//! Inspect configurations and run forecasts on synthetic series.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ndarray::Axis;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use harhn::data::synthetic_series;
use harhn::utils::{mae, rmse, setup_logging, verbosity_level, AppConfig};
use harhn::HarhnModel;

#[derive(Parser)]
#[command(name = "harhn")]
#[command(version, about = "Hierarchical attention-based recurrent highway network forecaster")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the model configuration and its parameter count
    Info {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Forecast the last samples of a synthetic series
    Forecast {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of trailing samples to forecast
        #[arg(short, long, default_value = "5")]
        samples: usize,

        /// Load model parameters instead of initializing new ones
        #[arg(long)]
        load: Option<PathBuf>,

        /// Save the model parameters after the forecast
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Write the default configuration file
    InitConfig {
        /// Output file
        #[arg(short, long, default_value = "harhn.toml")]
        output: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { config } => {
            let config = load_config(config.as_ref())?;
            setup_logging(&verbosity_level(&config.logging.level, cli.verbose));

            let model = HarhnModel::new(config.model.clone())?;
            println!("HARHN v{}", harhn::VERSION);
            println!("{}", toml::to_string_pretty(&config.model)?);
            println!("Convolution blocks: {}", model.features().num_blocks());
            println!("Encoder parameters: {}", model.encoder().num_params());
            println!("Decoder parameters: {}", model.decoder().num_params());
            println!("Total parameters:   {}", model.num_params());
        }

        Commands::Forecast {
            config,
            samples,
            load,
            save,
        } => {
            let config = load_config(config.as_ref())?;
            setup_logging(&verbosity_level(&config.logging.level, cli.verbose));

            let model = match &load {
                Some(path) => HarhnModel::load(path)
                    .with_context(|| format!("Failed to load model from {}", path.display()))?,
                None => HarhnModel::new(config.model.clone())?,
            };
            let model_config = model.config().clone();
            if model_config.target_feats != 1 {
                bail!(
                    "Windowed series carry a single target, model expects {}",
                    model_config.target_feats
                );
            }

            let mut rng = StdRng::seed_from_u64(config.synthetic.seed);
            let table = synthetic_series(
                config.synthetic.rows,
                model_config.in_feats,
                config.synthetic.noise_std,
                &mut rng,
            )?;
            let windows = config.data.windows(&table, model_config.lookback)?;
            info!(
                "Generated {} rows, {} windows of length {}",
                table.nrows(),
                windows.len(),
                model_config.lookback
            );

            let end = windows.len();
            let batch = windows.slice(end.saturating_sub(samples), end);
            if batch.is_empty() {
                bail!("No samples to forecast");
            }

            let forecast = model.forward_with_attention(&batch.x, &batch.y)?;
            let predicted = forecast.prediction.column(0).to_owned();

            for (i, (p, t)) in predicted.iter().zip(batch.target.iter()).enumerate() {
                info!("Sample {}: predicted {:.4}, actual {:.4}", i, p, t);
            }
            info!(
                "RMSE {:.4}, MAE {:.4}",
                rmse(&batch.target, &predicted),
                mae(&batch.target, &predicted)
            );

            // Most attended encoder step per depth at the last decoder step
            let last_step = forecast.attention.index_axis(Axis(0), model_config.lookback - 1);
            for (k, depth) in last_step.outer_iter().enumerate() {
                let mean = depth
                    .mean_axis(Axis(0))
                    .context("Attention batch is empty")?;
                let (peak, weight) = mean
                    .iter()
                    .enumerate()
                    .fold((0, f64::MIN), |best, (t, &w)| if w > best.1 { (t, w) } else { best });
                info!("Depth {}: peak attention {:.3} at encoder step {}", k, weight, peak);
            }

            if let Some(path) = save {
                model.save(&path)?;
            }
        }

        Commands::InitConfig { output } => {
            setup_logging(&verbosity_level("info", cli.verbose));
            AppConfig::create_default(&output)?;
            info!("Default configuration written to {}", output.display());
        }
    }

    Ok(())
}
