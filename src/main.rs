use std::{fs, path::PathBuf, process};

use anyhow::Context;
use clap::{Parser, Subcommand};
use handsign::{
    classifier::ClassifierKind,
    config::Config,
    pipeline::{InferencePipeline, MediaType},
    train::{self, TrainOptions, DEFAULT_EXPERIMENT},
};

/// Hand gesture classification from still images.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify the hand gesture in an image and print it as JSON.
    Predict {
        /// TOML configuration file. Defaults to `$HANDSIGN_CONFIG`, then built-in defaults.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Declared media type of the image. Guessed from the file extension if omitted.
        #[arg(long)]
        content_type: Option<String>,
        image: PathBuf,
    },
    /// Train, evaluate and save classifiers on a landmark CSV.
    Train {
        #[arg(long, default_value = "data/hand_landmarks_data.csv")]
        data: PathBuf,
        #[arg(long, num_args = 1.., default_values_t = ClassifierKind::ALL)]
        models: Vec<ClassifierKind>,
        #[arg(long, default_value = "models")]
        out_dir: PathBuf,
        #[arg(long, default_value = DEFAULT_EXPERIMENT)]
        experiment: String,
        #[arg(long, default_value_t = handsign::dataset::SPLIT_SEED)]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    handsign::init_logger!();

    match Args::parse().command {
        Command::Predict {
            config,
            content_type,
            image,
        } => predict(Config::load(config.as_deref())?, content_type, image),
        Command::Train {
            data,
            models,
            out_dir,
            experiment,
            seed,
        } => {
            let opts = TrainOptions {
                data,
                kinds: models,
                out_dir,
                experiment,
                seed,
            };
            train::train_all(&opts)?;
            Ok(())
        }
    }
}

fn predict(config: Config, content_type: Option<String>, image: PathBuf) -> anyhow::Result<()> {
    let content_type = content_type.unwrap_or_else(|| {
        image
            .extension()
            .and_then(|ext| MediaType::from_extension(&ext.to_string_lossy()))
            .map_or("application/octet-stream", |ty| ty.content_type())
            .to_string()
    });
    let bytes =
        fs::read(&image).with_context(|| format!("failed to read '{}'", image.display()))?;

    let pipeline = InferencePipeline::from_config(&config)?;
    let result = pipeline.infer(&bytes, &content_type);
    pipeline.log_timers();

    match result {
        Ok(class) => {
            let direction = config.controls.direction(&class);
            println!(
                "{}",
                serde_json::json!({ "class": class, "direction": direction })
            );
            Ok(())
        }
        Err(e) => {
            println!(
                "{}",
                serde_json::json!({ "status": e.status(), "detail": e.to_string() })
            );
            process::exit(1);
        }
    }
}
