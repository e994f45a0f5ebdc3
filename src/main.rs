//! Plant Disease Trainer CLI
//!
//! Entry point for fine-tuning a frozen EfficientNet-B0 on a class-per-folder
//! leaf image dataset, inspecting datasets and evaluating saved models.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use plant_disease_trainer::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use plant_disease_trainer::dataset::{DataFeed, ImageFolder, LeafBatcher, LeafDataset};
use plant_disease_trainer::training::{evaluate, load_model, run_training};
use plant_disease_trainer::utils::logging::{init_logging, LogConfig};
use plant_disease_trainer::utils::{format_duration, format_number};
use plant_disease_trainer::{ConfigOverrides, TrainConfig};

/// Plant disease classifier training with a frozen pretrained backbone
#[derive(Parser, Debug)]
#[command(name = "plant-disease-trainer")]
#[command(version)]
#[command(about = "Transfer-learning plant disease classifier with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune the classification head on DATA_DIR/train, validating on DATA_DIR/val
    Train(TrainArgs),

    /// Show class distribution of DATA_DIR/train and DATA_DIR/val
    Stats {
        /// Dataset root containing train/ and val/
        #[arg(short, long, alias = "data_dir")]
        data_dir: PathBuf,
    },

    /// Evaluate a saved model on DATA_DIR/val
    Evaluate {
        /// Output directory of a training run
        #[arg(short, long, default_value = "saved_model")]
        model_dir: PathBuf,

        /// Dataset root containing val/
        #[arg(short, long, alias = "data_dir")]
        data_dir: PathBuf,

        /// Batch size for evaluation
        #[arg(short, long, default_value = "32")]
        batch_size: usize,
    },
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Dataset root containing train/ and val/
    #[arg(short, long, alias = "data_dir")]
    data_dir: Option<PathBuf>,

    /// Maximum number of epochs [default: 10]
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Batch size [default: 32]
    #[arg(short, long, alias = "batch_size")]
    batch_size: Option<usize>,

    /// Square image size in pixels [default: 224]
    #[arg(long, alias = "img_size")]
    img_size: Option<usize>,

    /// Adam learning rate [default: 0.001]
    #[arg(short, long)]
    learning_rate: Option<f64>,

    /// Dropout rate of the head [default: 0.3]
    #[arg(long)]
    dropout: Option<f64>,

    /// Early-stopping patience in epochs, 0 disables [default: 4]
    #[arg(long)]
    patience: Option<usize>,

    /// Output directory for models and metadata [default: saved_model]
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Burn record (.mpk) with pretrained EfficientNet-B0 weights
    #[arg(long)]
    backbone_weights: Option<PathBuf>,

    /// Random seed for shuffling [default: 42]
    #[arg(long)]
    seed: Option<u64>,

    /// Keep the training set in directory order
    #[arg(long, default_value = "false")]
    no_shuffle: bool,

    /// TOML config file; command-line flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl TrainArgs {
    /// Config file path and the flags that override it
    fn into_parts(self) -> (Option<PathBuf>, ConfigOverrides) {
        let overrides = ConfigOverrides {
            data_dir: self.data_dir,
            epochs: self.epochs,
            batch_size: self.batch_size,
            img_size: self.img_size,
            learning_rate: self.learning_rate,
            dropout: self.dropout,
            patience: self.patience,
            output_dir: self.output_dir,
            backbone_weights: self.backbone_weights,
            seed: self.seed,
            no_shuffle: self.no_shuffle,
        };
        (self.config, overrides)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train(args) => {
            let (config_path, overrides) = args.into_parts();
            cmd_train(config_path.as_deref(), overrides)?;
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }

        Commands::Evaluate {
            model_dir,
            data_dir,
            batch_size,
        } => {
            cmd_evaluate(&model_dir, &data_dir, batch_size)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!("{}", "Plant Disease Trainer".green().bold());
    println!("{}", "Transfer learning with Burn + Rust".dimmed());
    println!();
}

/// Config file (or defaults) with command-line flags applied on top
fn resolve_config(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<TrainConfig> {
    let mut config = match config_path {
        Some(path) => TrainConfig::from_toml_file(path)?,
        None => TrainConfig::default(),
    };
    config.apply_overrides(overrides);
    config
        .validate()
        .context("Invalid training configuration (is --data-dir set?)")?;
    Ok(config)
}

fn cmd_train(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<()> {
    let config = resolve_config(config_path, overrides)?;

    info!("Training with backend: {}", backend_name());
    let device = default_device();

    let started = std::time::Instant::now();
    let outcome = run_training::<TrainingBackend>(&config, &device).context("Training failed")?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  Epochs run:      {}", outcome.history.len());
    if let (Some(epoch), Some(loss)) = (outcome.metadata.best_epoch, outcome.metadata.best_val_loss) {
        println!("  Best epoch:      {} (val_loss {:.4})", epoch, loss);
    }
    if let Some(acc) = outcome.metadata.best_val_accuracy {
        println!("  Best val acc:    {:.2}%", acc * 100.0);
    }
    if outcome.metadata.early_stopped {
        println!("  {}", "Stopped early; best weights restored".yellow());
    }
    println!("  Final model:     {:?}", outcome.final_model_path);
    if let Some(best) = &outcome.best_model_path {
        println!("  Best checkpoint: {:?}", best);
    }
    println!("  Elapsed:         {}", format_duration(started.elapsed().as_secs_f64()));
    println!();

    println!("{}", "Next steps:".cyan().bold());
    println!(
        "  • Evaluate: plant-disease-trainer evaluate --model-dir {:?} --data-dir {:?}",
        config.output_dir, config.data_dir
    );

    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    for split in ["train", "val"] {
        let folder = ImageFolder::scan(data_dir.join(split))
            .with_context(|| format!("Failed to scan {} split", split))?;

        println!("{}", format!("{} split:", split).cyan().bold());
        folder.stats().print();
        println!();
    }
    Ok(())
}

fn cmd_evaluate(model_dir: &Path, data_dir: &Path, batch_size: usize) -> Result<()> {
    let device = default_device();
    let (model, metadata) = load_model::<DefaultBackend>(model_dir, &device)
        .with_context(|| format!("Failed to load model from {:?}", model_dir))?;

    let folder = ImageFolder::scan_with_classes(data_dir.join("val"), &metadata.class_names)
        .context("Failed to scan validation split")?;
    println!(
        "Evaluating {} images over {} classes",
        format_number(folder.len()),
        metadata.num_classes
    );

    let feed = DataFeed::new(LeafDataset::from_folder(&folder, metadata.img_size), batch_size);
    let report = evaluate(&model, &feed, &LeafBatcher::new(metadata.img_size), &device)
        .context("Evaluation failed")?;

    println!();
    println!("{}", "Evaluation Results:".cyan().bold());
    report.print(&metadata.class_names);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn train_args(argv: &[&str]) -> TrainArgs {
        let mut full = vec!["plant-disease-trainer", "train"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Train(args) => args,
            other => panic!("expected train, got {:?}", other),
        }
    }

    #[test]
    fn test_underscore_flags_are_accepted() {
        let args = train_args(&["--data_dir", "leaves", "--batch_size", "8", "--img_size", "160"]);
        assert_eq!(args.data_dir, Some(PathBuf::from("leaves")));
        assert_eq!(args.batch_size, Some(8));
        assert_eq!(args.img_size, Some(160));

        let args = train_args(&["--data-dir", "leaves", "--batch-size", "8", "--img-size", "160"]);
        assert_eq!(args.data_dir, Some(PathBuf::from("leaves")));
        assert_eq!(args.batch_size, Some(8));
        assert_eq!(args.img_size, Some(160));
    }

    #[test]
    fn test_unset_flags_fall_back_to_defaults() {
        let (config_path, overrides) = train_args(&["--data_dir", "leaves"]).into_parts();
        let config = resolve_config(config_path.as_deref(), overrides).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("leaves"));
        assert_eq!(config.epochs, 10);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.img_size, 224);
        assert!(config.shuffle);
    }

    #[test]
    fn test_flags_take_precedence_over_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.toml");
        std::fs::write(
            &path,
            "data_dir = \"from_file\"\nepochs = 3\nbatch_size = 16\npatience = 2\n",
        )
        .unwrap();

        let (config_path, overrides) = train_args(&[
            "--config",
            path.to_str().unwrap(),
            "--batch_size",
            "8",
            "--no-shuffle",
        ])
        .into_parts();
        let config = resolve_config(config_path.as_deref(), overrides).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("from_file"));
        assert_eq!(config.epochs, 3);
        assert_eq!(config.patience, 2);
        assert_eq!(config.batch_size, 8);
        assert!(!config.shuffle);
    }

    #[test]
    fn test_missing_data_dir_is_rejected() {
        let (config_path, overrides) = train_args(&[]).into_parts();
        assert!(resolve_config(config_path.as_deref(), overrides).is_err());
    }
}
