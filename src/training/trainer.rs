//! Transfer-learning training loop
//!
//! A custom loop over Burn's autodiff API rather than the high-level
//! `LearnerBuilder`: the backbone stays frozen, only the head is optimized,
//! and checkpointing/early stopping both monitor validation loss.

use std::fs;
use std::path::PathBuf;

use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::backend::AutodiffBackend,
};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use super::checkpoint::{
    save_model, BestCheckpoint, ModelMetadata, FINAL_MODEL_NAME, HISTORY_FILE, METADATA_FILE,
};
use super::early_stopping::{EarlyStopping, StopDecision};
use super::evaluate::{batch_outcome, evaluate};
use super::history::{EpochRecord, TrainingHistory};
use crate::config::TrainConfig;
use crate::dataset::{DataFeed, ImageFolder, LeafBatch, LeafBatcher, LeafDataset};
use crate::model::{TransferClassifier, TransferClassifierConfig, BACKBONE_NAME};
use crate::utils::error::{Result, TrainerError};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{AccuracyTracker, WeightedAverage};
use crate::utils::format_number;

/// Adam epsilon matching the Keras default
const ADAM_EPSILON: f32 = 1e-7;

/// Everything a finished run produced
#[derive(Debug)]
pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: TransferClassifier<B>,
    pub metadata: ModelMetadata,
    pub history: TrainingHistory,
    pub final_model_path: PathBuf,
    /// `None` when validation loss never became finite
    pub best_model_path: Option<PathBuf>,
}

/// Run training with the given configuration
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
pub fn run_training<B: AutodiffBackend>(
    config: &TrainConfig,
    device: &B::Device,
) -> Result<TrainingOutcome<B>> {
    config.validate()?;
    fs::create_dir_all(&config.output_dir)?;

    // Data
    let train_folder = ImageFolder::scan(config.train_dir())?;
    if train_folder.num_classes() < 2 {
        return Err(TrainerError::Dataset(format!(
            "Need at least 2 classes to train, found {} in {:?}",
            train_folder.num_classes(),
            config.train_dir()
        )));
    }
    let val_folder = ImageFolder::scan_with_classes(config.val_dir(), &train_folder.class_names)?;
    let class_names = train_folder.class_names.clone();
    println!("Classes: {:?}", class_names);

    let mut train_feed = DataFeed::new(
        LeafDataset::from_folder(&train_folder, config.img_size),
        config.batch_size,
    );
    if config.shuffle {
        train_feed = train_feed.with_shuffle(config.seed);
    }
    let val_feed = DataFeed::new(
        LeafDataset::from_folder(&val_folder, config.img_size),
        config.batch_size,
    );
    let batcher = LeafBatcher::new(config.img_size);

    // Model
    let mut model = TransferClassifierConfig::new(class_names.len())
        .with_dropout(config.dropout)
        .init::<B>(device);
    match &config.backbone_weights {
        Some(path) => {
            let backbone = model.backbone.clone().load_pretrained(path, device)?;
            model = model.with_backbone(backbone);
        }
        None => warn!("No backbone weights given; the backbone keeps its random initialization"),
    }

    let mut optimizer = AdamConfig::new().with_epsilon(ADAM_EPSILON).init();
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    print_configuration(config, &train_feed, &val_feed, &model);

    let mut logger = TrainingLogger::new(config.epochs);
    let mut history = TrainingHistory::new();
    let mut checkpoint = BestCheckpoint::new(&config.output_dir);
    let mut stopper = EarlyStopping::new(config.patience);
    let mut best_weights = BestWeights::new();

    println!("{}", "Starting Training...".green().bold());

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);
        println!("{}", format!("Epoch {}/{}", epoch + 1, config.epochs).yellow().bold());

        let batches = train_feed.epoch_batches(epoch);
        let progress = batch_progress(batches.len());

        let mut train_loss = WeightedAverage::new();
        let mut train_acc = AccuracyTracker::new();

        for indices in batches {
            let items = train_feed.load_batch(&indices);
            if items.is_empty() {
                progress.inc(1);
                continue;
            }

            let batch: LeafBatch<B> = batcher.batch(items, device);
            let logits = model.forward_frozen(batch.images.clone());
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());

            let outcome = batch_outcome(logits, batch, loss.clone());
            train_loss.add(outcome.loss, outcome.targets.len());
            train_acc.add(outcome.correct(), outcome.targets.len());

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);

            progress.set_message(format!(
                "loss {:.4} acc {:.2}%",
                train_loss.average(),
                train_acc.accuracy() * 100.0
            ));
            progress.inc(1);
        }
        progress.finish_and_clear();

        if train_acc.count() == 0 {
            return Err(TrainerError::Training(
                "No training images could be decoded".to_string(),
            ));
        }

        let report = evaluate(&model.valid(), &val_feed, &batcher, device)?;
        logger.end_epoch(train_loss.average(), train_acc.accuracy(), report.loss, report.accuracy);

        history.push(EpochRecord {
            epoch: epoch + 1,
            train_loss: train_loss.average(),
            train_accuracy: train_acc.accuracy(),
            val_loss: report.loss,
            val_accuracy: report.accuracy,
            elapsed_secs: logger.epoch_elapsed(),
        });

        println!(
            "  {} loss: {:.4} | acc: {:.2}% | val_loss: {:.4} | val_acc: {:.2}%",
            "→".cyan(),
            train_loss.average(),
            train_acc.accuracy() * 100.0,
            report.loss,
            report.accuracy * 100.0
        );

        let previous_best = stopper.best_loss().unwrap_or(f64::INFINITY);
        if checkpoint.observe(&model, report.loss)? {
            logger.log_improvement(previous_best, report.loss);
        }

        let decision = stopper.update(epoch, report.loss);
        best_weights.record(decision, &model);
        match decision {
            StopDecision::Improved => {}
            StopDecision::Continue { wait } => {
                info!("No val_loss improvement for {} epoch(s)", wait);
            }
            StopDecision::Stop => {
                if let Some(best_epoch) = stopper.best_epoch() {
                    logger.log_early_stop(stopper.patience(), best_epoch);
                }
                break;
            }
        }
    }

    let model = best_weights.select(model, stopper.triggered());

    // Artifacts
    let final_model_path = save_model(&model, &config.output_dir.join(FINAL_MODEL_NAME))?;
    info!("Final model saved to {:?}", final_model_path);

    let mut metadata = ModelMetadata::new(class_names, config.img_size, config.dropout, BACKBONE_NAME);
    metadata.epochs_run = history.len();
    metadata.early_stopped = stopper.triggered();
    if let Some(best) = history.best() {
        metadata.best_epoch = Some(best.epoch);
        metadata.best_val_loss = Some(best.val_loss);
        metadata.best_val_accuracy = Some(best.val_accuracy);
    }
    metadata.save(&config.output_dir.join(METADATA_FILE))?;
    history.save_csv(&config.output_dir.join(HISTORY_FILE))?;

    logger.log_complete(history.len(), metadata.best_val_loss.unwrap_or(f64::NAN));

    let best_model_path = (checkpoint.saves() > 0).then(|| checkpoint.path());

    Ok(TrainingOutcome {
        model,
        metadata,
        history,
        final_model_path,
        best_model_path,
    })
}

/// In-memory copy of the best epoch's weights
///
/// Restored only when early stopping fires; a run that exhausts its epochs
/// keeps its last weights.
struct BestWeights<M> {
    best: Option<M>,
}

impl<M: Clone> BestWeights<M> {
    fn new() -> Self {
        Self { best: None }
    }

    fn record(&mut self, decision: StopDecision, model: &M) {
        if decision == StopDecision::Improved {
            self.best = Some(model.clone());
        }
    }

    fn select(self, last: M, stopped_early: bool) -> M {
        if !stopped_early {
            return last;
        }
        match self.best {
            Some(best) => best,
            None => {
                warn!("Early stopping fired before any finite val_loss; keeping last weights");
                last
            }
        }
    }
}

fn batch_progress(num_batches: usize) -> ProgressBar {
    let progress = ProgressBar::new(num_batches as u64);
    let style = ProgressStyle::with_template(
        "  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    progress.set_style(style);
    progress
}

fn print_configuration<B: AutodiffBackend>(
    config: &TrainConfig,
    train_feed: &DataFeed,
    val_feed: &DataFeed,
    model: &TransferClassifier<B>,
) {
    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Training samples:   {}", format_number(train_feed.len()));
    println!("  Validation samples: {}", format_number(val_feed.len()));
    println!("  Classes:            {}", model.num_classes());
    println!("  Image size:         {}x{}", config.img_size, config.img_size);
    println!("  Epochs:             {}", config.epochs);
    println!("  Batch size:         {}", config.batch_size);
    println!("  Batches per epoch:  {}", train_feed.num_batches());
    println!("  Learning rate:      {}", config.learning_rate);
    println!("  Dropout:            {}", config.dropout);
    println!("  Patience:           {}", config.patience);
    println!(
        "  Parameters:         {} trainable, {} frozen",
        format_number(model.num_trainable_params()),
        format_number(model.num_frozen_params())
    );
    println!("  Output dir:         {:?}", config.output_dir);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::checkpoint::{load_model, BEST_MODEL_NAME};
    use burn::backend::Autodiff;
    use burn::module::Module;
    use burn::record::CompactRecorder;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use tempfile::TempDir;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn write_split(root: &Path, split: &str, per_class: usize) {
        for (class, color) in [("Corn___healthy", [20u8, 200, 20]), ("Corn___rust", [180, 90, 10])] {
            let dir = root.join(split).join(class);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                RgbImage::from_pixel(36, 36, Rgb(color))
                    .save(dir.join(format!("{i}.png")))
                    .unwrap();
            }
        }
    }

    fn tiny_config(dir: &TempDir) -> TrainConfig {
        let mut config = TrainConfig::new(dir.path().join("data"));
        config.epochs = 2;
        config.batch_size = 3;
        config.img_size = 32;
        config.patience = 1;
        config.output_dir = dir.path().join("out");
        config
    }

    #[test]
    fn test_training_writes_all_artifacts() {
        let dir = TempDir::new().unwrap();
        write_split(&dir.path().join("data"), "train", 2);
        write_split(&dir.path().join("data"), "val", 1);
        let config = tiny_config(&dir);

        let device = Default::default();
        let outcome = run_training::<TestAutodiffBackend>(&config, &device).unwrap();

        assert!(!outcome.history.is_empty() && outcome.history.len() <= 2);
        assert_eq!(outcome.metadata.class_names, vec!["Corn___healthy", "Corn___rust"]);
        assert_eq!(outcome.metadata.epochs_run, outcome.history.len());
        assert!(outcome.final_model_path.exists());
        assert!(config.output_dir.join(METADATA_FILE).exists());
        assert!(config.output_dir.join(HISTORY_FILE).exists());

        let (reloaded, meta) = load_model::<TestBackend>(&config.output_dir, &device).unwrap();
        assert_eq!(reloaded.num_classes(), 2);
        assert_eq!(meta.img_size, 32);
    }

    #[test]
    fn test_early_stop_restores_best_checkpoint() {
        let dir = TempDir::new().unwrap();
        write_split(&dir.path().join("data"), "train", 2);
        write_split(&dir.path().join("data"), "val", 1);
        let mut config = tiny_config(&dir);
        config.epochs = 4;
        // Weights cannot move, so the second epoch repeats the first val_loss
        config.learning_rate = 1e-30;
        config.shuffle = false;

        let device = Default::default();
        let outcome = run_training::<TestAutodiffBackend>(&config, &device).unwrap();

        assert!(outcome.metadata.early_stopped);
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.metadata.best_epoch, Some(1));

        let best_path = outcome.best_model_path.clone().unwrap();
        assert_eq!(best_path, config.output_dir.join(BEST_MODEL_NAME).with_extension("mpk"));
        assert!(best_path.exists());

        let best = TransferClassifierConfig::new(2)
            .init::<TestBackend>(&device)
            .load_file(best_path, &CompactRecorder::new(), &device)
            .unwrap();
        let expected: Vec<f32> = best.head.fc.weight.val().into_data().to_vec().unwrap();
        let actual: Vec<f32> = outcome.model.head.fc.weight.val().into_data().to_vec().unwrap();
        assert_eq!(expected.len(), actual.len());
        for (e, a) in expected.iter().zip(&actual) {
            assert!((e - a).abs() < 1e-3, "{e} vs {a}");
        }
    }

    #[test]
    fn test_best_weights_restored_only_on_early_stop() {
        let mut best = BestWeights::new();
        best.record(StopDecision::Improved, &"epoch 1");
        best.record(StopDecision::Continue { wait: 1 }, &"epoch 2");
        assert_eq!(best.select("epoch 3", true), "epoch 1");

        let mut best = BestWeights::new();
        best.record(StopDecision::Improved, &"epoch 1");
        assert_eq!(best.select("epoch 2", false), "epoch 2");

        let best = BestWeights::<&str>::new();
        assert_eq!(best.select("epoch 2", true), "epoch 2");
    }

    #[test]
    fn test_single_class_is_rejected() {
        let dir = TempDir::new().unwrap();
        let class_dir = dir.path().join("data/train/Corn___healthy");
        fs::create_dir_all(&class_dir).unwrap();
        RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])).save(class_dir.join("a.png")).unwrap();

        let config = tiny_config(&dir);
        let err = run_training::<TestAutodiffBackend>(&config, &Default::default()).unwrap_err();

        assert!(err.to_string().contains("at least 2 classes"));
        assert!(config.output_dir.exists());
    }

    #[test]
    fn test_invalid_config_fails_before_touching_disk() {
        let dir = TempDir::new().unwrap();
        let mut config = tiny_config(&dir);
        config.batch_size = 0;

        assert!(run_training::<TestAutodiffBackend>(&config, &Default::default()).is_err());
        assert!(!config.output_dir.exists());
    }
}
