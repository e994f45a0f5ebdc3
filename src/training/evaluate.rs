//! Model evaluation on a non-autodiff backend
//!
//! Produces the sample-weighted mean loss, accuracy and confusion matrix of a
//! classifier over a `DataFeed`.

use burn::{
    data::dataloader::batcher::Batcher,
    nn::loss::CrossEntropyLossConfig,
    tensor::{backend::Backend, ElementConversion, Tensor},
};
use colored::Colorize;
use tracing::debug;

use crate::dataset::{DataFeed, LeafBatch, LeafBatcher};
use crate::model::TransferClassifier;
use crate::utils::error::{Result, TrainerError};
use crate::utils::metrics::{ConfusionMatrix, WeightedAverage};

/// Result of evaluating a classifier over one split
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub loss: f64,
    pub accuracy: f64,
    pub samples: usize,
    /// Images that could not be decoded
    pub skipped: usize,
    pub confusion: ConfusionMatrix,
}

impl EvaluationReport {
    pub fn per_class_accuracy(&self) -> Vec<Option<f64>> {
        self.confusion.per_class_accuracy()
    }

    pub fn print(&self, class_names: &[String]) {
        println!("  Samples:  {}", self.samples);
        if self.skipped > 0 {
            println!("  Skipped:  {}", self.skipped.to_string().yellow());
        }
        println!("  Loss:     {:.4}", self.loss);
        println!("  Accuracy: {:.2}%", self.accuracy * 100.0);
        println!();
        println!("{}", "Per-class accuracy:".cyan());

        for (idx, acc) in self.per_class_accuracy().iter().enumerate() {
            let name = class_names.get(idx).map(String::as_str).unwrap_or("?");
            match acc {
                Some(acc) => println!(
                    "    {:40} {:6.2}%  ({} samples)",
                    name,
                    acc * 100.0,
                    self.confusion.support(idx)
                ),
                None => println!("    {:40} {:>7}", name, "n/a".dimmed()),
            }
        }
        println!();
        print!("{}", self.confusion.display(Some(class_names)));
    }
}

/// Loss and predictions of one batch
pub(crate) struct BatchOutcome {
    pub loss: f64,
    pub predictions: Vec<usize>,
    pub targets: Vec<usize>,
}

impl BatchOutcome {
    pub fn correct(&self) -> usize {
        self.predictions
            .iter()
            .zip(&self.targets)
            .filter(|(p, t)| p == t)
            .count()
    }
}

/// Host-side labels of a `[N, num_classes]` logits tensor and its targets
pub(crate) fn batch_outcome<B: Backend>(
    logits: Tensor<B, 2>,
    batch: LeafBatch<B>,
    loss: Tensor<B, 1>,
) -> BatchOutcome {
    let loss: f64 = loss.into_scalar().elem();

    let predictions = logits
        .argmax(1)
        .flatten::<1>(0, 1)
        .into_data()
        .iter::<i64>()
        .map(|p| p as usize)
        .collect();
    let targets = batch
        .targets
        .into_data()
        .iter::<i64>()
        .map(|t| t as usize)
        .collect();

    BatchOutcome {
        loss,
        predictions,
        targets,
    }
}

/// Evaluate `model` over every batch of `feed`
pub fn evaluate<B: Backend>(
    model: &TransferClassifier<B>,
    feed: &DataFeed,
    batcher: &LeafBatcher,
    device: &B::Device,
) -> Result<EvaluationReport> {
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut loss = WeightedAverage::new();
    let mut confusion = ConfusionMatrix::new(model.num_classes());
    let mut skipped = 0;

    for indices in feed.epoch_batches(0) {
        let items = feed.load_batch(&indices);
        skipped += indices.len() - items.len();
        if items.is_empty() {
            continue;
        }

        let batch: LeafBatch<B> = batcher.batch(items, device);
        let logits = model.forward(batch.images.clone());
        let batch_loss = loss_fn.forward(logits.clone(), batch.targets.clone());

        let outcome = batch_outcome(logits, batch, batch_loss);
        loss.add(outcome.loss, outcome.targets.len());
        confusion.add_batch(&outcome.predictions, &outcome.targets);
    }

    if confusion.total() == 0 {
        return Err(TrainerError::Training(
            "No evaluation images could be decoded".to_string(),
        ));
    }

    debug!(
        "Evaluated {} samples ({} skipped): loss {:.4}, accuracy {:.4}",
        confusion.total(),
        skipped,
        loss.average(),
        confusion.accuracy()
    );

    Ok(EvaluationReport {
        loss: loss.average(),
        accuracy: confusion.accuracy(),
        samples: confusion.total(),
        skipped,
        confusion,
    })
}
