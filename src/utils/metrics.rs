//! Metrics for training and evaluation
//!
//! - Sample-weighted loss averaging (matches per-sample mean over an epoch)
//! - Running accuracy
//! - Confusion matrix with per-class recall

use serde::{Deserialize, Serialize};

/// Sample-weighted running mean
///
/// Batches contribute in proportion to their size, so a partial last batch
/// does not skew the epoch mean.
#[derive(Debug, Clone, Default)]
pub struct WeightedAverage {
    sum: f64,
    weight: usize,
}

impl WeightedAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch mean computed over `count` samples
    pub fn add(&mut self, batch_mean: f64, count: usize) {
        self.sum += batch_mean * count as f64;
        self.weight += count;
    }

    pub fn average(&self) -> f64 {
        if self.weight > 0 {
            self.sum / self.weight as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.weight
    }
}

/// Accuracy tracker for training
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    correct: usize,
    total: usize,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the outcome of one batch
    pub fn add(&mut self, correct: usize, total: usize) {
        self.correct += correct;
        self.total += total;
    }

    pub fn accuracy(&self) -> f64 {
        if self.total > 0 {
            self.correct as f64 / self.total as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.total
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,

    /// Row-major counts, row = actual, column = predicted
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Add a single prediction; out-of-range labels are ignored
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    pub fn add_batch(&mut self, predictions: &[usize], ground_truth: &[usize]) {
        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            self.add(actual, pred);
        }
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Number of samples whose actual label is `class_idx`
    pub fn support(&self, class_idx: usize) -> usize {
        (0..self.num_classes).map(|col| self.get(class_idx, col)).sum()
    }

    /// Per-class accuracy (recall); `None` for classes without samples
    pub fn per_class_accuracy(&self) -> Vec<Option<f64>> {
        (0..self.num_classes)
            .map(|class_idx| {
                let support = self.support(class_idx);
                if support == 0 {
                    None
                } else {
                    Some(self.get(class_idx, class_idx) as f64 / support as f64)
                }
            })
            .collect()
    }

    /// Render the matrix; large matrices collapse to a summary line
    pub fn display(&self, class_names: Option<&[String]>) -> String {
        let mut output = String::from("Confusion Matrix (rows=actual, cols=predicted):\n");

        if self.num_classes > 20 {
            output.push_str(&format!(
                "({}x{} matrix omitted) total: {}, accuracy: {:.2}%\n",
                self.num_classes,
                self.num_classes,
                self.total(),
                self.accuracy() * 100.0
            ));
            return output;
        }

        let label = |idx: usize, width: usize| -> String {
            match class_names.and_then(|names| names.get(idx)) {
                Some(name) => name.chars().take(width).collect(),
                None => idx.to_string(),
            }
        };

        output.push_str(&format!("{:>10}", ""));
        for col in 0..self.num_classes {
            output.push_str(&format!("{:>7}", label(col, 6)));
        }
        output.push('\n');

        for row in 0..self.num_classes {
            output.push_str(&format!("{:>9} ", label(row, 9)));
            for col in 0..self.num_classes {
                let count = self.get(row, col);
                if row == col {
                    output.push_str(&format!(" [{:>4}]", count));
                } else if count > 0 {
                    output.push_str(&format!("  {:>4} ", count));
                } else {
                    output.push_str("     . ");
                }
            }
            output.push('\n');
        }

        output.push_str(&format!("Accuracy: {:.2}%\n", self.accuracy() * 100.0));
        output
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix() {
        let predictions = vec![0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let ground_truth = vec![0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

        let mut cm = ConfusionMatrix::new(3);
        cm.add_batch(&predictions, &ground_truth);

        assert_eq!(cm.get(0, 0), 3);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.get(2, 2), 3);
        assert_eq!(cm.get(1, 0), 1);
        assert_eq!(cm.total(), 10);
        assert_eq!(cm.correct(), 7);
        assert!((cm.accuracy() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_per_class_accuracy_skips_empty_classes() {
        let mut cm = ConfusionMatrix::new(3);
        cm.add_batch(&[0, 0, 1], &[0, 1, 1]);
        let per_class = cm.per_class_accuracy();

        assert_eq!(per_class[0], Some(1.0));
        assert_eq!(per_class[1], Some(0.5));
        assert_eq!(per_class[2], None);
    }

    #[test]
    fn test_out_of_range_labels_are_ignored() {
        let mut cm = ConfusionMatrix::new(2);
        cm.add(5, 0);
        cm.add(0, 7);
        assert_eq!(cm.total(), 0);
    }

    #[test]
    fn test_display_uses_class_names() {
        let names = vec!["healthy".to_string(), "blight".to_string()];
        let mut cm = ConfusionMatrix::new(2);
        cm.add_batch(&[0, 1], &[0, 1]);
        let rendered = cm.display(Some(&names));
        assert!(rendered.contains("healthy"));
        assert!(rendered.contains("Accuracy: 100.00%"));
    }

    #[test]
    fn test_weighted_average_respects_batch_sizes() {
        let mut avg = WeightedAverage::new();
        avg.add(1.0, 3);
        avg.add(4.0, 1);

        assert_eq!(avg.count(), 4);
        assert!((avg.average() - 1.75).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_tracker() {
        let mut tracker = AccuracyTracker::new();
        tracker.add(2, 3);
        tracker.add(1, 1);

        assert_eq!(tracker.count(), 4);
        assert!((tracker.accuracy() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_trackers_report_zero() {
        assert_eq!(WeightedAverage::new().average(), 0.0);
        assert_eq!(AccuracyTracker::new().accuracy(), 0.0);
        assert_eq!(ConfusionMatrix::new(3).accuracy(), 0.0);
    }
}
