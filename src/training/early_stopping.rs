//! Early stopping on validation loss
//!
//! An epoch improves only when its validation loss is strictly below the best
//! seen so far; NaN never improves. After `patience` consecutive epochs
//! without improvement training stops.
//!
//! Two departures from the Keras `EarlyStopping` callback:
//! - `patience == 0` disables stopping, where Keras would stop at the first
//!   epoch that fails to improve.
//! - Any epoch may stop, including the first, when its loss is NaN and
//!   `patience` is 1. Keras never stops on the first epoch.

/// Whether `current` beats `best` for a lower-is-better metric
pub fn improves(current: f64, best: f64) -> bool {
    current < best
}

/// Outcome of feeding one epoch's validation loss to `EarlyStopping`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopDecision {
    /// New best loss; keep these weights
    Improved,
    /// No improvement for `wait` epochs
    Continue { wait: usize },
    /// Patience exhausted
    Stop,
}

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: f64,
    best_epoch: Option<usize>,
    wait: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    /// `patience == 0` never stops
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f64::INFINITY,
            best_epoch: None,
            wait: 0,
            stopped_epoch: None,
        }
    }

    pub fn update(&mut self, epoch: usize, val_loss: f64) -> StopDecision {
        if improves(val_loss, self.best) {
            self.best = val_loss;
            self.best_epoch = Some(epoch);
            self.wait = 0;
            return StopDecision::Improved;
        }

        self.wait += 1;
        if self.patience > 0 && self.wait >= self.patience {
            self.stopped_epoch = Some(epoch);
            StopDecision::Stop
        } else {
            StopDecision::Continue { wait: self.wait }
        }
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    /// Best loss so far, `None` before any improvement
    pub fn best_loss(&self) -> Option<f64> {
        self.best_epoch.map(|_| self.best)
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn triggered(&self) -> bool {
        self.stopped_epoch.is_some()
    }
}
