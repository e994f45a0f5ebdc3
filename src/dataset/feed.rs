//! Epoch batching over a `LeafDataset`
//!
//! Batches are index chunks; their images are decoded in parallel only when
//! the batch is requested, so a whole split never sits in memory.

use burn::data::dataset::Dataset;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

use super::burn_dataset::{LeafDataset, LeafItem};

#[derive(Debug, Clone)]
pub struct DataFeed {
    dataset: LeafDataset,
    batch_size: usize,
    shuffle_seed: Option<u64>,
}

impl DataFeed {
    /// Feed in dataset order; a `batch_size` of 0 is treated as 1
    pub fn new(dataset: LeafDataset, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle_seed: None,
        }
    }

    /// Reshuffle every epoch with a permutation derived from `seed` and the epoch
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Batches per epoch, counting a trailing partial batch
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    /// Index chunks for one epoch; the last chunk may be short
    pub fn epoch_batches(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.len()).collect();

        if let Some(seed) = self.shuffle_seed {
            let mut rng = ChaCha8Rng::seed_from_u64(epoch_seed(seed, epoch));
            indices.shuffle(&mut rng);
        }

        indices
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Decode the images of one chunk in parallel, keeping chunk order
    ///
    /// Images that fail to decode are left out, so the result can be shorter
    /// than `indices`.
    pub fn load_batch(&self, indices: &[usize]) -> Vec<LeafItem> {
        let items: Vec<LeafItem> = indices
            .par_iter()
            .filter_map(|&index| self.dataset.get(index))
            .collect();

        if items.len() < indices.len() {
            debug!("Batch lost {} undecodable images", indices.len() - items.len());
        }
        items
    }
}

fn epoch_seed(seed: u64, epoch: usize) -> u64 {
    seed ^ (epoch as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
