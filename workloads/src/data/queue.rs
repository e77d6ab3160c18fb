use std::sync::Arc;

use api::{Batch, BenchErr, Result};
use log::debug;
use ndarray::Axis;
use rand::{rngs::StdRng, seq::SliceRandom};

use super::{InMemoryDataset, Normalizer};

/// A stream of normalized batches over an in-memory split.
///
/// A shuffling queue is endless: the split is repeated before it's batched, so a batch may hold
/// the tail of one pass and the head of the next one, and every pass draws a new order. A
/// sequential queue makes a single pass and drops the examples that don't fill a last batch.
#[derive(Debug)]
pub struct InputQueue {
    dataset: Arc<InMemoryDataset>,
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
    shuffle: Option<StdRng>,
    normalizer: Normalizer,
    passes: usize,
}

impl InputQueue {
    /// Creates a queue that reads the split once in order, used for evaluation.
    ///
    /// # Arguments
    /// * `dataset` - The split to read.
    /// * `batch_size` - The amount of examples per batch.
    /// * `normalizer` - The standardization applied to every batch.
    ///
    /// # Returns
    /// A new `InputQueue` or an error if `batch_size` is zero.
    pub fn sequential(
        dataset: Arc<InMemoryDataset>,
        batch_size: usize,
        normalizer: Normalizer,
    ) -> Result<Self> {
        Self::new(dataset, batch_size, normalizer, None)
    }

    /// Creates an endless queue that reshuffles the split on every pass, used for training.
    pub fn shuffled(
        dataset: Arc<InMemoryDataset>,
        batch_size: usize,
        normalizer: Normalizer,
        rng: StdRng,
    ) -> Result<Self> {
        Self::new(dataset, batch_size, normalizer, Some(rng))
    }

    fn new(
        dataset: Arc<InMemoryDataset>,
        batch_size: usize,
        normalizer: Normalizer,
        shuffle: Option<StdRng>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(BenchErr::InvalidConfig("batch size must be positive".into()));
        }

        let mut queue = Self {
            order: (0..dataset.len()).collect(),
            dataset,
            cursor: 0,
            batch_size,
            shuffle,
            normalizer,
            passes: 0,
        };
        queue.reshuffle();

        Ok(queue)
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The amount of completed passes over the split.
    #[inline]
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// The amount of batches a single pass yields, the remainder of the split is dropped.
    #[inline]
    pub fn batches_per_pass(&self) -> usize {
        self.order.len() / self.batch_size
    }

    /// Reads the next batch of the stream.
    ///
    /// # Returns
    /// The batch, `None` once a sequential queue has made its pass or an error if the rows it
    /// gathered don't make a well-formed batch.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        let indices = match self.shuffle {
            Some(_) => self.next_repeated(),
            None => self.next_in_pass(),
        };
        let Some(indices) = indices else {
            return Ok(None);
        };

        let raw = self.dataset.inputs().select(Axis(0), &indices);
        let labels = self.dataset.labels().select(Axis(0), &indices);

        Batch::new(self.normalizer.apply(raw.view()), labels).map(Some)
    }

    fn reshuffle(&mut self) {
        if let Some(rng) = self.shuffle.as_mut() {
            self.order.shuffle(rng);
        }
    }

    fn next_in_pass(&mut self) -> Option<Vec<usize>> {
        let end = self.cursor + self.batch_size;
        if end > self.order.len() {
            return None;
        }

        let indices = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        if self.order.len() - self.cursor < self.batch_size {
            self.passes = 1;
        }
        Some(indices)
    }

    fn next_repeated(&mut self) -> Option<Vec<usize>> {
        let mut indices = Vec::with_capacity(self.batch_size);
        while indices.len() < self.batch_size {
            if self.cursor == self.order.len() {
                self.cursor = 0;
                self.passes += 1;
                self.reshuffle();
                debug!(passes = self.passes; "input queue wrapped around");
            }

            let take = (self.batch_size - indices.len()).min(self.order.len() - self.cursor);
            indices.extend_from_slice(&self.order[self.cursor..self.cursor + take]);
            self.cursor += take;
        }
        Some(indices)
    }
}

impl Iterator for InputQueue {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Result<Batch>> {
        self.next_batch().transpose()
    }
}
