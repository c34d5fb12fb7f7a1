//! Batching with optional background prefetch.
//!
//! Each sample gets its own RNG seeded from the epoch seed and its dataset
//! index, so the batches an epoch yields are the same for any worker count.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::data::augment::Mode;
use crate::data::sample::{Dataset, Sample};
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Stacked samples. `inputs` is `[N, C, H, W]`; `targets` is `[N, 1, H, W]`
/// for label maps or `[N, K]` for vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub inputs: Tensor,
    pub targets: Tensor,
    pub input_ids: Vec<PathBuf>,
    pub target_ids: Vec<Option<PathBuf>>,
}

impl Batch {
    pub fn from_samples(samples: Vec<Sample>) -> Result<Batch> {
        let mut inputs = Vec::with_capacity(samples.len());
        let mut targets = Vec::with_capacity(samples.len());
        let mut input_ids = Vec::with_capacity(samples.len());
        let mut target_ids = Vec::with_capacity(samples.len());
        for s in samples {
            inputs.push(s.input);
            targets.push(s.target);
            input_ids.push(s.input_id);
            target_ids.push(s.target_id);
        }
        Ok(Batch {
            inputs: Tensor::stack(&inputs)?,
            targets: Tensor::stack(&targets)?,
            input_ids,
            target_ids,
        })
    }

    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Throughput knobs. None of them changes batch contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    pub batch_size: usize,
    /// Background threads; `0` loads on the calling thread.
    pub workers: usize,
    /// Accepted for config compatibility; host memory is always used.
    pub pin_memory: bool,
    /// Ready batches buffered per worker.
    pub prefetch_factor: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        LoaderOptions { batch_size: 4, workers: 0, pin_memory: true, prefetch_factor: 2 }
    }
}

fn sample_rng(epoch_seed: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(epoch_seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn load_batch(dataset: &dyn Dataset, indices: &[usize], epoch_seed: u64) -> Result<Batch> {
    let samples = indices
        .iter()
        .map(|&i| dataset.get(i, &mut sample_rng(epoch_seed, i)))
        .collect::<Result<Vec<_>>>()?;
    Batch::from_samples(samples)
}

/// Groups a dataset into batches: shuffled each epoch in train mode, in
/// dataset order in validation mode. The final batch may be short.
pub struct BatchLoader {
    dataset: Arc<dyn Dataset>,
    mode: Mode,
    options: LoaderOptions,
    rng: StdRng,
}

impl BatchLoader {
    pub fn new(dataset: Arc<dyn Dataset>, mode: Mode, options: LoaderOptions, seed: u64) -> Result<BatchLoader> {
        if options.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if options.pin_memory {
            debug!("pin_memory requested; batches stay in host memory");
        }
        Ok(BatchLoader { dataset, mode, options, rng: StdRng::seed_from_u64(seed) })
    }

    /// Number of batches per epoch.
    pub fn len(&self) -> usize {
        (self.dataset.len() + self.options.batch_size - 1) / self.options.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn num_samples(&self) -> usize {
        self.dataset.len()
    }

    pub fn batch_size(&self) -> usize {
        self.options.batch_size
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn dataset(&self) -> &Arc<dyn Dataset> {
        &self.dataset
    }

    /// Plans one epoch and starts producing its batches.
    pub fn epoch(&mut self) -> EpochBatches {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.mode == Mode::Train {
            order.shuffle(&mut self.rng);
        }
        let epoch_seed: u64 = self.rng.gen();
        let plan: Vec<Vec<usize>> = order
            .chunks(self.options.batch_size)
            .map(|c| c.to_vec())
            .collect();
        let total = plan.len();

        let source = if self.options.workers == 0 {
            Source::Inline { dataset: Arc::clone(&self.dataset), plan, epoch_seed }
        } else {
            let workers = self.options.workers.min(total.max(1));
            let plan = Arc::new(plan);
            let receivers = (0..workers)
                .map(|worker| {
                    let (tx, rx) = bounded(self.options.prefetch_factor.max(1));
                    let dataset = Arc::clone(&self.dataset);
                    let plan = Arc::clone(&plan);
                    thread::spawn(move || {
                        for position in (worker..plan.len()).step_by(workers) {
                            let batch = load_batch(dataset.as_ref(), &plan[position], epoch_seed);
                            // Receiver gone: the epoch was abandoned.
                            if tx.send(batch).is_err() {
                                break;
                            }
                        }
                    });
                    rx
                })
                .collect();
            info!(workers, batches = total, "prefetch workers started");
            Source::Workers { receivers }
        };

        EpochBatches { source, next: 0, total }
    }
}

enum Source {
    Inline {
        dataset: Arc<dyn Dataset>,
        plan: Vec<Vec<usize>>,
        epoch_seed: u64,
    },
    Workers {
        receivers: Vec<Receiver<Result<Batch>>>,
    },
}

/// The batches of one epoch, in plan order.
pub struct EpochBatches {
    source: Source,
    next: usize,
    total: usize,
}

impl EpochBatches {
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for EpochBatches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let position = self.next;
        self.next += 1;
        let item = match &self.source {
            Source::Inline { dataset, plan, epoch_seed } => {
                load_batch(dataset.as_ref(), &plan[position], *epoch_seed)
            }
            Source::Workers { receivers } => receivers[position % receivers.len()]
                .recv()
                .unwrap_or_else(|_| Err(Error::Worker(format!("no batch for position {}", position)))),
        };
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total - self.next;
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Input encodes the index plus a per-sample random draw.
    struct Indexed(usize);

    impl Dataset for Indexed {
        fn len(&self) -> usize {
            self.0
        }

        fn get(&self, index: usize, rng: &mut StdRng) -> Result<Sample> {
            let noise: f32 = rng.gen();
            Ok(Sample {
                input: Tensor::from_vec(&[2], vec![index as f32, noise])?,
                target: Tensor::from_vec(&[1], vec![index as f32])?,
                input_id: PathBuf::from(format!("{}.png", index)),
                target_id: None,
            })
        }
    }

    fn loader(n: usize, mode: Mode, workers: usize) -> BatchLoader {
        let options = LoaderOptions { batch_size: 3, workers, ..LoaderOptions::default() };
        BatchLoader::new(Arc::new(Indexed(n)), mode, options, 42).unwrap()
    }

    fn indices(batch: &Batch) -> Vec<usize> {
        batch.targets.data().iter().map(|&v| v as usize).collect()
    }

    #[test]
    fn length_counts_the_short_final_batch() {
        assert_eq!(loader(10, Mode::Train, 0).len(), 4);
        assert_eq!(loader(9, Mode::Train, 0).len(), 3);
    }

    #[test]
    fn validation_keeps_dataset_order() {
        let mut l = loader(7, Mode::Validation, 0);
        let seen: Vec<usize> = l.epoch().flat_map(|b| indices(&b.unwrap())).collect();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn train_shuffles_a_permutation_each_epoch() {
        let mut l = loader(12, Mode::Train, 0);
        let first: Vec<usize> = l.epoch().flat_map(|b| indices(&b.unwrap())).collect();
        let second: Vec<usize> = l.epoch().flat_map(|b| indices(&b.unwrap())).collect();
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, (0..12).collect::<Vec<_>>());
        assert_ne!(first, second);
    }

    #[test]
    fn worker_count_does_not_change_batches() {
        let collect = |workers| -> Vec<Batch> {
            let mut l = loader(11, Mode::Train, workers);
            l.epoch().map(|b| b.unwrap()).collect()
        };
        let inline = collect(0);
        assert_eq!(inline, collect(1));
        assert_eq!(inline, collect(3));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let options = LoaderOptions { batch_size: 0, ..LoaderOptions::default() };
        assert!(BatchLoader::new(Arc::new(Indexed(3)), Mode::Train, options, 0).is_err());
    }

    #[test]
    fn dropping_an_epoch_early_releases_workers() {
        let mut l = loader(30, Mode::Train, 2);
        let first = l.epoch().next().unwrap().unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(l.epoch().count(), 10);
    }
}
