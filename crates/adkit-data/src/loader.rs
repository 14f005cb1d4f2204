//! Loaders: a dataset view plus a batching strategy.
//!
//! A [`Loader`] can be iterated directly, one epoch at a time, or handed to
//! Burn's `DataLoaderBuilder` for multi-worker prefetching.

use std::{fmt::Debug, sync::Arc};

use burn::{
    data::{
        dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    tensor::backend::Backend,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{
    dataset::{AnomalyDataset, AnomalyItem, IndexedDataset},
    error::{DataError, DataResult},
    sampler::BatchSampler,
};

/// How a loader groups indices into batches.
///
/// The two modes are mutually exclusive: either the loader shuffles items
/// and cuts them into `batch_size` chunks, or a batch sampler hands it
/// complete batches.
#[derive(Debug, Clone)]
pub enum Sampling {
    Items {
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
    },
    Batches(Arc<dyn BatchSampler>),
}

/// Worker settings forwarded to the data-loading backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub num_workers: usize,
    /// Carried for parity with the configuration; Burn has no equivalent.
    pub pin_memory: bool,
    /// Carried for parity with the configuration; Burn has no equivalent.
    pub persistent_workers: bool,
}

#[derive(Debug, Clone)]
pub struct Loader {
    dataset: IndexedDataset,
    sampling: Sampling,
    workers: WorkerSettings,
    seed: u64,
}

impl Loader {
    /// # Errors
    ///
    /// Returns `DataError::InvalidConfig` for a zero batch size.
    pub fn new(
        dataset: IndexedDataset,
        sampling: Sampling,
        workers: WorkerSettings,
        seed: u64,
    ) -> DataResult<Self> {
        if let Sampling::Items { batch_size: 0, .. } = sampling {
            return Err(DataError::InvalidConfig {
                reason: "loader batch size must be positive".into(),
            });
        }
        Ok(Self {
            dataset,
            sampling,
            workers,
            seed,
        })
    }

    pub fn dataset(&self) -> &IndexedDataset {
        &self.dataset
    }

    pub fn sampling(&self) -> &Sampling {
        &self.sampling
    }

    pub fn workers(&self) -> WorkerSettings {
        self.workers
    }

    /// Whether batches come from a batch sampler.
    pub fn has_batch_sampler(&self) -> bool {
        matches!(self.sampling, Sampling::Batches(_))
    }

    /// Whether the loader shuffles items itself.
    pub fn shuffles(&self) -> bool {
        matches!(self.sampling, Sampling::Items { shuffle: true, .. })
    }

    pub fn batch_size(&self) -> usize {
        match &self.sampling {
            Sampling::Items { batch_size, .. } => *batch_size,
            Sampling::Batches(sampler) => sampler.batch_size(),
        }
    }

    /// Items in the underlying view.
    pub fn num_items(&self) -> usize {
        self.dataset.indices().len()
    }

    /// Batches per epoch.
    pub fn num_batches(&self) -> usize {
        match &self.sampling {
            Sampling::Items {
                batch_size,
                drop_last: true,
                ..
            } => self.num_items() / batch_size,
            Sampling::Items { batch_size, .. } => self.num_items().div_ceil(*batch_size),
            Sampling::Batches(sampler) => sampler.num_batches(),
        }
    }

    /// Index batches (positions in [`Loader::dataset`]) for `epoch`.
    pub fn epoch_batches(&self, epoch: usize) -> Vec<Vec<usize>> {
        match &self.sampling {
            Sampling::Items {
                batch_size,
                shuffle,
                drop_last,
            } => {
                let mut order: Vec<usize> = (0..self.num_items()).collect();
                if *shuffle {
                    let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
                    order.shuffle(&mut rng);
                }
                order
                    .chunks(*batch_size)
                    .filter(|chunk| !*drop_last || chunk.len() == *batch_size)
                    .map(<[usize]>::to_vec)
                    .collect()
            }
            Sampling::Batches(sampler) => sampler.batches(epoch),
        }
    }

    /// Loads and batches one epoch on the calling thread.
    ///
    /// Each element is one batch; the first item that fails to load turns
    /// its batch into an error.
    pub fn iter_epoch<'a, B, O, T>(
        &'a self,
        epoch: usize,
        batcher: &'a T,
        device: &'a B::Device,
    ) -> impl Iterator<Item = DataResult<O>> + 'a
    where
        B: Backend,
        T: Batcher<B, AnomalyItem, O>,
    {
        self.epoch_batches(epoch).into_iter().map(move |indices| {
            let items = indices
                .into_iter()
                .map(|i| self.dataset.load(i))
                .collect::<DataResult<Vec<_>>>()?;
            Ok(batcher.batch(items, device))
        })
    }

    /// Hands the loader to Burn's `DataLoaderBuilder`.
    ///
    /// Every Burn item is one whole index batch of epoch 0 and Burn batches
    /// them one at a time, so the worker split never regroups items: batch
    /// sampler groups and `drop_last` survive any worker count. A shuffling
    /// loader additionally lets Burn reshuffle the batch order each epoch;
    /// batch contents stay those of epoch 0. Use [`Loader::iter_epoch`] for
    /// fresh groups every epoch.
    ///
    /// # Errors
    ///
    /// Returns an error if a batch holds positions outside the view.
    pub fn into_dataloader<B, O, T>(self, batcher: T) -> DataResult<Arc<dyn DataLoader<B, O>>>
    where
        B: Backend,
        O: Send + Sync + Clone + Debug + 'static,
        T: Batcher<B, AnomalyItem, O> + 'static,
    {
        let len = self.num_items();
        let batches = self.epoch_batches(0);
        if let Some(&index) = batches.iter().flatten().find(|&&p| p >= len) {
            return Err(DataError::IndexOutOfBounds { index, len });
        }

        let groups = BatchGroups {
            dataset: self.dataset.clone(),
            batches,
        };
        let builder = DataLoaderBuilder::new(GroupBatcher { inner: batcher })
            .batch_size(1)
            .num_workers(self.workers.num_workers.max(1));
        let builder = if self.shuffles() {
            builder.shuffle(self.seed)
        } else {
            builder
        };
        Ok(builder.build(groups))
    }
}

/// Precomputed index batches served as single Burn items.
struct BatchGroups {
    dataset: IndexedDataset,
    batches: Vec<Vec<usize>>,
}

impl Dataset<Vec<AnomalyItem>> for BatchGroups {
    fn get(&self, index: usize) -> Option<Vec<AnomalyItem>> {
        let positions = self.batches.get(index)?;
        match positions
            .iter()
            .map(|&p| self.dataset.load(p))
            .collect::<DataResult<Vec<_>>>()
        {
            Ok(items) => Some(items),
            Err(err) => {
                tracing::error!(batch = index, error = %err, "failed to load batch");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.batches.len()
    }
}

/// Unwraps the one group Burn hands over and batches its items.
#[derive(Clone)]
struct GroupBatcher<T> {
    inner: T,
}

impl<B, O, T> Batcher<B, Vec<AnomalyItem>, O> for GroupBatcher<T>
where
    B: Backend,
    T: Batcher<B, AnomalyItem, O>,
{
    fn batch(&self, groups: Vec<Vec<AnomalyItem>>, device: &B::Device) -> O {
        self.inner
            .batch(groups.into_iter().flatten().collect(), device)
    }
}
