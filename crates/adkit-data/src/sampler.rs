//! Batch-level samplers.
//!
//! A loader either shuffles items itself and groups them by batch size, or
//! takes pre-grouped index batches from a [`BatchSampler`]. Which one is
//! used is decided by the sampler name in the configuration.

use std::{collections::BTreeMap, fmt, sync::Arc};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::error::{DataError, DataResult};

/// Produces the index batches of one epoch.
pub trait BatchSampler: Send + Sync + fmt::Debug {
    /// Items per batch.
    fn batch_size(&self) -> usize;

    /// Batches per epoch.
    fn num_batches(&self) -> usize;

    /// Index batches for `epoch`. The same epoch always yields the same
    /// batches.
    fn batches(&self, epoch: usize) -> Vec<Vec<usize>>;
}

/// Registered sampler strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    /// No sampler: the loader shuffles items.
    Naive,
    /// [`BalancedBatchSampler`].
    Balanced,
}

impl SamplerKind {
    const REGISTRY: [(&'static str, Self); 2] = [("naive", Self::Naive), ("balanced", Self::Balanced)];

    /// Looks up a sampler by its configured name.
    ///
    /// # Errors
    ///
    /// Returns `DataError::UnknownSampler` for any other name.
    pub fn from_name(name: &str) -> DataResult<Self> {
        Self::REGISTRY
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| DataError::UnknownSampler {
                name: name.to_string(),
                available: Self::names().join(", "),
            })
    }

    /// Every registered sampler name.
    pub fn names() -> Vec<&'static str> {
        Self::REGISTRY.iter().map(|(n, _)| *n).collect()
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Balanced => "balanced",
        }
    }

    /// Builds the sampler for a dataset with the given labels, or `None`
    /// for [`SamplerKind::Naive`].
    pub fn build(
        &self,
        batch_size: usize,
        labels: &[usize],
        seed: u64,
    ) -> DataResult<Option<Arc<dyn BatchSampler>>> {
        match self {
            Self::Naive => Ok(None),
            Self::Balanced => Ok(Some(Arc::new(BalancedBatchSampler::new(
                batch_size, labels, seed,
            )?))),
        }
    }
}

/// Draws every batch with the classes in (near) equal proportion.
///
/// With `k` classes each batch takes `batch_size / k` indices per class; the
/// `batch_size % k` extra slots rotate over the classes from batch to batch.
/// Each class is drawn from its own per-epoch shuffle and restarts with a
/// fresh shuffle when exhausted, so minority classes repeat within an epoch.
#[derive(Debug, Clone)]
pub struct BalancedBatchSampler {
    batch_size: usize,
    classes: Vec<Vec<usize>>,
    num_batches: usize,
    seed: u64,
}

impl BalancedBatchSampler {
    /// # Errors
    ///
    /// Returns `DataError::InvalidConfig` for a zero batch size or an empty
    /// label list.
    pub fn new(batch_size: usize, labels: &[usize], seed: u64) -> DataResult<Self> {
        if batch_size == 0 {
            return Err(DataError::InvalidConfig {
                reason: "balanced sampler needs a positive batch size".into(),
            });
        }
        if labels.is_empty() {
            return Err(DataError::InvalidConfig {
                reason: "balanced sampler needs a non-empty dataset".into(),
            });
        }

        let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, &label) in labels.iter().enumerate() {
            grouped.entry(label).or_default().push(index);
        }
        let classes: Vec<Vec<usize>> = grouped.into_values().collect();
        tracing::debug!(
            batch_size,
            classes = classes.len(),
            sizes = ?classes.iter().map(Vec::len).collect::<Vec<_>>(),
            "balanced sampler built"
        );

        Ok(Self {
            batch_size,
            num_batches: labels.len().div_ceil(batch_size),
            classes,
            seed,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

impl BatchSampler for BalancedBatchSampler {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn num_batches(&self) -> usize {
        self.num_batches
    }

    fn batches(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
        let num_classes = self.classes.len();
        let per_class = self.batch_size / num_classes;
        let extra = self.batch_size % num_classes;

        let mut pools: Vec<Vec<usize>> = self.classes.clone();
        for pool in &mut pools {
            pool.shuffle(&mut rng);
        }
        let mut cursors = vec![0usize; num_classes];

        (0..self.num_batches)
            .map(|b| {
                let mut batch = Vec::with_capacity(self.batch_size);
                for class in 0..num_classes {
                    let quota = per_class + usize::from((class + b) % num_classes < extra);
                    for _ in 0..quota {
                        if cursors[class] == pools[class].len() {
                            pools[class].shuffle(&mut rng);
                            cursors[class] = 0;
                        }
                        batch.push(pools[class][cursors[class]]);
                        cursors[class] += 1;
                    }
                }
                batch.shuffle(&mut rng);
                batch
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_known_names() {
        assert_eq!(SamplerKind::from_name("naive").unwrap(), SamplerKind::Naive);
        assert_eq!(
            SamplerKind::from_name("balanced").unwrap(),
            SamplerKind::Balanced
        );
    }

    #[test]
    fn unknown_sampler_name_is_fatal() {
        match SamplerKind::from_name("weighted") {
            Err(DataError::UnknownSampler { name, available }) => {
                assert_eq!(name, "weighted");
                assert_eq!(available, "naive, balanced");
            }
            other => panic!("expected UnknownSampler, got {other:?}"),
        }
    }

    #[test]
    fn naive_builds_no_sampler() {
        let sampler = SamplerKind::Naive.build(4, &[0, 1], 0).unwrap();
        assert!(sampler.is_none());
    }

    #[test]
    fn batches_hold_classes_in_equal_proportion() {
        // 6 normal, 2 anomalous.
        let labels = [0, 0, 0, 0, 0, 0, 1, 1];
        let sampler = BalancedBatchSampler::new(4, &labels, 3).unwrap();
        assert_eq!(sampler.num_batches(), 2);

        for batch in sampler.batches(0) {
            assert_eq!(batch.len(), 4);
            let anomalous = batch.iter().filter(|&&i| labels[i] == 1).count();
            assert_eq!(anomalous, 2);
        }
    }

    #[test]
    fn odd_batch_size_rotates_the_extra_slot() {
        let labels = [0, 0, 0, 1, 1, 1];
        let sampler = BalancedBatchSampler::new(3, &labels, 0).unwrap();
        let counts: Vec<usize> = sampler
            .batches(0)
            .iter()
            .map(|batch| batch.iter().filter(|&&i| labels[i] == 0).count())
            .collect();
        assert_eq!(counts, vec![2, 1]);
    }

    #[test]
    fn batches_are_reproducible_per_epoch() {
        let labels: Vec<usize> = (0..20).map(|i| i % 3).collect();
        let sampler = BalancedBatchSampler::new(6, &labels, 11).unwrap();
        assert_eq!(sampler.batches(0), sampler.batches(0));
        assert_ne!(sampler.batches(0), sampler.batches(1));
        assert!(sampler.batches(2).iter().flatten().all(|&i| i < 20));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(BalancedBatchSampler::new(0, &[0], 0).is_err());
        assert!(BalancedBatchSampler::new(2, &[], 0).is_err());
    }
}
