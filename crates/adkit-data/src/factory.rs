//! Assembly of datasets and loaders from a [`DataConfig`].

use std::sync::Arc;

use image::imageops::FilterType;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    config::{DataConfig, LoaderSettings},
    dataset::{AnomalyDataset, DatasetRegistry, DatasetTransforms, IndexedDataset, Split},
    error::DataResult,
    loader::{Loader, Sampling, WorkerSettings},
    partition::{shuffled_partition, ShuffledPartition},
    sampler::SamplerKind,
    transform::build_transforms,
};

/// Train and test loaders over the full datasets.
#[derive(Debug, Clone)]
pub struct Loaders {
    pub train: Loader,
    pub test: Loader,
    pub train_set: IndexedDataset,
    pub test_set: IndexedDataset,
}

/// Loaders for training on disjoint subsets of the training set.
#[derive(Debug, Clone)]
pub struct SplitLoaders {
    /// Loader over the whole training set.
    pub train: Loader,
    /// One training loader per subset.
    pub sub_train: Vec<Loader>,
    /// One evaluation-mode loader per subset, over the same indices as the
    /// matching `sub_train` loader.
    pub test_train: Vec<Loader>,
    pub test: Loader,
    /// The training set in shuffled order; subsets are consecutive slices of
    /// this view.
    pub train_set: IndexedDataset,
    pub test_set: IndexedDataset,
    /// The permutation and the positions of each subset in the training set.
    pub partition: ShuffledPartition,
}

/// Constructs the train and test datasets.
///
/// Masks go through `target_transforms` in evaluation mode for both sets.
///
/// # Errors
///
/// Returns an error for an unknown dataset or transform configuration, or
/// if either dataset cannot be scanned.
pub fn build_datasets(
    cfg: &DataConfig,
    registry: &DatasetRegistry,
) -> DataResult<DatasetPair> {
    build_datasets_seeded(cfg, registry, resolve_seed(cfg))
}

/// Train and test datasets, in that order.
pub type DatasetPair = (Arc<dyn AnomalyDataset>, Arc<dyn AnomalyDataset>);

fn build_datasets_seeded(
    cfg: &DataConfig,
    registry: &DatasetRegistry,
    seed: u64,
) -> DataResult<DatasetPair> {
    let target_transform = build_transforms(&cfg.train_data.target_transforms, false)?
        .with_filter(FilterType::Nearest);

    let train_set = registry.build(
        &cfg.train_data.dataset_spec(),
        Split::Train,
        DatasetTransforms {
            transform: build_transforms(&cfg.train_data.train_transforms, true)?,
            target_transform: target_transform.clone(),
            seed,
        },
    )?;
    let test_set = registry.build(
        &cfg.test_data.dataset_spec(),
        Split::Test,
        DatasetTransforms {
            transform: build_transforms(cfg.test_data.transforms(), false)?,
            target_transform,
            seed,
        },
    )?;
    Ok((train_set, test_set))
}

/// Builds the train and test loaders.
///
/// The train loader shuffles items unless the configured sampler provides
/// batches. The test loader never shuffles and keeps its last batch.
///
/// # Errors
///
/// Returns an error for an invalid configuration, an unknown sampler or
/// dataset, or a dataset that cannot be scanned.
pub fn build_loaders(cfg: &DataConfig, registry: &DatasetRegistry) -> DataResult<Loaders> {
    cfg.validate()?;
    let sampler = SamplerKind::from_name(&cfg.train_data.sampler.name)?;
    let seed = resolve_seed(cfg);
    let (train_source, test_source) = build_datasets_seeded(cfg, registry, seed)?;

    let settings = &cfg.trainer.data;
    let train_set = IndexedDataset::full(train_source);
    let test_set = IndexedDataset::full(test_source);
    let train = train_loader(train_set.clone(), sampler, settings, seed)?;
    let test = test_loader(test_set.clone(), settings, seed)?;

    tracing::info!(
        sampler = sampler.name(),
        train_samples = train.num_items(),
        train_batches = train.num_batches(),
        test_samples = test.num_items(),
        test_batches = test.num_batches(),
        "loaders built"
    );
    Ok(Loaders {
        train,
        test,
        train_set,
        test_set,
    })
}

/// Builds loaders over `subset_num` disjoint random subsets of the training
/// set, plus the full train and test loaders.
///
/// Every subset gets a training loader and an evaluation-mode loader over
/// the same indices. With a batch sampler configured, each subset's sampler
/// is built over that subset's labels.
///
/// # Errors
///
/// Same as [`build_loaders`].
pub fn build_split_loaders(
    cfg: &DataConfig,
    registry: &DatasetRegistry,
) -> DataResult<SplitLoaders> {
    cfg.validate()?;
    let sampler = SamplerKind::from_name(&cfg.train_data.sampler.name)?;
    let seed = resolve_seed(cfg);
    let (train_source, test_source) = build_datasets_seeded(cfg, registry, seed)?;
    let settings = &cfg.trainer.data;

    let mut rng = StdRng::seed_from_u64(seed);
    let partition = shuffled_partition(train_source.len(), cfg.subset_num, &mut rng)?;
    let train_set = IndexedDataset::new(train_source, partition.order.clone())?;
    let test_set = IndexedDataset::full(test_source);

    let train = train_loader(train_set.clone(), sampler, settings, seed)?;
    let test = test_loader(test_set.clone(), settings, seed)?;

    let mut sub_train = Vec::with_capacity(cfg.subset_num);
    let mut test_train = Vec::with_capacity(cfg.subset_num);
    let mut offset = 0;
    for (j, part) in partition.parts.iter().enumerate() {
        // Subset j is the slice of the shuffled view right after subset j-1.
        let positions: Vec<usize> = (offset..offset + part.len()).collect();
        offset += part.len();
        let subset = train_set.select(&positions)?;
        let subset_seed = seed.wrapping_add(j as u64 + 1);

        sub_train.push(train_loader(subset.clone(), sampler, settings, subset_seed)?);
        test_train.push(Loader::new(
            subset,
            Sampling::Items {
                batch_size: settings.batch_size_per_gpu,
                shuffle: false,
                drop_last: settings.drop_last,
            },
            worker_settings(settings),
            subset_seed,
        )?);
        tracing::debug!(subset = j, samples = part.len(), "subset loaders built");
    }

    tracing::info!(
        sampler = sampler.name(),
        subsets = cfg.subset_num,
        subset_sizes = ?partition.parts.iter().map(Vec::len).collect::<Vec<_>>(),
        train_samples = train.num_items(),
        test_samples = test.num_items(),
        "split loaders built"
    );
    Ok(SplitLoaders {
        train,
        sub_train,
        test_train,
        test,
        train_set,
        test_set,
        partition,
    })
}

fn resolve_seed(cfg: &DataConfig) -> u64 {
    match cfg.seed {
        Some(seed) => seed,
        None => {
            let seed = rand::random::<u64>();
            tracing::info!(seed, "no seed configured, drew one at random");
            seed
        }
    }
}

fn worker_settings(settings: &LoaderSettings) -> WorkerSettings {
    WorkerSettings {
        num_workers: settings.num_workers_per_gpu,
        pin_memory: settings.pin_memory,
        persistent_workers: settings.persistent_workers,
    }
}

fn train_loader(
    dataset: IndexedDataset,
    sampler: SamplerKind,
    settings: &LoaderSettings,
    seed: u64,
) -> DataResult<Loader> {
    let labels = dataset.labels();
    // An empty subset has nothing to balance; it gets an item loader with
    // no batches instead.
    let batch_sampler = if labels.is_empty() {
        None
    } else {
        sampler.build(settings.batch_size_per_gpu, &labels, seed)?
    };
    let sampling = match batch_sampler {
        Some(batch_sampler) => Sampling::Batches(batch_sampler),
        None => Sampling::Items {
            batch_size: settings.batch_size_per_gpu,
            shuffle: true,
            drop_last: settings.drop_last,
        },
    };
    Loader::new(dataset, sampling, worker_settings(settings), seed)
}

fn test_loader(
    dataset: IndexedDataset,
    settings: &LoaderSettings,
    seed: u64,
) -> DataResult<Loader> {
    Loader::new(
        dataset,
        Sampling::Items {
            batch_size: settings.batch_size_per_gpu_test,
            shuffle: false,
            drop_last: false,
        },
        worker_settings(settings),
        seed,
    )
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, path::Path};

    use super::*;
    use crate::{
        dataset::{
            tests::{write_mask, write_rgb},
            ANOMALOUS, NORMAL,
        },
        error::DataError,
    };

    /// One `bottle` category: `train_good` normal training images, two good
    /// and two broken test images.
    fn mvtec_fixture(root: &Path, train_good: usize) {
        let bottle = root.join("bottle");
        for i in 0..train_good {
            write_rgb(&bottle.join(format!("train/good/{i:03}.png")), 8, 100);
        }
        for i in 0..2 {
            write_rgb(&bottle.join(format!("test/good/{i:03}.png")), 8, 100);
            write_rgb(&bottle.join(format!("test/broken/{i:03}.png")), 8, 30);
            write_mask(
                &bottle.join(format!("ground_truth/broken/{i:03}_mask.png")),
                8,
            );
        }
    }

    fn config(root: &Path, sampler: &str, subset_num: usize) -> DataConfig {
        let json = format!(
            r#"{{
                "train_data": {{
                    "type": "mvtec",
                    "root": {root:?},
                    "train_transforms": [
                        {{"type": "Resize", "size": 4}},
                        {{"type": "RandomHorizontalFlip"}},
                        {{"type": "ToTensor"}}
                    ],
                    "target_transforms": [{{"type": "Resize", "size": 4}}],
                    "sampler": {{"name": "{sampler}"}}
                }},
                "test_data": {{
                    "type": "mvtec",
                    "root": {root:?},
                    "test_transforms": [{{"type": "Resize", "size": 4}}]
                }},
                "trainer": {{"data": {{"batch_size_per_gpu": 2, "batch_size_per_gpu_test": 3, "num_workers_per_gpu": 0}}}},
                "subset_num": {subset_num},
                "seed": 17
            }}"#,
            root = root.display().to_string(),
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn naive_sampler_shuffles_items() {
        let dir = tempfile::tempdir().unwrap();
        mvtec_fixture(dir.path(), 5);
        let loaders =
            build_loaders(&config(dir.path(), "naive", 1), &DatasetRegistry::builtin()).unwrap();

        assert!(loaders.train.shuffles());
        assert!(!loaders.train.has_batch_sampler());
        // drop_last defaults to true.
        assert_eq!(loaders.train.num_batches(), 2);

        assert!(!loaders.test.shuffles());
        assert!(!loaders.test.has_batch_sampler());
        assert_eq!(loaders.test.num_items(), 4);
        assert_eq!(loaders.test.num_batches(), 2);
    }

    #[test]
    fn balanced_sampler_replaces_item_shuffling() {
        let dir = tempfile::tempdir().unwrap();
        mvtec_fixture(dir.path(), 5);
        let loaders = build_loaders(
            &config(dir.path(), "balanced", 1),
            &DatasetRegistry::builtin(),
        )
        .unwrap();

        assert!(loaders.train.has_batch_sampler());
        assert!(!loaders.train.shuffles());
        assert_eq!(loaders.train.batch_size(), 2);
        assert!(!loaders.test.has_batch_sampler());
    }

    #[test]
    fn unknown_sampler_fails_before_scanning() {
        // The dataset root does not exist; the sampler error must win.
        let cfg = config(Path::new("/nonexistent/adkit"), "weighted", 1);
        assert!(matches!(
            build_loaders(&cfg, &DatasetRegistry::builtin()),
            Err(DataError::UnknownSampler { .. })
        ));
    }

    #[test]
    fn unknown_dataset_type_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        mvtec_fixture(dir.path(), 2);
        let mut cfg = config(dir.path(), "naive", 1);
        cfg.train_data.kind = "imagenet".into();
        assert!(matches!(
            build_loaders(&cfg, &DatasetRegistry::builtin()),
            Err(DataError::UnknownDataset { .. })
        ));
    }

    #[test]
    fn datasets_use_eval_target_transforms() {
        let dir = tempfile::tempdir().unwrap();
        mvtec_fixture(dir.path(), 1);
        let (train, test) =
            build_datasets(&config(dir.path(), "naive", 1), &DatasetRegistry::builtin()).unwrap();

        assert_eq!(train.labels(), vec![NORMAL]);
        assert_eq!(test.len(), 4);

        let broken = (0..test.len())
            .find(|&i| test.label(i) == Some(ANOMALOUS))
            .unwrap();
        let item = test.load(broken).unwrap();
        assert_eq!((item.mask.height, item.mask.width), (4, 4));
        // Left half of the mask is foreground, nearest resize keeps it binary.
        assert!(item.mask.data.iter().all(|&v| v == 0.0 || v == 1.0));
        assert_eq!(item.mask.data[0], 1.0);
    }

    #[test]
    fn split_partitions_the_training_set() {
        let dir = tempfile::tempdir().unwrap();
        mvtec_fixture(dir.path(), 10);
        let split = build_split_loaders(
            &config(dir.path(), "naive", 3),
            &DatasetRegistry::builtin(),
        )
        .unwrap();

        let sizes: Vec<usize> = split.sub_train.iter().map(Loader::num_items).collect();
        assert_eq!(sizes, vec![3, 3, 4]);
        assert_eq!(split.test_train.len(), 3);
        assert_eq!(split.train.num_items(), 10);

        let mut seen = HashSet::new();
        for (sub, eval) in split.sub_train.iter().zip(&split.test_train) {
            assert_eq!(sub.dataset().indices(), eval.dataset().indices());
            assert!(sub.shuffles());
            assert!(!eval.shuffles());
            assert!(!eval.has_batch_sampler());
            for &index in sub.dataset().indices() {
                assert!(seen.insert(index));
            }
        }
        assert_eq!(seen, (0..10).collect());
        assert_eq!(split.train_set.indices(), split.partition.order.as_slice());
        assert_eq!(split.test.num_items(), 4);
    }

    #[test]
    fn split_builds_a_sampler_per_subset() {
        let dir = tempfile::tempdir().unwrap();
        mvtec_fixture(dir.path(), 9);
        let split = build_split_loaders(
            &config(dir.path(), "balanced", 2),
            &DatasetRegistry::builtin(),
        )
        .unwrap();

        for (sub, eval) in split.sub_train.iter().zip(&split.test_train) {
            assert!(sub.has_batch_sampler());
            assert_eq!(sub.num_batches(), sub.num_items().div_ceil(2));
            assert!(sub
                .epoch_batches(0)
                .iter()
                .flatten()
                .all(|&p| p < sub.num_items()));
            assert!(!eval.has_batch_sampler());
        }
    }

    #[test]
    fn split_tolerates_more_subsets_than_samples() {
        let dir = tempfile::tempdir().unwrap();
        mvtec_fixture(dir.path(), 3);
        for sampler in ["naive", "balanced"] {
            let split = build_split_loaders(
                &config(dir.path(), sampler, 5),
                &DatasetRegistry::builtin(),
            )
            .unwrap();

            assert_eq!(split.sub_train.len(), 5);
            assert_eq!(split.test_train.len(), 5);
            let sizes: Vec<usize> = split.sub_train.iter().map(Loader::num_items).collect();
            assert_eq!(sizes.iter().sum::<usize>(), 3);
            for sub in split.sub_train.iter().filter(|sub| sub.num_items() == 0) {
                assert!(!sub.has_batch_sampler());
                assert!(sub.epoch_batches(0).is_empty());
            }
            assert_eq!(
                split.train.has_batch_sampler(),
                sampler == "balanced",
                "sampler = {sampler}"
            );
        }
    }

    #[test]
    fn split_is_reproducible_with_a_seed() {
        let dir = tempfile::tempdir().unwrap();
        mvtec_fixture(dir.path(), 8);
        let cfg = config(dir.path(), "naive", 2);
        let a = build_split_loaders(&cfg, &DatasetRegistry::builtin()).unwrap();
        let b = build_split_loaders(&cfg, &DatasetRegistry::builtin()).unwrap();
        assert_eq!(a.partition, b.partition);
    }

    #[test]
    fn zero_subsets_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        mvtec_fixture(dir.path(), 2);
        assert!(matches!(
            build_split_loaders(
                &config(dir.path(), "naive", 0),
                &DatasetRegistry::builtin()
            ),
            Err(DataError::InvalidConfig { .. })
        ));
    }
}
