use std::{fmt, path::PathBuf};

use adkit_data::{
    build_loaders, build_split_loaders, AnomalyBatch, AnomalyBatcher, DataConfig,
    DatasetRegistry, Loader, Loaders, SplitLoaders,
};
use anyhow::{Context, Result};
use burn::tensor::backend::Backend;

use crate::backend::{create_device, get_backend_name, SelectedBackend};

/// CLI arguments for the loaders subcommand.
#[derive(Debug)]
pub struct LoadersCliArgs {
    /// Path to the JSON data configuration.
    pub config_path: PathBuf,
    /// Build the subset loaders as well.
    pub split: bool,
    /// Training batches to materialise as a smoke test.
    pub preview_batches: usize,
}

/// One line of the loader report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSummary {
    pub name: String,
    pub items: usize,
    pub batches: usize,
    pub batch_size: usize,
    pub mode: &'static str,
}

impl LoaderSummary {
    pub fn of(name: impl Into<String>, loader: &Loader) -> Self {
        let mode = if loader.has_batch_sampler() {
            "batch sampler"
        } else if loader.shuffles() {
            "shuffle"
        } else {
            "sequential"
        };
        Self {
            name: name.into(),
            items: loader.num_items(),
            batches: loader.num_batches(),
            batch_size: loader.batch_size(),
            mode,
        }
    }
}

impl fmt::Display for LoaderSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<14} {:>7} items {:>6} batches of {:<4} ({})",
            self.name, self.items, self.batches, self.batch_size, self.mode
        )
    }
}

pub fn summarize(loaders: &Loaders) -> Vec<LoaderSummary> {
    vec![
        LoaderSummary::of("train", &loaders.train),
        LoaderSummary::of("test", &loaders.test),
    ]
}

/// Full loaders first, then each subset's train and evaluation loader.
pub fn summarize_split(loaders: &SplitLoaders) -> Vec<LoaderSummary> {
    let mut lines = vec![
        LoaderSummary::of("train", &loaders.train),
        LoaderSummary::of("test", &loaders.test),
    ];
    for (j, (sub, eval)) in loaders.sub_train.iter().zip(&loaders.test_train).enumerate() {
        lines.push(LoaderSummary::of(format!("sub_train[{j}]"), sub));
        lines.push(LoaderSummary::of(format!("test_train[{j}]"), eval));
    }
    lines
}

/// Loads the first `count` batches of epoch 0 and returns their image
/// tensor shapes.
///
/// # Errors
///
/// Returns the first sample that fails to load.
pub fn preview_batches<B: Backend>(
    loader: &Loader,
    count: usize,
    device: &B::Device,
) -> Result<Vec<[usize; 4]>> {
    let batcher = AnomalyBatcher::<B>::new();
    loader
        .iter_epoch::<B, AnomalyBatch<B>, _>(0, &batcher, device)
        .take(count)
        .enumerate()
        .map(|(index, batch)| {
            let batch = batch.with_context(|| format!("failed to load batch {index}"))?;
            let shape = batch.images.dims();
            tracing::info!(
                batch = index,
                images = ?shape,
                masks = ?batch.masks.dims(),
                "batch loaded"
            );
            Ok(shape)
        })
        .collect()
}

/// Builds the configured loaders and reports them.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the loaders
/// cannot be built, or a previewed batch fails to load.
pub fn run_loaders(args: &LoadersCliArgs) -> Result<Vec<LoaderSummary>> {
    let config = DataConfig::load(&args.config_path).with_context(|| {
        format!(
            "failed to load data configuration from {}",
            args.config_path.display()
        )
    })?;
    tracing::info!(
        train = %config.train_data.kind,
        test = %config.test_data.kind,
        sampler = %config.train_data.sampler.name,
        subset_num = config.subset_num,
        pin_memory = config.trainer.data.pin_memory,
        persistent_workers = config.trainer.data.persistent_workers,
        "configuration loaded"
    );

    let registry = DatasetRegistry::builtin();
    let (train, lines) = if args.split {
        let loaders =
            build_split_loaders(&config, &registry).context("failed to build split loaders")?;
        let lines = summarize_split(&loaders);
        (loaders.train, lines)
    } else {
        let loaders = build_loaders(&config, &registry).context("failed to build loaders")?;
        let lines = summarize(&loaders);
        (loaders.train, lines)
    };

    if args.preview_batches > 0 {
        tracing::info!(
            backend = get_backend_name(),
            batches = args.preview_batches,
            "previewing training batches"
        );
        let device = create_device();
        preview_batches::<SelectedBackend>(&train, args.preview_batches, &device)?;
    }
    Ok(lines)
}
