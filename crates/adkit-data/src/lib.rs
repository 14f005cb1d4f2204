//! # adkit-data
//!
//! Turns a JSON experiment configuration into training and evaluation data
//! loaders for anomaly detection: dataset construction by type name,
//! transform pipelines, optional class-balanced batch sampling, and random
//! partitioning of the training set into disjoint subsets.

pub mod batcher;
pub mod config;
pub mod dataset;
pub mod error;
pub mod factory;
pub mod loader;
pub mod partition;
pub mod sampler;
pub mod transform;

// Re-export commonly used types
pub use batcher::{AnomalyBatch, AnomalyBatcher};
pub use config::{DataConfig, LoaderSettings};
pub use dataset::{AnomalyDataset, AnomalyItem, DatasetRegistry, IndexedDataset, Split};
pub use error::{DataError, DataResult};
pub use factory::{build_datasets, build_loaders, build_split_loaders, Loaders, SplitLoaders};
pub use loader::{Loader, Sampling, WorkerSettings};
pub use partition::{partition_ranges, shuffled_partition, ShuffledPartition};
pub use sampler::{BalancedBatchSampler, BatchSampler, SamplerKind};
pub use transform::{build_transforms, Pipeline, TensorImage, TransformSpec};
