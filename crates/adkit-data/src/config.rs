//! Loader configuration.
//!
//! The layout mirrors the experiment configuration files this crate is fed
//! with: a `train_data` and `test_data` section describing datasets and
//! transforms, and a `trainer.data` section with batching and worker
//! settings.

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DataError, DataResult},
    transform::TransformSpec,
};

/// Root configuration for loader assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Training dataset, transforms and sampler.
    pub train_data: TrainDataConfig,
    /// Test dataset and transforms.
    pub test_data: TestDataConfig,
    /// Batching and worker settings.
    #[serde(default)]
    pub trainer: TrainerConfig,
    /// Number of disjoint training subsets for the split variant.
    #[serde(default = "default_subset_num")]
    pub subset_num: usize,
    /// Seed for shuffling, partitioning and sampling. Drawn at random when
    /// absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

const fn default_subset_num() -> usize {
    1
}

/// Training data section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainDataConfig {
    /// Registered dataset type, e.g. `"mvtec"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Dataset root directory.
    pub root: PathBuf,
    /// Categories to include. Empty selects every category found.
    #[serde(default)]
    pub cls_names: Vec<String>,
    /// Input transforms for training.
    #[serde(default)]
    pub train_transforms: Vec<TransformSpec>,
    /// Mask transforms, shared by the train and test sets.
    #[serde(default)]
    pub target_transforms: Vec<TransformSpec>,
    #[serde(default)]
    pub sampler: SamplerConfig,
}

/// Test data section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDataConfig {
    /// Registered dataset type, e.g. `"mvtec"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Dataset root directory.
    pub root: PathBuf,
    /// Categories to include. Empty selects every category found.
    #[serde(default)]
    pub cls_names: Vec<String>,
    /// Input transforms for evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_transforms: Option<Vec<TransformSpec>>,
    /// Older configurations put the evaluation transforms under this key;
    /// it is read only when `test_transforms` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_transforms: Option<Vec<TransformSpec>>,
}

/// Sampler selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Registered sampler name: `"naive"` or `"balanced"`.
    #[serde(default = "default_sampler_name")]
    pub name: String,
}

fn default_sampler_name() -> String {
    "naive".to_string()
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            name: default_sampler_name(),
        }
    }
}

/// `trainer` section. Only the data settings are read here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub data: LoaderSettings,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            data: LoaderSettings::new(),
        }
    }
}

/// Batching and worker settings shared by every loader.
#[derive(Config, Debug)]
pub struct LoaderSettings {
    /// Training batch size.
    #[config(default = 8)]
    pub batch_size_per_gpu: usize,
    /// Test batch size.
    #[config(default = 8)]
    pub batch_size_per_gpu_test: usize,
    #[config(default = 4)]
    pub num_workers_per_gpu: usize,
    #[config(default = true)]
    pub pin_memory: bool,
    /// Drop the trailing partial batch of training loaders.
    #[config(default = true)]
    pub drop_last: bool,
    #[config(default = false)]
    pub persistent_workers: bool,
}

/// The fields of a data section needed to construct a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    pub kind: String,
    pub root: PathBuf,
    pub cls_names: Vec<String>,
}

impl TrainDataConfig {
    pub fn dataset_spec(&self) -> DatasetSpec {
        DatasetSpec {
            kind: self.kind.clone(),
            root: self.root.clone(),
            cls_names: self.cls_names.clone(),
        }
    }
}

impl TestDataConfig {
    pub fn dataset_spec(&self) -> DatasetSpec {
        DatasetSpec {
            kind: self.kind.clone(),
            root: self.root.clone(),
            cls_names: self.cls_names.clone(),
        }
    }

    /// Evaluation transforms: `test_transforms`, else `train_transforms`,
    /// else none.
    pub fn transforms(&self) -> &[TransformSpec] {
        self.test_transforms
            .as_deref()
            .or(self.train_transforms.as_deref())
            .unwrap_or(&[])
    }
}

impl DataConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> DataResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| DataError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| DataError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks values that the type system cannot.
    ///
    /// # Errors
    ///
    /// Returns `DataError::InvalidConfig` for zero batch sizes or a zero
    /// `subset_num`.
    pub fn validate(&self) -> DataResult<()> {
        let data = &self.trainer.data;
        if data.batch_size_per_gpu == 0 || data.batch_size_per_gpu_test == 0 {
            return Err(DataError::InvalidConfig {
                reason: format!(
                    "batch sizes must be positive, got train={} test={}",
                    data.batch_size_per_gpu, data.batch_size_per_gpu_test
                ),
            });
        }
        if self.subset_num == 0 {
            return Err(DataError::InvalidConfig {
                reason: "subset_num must be at least 1".into(),
            });
        }
        Ok(())
    }
}
