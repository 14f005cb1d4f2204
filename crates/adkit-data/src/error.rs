//! Error types for loader assembly.
//!
//! Every failure in this crate is fatal to the caller: configuration
//! problems surface when the loaders are built, item problems surface on
//! access.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for dataset, transform, sampler and loader operations.
#[derive(Error, Debug)]
pub enum DataError {
    /// The configured sampler name is not in the sampler registry.
    #[error("unknown sampler '{name}' (available: {available})")]
    UnknownSampler {
        /// The requested sampler name.
        name: String,
        /// Comma separated list of registered names.
        available: String,
    },

    /// The configured dataset type is not in the dataset registry.
    #[error("unknown dataset type '{name}' (available: {available})")]
    UnknownDataset {
        /// The requested dataset type.
        name: String,
        /// Comma separated list of registered names.
        available: String,
    },

    /// A logically inconsistent configuration value.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ConfigRead {
        /// The configuration file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected schema.
    #[error("failed to parse configuration file: {path}")]
    ConfigParse {
        /// The configuration file path.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A transform was placed where it cannot operate.
    #[error("transform '{transform}' cannot run after ToTensor")]
    TransformOrder {
        /// The misplaced transform.
        transform: &'static str,
    },

    /// A normalization vector does not match the image channel count.
    #[error("normalize expects {expected} channels, image has {actual}")]
    ChannelMismatch {
        /// Length of the mean/std vectors.
        expected: usize,
        /// Channels in the image.
        actual: usize,
    },

    /// An expected dataset directory is missing.
    #[error("dataset directory not found: {path}")]
    DirectoryNotFound {
        /// The missing directory.
        path: PathBuf,
    },

    /// Reading a directory failed.
    #[error("failed to read directory: {path}")]
    DirectoryReadFailed {
        /// The directory path that failed to read.
        path: PathBuf,
        /// The underlying walk error.
        #[source]
        source: walkdir::Error,
    },

    /// A dataset scan found nothing to load.
    #[error("no samples found under: {path}")]
    EmptyDataset {
        /// The scanned root.
        path: PathBuf,
    },

    /// Opening or decoding an image failed.
    #[error("failed to open image: {path}")]
    ImageOpenFailed {
        /// The image file path.
        path: PathBuf,
        /// The underlying decode error.
        #[source]
        source: image::ImageError,
    },

    /// An index outside the dataset was requested.
    #[error("index {index} out of bounds for dataset of length {len}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The dataset length.
        len: usize,
    },
}

/// A specialized `Result` type for loader assembly.
pub type DataResult<T> = Result<T, DataError>;
