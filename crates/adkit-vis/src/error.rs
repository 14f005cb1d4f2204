//! Error types for result tiling.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for triplet loading, compositing and tiling runs.
#[derive(Error, Debug)]
pub enum VisError {
    /// One of the three images of a sample could not be read.
    #[error(
        "failed to read image triplet (original: {original}, mask: {mask}, amp: {amp})"
    )]
    UnreadableTriplet {
        original: PathBuf,
        mask: PathBuf,
        amp: PathBuf,
        /// The first failure encountered.
        #[source]
        source: image::ImageError,
    },

    #[error("no sample names given")]
    NoSamples,

    #[error("no method directories given")]
    NoMethods,

    /// Crop windows were given, but not one per sample.
    #[error("{windows} crop windows given for {samples} samples")]
    CropWindowCount { samples: usize, windows: usize },

    /// A crop window covers no pixels.
    #[error("empty crop window ({top}, {left}, {bottom}, {right}) for sample '{name}'")]
    EmptyCropWindow {
        name: String,
        top: u32,
        left: u32,
        bottom: u32,
        right: u32,
    },

    #[error("tile size must be positive")]
    ZeroTileSize,

    #[error("ratio '{name}' must be finite and non-negative, got {value}")]
    InvalidRatio { name: &'static str, value: f64 },

    /// `concat_images` was called with nothing to place.
    #[error("nothing to composite")]
    EmptyGrid,

    #[error("images per row must be positive")]
    ZeroColumns,

    /// Every group must hold as many tiles as the first one.
    #[error("group {group} holds {actual} tiles, expected {expected}")]
    GroupLength {
        group: usize,
        expected: usize,
        actual: usize,
    },

    /// Every tile must have the size of the first one.
    #[error("tile {group}/{index} is {actual:?}, expected {expected:?}")]
    TileSize {
        group: usize,
        index: usize,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("failed to place tile on canvas")]
    Composite {
        #[source]
        source: image::ImageError,
    },

    #[error("failed to create output directory: {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to save image: {path}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to read directory: {path}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to read configuration file: {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file: {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A specialized `Result` type for tiling.
pub type VisResult<T> = Result<T, VisError>;
