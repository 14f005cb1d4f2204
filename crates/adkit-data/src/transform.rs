//! Image transform pipelines.
//!
//! Transforms are declared in the configuration as a list of tagged
//! objects, e.g. `{"type": "Resize", "size": 256}`. The set of transform
//! types is closed: an unknown `type` is rejected when the configuration is
//! parsed. A pipeline built for evaluation skips its stochastic steps.

use image::{imageops::FilterType, DynamicImage};
use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

/// Output size of a resize or crop: a single edge or `[height, width]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    /// Square output.
    Square(u32),
    /// Explicit `[height, width]`.
    HeightWidth([u32; 2]),
}

impl SizeSpec {
    /// Returns `(width, height)`.
    pub const fn dims(&self) -> (u32, u32) {
        match *self {
            Self::Square(size) => (size, size),
            Self::HeightWidth([height, width]) => (width, height),
        }
    }
}

/// A single transform declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransformSpec {
    /// Resize to an exact size, ignoring aspect ratio.
    Resize { size: SizeSpec },
    /// Crop the central region.
    CenterCrop { size: SizeSpec },
    /// Mirror left/right with probability `p`.
    RandomHorizontalFlip {
        #[serde(default = "default_flip_probability")]
        p: f64,
    },
    /// Mirror top/bottom with probability `p`.
    RandomVerticalFlip {
        #[serde(default = "default_flip_probability")]
        p: f64,
    },
    /// Collapse to a single luminance channel.
    Grayscale,
    /// Convert to a float buffer scaled to `[0, 1]`.
    ToTensor,
    /// Per-channel `(x - mean) / std`.
    Normalize { mean: Vec<f32>, std: Vec<f32> },
}

const fn default_flip_probability() -> f64 {
    0.5
}

impl TransformSpec {
    /// Name used in log and error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Resize { .. } => "Resize",
            Self::CenterCrop { .. } => "CenterCrop",
            Self::RandomHorizontalFlip { .. } => "RandomHorizontalFlip",
            Self::RandomVerticalFlip { .. } => "RandomVerticalFlip",
            Self::Grayscale => "Grayscale",
            Self::ToTensor => "ToTensor",
            Self::Normalize { .. } => "Normalize",
        }
    }

    /// Whether the transform draws from the random number generator.
    pub const fn is_stochastic(&self) -> bool {
        matches!(
            self,
            Self::RandomHorizontalFlip { .. } | Self::RandomVerticalFlip { .. }
        )
    }
}

/// A float image in `[H, W, C]` layout.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorImage {
    pub data: Vec<f32>,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl TensorImage {
    /// Converts a decoded image, keeping one channel for grayscale sources
    /// and three for color sources. Alpha is dropped.
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        if image.color().has_color() {
            Self {
                data: image.to_rgb32f().into_raw(),
                height,
                width,
                channels: 3,
            }
        } else {
            Self {
                data: image.to_luma32f().into_raw(),
                height,
                width,
                channels: 1,
            }
        }
    }

    /// An all-zero single channel image.
    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            data: vec![0.0; height * width],
            height,
            width,
            channels: 1,
        }
    }

    fn normalize(mut self, mean: &[f32], std: &[f32]) -> DataResult<Self> {
        let channels = self.channels;
        let lookup = |values: &[f32], c: usize| -> DataResult<f32> {
            match values.len() {
                1 => Ok(values[0]),
                n if n == channels => Ok(values[c]),
                n => Err(DataError::ChannelMismatch {
                    expected: n,
                    actual: channels,
                }),
            }
        };
        let mut scale = Vec::with_capacity(channels);
        for c in 0..channels {
            scale.push((lookup(mean, c)?, lookup(std, c)?));
        }
        for (i, value) in self.data.iter_mut().enumerate() {
            let (m, s) = scale[i % channels];
            *value = (*value - m) / s;
        }
        Ok(self)
    }
}

enum Stage {
    Raster(DynamicImage),
    Tensor(TensorImage),
}

/// An ordered list of transforms bound to a train/eval mode.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<TransformSpec>,
    train: bool,
    filter: FilterType,
}

impl Pipeline {
    pub fn new(steps: Vec<TransformSpec>, train: bool) -> Self {
        Self {
            steps,
            train,
            filter: FilterType::Triangle,
        }
    }

    /// Uses `filter` for every resize in the pipeline. Targets use
    /// [`FilterType::Nearest`] so mask values stay binary.
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn steps(&self) -> &[TransformSpec] {
        &self.steps
    }

    pub const fn is_train(&self) -> bool {
        self.train
    }

    /// Checks step ordering without touching any image.
    pub fn validate(&self) -> DataResult<()> {
        let mut tensor = false;
        for step in &self.steps {
            match step {
                TransformSpec::ToTensor => tensor = true,
                TransformSpec::Normalize { mean, std } => {
                    if mean.is_empty() || std.is_empty() || std.iter().any(|s| *s == 0.0) {
                        return Err(DataError::InvalidConfig {
                            reason: "Normalize needs non-empty mean and non-zero std".into(),
                        });
                    }
                    tensor = true;
                }
                other if tensor => {
                    return Err(DataError::TransformOrder {
                        transform: other.name(),
                    })
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Runs every step on `image` and returns the float result.
    pub fn apply(&self, image: DynamicImage, rng: &mut StdRng) -> DataResult<TensorImage> {
        let mut stage = Stage::Raster(image);
        for step in &self.steps {
            if step.is_stochastic() && !self.train {
                continue;
            }
            stage = match (stage, step) {
                (Stage::Raster(img), TransformSpec::Resize { size }) => {
                    let (w, h) = size.dims();
                    Stage::Raster(img.resize_exact(w, h, self.filter))
                }
                (Stage::Raster(img), TransformSpec::CenterCrop { size }) => {
                    Stage::Raster(center_crop(img, *size))
                }
                (Stage::Raster(img), TransformSpec::RandomHorizontalFlip { p }) => {
                    if rng.random_bool(p.clamp(0.0, 1.0)) {
                        Stage::Raster(img.fliph())
                    } else {
                        Stage::Raster(img)
                    }
                }
                (Stage::Raster(img), TransformSpec::RandomVerticalFlip { p }) => {
                    if rng.random_bool(p.clamp(0.0, 1.0)) {
                        Stage::Raster(img.flipv())
                    } else {
                        Stage::Raster(img)
                    }
                }
                (Stage::Raster(img), TransformSpec::Grayscale) => {
                    Stage::Raster(DynamicImage::ImageLuma8(img.to_luma8()))
                }
                (Stage::Raster(img), TransformSpec::ToTensor) => {
                    Stage::Tensor(TensorImage::from_dynamic(&img))
                }
                (Stage::Raster(img), TransformSpec::Normalize { mean, std }) => {
                    Stage::Tensor(TensorImage::from_dynamic(&img).normalize(mean, std)?)
                }
                (Stage::Tensor(t), TransformSpec::ToTensor) => Stage::Tensor(t),
                (Stage::Tensor(t), TransformSpec::Normalize { mean, std }) => {
                    Stage::Tensor(t.normalize(mean, std)?)
                }
                (Stage::Tensor(_), other) => {
                    return Err(DataError::TransformOrder {
                        transform: other.name(),
                    })
                }
            };
        }
        Ok(match stage {
            Stage::Raster(img) => TensorImage::from_dynamic(&img),
            Stage::Tensor(t) => t,
        })
    }
}

fn center_crop(image: DynamicImage, size: SizeSpec) -> DynamicImage {
    let (w, h) = size.dims();
    let w = w.min(image.width());
    let h = h.min(image.height());
    let x = (image.width() - w) / 2;
    let y = (image.height() - h) / 2;
    image.crop_imm(x, y, w, h)
}

/// Builds the pipeline for one configured transform list.
///
/// `train = false` yields the evaluation variant, which skips random
/// augmentation. Target pipelines are always built with `train = false`.
pub fn build_transforms(specs: &[TransformSpec], train: bool) -> DataResult<Pipeline> {
    let pipeline = Pipeline::new(specs.to_vec(), train);
    pipeline.validate()?;
    tracing::debug!(
        train,
        steps = ?specs.iter().map(TransformSpec::name).collect::<Vec<_>>(),
        "transform pipeline built"
    );
    Ok(pipeline)
}
