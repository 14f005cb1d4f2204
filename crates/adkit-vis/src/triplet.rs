//! Loading of `(original, mask, amp)` result triplets.
//!
//! A method directory holds three images per sample:
//!
//! ```text
//! <name>_img.png   original input
//! <name>_mask.png  ground-truth mask
//! <name>_amp.png   anomaly map produced by the method
//! ```

use std::path::{Path, PathBuf};

use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{VisError, VisResult};

pub const IMG_SUFFIX: &str = "_img.png";
pub const MASK_SUFFIX: &str = "_mask.png";
pub const AMP_SUFFIX: &str = "_amp.png";

/// A rectangle in original-resolution pixel coordinates, `top..bottom`
/// rows by `left..right` columns.
///
/// Serialized as `[top, left, bottom, right]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct CropWindow {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
}

impl From<[u32; 4]> for CropWindow {
    fn from([top, left, bottom, right]: [u32; 4]) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }
}

impl From<CropWindow> for [u32; 4] {
    fn from(window: CropWindow) -> Self {
        [window.top, window.left, window.bottom, window.right]
    }
}

impl CropWindow {
    pub const fn new(top: u32, left: u32, bottom: u32, right: u32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.top >= self.bottom || self.left >= self.right
    }

    /// `(x, y, width, height)` of the window clipped to a `width` x `height`
    /// image, or `None` if nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let bottom = self.bottom.min(height);
        let right = self.right.min(width);
        (self.top < bottom && self.left < right).then(|| {
            (self.left, self.top, right - self.left, bottom - self.top)
        })
    }

    fn empty_error(&self, name: &str) -> VisError {
        VisError::EmptyCropWindow {
            name: name.to_string(),
            top: self.top,
            left: self.left,
            bottom: self.bottom,
            right: self.right,
        }
    }
}

/// File locations of one sample's triplet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripletPaths {
    pub original: PathBuf,
    pub mask: PathBuf,
    pub amp: PathBuf,
}

impl TripletPaths {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            original: dir.join(format!("{name}{IMG_SUFFIX}")),
            mask: dir.join(format!("{name}{MASK_SUFFIX}")),
            amp: dir.join(format!("{name}{AMP_SUFFIX}")),
        }
    }

    pub fn all_exist(&self) -> bool {
        self.original.is_file() && self.mask.is_file() && self.amp.is_file()
    }
}

/// Three tiles of one sample, in role order.
#[derive(Debug, Clone)]
pub struct Triplet {
    pub original: RgbImage,
    pub mask: RgbImage,
    pub amp: RgbImage,
}

impl Triplet {
    fn map(self, mut f: impl FnMut(RgbImage) -> RgbImage) -> Self {
        Self {
            original: f(self.original),
            mask: f(self.mask),
            amp: f(self.amp),
        }
    }

    fn for_each_mut(&mut self, mut f: impl FnMut(&mut RgbImage)) {
        f(&mut self.original);
        f(&mut self.mask);
        f(&mut self.amp);
    }
}

/// A loaded triplet: full tiles and, with a crop window, detail tiles.
#[derive(Debug, Clone)]
pub struct LoadedTriplet {
    pub full: Triplet,
    pub detail: Option<Triplet>,
}

/// Loads the triplet for `name` from `dir` and resizes every image to a
/// `tile_size` square (bilinear).
///
/// With a crop window, the window is cut from the original-resolution
/// images and resized the same way into the detail tiles. With
/// `border_ratio > 0`, a black frame `floor(border_ratio * tile_size)`
/// pixels wide is painted over the full tiles; detail tiles stay unframed.
///
/// # Errors
///
/// Returns `VisError::UnreadableTriplet` naming all three paths if any of
/// them cannot be decoded, and `VisError::EmptyCropWindow` if the window
/// lies outside the images.
pub fn load_triplet(
    dir: &Path,
    name: &str,
    tile_size: u32,
    border_ratio: f64,
    crop: Option<CropWindow>,
) -> VisResult<LoadedTriplet> {
    let paths = TripletPaths::new(dir, name);
    tracing::debug!(
        original = %paths.original.display(),
        mask = %paths.mask.display(),
        amp = %paths.amp.display(),
        "reading triplet"
    );
    let raw = read_raw(&paths)?;

    let detail = match crop {
        Some(window) => Some(crop_triplet(&raw, window, name)?),
        None => None,
    };
    let resize = |image: RgbImage| {
        imageops::resize(&image, tile_size, tile_size, FilterType::Triangle)
    };

    let mut full = raw.map(resize);
    let detail = detail.map(|d| d.map(resize));

    let border = border_width(border_ratio, tile_size);
    if border > 0 {
        full.for_each_mut(|tile| add_black_border(tile, border));
    }
    Ok(LoadedTriplet { full, detail })
}

fn read_raw(paths: &TripletPaths) -> VisResult<Triplet> {
    let open = |path: &Path| image::open(path).map(|image| image.to_rgb8());
    let result = open(&paths.original).and_then(|original| {
        Ok(Triplet {
            original,
            mask: open(&paths.mask)?,
            amp: open(&paths.amp)?,
        })
    });
    result.map_err(|source| {
        tracing::error!(
            original = %paths.original.display(),
            mask = %paths.mask.display(),
            amp = %paths.amp.display(),
            error = %source,
            "failed to read image triplet"
        );
        VisError::UnreadableTriplet {
            original: paths.original.clone(),
            mask: paths.mask.clone(),
            amp: paths.amp.clone(),
            source,
        }
    })
}

fn crop_triplet(raw: &Triplet, window: CropWindow, name: &str) -> VisResult<Triplet> {
    let crop = |image: &RgbImage| -> VisResult<RgbImage> {
        let (x, y, w, h) = window
            .clamp_to(image.width(), image.height())
            .ok_or_else(|| window.empty_error(name))?;
        Ok(imageops::crop_imm(image, x, y, w, h).to_image())
    };
    Ok(Triplet {
        original: crop(&raw.original)?,
        mask: crop(&raw.mask)?,
        amp: crop(&raw.amp)?,
    })
}

pub(crate) fn border_width(border_ratio: f64, tile_size: u32) -> u32 {
    if border_ratio > 0.0 {
        (border_ratio * f64::from(tile_size)).floor() as u32
    } else {
        0
    }
}

/// Paints the outer `border` pixels of every edge black, in place.
///
/// The image keeps its size; a border of half the shorter side or more
/// blackens the whole image.
pub fn add_black_border(image: &mut RgbImage, border: u32) {
    let (width, height) = image.dimensions();
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let on_frame = x < border
            || y < border
            || x >= width.saturating_sub(border)
            || y >= height.saturating_sub(border);
        if on_frame {
            *pixel = Rgb([0, 0, 0]);
        }
    }
}
