//! Qualitative comparison canvases across methods.

use std::{
    fs,
    path::{Path, PathBuf},
};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::{
    error::{VisError, VisResult},
    layout::concat_images,
    triplet::{load_triplet, CropWindow, LoadedTriplet, Triplet, TripletPaths, IMG_SUFFIX},
};

/// Output file when neither `save_dir` nor `save_name` is configured.
pub const DEFAULT_OUTPUT: &str = "result_image.png";

/// Parameters of one tiling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilingConfig {
    /// Directory containing the method directories.
    pub root_dir: PathBuf,
    /// Samples to show, in display order.
    #[serde(default)]
    pub image_names: Vec<String>,
    /// Method directories relative to `root_dir`, in display order. The
    /// original and ground-truth tiles come from the first one.
    pub method_dirs: Vec<PathBuf>,
    /// Output directory, created if missing.
    #[serde(default)]
    pub save_dir: Option<PathBuf>,
    /// Output file stem.
    #[serde(default = "default_save_name")]
    pub save_name: String,
    /// Black frame width as a fraction of `image_size`; 0 disables it.
    #[serde(default)]
    pub border_ratio: f64,
    /// Gap between tiles as a fraction of `image_size`.
    #[serde(default = "default_gap_ratio")]
    pub gap_ratio: f64,
    /// Side of the square tiles, in pixels.
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    /// One window per sample to add detail tiles, or empty.
    #[serde(default)]
    pub crop_windows: Vec<CropWindow>,
    /// One group per sample instead of one group per image role.
    #[serde(default)]
    pub reverse: bool,
}

fn default_save_name() -> String {
    "result_image".to_string()
}

const fn default_gap_ratio() -> f64 {
    0.07
}

const fn default_image_size() -> u32 {
    224
}

impl TilingConfig {
    pub fn new(root_dir: impl Into<PathBuf>, image_names: Vec<String>, method_dirs: Vec<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            image_names,
            method_dirs,
            save_dir: None,
            save_name: default_save_name(),
            border_ratio: 0.0,
            gap_ratio: default_gap_ratio(),
            image_size: default_image_size(),
            crop_windows: Vec::new(),
            reverse: false,
        }
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> VisResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| VisError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| VisError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Where the canvas is written.
    pub fn output_path(&self) -> PathBuf {
        match &self.save_dir {
            Some(dir) => dir.join(format!("{}.png", self.save_name)),
            None => PathBuf::from(format!("{}.png", self.save_name)),
        }
    }

    fn has_crops(&self) -> bool {
        !self.crop_windows.is_empty()
    }

    /// Checks everything that does not need the filesystem.
    ///
    /// # Errors
    ///
    /// Returns the first violated precondition.
    pub fn validate(&self) -> VisResult<()> {
        if self.image_names.is_empty() {
            return Err(VisError::NoSamples);
        }
        if self.method_dirs.is_empty() {
            return Err(VisError::NoMethods);
        }
        if self.image_size == 0 {
            return Err(VisError::ZeroTileSize);
        }
        for (name, value) in [("border_ratio", self.border_ratio), ("gap_ratio", self.gap_ratio)] {
            if !value.is_finite() || value < 0.0 {
                return Err(VisError::InvalidRatio { name, value });
            }
        }
        if self.has_crops() {
            if self.crop_windows.len() != self.image_names.len() {
                return Err(VisError::CropWindowCount {
                    samples: self.image_names.len(),
                    windows: self.crop_windows.len(),
                });
            }
            if let Some((name, window)) = self
                .image_names
                .iter()
                .zip(&self.crop_windows)
                .find(|(_, window)| window.is_empty())
            {
                return Err(VisError::EmptyCropWindow {
                    name: name.clone(),
                    top: window.top,
                    left: window.left,
                    bottom: window.bottom,
                    right: window.right,
                });
            }
        }
        Ok(())
    }
}

/// Tiles of one sample in role order: original, ground truth, then one
/// anomaly map per method.
struct SampleRow {
    full: Vec<RgbImage>,
    detail: Option<Vec<RgbImage>>,
}

fn role_row(first: &Triplet, amps: impl Iterator<Item = RgbImage>) -> Vec<RgbImage> {
    [first.original.clone(), first.mask.clone()]
        .into_iter()
        .chain(amps)
        .collect()
}

fn load_sample(cfg: &TilingConfig, name: &str, crop: Option<CropWindow>) -> VisResult<SampleRow> {
    let triplets = cfg
        .method_dirs
        .iter()
        .map(|method| {
            load_triplet(
                &cfg.root_dir.join(method),
                name,
                cfg.image_size,
                cfg.border_ratio,
                crop,
            )
        })
        .collect::<VisResult<Vec<LoadedTriplet>>>()?;

    let first = &triplets[0];
    let full = role_row(&first.full, triplets.iter().map(|t| t.full.amp.clone()));
    let detail = first.detail.as_ref().map(|first_detail| {
        role_row(
            first_detail,
            triplets
                .iter()
                .filter_map(|t| t.detail.as_ref().map(|d| d.amp.clone())),
        )
    });
    Ok(SampleRow { full, detail })
}

/// Groups and tiles-per-row for the configured layout.
fn arrange(cfg: &TilingConfig, rows: Vec<SampleRow>) -> (Vec<Vec<RgbImage>>, usize) {
    let roles = cfg.method_dirs.len() + 2;
    if cfg.reverse {
        let groups = rows
            .into_iter()
            .flat_map(|row| std::iter::once(row.full).chain(row.detail))
            .collect();
        return (groups, roles);
    }

    let per_sample = if cfg.has_crops() { 2 } else { 1 };
    let mut groups: Vec<Vec<RgbImage>> = (0..roles)
        .map(|_| Vec::with_capacity(rows.len() * per_sample))
        .collect();
    for row in rows {
        let mut detail = row.detail.map(Vec::into_iter);
        for (group, tile) in groups.iter_mut().zip(row.full) {
            group.push(tile);
            if let Some(next) = detail.as_mut().and_then(Iterator::next) {
                group.push(next);
            }
        }
    }
    (groups, cfg.image_names.len() * per_sample)
}

/// Renders every sample of every method into one PNG and returns its path.
///
/// All triplets are read before anything is written, so a missing or
/// unreadable image leaves no output behind.
///
/// # Errors
///
/// Returns an error for an invalid configuration, an unreadable triplet in
/// any method directory, or a failure to write the output.
pub fn plot_qualitative_results(cfg: &TilingConfig) -> VisResult<PathBuf> {
    cfg.validate()?;

    let crops: Vec<Option<CropWindow>> = if cfg.has_crops() {
        cfg.crop_windows.iter().copied().map(Some).collect()
    } else {
        vec![None; cfg.image_names.len()]
    };
    let rows = cfg
        .image_names
        .iter()
        .zip(crops)
        .map(|(name, crop)| load_sample(cfg, name, crop))
        .collect::<VisResult<Vec<_>>>()?;

    let (groups, nrows) = arrange(cfg, rows);
    let canvas = concat_images(&groups, nrows, cfg.gap_ratio)?;

    let path = cfg.output_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| VisError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    canvas.save(&path).map_err(|source| VisError::Save {
        path: path.clone(),
        source,
    })?;

    tracing::info!(
        path = %path.display(),
        samples = cfg.image_names.len(),
        methods = cfg.method_dirs.len(),
        width = canvas.width(),
        height = canvas.height(),
        reverse = cfg.reverse,
        "saved comparison canvas"
    );
    Ok(path)
}

/// Sample names with a complete triplet in `dir`, sorted.
///
/// Names whose `_img.png` has no matching mask or anomaly map are skipped
/// with a warning.
///
/// # Errors
///
/// Returns an error if `dir` cannot be read.
pub fn discover_sample_names(dir: &Path) -> VisResult<Vec<String>> {
    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| VisError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut names = Vec::new();
    for entry in entries.iter().filter(|e| e.file_type().is_file()) {
        let Some(name) = entry
            .file_name()
            .to_str()
            .and_then(|file| file.strip_suffix(IMG_SUFFIX))
            .filter(|name| !name.is_empty())
        else {
            continue;
        };
        if TripletPaths::new(dir, name).all_exist() {
            names.push(name.to_string());
        } else {
            tracing::warn!(sample = name, dir = %dir.display(), "missing mask or anomaly map, skipping");
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;
    use crate::{layout::Grid, triplet::tests::write_triplet};

    fn fixture(root: &Path, methods: &[&str], names: &[&str]) {
        for (m, method) in methods.iter().enumerate() {
            for name in names {
                write_triplet(&root.join(method), name, 32, 40 * (m as u8 + 1));
            }
        }
    }

    fn config(root: &Path, out: &Path, names: &[&str], methods: &[&str]) -> TilingConfig {
        let mut cfg = TilingConfig::new(
            root,
            names.iter().map(|n| n.to_string()).collect(),
            methods.iter().map(PathBuf::from).collect(),
        );
        cfg.save_dir = Some(out.to_path_buf());
        cfg.save_name = "cmp".into();
        cfg
    }

    #[test]
    fn two_by_two_canvas_has_expected_size() {
        let root = tempfile::tempdir().unwrap();
        fixture(root.path(), &["m1", "m2"], &["a", "b"]);
        let out = root.path().join("out");

        let path = plot_qualitative_results(&config(root.path(), &out, &["a", "b"], &["m1", "m2"]))
            .unwrap();
        assert_eq!(path, out.join("cmp.png"));
        let canvas = image::open(&path).unwrap().to_rgb8();
        assert_eq!(canvas.dimensions(), (463, 941));
        // Row 0 holds originals from m1; row 2 the anomaly maps of m1, row 3 of m2.
        assert_eq!(canvas.get_pixel(100, 100).0, [40, 40, 40]);
        assert_eq!(canvas.get_pixel(100, 2 * 239 + 100).0, [20, 20, 20]);
        assert_eq!(canvas.get_pixel(100, 3 * 239 + 100).0, [40, 40, 40]);
    }

    #[test]
    fn tiling_is_deterministic() {
        let root = tempfile::tempdir().unwrap();
        fixture(root.path(), &["m1", "m2"], &["a", "b"]);
        let mut cfg = config(root.path(), &root.path().join("out"), &["a", "b"], &["m1", "m2"]);
        cfg.border_ratio = 0.1;

        let first = image::open(plot_qualitative_results(&cfg).unwrap())
            .unwrap()
            .to_rgb8();
        let second = image::open(plot_qualitative_results(&cfg).unwrap())
            .unwrap()
            .to_rgb8();
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn missing_amp_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        fixture(root.path(), &["m1", "m2"], &["a", "b"]);
        fs::remove_file(root.path().join("m2/b_amp.png")).unwrap();
        let out = root.path().join("out");
        let cfg = config(root.path(), &out, &["a", "b"], &["m1", "m2"]);

        assert!(matches!(
            plot_qualitative_results(&cfg),
            Err(VisError::UnreadableTriplet { .. })
        ));
        assert!(!cfg.output_path().exists());
        assert!(!out.exists());
    }

    #[test]
    fn crop_windows_must_match_samples() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = config(root.path(), root.path(), &["a", "b"], &["m1"]);
        cfg.crop_windows = vec![CropWindow::new(0, 0, 8, 8)];
        assert!(matches!(
            plot_qualitative_results(&cfg),
            Err(VisError::CropWindowCount {
                samples: 2,
                windows: 1
            })
        ));
        cfg.crop_windows.push(CropWindow::new(4, 4, 4, 8));
        assert!(matches!(
            cfg.validate(),
            Err(VisError::EmptyCropWindow { .. })
        ));
    }

    #[test]
    fn preconditions_are_checked_before_io() {
        let cfg = TilingConfig::new("/nonexistent", vec![], vec![PathBuf::from("m")]);
        assert!(matches!(cfg.validate(), Err(VisError::NoSamples)));
        let mut cfg = TilingConfig::new("/nonexistent", vec!["a".into()], vec![]);
        assert!(matches!(cfg.validate(), Err(VisError::NoMethods)));
        cfg.method_dirs.push(PathBuf::from("m"));
        cfg.image_size = 0;
        assert!(matches!(cfg.validate(), Err(VisError::ZeroTileSize)));
    }

    /// 32x32 triplet whose bottom-right quadrant differs from the rest:
    /// original 40 / 200, anomaly map 20 / 120.
    fn write_quadrant_triplet(dir: &Path, name: &str) {
        write_triplet(dir, name, 32, 0);
        let paths = TripletPaths::new(dir, name);
        for (path, outer, inner) in [(&paths.original, 40, 200), (&paths.amp, 20, 120)] {
            RgbImage::from_fn(32, 32, |x, y| {
                let v = if x >= 16 && y >= 16 { inner } else { outer };
                Rgb([v, v, v])
            })
            .save(path)
            .unwrap();
        }
    }

    fn crop_config(root: &Path, reverse: bool) -> TilingConfig {
        for name in ["a", "b"] {
            write_quadrant_triplet(&root.join("m1"), name);
        }
        let mut cfg = config(root, &root.join("out"), &["a", "b"], &["m1"]);
        cfg.image_size = 10;
        cfg.gap_ratio = 0.0;
        cfg.crop_windows = vec![CropWindow::new(16, 16, 32, 32); 2];
        cfg.reverse = reverse;
        cfg
    }

    /// Pixel one in from the top-left corner of a tile.
    fn tile_pixel(canvas: &RgbImage, grid: &Grid, group: usize, index: usize) -> u8 {
        let (x, y) = grid.offset(group, index);
        canvas.get_pixel(x + 1, y + 1).0[0]
    }

    #[test]
    fn crops_interleave_detail_tiles() {
        let root = tempfile::tempdir().unwrap();
        let cfg = crop_config(root.path(), false);
        let canvas = image::open(plot_qualitative_results(&cfg).unwrap())
            .unwrap()
            .to_rgb8();

        // Role groups (original, gt, amp), each a_full, a_detail, b_full, b_detail.
        let grid = Grid::new(10, 10, 0.0, 4, 3, 4);
        assert_eq!(canvas.dimensions(), grid.canvas_size());
        assert_eq!(canvas.dimensions(), (40, 30));
        for (group, full, detail) in [(0, 40, 200), (1, 255, 255), (2, 20, 120)] {
            let row: Vec<u8> = (0..4).map(|i| tile_pixel(&canvas, &grid, group, i)).collect();
            assert_eq!(row, vec![full, detail, full, detail], "group {group}");
        }
    }

    #[test]
    fn reverse_layout_gives_detail_tiles_their_own_row() {
        let root = tempfile::tempdir().unwrap();
        let cfg = crop_config(root.path(), true);
        let canvas = image::open(plot_qualitative_results(&cfg).unwrap())
            .unwrap()
            .to_rgb8();

        // Groups a_full, a_detail, b_full, b_detail; each original, gt, amp.
        let grid = Grid::new(10, 10, 0.0, 3, 4, 3);
        assert_eq!(canvas.dimensions(), (30, 40));
        for (group, expected) in [
            (0, [40, 255, 20]),
            (1, [200, 255, 120]),
            (2, [40, 255, 20]),
            (3, [200, 255, 120]),
        ] {
            let row: Vec<u8> = (0..3).map(|i| tile_pixel(&canvas, &grid, group, i)).collect();
            assert_eq!(row, expected.to_vec(), "group {group}");
        }
    }

    #[test]
    fn reverse_layout_puts_one_sample_per_row() {
        let root = tempfile::tempdir().unwrap();
        fixture(root.path(), &["m1", "m2"], &["a", "b", "c"]);
        let mut cfg = config(
            root.path(),
            &root.path().join("out"),
            &["a", "b", "c"],
            &["m1", "m2"],
        );
        cfg.image_size = 10;
        cfg.gap_ratio = 0.0;
        cfg.reverse = true;

        let canvas = image::open(plot_qualitative_results(&cfg).unwrap())
            .unwrap()
            .to_rgb8();
        // nrows = methods + 2 tiles per row, one row per sample.
        assert_eq!(canvas.dimensions(), (40, 30));
        // Columns: original(m1), gt, amp(m1), amp(m2).
        assert_eq!(canvas.get_pixel(5, 25).0, [40, 40, 40]);
        assert_eq!(canvas.get_pixel(15, 25).0, [255, 255, 255]);
        assert_eq!(canvas.get_pixel(25, 25).0, [20, 20, 20]);
        assert_eq!(canvas.get_pixel(35, 25).0, [40, 40, 40]);
    }

    #[test]
    fn discovery_skips_incomplete_triplets() {
        let dir = tempfile::tempdir().unwrap();
        write_triplet(dir.path(), "b", 4, 0);
        write_triplet(dir.path(), "a", 4, 0);
        write_triplet(dir.path(), "c", 4, 0);
        fs::remove_file(dir.path().join("c_mask.png")).unwrap();
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]))
            .save(dir.path().join("notes.png"))
            .unwrap();

        assert_eq!(discover_sample_names(dir.path()).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn default_output_is_result_image() {
        let cfg = TilingConfig::new("r", vec!["a".into()], vec![PathBuf::from("m")]);
        assert_eq!(cfg.output_path(), PathBuf::from(DEFAULT_OUTPUT));
    }

    #[test]
    fn config_parses_with_defaults() {
        let cfg: TilingConfig = serde_json::from_str(
            r#"{"root_dir": "runs", "method_dirs": ["a", "b"], "crop_windows": [[0, 0, 64, 64]]}"#,
        )
        .unwrap();
        assert_eq!(cfg.image_size, 224);
        assert!((cfg.gap_ratio - 0.07).abs() < 1e-12);
        assert_eq!(cfg.border_ratio, 0.0);
        assert!(!cfg.reverse);
        assert_eq!(cfg.crop_windows, vec![CropWindow::new(0, 0, 64, 64)]);
    }
}
