//! Datasets of `(image, mask, label)` samples.
//!
//! A dataset scans its directory layout once at construction and decodes
//! images lazily on access. Items are returned as raw float buffers; the
//! [`AnomalyBatcher`](crate::batcher::AnomalyBatcher) turns them into
//! tensors, following Burn's convention.

mod folder;
mod mvtec;

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use burn::data::dataset::Dataset;
use image::{DynamicImage, GrayImage};
use rand::{rngs::StdRng, SeedableRng};
use walkdir::WalkDir;

use crate::{
    config::DatasetSpec,
    error::{DataError, DataResult},
    transform::{Pipeline, TensorImage},
};

pub use folder::build_folder;
pub use mvtec::build_mvtec;

/// Label of normal samples in anomaly datasets.
pub const NORMAL: usize = 0;
/// Label of anomalous samples in anomaly datasets.
pub const ANOMALOUS: usize = 1;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Which half of a dataset to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
        }
    }

    pub const fn is_train(&self) -> bool {
        matches!(self, Self::Train)
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single transformed sample.
#[derive(Debug, Clone)]
pub struct AnomalyItem {
    /// Transformed input image.
    pub image: TensorImage,
    /// Transformed single channel target mask.
    pub mask: TensorImage,
    /// Class label.
    pub label: usize,
    /// Category the sample belongs to.
    pub cls_name: String,
    /// Source image path.
    pub path: PathBuf,
}

/// An indexable, finite collection of samples.
///
/// `label` must be answerable without decoding the image so that samplers
/// can group indices cheaply.
pub trait AnomalyDataset: Send + Sync {
    /// Loads and transforms the sample at `index`.
    fn load(&self, index: usize) -> DataResult<AnomalyItem>;

    /// Number of samples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Class label of the sample at `index`.
    fn label(&self, index: usize) -> Option<usize>;

    /// Labels of every sample, in index order.
    fn labels(&self) -> Vec<usize> {
        (0..self.len()).filter_map(|i| self.label(i)).collect()
    }

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Transforms applied to a dataset's inputs and targets.
#[derive(Debug, Clone)]
pub struct DatasetTransforms {
    pub transform: Pipeline,
    pub target_transform: Pipeline,
    /// Base seed for per-item randomness.
    pub seed: u64,
}

/// A sample located on disk, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub image_path: PathBuf,
    /// `None` for samples without a ground-truth mask; they get an all-zero
    /// target.
    pub mask_path: Option<PathBuf>,
    pub label: usize,
    pub cls_name: String,
}

/// Dataset backed by a list of [`SampleRecord`]s.
pub struct RecordDataset {
    name: String,
    records: Vec<SampleRecord>,
    transforms: DatasetTransforms,
}

impl RecordDataset {
    pub fn new(
        name: impl Into<String>,
        records: Vec<SampleRecord>,
        transforms: DatasetTransforms,
    ) -> Self {
        Self {
            name: name.into(),
            records,
            transforms,
        }
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }
}

impl AnomalyDataset for RecordDataset {
    fn load(&self, index: usize) -> DataResult<AnomalyItem> {
        let record = self
            .records
            .get(index)
            .ok_or(DataError::IndexOutOfBounds {
                index,
                len: self.records.len(),
            })?;
        tracing::debug!(index, path = %record.image_path.display(), "loading sample");

        let image = DynamicImage::ImageRgb8(open_image(&record.image_path)?.to_rgb8());
        let mask = match &record.mask_path {
            Some(path) => DynamicImage::ImageLuma8(open_image(path)?.to_luma8()),
            None => DynamicImage::ImageLuma8(GrayImage::new(image.width(), image.height())),
        };

        // Image and target draw from identically seeded generators so that a
        // stochastic target pipeline would follow the image.
        let seed = self.transforms.seed.wrapping_add(index as u64);
        let image = self
            .transforms
            .transform
            .apply(image, &mut StdRng::seed_from_u64(seed))?;
        let mask = self
            .transforms
            .target_transform
            .apply(mask, &mut StdRng::seed_from_u64(seed))?;

        Ok(AnomalyItem {
            image,
            mask,
            label: record.label,
            cls_name: record.cls_name.clone(),
            path: record.image_path.clone(),
        })
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn label(&self, index: usize) -> Option<usize> {
        self.records.get(index).map(|record| record.label)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn open_image(path: &Path) -> DataResult<DynamicImage> {
    image::open(path).map_err(|source| DataError::ImageOpenFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// A view of a dataset through an index list.
///
/// Positions in the view map to `indices[position]` in the source. Views
/// are cheap to clone and share the source.
#[derive(Clone)]
pub struct IndexedDataset {
    source: Arc<dyn AnomalyDataset>,
    indices: Arc<[usize]>,
}

impl IndexedDataset {
    /// A view covering every index of `source` in order.
    pub fn full(source: Arc<dyn AnomalyDataset>) -> Self {
        let indices = (0..source.len()).collect();
        Self { source, indices }
    }

    /// A view over `indices` of `source`.
    ///
    /// # Errors
    ///
    /// Returns `DataError::IndexOutOfBounds` if any index exceeds the source.
    pub fn new(source: Arc<dyn AnomalyDataset>, indices: Vec<usize>) -> DataResult<Self> {
        let len = source.len();
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(DataError::IndexOutOfBounds { index, len });
        }
        Ok(Self {
            source,
            indices: indices.into(),
        })
    }

    /// Narrows the view to `positions` of this view.
    ///
    /// # Errors
    ///
    /// Returns `DataError::IndexOutOfBounds` if a position exceeds the view.
    pub fn select(&self, positions: &[usize]) -> DataResult<Self> {
        let indices = positions
            .iter()
            .map(|&p| {
                self.indices
                    .get(p)
                    .copied()
                    .ok_or(DataError::IndexOutOfBounds {
                        index: p,
                        len: self.indices.len(),
                    })
            })
            .collect::<DataResult<Vec<_>>>()?;
        Ok(Self {
            source: Arc::clone(&self.source),
            indices: indices.into(),
        })
    }

    /// Indices into the source, in view order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn source(&self) -> &Arc<dyn AnomalyDataset> {
        &self.source
    }
}

impl fmt::Debug for IndexedDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedDataset")
            .field("source", &self.source.name())
            .field("len", &self.indices.len())
            .finish()
    }
}

impl AnomalyDataset for IndexedDataset {
    fn load(&self, index: usize) -> DataResult<AnomalyItem> {
        let source_index = self
            .indices
            .get(index)
            .copied()
            .ok_or(DataError::IndexOutOfBounds {
                index,
                len: self.indices.len(),
            })?;
        self.source.load(source_index)
    }

    fn len(&self) -> usize {
        self.indices.len()
    }

    fn label(&self, index: usize) -> Option<usize> {
        self.indices.get(index).and_then(|&i| self.source.label(i))
    }

    fn name(&self) -> &str {
        self.source.name()
    }
}

impl Dataset<AnomalyItem> for IndexedDataset {
    fn get(&self, index: usize) -> Option<AnomalyItem> {
        match self.load(index) {
            Ok(item) => Some(item),
            Err(err) => {
                tracing::error!(index, error = %err, "failed to load sample");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

/// Constructor for a registered dataset type.
pub type DatasetCtor =
    fn(&DatasetSpec, Split, DatasetTransforms) -> DataResult<Arc<dyn AnomalyDataset>>;

/// The closed set of dataset types the loaders can construct.
///
/// Entries are registered explicitly; there is no discovery at runtime.
#[derive(Clone)]
pub struct DatasetRegistry {
    entries: Vec<(&'static str, DatasetCtor)>,
}

impl DatasetRegistry {
    /// An empty registry.
    pub const fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The registry with every dataset type shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("mvtec", build_mvtec);
        registry.register("folder", build_folder);
        registry
    }

    /// Adds or replaces the constructor for `name`.
    pub fn register(&mut self, name: &'static str, ctor: DatasetCtor) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = ctor,
            None => self.entries.push((name, ctor)),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }

    /// Looks up the constructor for `name`.
    ///
    /// # Errors
    ///
    /// Returns `DataError::UnknownDataset` if `name` is not registered.
    pub fn resolve(&self, name: &str) -> DataResult<DatasetCtor> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ctor)| *ctor)
            .ok_or_else(|| DataError::UnknownDataset {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    /// Resolves `spec.kind` and constructs the dataset.
    pub fn build(
        &self,
        spec: &DatasetSpec,
        split: Split,
        transforms: DatasetTransforms,
    ) -> DataResult<Arc<dyn AnomalyDataset>> {
        let ctor = self.resolve(&spec.kind)?;
        let dataset = ctor(spec, split, transforms)?;
        tracing::info!(
            kind = %spec.kind,
            %split,
            root = %spec.root.display(),
            samples = dataset.len(),
            "dataset constructed"
        );
        Ok(dataset)
    }
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn require_dir(path: &Path) -> DataResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(DataError::DirectoryNotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Immediate entries of `dir`, sorted by file name.
fn read_sorted(dir: &Path) -> DataResult<Vec<walkdir::DirEntry>> {
    require_dir(dir)?;
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| DataError::DirectoryReadFailed {
            path: dir.to_path_buf(),
            source,
        })
}

/// Sorted names of the immediate sub-directories of `dir`.
fn sub_dirs(dir: &Path) -> DataResult<Vec<String>> {
    Ok(read_sorted(dir)?
        .into_iter()
        .filter(|entry| entry.file_type().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect())
}

/// Sorted image files directly inside `dir`.
fn image_files(dir: &Path) -> DataResult<Vec<PathBuf>> {
    Ok(read_sorted(dir)?
        .into_iter()
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| is_image(path))
        .collect())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// `cls_names` when given, otherwise every sub-directory of `root`.
fn categories(spec: &DatasetSpec, root: &Path) -> DataResult<Vec<String>> {
    if spec.cls_names.is_empty() {
        sub_dirs(root)
    } else {
        Ok(spec.cls_names.clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fs;

    use image::{Luma, Rgb, RgbImage};

    use super::*;
    use crate::transform::{build_transforms, SizeSpec, TransformSpec};

    pub(crate) fn write_rgb(path: &Path, size: u32, value: u8) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(size, size, Rgb([value, value, value]))
            .save(path)
            .unwrap();
    }

    pub(crate) fn write_mask(path: &Path, size: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        GrayImage::from_fn(size, size, |x, _| Luma([if x < size / 2 { 255 } else { 0 }]))
            .save(path)
            .unwrap();
    }

    pub(crate) fn resize_transforms(size: u32) -> DatasetTransforms {
        let steps = vec![TransformSpec::Resize {
            size: SizeSpec::Square(size),
        }];
        DatasetTransforms {
            transform: build_transforms(&steps, true).unwrap(),
            target_transform: build_transforms(&steps, false).unwrap(),
            seed: 0,
        }
    }

    /// Labels only; `load` always fails.
    pub(crate) struct LabelDataset(pub Vec<usize>);

    impl AnomalyDataset for LabelDataset {
        fn load(&self, index: usize) -> DataResult<AnomalyItem> {
            Err(DataError::IndexOutOfBounds {
                index,
                len: self.0.len(),
            })
        }

        fn len(&self) -> usize {
            self.0.len()
        }

        fn label(&self, index: usize) -> Option<usize> {
            self.0.get(index).copied()
        }

        fn name(&self) -> &str {
            "labels"
        }
    }

    #[test]
    fn record_dataset_loads_image_and_zero_mask() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("a.png");
        write_rgb(&image_path, 12, 200);

        let dataset = RecordDataset::new(
            "records",
            vec![SampleRecord {
                image_path: image_path.clone(),
                mask_path: None,
                label: NORMAL,
                cls_name: "bottle".into(),
            }],
            resize_transforms(6),
        );
        let item = dataset.load(0).unwrap();
        assert_eq!((item.image.height, item.image.width, item.image.channels), (6, 6, 3));
        assert_eq!((item.mask.height, item.mask.width, item.mask.channels), (6, 6, 1));
        assert!(item.mask.data.iter().all(|v| *v == 0.0));
        assert_eq!(item.path, image_path);
        assert!(matches!(
            dataset.load(1),
            Err(DataError::IndexOutOfBounds { index: 1, len: 1 })
        ));
    }

    #[test]
    fn missing_image_is_an_error_on_access() {
        let dataset = RecordDataset::new(
            "records",
            vec![SampleRecord {
                image_path: PathBuf::from("missing.png"),
                mask_path: None,
                label: NORMAL,
                cls_name: "x".into(),
            }],
            resize_transforms(4),
        );
        assert!(matches!(
            dataset.load(0),
            Err(DataError::ImageOpenFailed { .. })
        ));
        let view = IndexedDataset::full(Arc::new(dataset));
        assert!(Dataset::get(&view, 0).is_none());
    }

    #[test]
    fn indexed_view_maps_positions_through_indices() {
        let source: Arc<dyn AnomalyDataset> = Arc::new(LabelDataset(vec![0, 1, 2, 3, 4]));
        let view = IndexedDataset::new(Arc::clone(&source), vec![4, 2, 0]).unwrap();
        assert_eq!(AnomalyDataset::len(&view), 3);
        assert_eq!(view.labels(), vec![4, 2, 0]);

        let narrowed = view.select(&[2, 0]).unwrap();
        assert_eq!(narrowed.indices(), &[0, 4]);

        assert!(IndexedDataset::new(Arc::clone(&source), vec![5]).is_err());
        assert!(view.select(&[3]).is_err());
    }

    #[test]
    fn registry_rejects_unknown_type() {
        let registry = DatasetRegistry::builtin();
        assert_eq!(registry.names(), vec!["mvtec", "folder"]);
        match registry.resolve("imagenet") {
            Err(DataError::UnknownDataset { name, available }) => {
                assert_eq!(name, "imagenet");
                assert_eq!(available, "mvtec, folder");
            }
            _ => panic!("expected UnknownDataset"),
        }
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(is_image(Path::new("a/b.PNG")));
        assert!(is_image(Path::new("a/b.jpeg")));
        assert!(!is_image(Path::new("a/b.txt")));
        assert!(!is_image(Path::new("a/b")));
    }
}
