//! Class-per-directory layout: `root/<split>/<class>/*`.
//!
//! Labels are positions in the sorted (or configured) class list. Samples
//! carry no ground truth, so every target is an all-zero mask.

use std::sync::Arc;

use super::{
    categories, image_files, AnomalyDataset, DatasetTransforms, RecordDataset, SampleRecord, Split,
};
use crate::{
    config::DatasetSpec,
    error::{DataError, DataResult},
};

/// Registry constructor for `"folder"`.
pub fn build_folder(
    spec: &DatasetSpec,
    split: Split,
    transforms: DatasetTransforms,
) -> DataResult<Arc<dyn AnomalyDataset>> {
    let split_root = spec.root.join(split.as_str());
    let classes = categories(spec, &split_root)?;

    let mut records = Vec::new();
    for (label, class) in classes.iter().enumerate() {
        records.extend(
            image_files(&split_root.join(class))?
                .into_iter()
                .map(|image_path| SampleRecord {
                    image_path,
                    mask_path: None,
                    label,
                    cls_name: class.clone(),
                }),
        );
    }
    if records.is_empty() {
        return Err(DataError::EmptyDataset { path: split_root });
    }
    Ok(Arc::new(RecordDataset::new("folder", records, transforms)))
}
