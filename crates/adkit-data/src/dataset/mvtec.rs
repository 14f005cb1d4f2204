//! MVTec-AD style layout.
//!
//! ```text
//! root/<category>/train/good/*.png
//! root/<category>/test/<defect>/*.png
//! root/<category>/ground_truth/<defect>/<stem>_mask.png
//! ```
//!
//! `good` test samples are normal and have no mask file.

use std::{path::Path, sync::Arc};

use super::{
    categories, image_files, require_dir, sub_dirs, AnomalyDataset, DatasetTransforms,
    RecordDataset, SampleRecord, Split, ANOMALOUS, NORMAL,
};
use crate::{
    config::DatasetSpec,
    error::{DataError, DataResult},
};

const GOOD: &str = "good";

/// Registry constructor for `"mvtec"`.
pub fn build_mvtec(
    spec: &DatasetSpec,
    split: Split,
    transforms: DatasetTransforms,
) -> DataResult<Arc<dyn AnomalyDataset>> {
    let records = scan(&spec.root, &categories(spec, &spec.root)?, split)?;
    Ok(Arc::new(RecordDataset::new("mvtec", records, transforms)))
}

fn scan(root: &Path, categories: &[String], split: Split) -> DataResult<Vec<SampleRecord>> {
    require_dir(root)?;
    let mut records = Vec::new();
    for category in categories {
        let category_root = root.join(category);
        match split {
            Split::Train => scan_train(&category_root, category, &mut records)?,
            Split::Test => scan_test(&category_root, category, &mut records)?,
        }
    }
    if records.is_empty() {
        return Err(DataError::EmptyDataset {
            path: root.to_path_buf(),
        });
    }
    Ok(records)
}

fn scan_train(category_root: &Path, category: &str, out: &mut Vec<SampleRecord>) -> DataResult<()> {
    let good = category_root.join("train").join(GOOD);
    out.extend(image_files(&good)?.into_iter().map(|image_path| SampleRecord {
        image_path,
        mask_path: None,
        label: NORMAL,
        cls_name: category.to_string(),
    }));
    Ok(())
}

fn scan_test(category_root: &Path, category: &str, out: &mut Vec<SampleRecord>) -> DataResult<()> {
    let test_root = category_root.join("test");
    let gt_root = category_root.join("ground_truth");
    for defect in sub_dirs(&test_root)? {
        let is_good = defect == GOOD;
        for image_path in image_files(&test_root.join(&defect))? {
            let mask_path = if is_good {
                None
            } else {
                let Some(stem) = image_path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let mask = gt_root.join(&defect).join(format!("{stem}_mask.png"));
                if !mask.is_file() {
                    tracing::warn!(
                        image = %image_path.display(),
                        mask = %mask.display(),
                        "no mask found for anomalous sample, skipping"
                    );
                    continue;
                }
                Some(mask)
            };
            out.push(SampleRecord {
                image_path,
                mask_path,
                label: if is_good { NORMAL } else { ANOMALOUS },
                cls_name: category.to_string(),
            });
        }
    }
    Ok(())
}
