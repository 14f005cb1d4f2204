//! Batching of [`AnomalyItem`]s into tensors.

use std::marker::PhantomData;

use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Int, Tensor, TensorData},
};

use crate::{dataset::AnomalyItem, transform::TensorImage};

/// A batch of transformed samples.
#[derive(Debug, Clone)]
pub struct AnomalyBatch<B: Backend> {
    /// `[B, C, H, W]`
    pub images: Tensor<B, 4>,
    /// `[B, 1, H, W]`
    pub masks: Tensor<B, 4>,
    /// `[B]`
    pub labels: Tensor<B, 1, Int>,
}

/// Stacks items into an [`AnomalyBatch`] on the target device.
///
/// Every item of a batch must have the same image and mask shape; the
/// transform pipelines are expected to end in a fixed size.
#[derive(Clone, Default)]
pub struct AnomalyBatcher<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> AnomalyBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

fn to_chw<B: Backend>(image: TensorImage, device: &B::Device) -> Tensor<B, 3> {
    let data = TensorData::new(image.data, [image.height, image.width, image.channels])
        .convert::<B::FloatElem>();
    Tensor::<B, 3>::from_data(data, device).permute([2, 0, 1])
}

impl<B: Backend> Batcher<B, AnomalyItem, AnomalyBatch<B>> for AnomalyBatcher<B> {
    fn batch(&self, items: Vec<AnomalyItem>, device: &B::Device) -> AnomalyBatch<B> {
        let batch_size = items.len();
        let mut images = Vec::with_capacity(batch_size);
        let mut masks = Vec::with_capacity(batch_size);
        let mut labels = Vec::with_capacity(batch_size);

        for item in items {
            images.push(to_chw::<B>(item.image, device));
            masks.push(to_chw::<B>(item.mask, device));
            labels.push(item.label as i64);
        }

        let labels = Tensor::<B, 1, Int>::from_data(
            TensorData::new(labels, [batch_size]).convert::<B::IntElem>(),
            device,
        );

        AnomalyBatch {
            images: Tensor::stack(images, 0),
            masks: Tensor::stack(masks, 0),
            labels,
        }
    }
}
