use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Int, Tensor, TensorData},
};

use crate::data::dataset::{EhrItem, ItemLabels};
use crate::data::masking::IGNORE_INDEX;

/// Stacked supervision for a batch.
#[derive(Debug, Clone)]
pub enum BatchLabels<B: Backend> {
    /// `[batch, seq]`
    Tokens(Tensor<B, 2, Int>),
    /// `[batch]`
    Scalar(Tensor<B, 1, Int>),
}

#[derive(Debug, Clone)]
pub struct EhrBatch<B: Backend> {
    pub concept_ids: Tensor<B, 2, Int>,
    pub type_ids: Tensor<B, 2, Int>,
    pub ages: Tensor<B, 2, Int>,
    pub time_stamps: Tensor<B, 2, Int>,
    pub visit_orders: Tensor<B, 2, Int>,
    pub visit_segments: Tensor<B, 2, Int>,
    pub attention_mask: Option<Tensor<B, 2, Int>>,
    pub labels: BatchLabels<B>,
    /// Task name per example, row-aligned with the tensors; `""` for an item without a task.
    /// Empty for single-task batches.
    pub tasks: Vec<String>,
    pub task_indices: Option<Tensor<B, 1, Int>>,
}

/// Stacks [`EhrItem`]s from one dataset into `Int` tensors.
///
/// The first item decides which optional fields the batch carries. Items that
/// lack a field the first one has contribute ignore-index rows or zeros.
#[derive(Clone, Debug, Default)]
pub struct EhrBatcher;

impl EhrBatcher {
    pub fn new() -> Self {
        Self
    }
}

fn stack<'a, B: Backend>(
    rows: impl Iterator<Item = &'a [i64]>,
    batch_size: usize,
    seq_len: usize,
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    // timestamps can exceed the i32 range
    let flat: Vec<i64> = rows.flat_map(|row| row.iter().copied()).collect();
    Tensor::<B, 2, Int>::from_data(TensorData::new(flat, [batch_size, seq_len]), device)
}

fn column<B: Backend>(values: Vec<i64>, device: &B::Device) -> Tensor<B, 1, Int> {
    let len = values.len();
    Tensor::<B, 1, Int>::from_data(TensorData::new(values, [len]), device)
}

impl<B: Backend> Batcher<B, EhrItem, EhrBatch<B>> for EhrBatcher {
    fn batch(&self, items: Vec<EhrItem>, device: &B::Device) -> EhrBatch<B> {
        let batch_size = items.len();
        let seq_len = items.first().map_or(0, |item| item.concept_ids.len());
        let channel = |pick: fn(&EhrItem) -> &[i64]| stack::<B>(items.iter().map(pick), batch_size, seq_len, device);

        let attention_mask = items
            .first()
            .is_some_and(|item| item.attention_mask.is_some())
            .then(|| {
                let rows: Vec<Vec<i64>> = items
                    .iter()
                    .map(|item| item.attention_mask.clone().unwrap_or_else(|| vec![0; seq_len]))
                    .collect();
                stack::<B>(rows.iter().map(Vec::as_slice), batch_size, seq_len, device)
            });

        let labels = match items.first().map(|item| &item.labels) {
            Some(ItemLabels::Scalar(_)) => BatchLabels::Scalar(column::<B>(
                items
                    .iter()
                    .map(|item| match item.labels {
                        ItemLabels::Scalar(label) => label,
                        ItemLabels::Tokens(_) => IGNORE_INDEX,
                    })
                    .collect(),
                device,
            )),
            _ => {
                let ignored = vec![IGNORE_INDEX; seq_len];
                let rows = items.iter().map(|item| match &item.labels {
                    ItemLabels::Tokens(labels) => labels.as_slice(),
                    ItemLabels::Scalar(_) => ignored.as_slice(),
                });
                BatchLabels::Tokens(stack::<B>(rows, batch_size, seq_len, device))
            }
        };

        let task_indices = items
            .first()
            .is_some_and(|item| item.task_index.is_some())
            .then(|| column::<B>(items.iter().map(|item| item.task_index.unwrap_or(IGNORE_INDEX)).collect(), device));

        let tasks = if items.first().is_some_and(|item| item.task.is_some()) {
            items.iter().map(|item| item.task.clone().unwrap_or_default()).collect()
        } else {
            Vec::new()
        };

        EhrBatch {
            concept_ids: channel(|item| item.concept_ids.as_slice()),
            type_ids: channel(|item| item.type_ids.as_slice()),
            ages: channel(|item| item.ages.as_slice()),
            time_stamps: channel(|item| item.time_stamps.as_slice()),
            visit_orders: channel(|item| item.visit_orders.as_slice()),
            visit_segments: channel(|item| item.visit_segments.as_slice()),
            attention_mask,
            labels,
            tasks,
            task_indices,
        }
    }
}
