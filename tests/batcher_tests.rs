// Tests for EhrBatcher on the NdArray backend

mod common;

use burn::backend::NdArray;
use burn::data::dataloader::batcher::Batcher;
use burn::tensor::{Int, Tensor};

use common::{record, table, tokenizer, StubTokenizer};
use ehr_seq_data::data::{BatchLabels, DatasetVariant, EhrBatch, EhrBatcher, EhrDataset, EhrItem, IGNORE_INDEX};
use ehr_seq_data::DatasetConfig;

type TestBackend = NdArray<f32>;

fn values<const D: usize>(tensor: Tensor<TestBackend, D, Int>) -> Vec<i64> {
    tensor.into_data().convert::<i64>().to_vec::<i64>().unwrap()
}

fn items(variant: DatasetVariant, config: DatasetConfig) -> Vec<EhrItem> {
    let data = table(
        4,
        vec![
            record("[CLS] A B").with_label(1).with_task_label("c1", 0),
            record("[CLS] C").with_label(0).with_task_label("c1", 1),
        ],
    );
    let ds = EhrDataset::new(data, tokenizer(), variant, config).unwrap();
    (0..ds.len()).map(|i| ds.try_get(i).unwrap()).collect()
}

#[test]
fn test_finetune_batch_shapes() {
    let device = Default::default();
    let batch: EhrBatch<TestBackend> =
        EhrBatcher::new().batch(items(DatasetVariant::Finetune, DatasetConfig::pretrain(4)), &device);

    assert_eq!(batch.concept_ids.dims(), [2, 4]);
    assert_eq!(batch.ages.dims(), [2, 4]);
    assert_eq!(
        values(batch.concept_ids),
        vec![
            StubTokenizer::id("[CLS]"),
            StubTokenizer::id("A"),
            StubTokenizer::id("B"),
            0,
            StubTokenizer::id("[CLS]"),
            StubTokenizer::id("C"),
            0,
            0
        ]
    );
    assert_eq!(values(batch.ages), vec![100, 101, 102, 0, 100, 101, 0, 0]);
    assert_eq!(values(batch.attention_mask.unwrap()), vec![1, 1, 1, 0, 1, 1, 0, 0]);

    match batch.labels {
        BatchLabels::Scalar(labels) => assert_eq!(values(labels), vec![1, 0]),
        BatchLabels::Tokens(_) => panic!("expected scalar labels"),
    }
    assert!(batch.tasks.is_empty());
    assert!(batch.task_indices.is_none());
}

#[test]
fn test_pretrain_batch_token_labels() {
    let device = Default::default();
    let config = DatasetConfig::pretrain(4).with_mask_prob(0.0);
    let batch: EhrBatch<TestBackend> = EhrBatcher::new().batch(items(DatasetVariant::PretrainEncoder, config), &device);

    match batch.labels {
        BatchLabels::Tokens(labels) => {
            assert_eq!(labels.dims(), [2, 4]);
            assert!(values(labels).iter().all(|&l| l == IGNORE_INDEX));
        }
        BatchLabels::Scalar(_) => panic!("expected token labels"),
    }
}

#[test]
fn test_multi_decoder_batch_tasks() {
    let device = Default::default();
    let config = DatasetConfig::finetune_multi(4, ["c1"]);
    let batch: EhrBatch<TestBackend> =
        EhrBatcher::new().batch(items(DatasetVariant::FinetuneMultiDecoder, config), &device);

    assert_eq!(batch.tasks, vec!["c1", "c1"]);
    assert_eq!(values(batch.task_indices.unwrap()), vec![4, 4]);
    assert!(batch.attention_mask.is_none());
    assert_eq!(values(batch.concept_ids)[0], StubTokenizer::id("[C1]"));
}

#[test]
fn test_large_timestamps_keep_full_width() {
    let device = Default::default();
    let mut long_epoch = record("[CLS] A B");
    long_epoch.time_tokens = vec![3_000_000_000, 3_000_086_400, 5_000_000_000];
    let data = table(4, vec![long_epoch.with_label(1)]);
    let ds = EhrDataset::new(data, tokenizer(), DatasetVariant::Finetune, DatasetConfig::pretrain(4)).unwrap();

    let batch: EhrBatch<TestBackend> = EhrBatcher::new().batch(vec![ds.try_get(0).unwrap()], &device);
    assert_eq!(values(batch.time_stamps), vec![3_000_000_000, 3_000_086_400, 5_000_000_000, 0]);
}

#[test]
fn test_tasks_stay_row_aligned() {
    let device = Default::default();
    let config = DatasetConfig::finetune_multi(4, ["c1"]);
    let mut mixed = items(DatasetVariant::FinetuneMultiEncoder, config);
    let mut untagged = mixed[0].clone();
    untagged.task = None;
    mixed.insert(1, untagged);

    let batch: EhrBatch<TestBackend> = EhrBatcher::new().batch(mixed, &device);
    assert_eq!(batch.concept_ids.dims(), [3, 4]);
    assert_eq!(batch.tasks, vec!["c1", "", "c1"]);
}
