use std::sync::{Arc, Mutex, PoisonError};

use burn::data::dataset::Dataset;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::config::DatasetConfig;
use crate::data::masking::MaskingEngine;
use crate::data::multitask::{task_index, ExampleDescriptor, TaskIndex};
use crate::data::record::{PatientRecord, PatientTable};
use crate::data::tokenizer::SequenceTokenizer;
use crate::data::truncate::truncate_and_pad;
use crate::error::{DataError, Result};

/// Which training objective the examples are built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetVariant {
    /// Masked-LM pretraining.
    PretrainEncoder,
    /// Next-token pretraining; labels mirror the inputs.
    PretrainDecoder,
    /// One scalar `label` per patient.
    Finetune,
    /// One example per (patient, task); position 0 carries the task token.
    FinetuneMultiEncoder,
    /// One example per (patient, task) for decoder models.
    FinetuneMultiDecoder,
}

impl DatasetVariant {
    pub fn is_multi_task(self) -> bool {
        matches!(self, Self::FinetuneMultiEncoder | Self::FinetuneMultiDecoder)
    }

    fn has_attention_mask(self) -> bool {
        !matches!(self, Self::PretrainDecoder | Self::FinetuneMultiDecoder)
    }
}

/// Supervision attached to an example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemLabels {
    /// Per-token labels, `-100` where the loss should ignore the position.
    Tokens(Vec<i64>),
    /// One label for the whole sequence.
    Scalar(i64),
}

/// A single training example; every channel has exactly `max_len` elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EhrItem {
    pub concept_ids: Vec<i64>,
    pub type_ids: Vec<i64>,
    pub ages: Vec<i64>,
    pub time_stamps: Vec<i64>,
    pub visit_orders: Vec<i64>,
    pub visit_segments: Vec<i64>,
    pub attention_mask: Option<Vec<i64>>,
    pub labels: ItemLabels,
    pub task: Option<String>,
    pub task_index: Option<i64>,
}

/// Builds training examples from a patient table for one [`DatasetVariant`].
///
/// Multi-task variants index and balance the table once, at construction;
/// retrieval then only reads the table, the tokenizer and the index.
pub struct EhrDataset {
    table: Arc<PatientTable>,
    tokenizer: Arc<dyn SequenceTokenizer>,
    variant: DatasetVariant,
    config: DatasetConfig,
    masking: Option<MaskingEngine>,
    task_index: TaskIndex,
    index_mapper: Vec<ExampleDescriptor>,
    rng: Mutex<StdRng>,
}

impl EhrDataset {
    pub fn new(
        table: Arc<PatientTable>,
        tokenizer: Arc<dyn SequenceTokenizer>,
        variant: DatasetVariant,
        config: DatasetConfig,
    ) -> Result<Self> {
        config.validate()?;
        if table.max_len() != config.max_len {
            return Err(DataError::config(format!(
                "table channels are stored at length {}, config asks for {}",
                table.max_len(),
                config.max_len
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);

        let masking = match variant {
            DatasetVariant::PretrainEncoder => Some(MaskingEngine::from_tokenizer(
                tokenizer.as_ref(),
                config.mask_prob,
                config.mask_split,
            )?),
            _ => None,
        };

        if variant == DatasetVariant::Finetune {
            if let Some(row) = table.records().iter().position(|r| r.label.is_none()) {
                return Err(DataError::InvalidValue {
                    row,
                    column: "label".to_string(),
                    reason: "finetuning needs a label on every row".to_string(),
                });
            }
        }

        let mut task_index_map = TaskIndex::default();
        let mut index_mapper = Vec::new();
        if variant.is_multi_task() {
            for task in &config.tasks {
                tokenizer.task_token(task)?;
                if variant == DatasetVariant::FinetuneMultiDecoder {
                    task_index(task)?;
                }
            }
            task_index_map = TaskIndex::build(&table, &config.tasks, config.missing_label)?;
            if let Some(guide) = &config.balance_guide {
                task_index_map.balance(guide, &mut rng)?;
            }
            index_mapper = task_index_map.flatten();
        }

        let dataset = Self {
            table,
            tokenizer,
            variant,
            config,
            masking,
            task_index: task_index_map,
            index_mapper,
            rng: Mutex::new(rng),
        };
        info!(
            variant = ?dataset.variant,
            rows = dataset.table.len(),
            examples = dataset.len(),
            max_len = dataset.config.max_len,
            "Dataset created"
        );
        Ok(dataset)
    }

    pub fn variant(&self) -> DatasetVariant {
        self.variant
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Per-task descriptors after balancing. Empty for single-task variants.
    pub fn task_to_index(&self) -> &TaskIndex {
        &self.task_index
    }

    /// Flat, task-major list addressed by multi-task retrieval.
    pub fn index_mapper(&self) -> &[ExampleDescriptor] {
        &self.index_mapper
    }

    /// Returns the number of examples in the dataset
    pub fn len(&self) -> usize {
        if self.variant.is_multi_task() {
            self.index_mapper.len()
        } else {
            self.table.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds example `index`, drawing masking randomness from the dataset's own seeded RNG.
    ///
    /// The RNG lock is taken only around masking, so variants without masking never wait on it.
    pub fn try_get(&self, index: usize) -> Result<EhrItem> {
        self.assemble(index, |masking, ids| {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            masking.mask_tokens(ids, &mut *rng)
        })
    }

    /// Builds example `index` with caller-supplied randomness.
    pub fn get_with_rng<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<EhrItem> {
        self.assemble(index, |masking, ids| masking.mask_tokens(ids, rng))
    }

    fn assemble<F>(&self, index: usize, mask: F) -> Result<EhrItem>
    where
        F: FnOnce(&MaskingEngine, &[i64]) -> (Vec<i64>, Vec<i64>),
    {
        let len = self.len();
        if index >= len {
            return Err(DataError::IndexOutOfRange { index, len });
        }

        if self.variant.is_multi_task() {
            let descriptor = &self.index_mapper[index];
            let record = self.table.record(descriptor.index)?;
            self.assemble_task_example(record, descriptor)
        } else {
            let record = self.table.record(index)?;
            self.assemble_sequence_example(record, mask)
        }
    }

    fn assemble_sequence_example<F>(&self, record: &PatientRecord, mask: F) -> Result<EhrItem>
    where
        F: FnOnce(&MaskingEngine, &[i64]) -> (Vec<i64>, Vec<i64>),
    {
        let padded = self.pad(record, record.cutoff)?;
        let tokenized = self.tokenizer.encode(&padded.event_tokens, self.config.max_len)?;

        let (concept_ids, labels) = match (self.variant, &self.masking) {
            (DatasetVariant::PretrainEncoder, Some(masking)) => {
                let (masked, labels) = mask(masking, &tokenized.input_ids);
                (masked, ItemLabels::Tokens(labels))
            }
            (DatasetVariant::PretrainDecoder, _) => {
                let labels = ItemLabels::Tokens(tokenized.input_ids.clone());
                (tokenized.input_ids, labels)
            }
            _ => {
                // checked in `new`
                let label = record.label.ok_or_else(|| DataError::MissingColumn("label".to_string()))?;
                (tokenized.input_ids, ItemLabels::Scalar(label))
            }
        };

        let attention_mask = self.variant.has_attention_mask().then_some(tokenized.attention_mask);
        Ok(with_channels(padded, concept_ids, attention_mask, labels))
    }

    fn assemble_task_example(&self, record: &PatientRecord, descriptor: &ExampleDescriptor) -> Result<EhrItem> {
        let task_token = self.tokenizer.task_token(&descriptor.task)?;
        let first = record.event_tokens.first().cloned().unwrap_or_default();

        let mut record = record.clone();
        self.write_task_tokens(&mut record.event_tokens, &task_token, &first);

        let mut padded = self.pad(&record, descriptor.cutoff)?;
        let visible = descriptor.cutoff.map_or(record.len(), |c| c.min(record.len()));
        if visible > self.config.max_len {
            // the head was dropped with the task token; write it into the kept window
            self.write_task_tokens(&mut padded.event_tokens, &task_token, &first);
        }
        let tokenized = self.tokenizer.encode(&padded.event_tokens, self.config.max_len)?;

        let (attention_mask, task_index) = match self.variant {
            DatasetVariant::FinetuneMultiDecoder => (None, Some(task_index(&descriptor.task)?)),
            _ => (Some(tokenized.attention_mask), None),
        };

        let mut item = with_channels(
            padded,
            tokenized.input_ids,
            attention_mask,
            ItemLabels::Scalar(descriptor.label),
        );
        item.task = Some(descriptor.task.clone());
        item.task_index = task_index;
        Ok(item)
    }

    /// Encoder: position 0 becomes the task token. Single-head decoder: position 0 and
    /// the last position. Multi-head decoder: the last position gets the record's first event.
    fn write_task_tokens(&self, events: &mut [String], task_token: &str, first: &str) {
        let Some(last) = events.len().checked_sub(1) else {
            return;
        };
        match self.variant {
            DatasetVariant::FinetuneMultiDecoder if self.config.is_single_head => {
                events[0] = task_token.to_string();
                events[last] = task_token.to_string();
            }
            DatasetVariant::FinetuneMultiDecoder => events[last] = first.to_string(),
            _ => events[0] = task_token.to_string(),
        }
    }

    fn pad(&self, record: &PatientRecord, cutoff: Option<usize>) -> Result<PatientRecord> {
        truncate_and_pad(record, cutoff, self.config.max_len, self.tokenizer.pad_token())
    }
}

fn with_channels(
    padded: PatientRecord,
    concept_ids: Vec<i64>,
    attention_mask: Option<Vec<i64>>,
    labels: ItemLabels,
) -> EhrItem {
    EhrItem {
        concept_ids,
        type_ids: padded.type_tokens,
        ages: padded.age_tokens,
        time_stamps: padded.time_tokens,
        visit_orders: padded.position_tokens,
        visit_segments: padded.visit_tokens,
        attention_mask,
        labels,
        task: None,
        task_index: None,
    }
}

/// Lets burn's `DataLoader` read the dataset directly
impl Dataset<EhrItem> for EhrDataset {
    fn get(&self, index: usize) -> Option<EhrItem> {
        match self.try_get(index) {
            Ok(item) => Some(item),
            Err(DataError::IndexOutOfRange { .. }) => None,
            Err(e) => {
                warn!(index, error = %e, "Failed to build example");
                None
            }
        }
    }

    fn len(&self) -> usize {
        EhrDataset::len(self)
    }
}
