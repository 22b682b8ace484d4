pub mod batcher;
pub mod dataset;
pub mod masking;
pub mod multitask;
pub mod record;
pub mod tokenizer;
pub mod truncate;

pub use batcher::{BatchLabels, EhrBatch, EhrBatcher};
pub use dataset::{DatasetVariant, EhrDataset, EhrItem, ItemLabels};
pub use masking::{MaskSplit, MaskingEngine, IGNORE_INDEX};
pub use multitask::{task_index, ExampleDescriptor, TaskIndex, MISSING_LABEL, TASK_TO_INDEX};
pub use record::{PatientRecord, PatientTable};
pub use tokenizer::{ConceptTokenizer, SequenceTokenizer, TokenizedInput};
pub use truncate::{fit_channel, truncate_and_pad};
