//! Example construction for sequence models over patient event histories.
//!
//! A [`PatientTable`](data::PatientTable) of tokenized event channels is turned
//! into fixed-length training examples by an [`EhrDataset`](data::EhrDataset):
//! masked-LM or next-token pretraining, single-task finetuning, or multi-task
//! finetuning over a balanced, task-major example index.

pub mod config;
pub mod data;
pub mod error;

pub use config::DatasetConfig;
pub use error::{DataError, Result};
