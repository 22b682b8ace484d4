use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::masking::MaskSplit;
use crate::data::multitask::MISSING_LABEL;
use crate::error::{DataError, Result};

/// Settings shared by every dataset variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Length of every emitted channel; also names the table's channel columns.
    pub max_len: usize,
    pub mask_prob: f64,
    pub mask_split: MaskSplit,
    /// Label value meaning "no label for this task".
    pub missing_label: i64,
    pub tasks: Vec<String>,
    /// Target positive ratio per task.
    pub balance_guide: Option<BTreeMap<String, f64>>,
    /// Multi-task decoder: one shared classification head for all tasks.
    pub is_single_head: bool,
    /// Seeds label balancing and masking.
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            max_len: 2048,
            mask_prob: 0.15,
            mask_split: MaskSplit::Independent,
            missing_label: MISSING_LABEL,
            tasks: Vec::new(),
            balance_guide: None,
            is_single_head: true,
            seed: 42,
        }
    }
}

impl DatasetConfig {
    pub fn pretrain(max_len: usize) -> Self {
        Self {
            max_len,
            ..Self::default()
        }
    }

    pub fn finetune_multi<S: Into<String>>(max_len: usize, tasks: impl IntoIterator<Item = S>) -> Self {
        Self {
            max_len,
            tasks: tasks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_mask_prob(mut self, mask_prob: f64) -> Self {
        self.mask_prob = mask_prob;
        self
    }

    pub fn with_mask_split(mut self, split: MaskSplit) -> Self {
        self.mask_split = split;
        self
    }

    pub fn with_missing_label(mut self, missing_label: i64) -> Self {
        self.missing_label = missing_label;
        self
    }

    pub fn with_balance_guide(mut self, guide: BTreeMap<String, f64>) -> Self {
        self.balance_guide = Some(guide);
        self
    }

    pub fn with_single_head(mut self, single: bool) -> Self {
        self.is_single_head = single;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.mask_prob) {
            return Err(DataError::config(format!("mask_prob {} not in [0, 1]", self.mask_prob)));
        }
        if let Some(guide) = &self.balance_guide {
            for (task, &ratio) in guide {
                if !(ratio > 0.0 && ratio <= 1.0) {
                    return Err(DataError::InvalidRatio {
                        task: task.clone(),
                        ratio,
                    });
                }
            }
        }
        Ok(())
    }
}
