use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::tokenizer::SequenceTokenizer;
use crate::error::{DataError, Result};

/// Label value ignored by the loss.
pub const IGNORE_INDEX: i64 = -100;

/// How a selected position is corrupted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskSplit {
    /// Two independent Bernoulli draws: `Bern(0.8)` picks `[MASK]`, then
    /// `Bern(0.1)` among the rest picks a random token. Among selected positions
    /// this yields 0.8 mask / 0.02 random / 0.18 unchanged.
    #[default]
    Independent,
    /// One categorical draw per selected position: 0.8 / 0.1 / 0.1.
    Exact,
}

/// Masked-LM corruption over token ids.
#[derive(Debug, Clone)]
pub struct MaskingEngine {
    mask_prob: f64,
    split: MaskSplit,
    mask_token_id: i64,
    first_ordinary: i64,
    last_ordinary: i64,
}

impl MaskingEngine {
    pub fn new(
        mask_prob: f64,
        split: MaskSplit,
        mask_token_id: i64,
        first_ordinary: i64,
        last_ordinary: i64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&mask_prob) {
            return Err(DataError::config(format!("mask_prob {mask_prob} not in [0, 1]")));
        }
        if first_ordinary >= last_ordinary {
            return Err(DataError::config(format!(
                "empty ordinary token range [{first_ordinary}, {last_ordinary})"
            )));
        }
        Ok(Self {
            mask_prob,
            split,
            mask_token_id,
            first_ordinary,
            last_ordinary,
        })
    }

    pub fn from_tokenizer(tokenizer: &dyn SequenceTokenizer, mask_prob: f64, split: MaskSplit) -> Result<Self> {
        Self::new(
            mask_prob,
            split,
            tokenizer.mask_token_id(),
            tokenizer.first_ordinary_token_index(),
            tokenizer.last_ordinary_token_index(),
        )
    }

    pub fn mask_prob(&self) -> f64 {
        self.mask_prob
    }

    /// Returns `(masked_ids, labels)`.
    ///
    /// Only ids strictly greater than the mask id are eligible, so pad, unknown,
    /// mask and the other reserved tokens are never selected. Selected positions
    /// are labelled with their original id, all others with [`IGNORE_INDEX`].
    pub fn mask_tokens<R: Rng + ?Sized>(&self, ids: &[i64], rng: &mut R) -> (Vec<i64>, Vec<i64>) {
        let mut masked = ids.to_vec();
        let mut labels = vec![IGNORE_INDEX; ids.len()];

        for (i, &id) in ids.iter().enumerate() {
            if id <= self.mask_token_id || !rng.gen_bool(self.mask_prob) {
                continue;
            }
            labels[i] = id;

            match self.corruption(rng) {
                Corruption::Mask => masked[i] = self.mask_token_id,
                Corruption::Random => masked[i] = rng.gen_range(self.first_ordinary..self.last_ordinary),
                Corruption::Keep => {}
            }
        }

        (masked, labels)
    }

    fn corruption<R: Rng + ?Sized>(&self, rng: &mut R) -> Corruption {
        match self.split {
            MaskSplit::Independent => {
                if rng.gen_bool(0.8) {
                    Corruption::Mask
                } else if rng.gen_bool(0.1) {
                    Corruption::Random
                } else {
                    Corruption::Keep
                }
            }
            MaskSplit::Exact => {
                let u: f64 = rng.gen();
                if u < 0.8 {
                    Corruption::Mask
                } else if u < 0.9 {
                    Corruption::Random
                } else {
                    Corruption::Keep
                }
            }
        }
    }
}

enum Corruption {
    Mask,
    Random,
    Keep,
}
