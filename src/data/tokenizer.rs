use std::collections::BTreeSet;

use tokenizers::models::wordlevel::WordLevel;
use tokenizers::Tokenizer;

use crate::data::record::PatientTable;
use crate::error::{DataError, Result};

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const MASK_TOKEN: &str = "[MASK]";

/// Reserved tokens placed before `[MASK]`. Every reserved id must be at most the
/// mask id, because masking treats `id > mask_id` as "ordinary token".
const LEADING_SPECIAL_TOKENS: [&str; 6] = [PAD_TOKEN, UNK_TOKEN, "[CLS]", "[REG]", "[VS]", "[VE]"];

/// Task name to its reserved task token.
pub const TASK_TOKENS: [(&str, &str); 6] = [
    ("mortality_1month", "[MOR_1M]"),
    ("readmission_1month", "[REA_1M]"),
    ("los_1week", "[LOS_1W]"),
    ("c0", "[C0]"),
    ("c1", "[C1]"),
    ("c2", "[C2]"),
];

/// Output of tokenization, one entry per input token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedInput {
    pub input_ids: Vec<i64>,
    /// 1 for real tokens, 0 for padding
    pub attention_mask: Vec<i64>,
}

/// What the dataset needs from a tokenizer.
///
/// Implementations are shared read-only between datasets and loader workers.
pub trait SequenceTokenizer: Send + Sync {
    /// Encodes an already-split event sequence, padded or truncated to `max_length`.
    fn encode(&self, tokens: &[String], max_length: usize) -> Result<TokenizedInput>;

    fn pad_token(&self) -> &str;

    fn pad_token_id(&self) -> i64;

    fn mask_token_id(&self) -> i64;

    /// Lowest id of an ordinary (non-reserved) token.
    fn first_ordinary_token_index(&self) -> i64;

    /// Exclusive upper bound of ordinary token ids.
    fn last_ordinary_token_index(&self) -> i64;

    /// Reserved token for `task`; unknown tasks are a configuration error.
    fn task_token(&self, task: &str) -> Result<String>;
}

/// Word-level concept tokenizer backed by HuggingFace `tokenizers`.
///
/// Id layout: leading reserved tokens, task tokens, `[MASK]`, then concepts in
/// sorted order.
pub struct ConceptTokenizer {
    tokenizer: Tokenizer,
    pub vocab_size: usize,
    pub pad_token_id: i64,
    pub mask_token_id: i64,
}

impl ConceptTokenizer {
    /// Builds the vocabulary from concept codes. Duplicates and reserved names are ignored.
    pub fn from_concepts<I, S>(concepts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let reserved: Vec<&str> = LEADING_SPECIAL_TOKENS
            .iter()
            .copied()
            .chain(TASK_TOKENS.iter().map(|(_, token)| *token))
            .chain(std::iter::once(MASK_TOKEN))
            .collect();

        let concepts: BTreeSet<String> = concepts
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .filter(|c| !reserved.contains(&c.as_str()))
            .collect();

        let entries: Vec<(String, u32)> = reserved
            .iter()
            .map(|t| t.to_string())
            .chain(concepts)
            .enumerate()
            .map(|(id, token)| (token, id as u32))
            .collect();
        let vocab_size = entries.len();

        let model = WordLevel::builder()
            .vocab(entries.into_iter().collect())
            .unk_token(UNK_TOKEN.to_string())
            .build()
            .map_err(|e| DataError::Tokenizer(e.to_string()))?;
        let tokenizer = Tokenizer::new(model);

        let id_of = |token: &str| {
            tokenizer
                .token_to_id(token)
                .map(i64::from)
                .ok_or_else(|| DataError::Tokenizer(format!("{token} missing from vocabulary")))
        };
        let pad_token_id = id_of(PAD_TOKEN)?;
        let mask_token_id = id_of(MASK_TOKEN)?;

        Ok(Self {
            tokenizer,
            vocab_size,
            pad_token_id,
            mask_token_id,
        })
    }

    /// Fits the vocabulary on every event token in `table`.
    pub fn fit_table(table: &PatientTable) -> Result<Self> {
        Self::from_concepts(
            table
                .records()
                .iter()
                .flat_map(|r| r.event_tokens.iter()),
        )
    }

    pub fn token_to_id(&self, token: &str) -> Option<i64> {
        self.tokenizer.token_to_id(token).map(i64::from)
    }

    pub fn id_to_token(&self, id: i64) -> Option<String> {
        u32::try_from(id).ok().and_then(|id| self.tokenizer.id_to_token(id))
    }

    /// Pads or truncates a vector to the target length
    fn pad_or_truncate(vec: &mut Vec<i64>, target: usize, pad_value: i64) {
        if vec.len() < target {
            vec.resize(target, pad_value);
        } else {
            vec.truncate(target);
        }
    }
}

impl SequenceTokenizer for ConceptTokenizer {
    fn encode(&self, tokens: &[String], max_length: usize) -> Result<TokenizedInput> {
        let words: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let encoding = self
            .tokenizer
            .encode(words, false)
            .map_err(|e| DataError::Tokenizer(e.to_string()))?;

        let mut input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
        Self::pad_or_truncate(&mut input_ids, max_length, self.pad_token_id);

        let attention_mask = input_ids
            .iter()
            .map(|&id| i64::from(id != self.pad_token_id))
            .collect();

        Ok(TokenizedInput {
            input_ids,
            attention_mask,
        })
    }

    fn pad_token(&self) -> &str {
        PAD_TOKEN
    }

    fn pad_token_id(&self) -> i64 {
        self.pad_token_id
    }

    fn mask_token_id(&self) -> i64 {
        self.mask_token_id
    }

    fn first_ordinary_token_index(&self) -> i64 {
        self.mask_token_id + 1
    }

    fn last_ordinary_token_index(&self) -> i64 {
        self.vocab_size as i64
    }

    fn task_token(&self, task: &str) -> Result<String> {
        TASK_TOKENS
            .iter()
            .find(|(name, _)| *name == task)
            .map(|(_, token)| token.to_string())
            .ok_or_else(|| DataError::UnknownTask(task.to_string()))
    }
}
