// Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use ehr_seq_data::data::{PatientRecord, PatientTable, SequenceTokenizer, TokenizedInput};
use ehr_seq_data::{DataError, Result};

/// Fixed vocabulary: reserved ids 0..=10, concepts `A`..`Z` from 11.
pub const VOCAB: [&str; 11] = [
    "[PAD]", "[UNK]", "[CLS]", "[MOR_1M]", "[REA_1M]", "[LOS_1W]", "[C0]", "[C1]", "[C2]", "[CUSTOM]", "[MASK]",
];
pub const MASK_ID: i64 = 10;
pub const FIRST_CONCEPT_ID: i64 = 11;

pub struct StubTokenizer;

impl StubTokenizer {
    pub fn id(token: &str) -> i64 {
        if let Some(i) = VOCAB.iter().position(|t| *t == token) {
            return i as i64;
        }
        match token.as_bytes() {
            [c @ b'A'..=b'Z'] => FIRST_CONCEPT_ID + i64::from(c - b'A'),
            _ => 1,
        }
    }
}

impl SequenceTokenizer for StubTokenizer {
    fn encode(&self, tokens: &[String], max_length: usize) -> Result<TokenizedInput> {
        let mut input_ids: Vec<i64> = tokens.iter().map(|t| Self::id(t)).collect();
        input_ids.resize(max_length, 0);
        let attention_mask = input_ids.iter().map(|&id| i64::from(id != 0)).collect();
        Ok(TokenizedInput {
            input_ids,
            attention_mask,
        })
    }

    fn pad_token(&self) -> &str {
        "[PAD]"
    }

    fn pad_token_id(&self) -> i64 {
        0
    }

    fn mask_token_id(&self) -> i64 {
        MASK_ID
    }

    fn first_ordinary_token_index(&self) -> i64 {
        FIRST_CONCEPT_ID
    }

    fn last_ordinary_token_index(&self) -> i64 {
        FIRST_CONCEPT_ID + 26
    }

    fn task_token(&self, task: &str) -> Result<String> {
        let token = match task {
            "mortality_1month" => "[MOR_1M]",
            "readmission_1month" => "[REA_1M]",
            "los_1week" => "[LOS_1W]",
            "c0" => "[C0]",
            "c1" => "[C1]",
            "c2" => "[C2]",
            "custom" => "[CUSTOM]",
            other => return Err(DataError::UnknownTask(other.to_string())),
        };
        Ok(token.to_string())
    }
}

pub fn tokenizer() -> Arc<dyn SequenceTokenizer> {
    Arc::new(StubTokenizer)
}

/// Record over `events` with ages 100.. and positions 0.. so channel alignment is visible.
pub fn record(events: &str) -> PatientRecord {
    let mut record = PatientRecord::from_events(events.split_whitespace());
    let n = record.len() as i64;
    record.age_tokens = (0..n).map(|i| 100 + i).collect();
    record.position_tokens = (0..n).collect();
    record.visit_tokens = (0..n).map(|i| 1 + i / 2).collect();
    record.type_tokens = vec![3; n as usize];
    record.time_tokens = (0..n).map(|i| 10 * i).collect();
    record
}

pub fn table(max_len: usize, records: Vec<PatientRecord>) -> Arc<PatientTable> {
    Arc::new(PatientTable::new(max_len, records).unwrap())
}
