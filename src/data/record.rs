use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::info;

use crate::error::{DataError, Result};

/// Names of the numeric channels, in the order they are stored on [`PatientRecord`].
pub const NUMERIC_CHANNELS: [&str; 5] = [
    "type_tokens",
    "age_tokens",
    "time_tokens",
    "visit_tokens",
    "position_tokens",
];

/// One patient row: parallel per-event channels plus optional supervision columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientRecord {
    pub event_tokens: Vec<String>,
    pub type_tokens: Vec<i64>,
    pub age_tokens: Vec<i64>,
    pub time_tokens: Vec<i64>,
    pub visit_tokens: Vec<i64>,
    pub position_tokens: Vec<i64>,
    /// Value of the table's generic cutoff column, if it has one.
    pub cutoff: Option<usize>,
    /// Single-task label.
    pub label: Option<i64>,
    /// `label_<task>` values; `null` cells are absent.
    pub task_labels: BTreeMap<String, i64>,
    /// `cutoff_<task>` values; `null` cells are stored as `None`.
    pub task_cutoffs: BTreeMap<String, Option<usize>>,
}

impl PatientRecord {
    /// Creates a record whose numeric channels are all zero.
    pub fn from_events<S: Into<String>>(events: impl IntoIterator<Item = S>) -> Self {
        let event_tokens: Vec<String> = events.into_iter().map(Into::into).collect();
        let n = event_tokens.len();
        Self {
            event_tokens,
            type_tokens: vec![0; n],
            age_tokens: vec![0; n],
            time_tokens: vec![0; n],
            visit_tokens: vec![0; n],
            position_tokens: vec![0; n],
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: i64) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_cutoff(mut self, cutoff: usize) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    pub fn with_task_label(mut self, task: &str, label: i64) -> Self {
        self.task_labels.insert(task.to_string(), label);
        self
    }

    pub fn with_task_cutoff(mut self, task: &str, cutoff: Option<usize>) -> Self {
        self.task_cutoffs.insert(task.to_string(), cutoff);
        self
    }

    /// Sequence length shared by every channel.
    pub fn len(&self) -> usize {
        self.event_tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_tokens.is_empty()
    }

    pub fn numeric_channels(&self) -> [&Vec<i64>; 5] {
        [
            &self.type_tokens,
            &self.age_tokens,
            &self.time_tokens,
            &self.visit_tokens,
            &self.position_tokens,
        ]
    }

    /// Verifies that every channel has the event channel's length.
    pub fn check_channels(&self, row: usize) -> Result<usize> {
        let expected = self.event_tokens.len();
        for (channel, values) in NUMERIC_CHANNELS.into_iter().zip(self.numeric_channels()) {
            if values.len() != expected {
                return Err(DataError::ChannelLengthMismatch {
                    row,
                    channel,
                    expected,
                    got: values.len(),
                });
            }
        }
        Ok(expected)
    }
}

/// Row-addressable patient table.
///
/// Rows are addressed by their dense position in the table, so an index built
/// against a table stays valid whatever filtering happened upstream.
#[derive(Debug, Clone)]
pub struct PatientTable {
    max_len: usize,
    columns: Vec<String>,
    cutoff_column: Option<String>,
    records: Vec<PatientRecord>,
}

impl PatientTable {
    /// Builds a table from typed records, deriving the column list from their contents.
    pub fn new(max_len: usize, records: Vec<PatientRecord>) -> Result<Self> {
        for (row, record) in records.iter().enumerate() {
            record.check_channels(row)?;
        }

        let mut columns = channel_columns(max_len);
        let mut push = |name: String| {
            if !columns.contains(&name) {
                columns.push(name);
            }
        };
        if records.iter().any(|r| r.label.is_some()) {
            push("label".to_string());
        }
        if records.iter().any(|r| r.cutoff.is_some()) {
            push("cutoff".to_string());
        }
        for record in &records {
            for task in record.task_labels.keys() {
                push(format!("label_{task}"));
            }
            for task in record.task_cutoffs.keys() {
                push(format!("cutoff_{task}"));
            }
        }

        let cutoff_column = detect_cutoff_column(&columns);
        Ok(Self {
            max_len,
            columns,
            cutoff_column,
            records,
        })
    }

    /// Reads a JSON-lines file, one patient object per line.
    pub fn from_json_lines_file<P: AsRef<Path>>(path: P, max_len: usize) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let table = Self::from_json_lines(std::io::BufReader::new(file), max_len)?;
        info!(
            path = %path.as_ref().display(),
            rows = table.len(),
            max_len,
            "Loaded patient table"
        );
        Ok(table)
    }

    /// Parses JSON-lines from any reader. Blank lines are skipped.
    pub fn from_json_lines<R: BufRead>(reader: R, max_len: usize) -> Result<Self> {
        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            rows.push(serde_json::from_str::<Map<String, Value>>(&line)?);
        }
        Self::from_rows(rows, max_len)
    }

    /// Builds a table from untyped rows.
    ///
    /// Column order is first-seen order across rows; the generic cutoff column is
    /// the first column whose name contains `cutoff`.
    pub fn from_rows(rows: Vec<Map<String, Value>>, max_len: usize) -> Result<Self> {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        let cutoff_column = detect_cutoff_column(&columns);

        let mut records = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let record = parse_row(index, row, max_len, cutoff_column.as_deref())?;
            record.check_channels(index)?;
            records.push(record);
        }

        Ok(Self {
            max_len,
            columns,
            cutoff_column,
            records,
        })
    }

    /// Storage length that names the channel columns (`event_tokens_<max_len>`, ...).
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn cutoff_column(&self) -> Option<&str> {
        self.cutoff_column.as_deref()
    }

    pub fn records(&self) -> &[PatientRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Result<&PatientRecord> {
        self.records.get(index).ok_or(DataError::IndexOutOfRange {
            index,
            len: self.records.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn channel_columns(max_len: usize) -> Vec<String> {
    std::iter::once("event_tokens")
        .chain(NUMERIC_CHANNELS)
        .map(|name| format!("{name}_{max_len}"))
        .collect()
}

fn detect_cutoff_column(columns: &[String]) -> Option<String> {
    columns.iter().find(|c| c.contains("cutoff")).cloned()
}

fn parse_row(
    row: usize,
    values: &Map<String, Value>,
    max_len: usize,
    cutoff_column: Option<&str>,
) -> Result<PatientRecord> {
    let column = |name: &str| format!("{name}_{max_len}");

    let mut record = PatientRecord {
        event_tokens: string_list(row, values, &column("event_tokens"))?,
        type_tokens: int_list(row, values, &column("type_tokens"))?,
        age_tokens: int_list(row, values, &column("age_tokens"))?,
        time_tokens: int_list(row, values, &column("time_tokens"))?,
        visit_tokens: int_list(row, values, &column("visit_tokens"))?,
        position_tokens: int_list(row, values, &column("position_tokens"))?,
        ..Default::default()
    };

    if let Some(name) = cutoff_column {
        record.cutoff = optional_cutoff(row, name, values.get(name))?;
    }
    if let Some(value) = values.get("label") {
        record.label = optional_int(row, "label", value)?;
    }

    for (key, value) in values {
        if let Some(task) = key.strip_prefix("label_") {
            if let Some(label) = optional_int(row, key, value)? {
                record.task_labels.insert(task.to_string(), label);
            }
        } else if let Some(task) = key.strip_prefix("cutoff_") {
            let cutoff = optional_cutoff(row, key, Some(value))?;
            record.task_cutoffs.insert(task.to_string(), cutoff);
        }
    }

    Ok(record)
}

fn invalid(row: usize, column: &str, reason: impl Into<String>) -> DataError {
    DataError::InvalidValue {
        row,
        column: column.to_string(),
        reason: reason.into(),
    }
}

fn array<'a>(row: usize, values: &'a Map<String, Value>, name: &str) -> Result<&'a Vec<Value>> {
    match values.get(name) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(invalid(row, name, "expected an array")),
        None => Err(DataError::MissingColumn(name.to_string())),
    }
}

fn string_list(row: usize, values: &Map<String, Value>, name: &str) -> Result<Vec<String>> {
    array(row, values, name)?
        .iter()
        .map(|v| match v {
            Value::String(s) => Ok(s.clone()),
            other => Err(invalid(row, name, format!("expected a string, got {other}"))),
        })
        .collect()
}

fn int_list(row: usize, values: &Map<String, Value>, name: &str) -> Result<Vec<i64>> {
    array(row, values, name)?
        .iter()
        .map(|v| {
            v.as_i64()
                .ok_or_else(|| invalid(row, name, format!("expected an integer, got {v}")))
        })
        .collect()
}

fn optional_int(row: usize, name: &str, value: &Value) -> Result<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        v => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid(row, name, format!("expected an integer, got {v}"))),
    }
}

fn optional_cutoff(row: usize, name: &str, value: Option<&Value>) -> Result<Option<usize>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|c| Some(c as usize))
            .ok_or_else(|| invalid(row, name, format!("expected a non-negative integer, got {v}"))),
    }
}
