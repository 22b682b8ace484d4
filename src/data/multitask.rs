use std::collections::BTreeMap;

use rand::seq::index;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::data::record::PatientTable;
use crate::error::{DataError, Result};

/// Default value marking a missing per-task label.
pub const MISSING_LABEL: i64 = -1;

/// Fixed task order used by multi-head decoders.
pub const TASK_TO_INDEX: [(&str, i64); 6] = [
    ("mortality_1month", 0),
    ("readmission_1month", 1),
    ("los_1week", 2),
    ("c0", 3),
    ("c1", 4),
    ("c2", 5),
];

/// Position of `task` in [`TASK_TO_INDEX`].
pub fn task_index(task: &str) -> Result<i64> {
    TASK_TO_INDEX
        .iter()
        .find(|(name, _)| *name == task)
        .map(|(_, index)| *index)
        .ok_or_else(|| DataError::UnknownTask(task.to_string()))
}

/// One trainable (patient, task) example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleDescriptor {
    /// Dense row index into the patient table.
    pub index: usize,
    pub task: String,
    pub label: i64,
    /// Task-specific cutoff; `None` means the full history.
    pub cutoff: Option<usize>,
}

/// Per-task descriptor lists, kept in the caller's task order.
#[derive(Debug, Clone, Default)]
pub struct TaskIndex {
    tasks: Vec<(String, Vec<ExampleDescriptor>)>,
}

impl TaskIndex {
    /// Scans `table` once and collects a descriptor for every (patient, task)
    /// pair whose label is present and differs from `missing_label`.
    ///
    /// A task listed twice is indexed once.
    pub fn build(table: &PatientTable, tasks: &[String], missing_label: i64) -> Result<Self> {
        let mut entries: Vec<(String, Vec<ExampleDescriptor>, bool)> = Vec::with_capacity(tasks.len());
        for task in tasks {
            if entries.iter().any(|(name, _, _)| name == task) {
                warn!(task = %task, "Task listed more than once, indexing it once");
                continue;
            }
            let label_col = format!("label_{task}");
            if !table.has_column(&label_col) {
                return Err(DataError::MissingColumn(label_col));
            }
            let has_cutoff = table.has_column(&format!("cutoff_{task}"));
            entries.push((task.clone(), Vec::new(), has_cutoff));
        }

        for (row, patient) in table.records().iter().enumerate() {
            for (task, descriptors, has_cutoff) in entries.iter_mut() {
                let label = match patient.task_labels.get(task.as_str()) {
                    Some(&label) if label != missing_label => label,
                    _ => continue,
                };
                let cutoff = if *has_cutoff {
                    patient.task_cutoffs.get(task.as_str()).copied().flatten()
                } else {
                    None
                };
                descriptors.push(ExampleDescriptor {
                    index: row,
                    task: task.clone(),
                    label,
                    cutoff,
                });
            }
        }

        let index = Self {
            tasks: entries
                .into_iter()
                .map(|(task, descriptors, _)| (task, descriptors))
                .collect(),
        };
        for (task, descriptors) in &index.tasks {
            debug!(task = %task, examples = descriptors.len(), "Indexed task");
        }
        Ok(index)
    }

    /// Subsamples negatives so each listed task reaches its target positive ratio.
    ///
    /// For a ratio `r` with `P` positives and `N` negatives, keeps
    /// `clamp(round(P / r) - P, 0, N)` negatives drawn without replacement; the
    /// new list is all positives followed by the kept negatives in draw order.
    /// A task without positives loses every negative.
    pub fn balance<R: Rng + ?Sized>(&mut self, guide: &BTreeMap<String, f64>, rng: &mut R) -> Result<()> {
        for (task, &ratio) in guide {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(DataError::InvalidRatio {
                    task: task.clone(),
                    ratio,
                });
            }
            let descriptors = self
                .tasks
                .iter_mut()
                .find(|(name, _)| name == task)
                .map(|(_, descriptors)| descriptors)
                .ok_or_else(|| DataError::UnknownTask(task.clone()))?;

            let (mut positives, negatives): (Vec<_>, Vec<_>) = descriptors
                .drain(..)
                .filter(|d| d.label == 0 || d.label == 1)
                .partition(|d| d.label == 1);

            let num_positives = positives.len();
            let needed = (num_positives as f64 / ratio).round() as usize;
            let keep = needed.saturating_sub(num_positives).min(negatives.len());
            if num_positives == 0 {
                warn!(task = %task, negatives = negatives.len(), "No positives, dropping all negatives");
            }

            let sampled = index::sample(rng, negatives.len(), keep);
            positives.extend(sampled.iter().map(|i| negatives[i].clone()));
            *descriptors = positives;

            info!(
                task = %task,
                ratio,
                positives = num_positives,
                negatives_kept = keep,
                negatives_dropped = negatives.len() - keep,
                "Balanced task labels"
            );
        }
        Ok(())
    }

    /// Concatenates every task's descriptors in task order.
    pub fn flatten(&self) -> Vec<ExampleDescriptor> {
        self.tasks
            .iter()
            .flat_map(|(_, descriptors)| descriptors.iter().cloned())
            .collect()
    }

    pub fn get(&self, task: &str) -> Option<&[ExampleDescriptor]> {
        self.tasks
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, descriptors)| descriptors.as_slice())
    }

    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|(name, _)| name.as_str())
    }

    /// `(task, example count)` in task order.
    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.tasks
            .iter()
            .map(|(name, descriptors)| (name.as_str(), descriptors.len()))
            .collect()
    }
}
