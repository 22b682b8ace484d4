/// All errors that can occur while building or reading a patient dataset.
///
/// Missing per-task labels are not errors: they are expected sparsity and are
/// filtered out when the multi-task index is built.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// A task was requested that the tokenizer (or the task-index table) does not know.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// The parallel channels of one record do not share a length.
    #[error("row {row}: channel `{channel}` has {got} elements, expected {expected}")]
    ChannelLengthMismatch {
        row: usize,
        channel: &'static str,
        expected: usize,
        got: usize,
    },

    /// Retrieval index outside `[0, len)`.
    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A column the requested dataset needs is absent from the table.
    #[error("missing column `{0}`")]
    MissingColumn(String),

    /// A value could not be interpreted (wrong JSON type, negative cutoff, ...).
    #[error("row {row}, column `{column}`: {reason}")]
    InvalidValue {
        row: usize,
        column: String,
        reason: String,
    },

    /// Balance ratio outside `(0, 1]`.
    #[error("invalid positive ratio {ratio} for task `{task}`: must be in (0, 1]")]
    InvalidRatio { task: String, ratio: f64 },

    /// Inconsistent configuration.
    #[error("config: {0}")]
    Config(String),

    #[error("tokenizer: {0}")]
    Tokenizer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DataError {
    /// Build a config error from any message.
    pub fn config(msg: impl Into<String>) -> Self {
        DataError::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
