use std::path::PathBuf;
use std::sync::Arc;

use burn::backend::NdArray;
use burn::data::dataloader::batcher::Batcher;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ehr_seq_data::data::{BatchLabels, ConceptTokenizer, DatasetVariant, EhrBatch, EhrBatcher, EhrDataset, PatientTable};
use ehr_seq_data::{DatasetConfig, Result};

type InferBackend = NdArray<f32>;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Pretrain,
    PretrainDecoder,
    Finetune,
    Multi,
    MultiDecoder,
}

impl From<Mode> for DatasetVariant {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Pretrain => DatasetVariant::PretrainEncoder,
            Mode::PretrainDecoder => DatasetVariant::PretrainDecoder,
            Mode::Finetune => DatasetVariant::Finetune,
            Mode::Multi => DatasetVariant::FinetuneMultiEncoder,
            Mode::MultiDecoder => DatasetVariant::FinetuneMultiDecoder,
        }
    }
}

/// Build training examples from a patient table and report their shapes.
#[derive(Parser, Debug)]
#[command(name = "ehr-data", version)]
struct Cli {
    /// JSON-lines patient table
    #[arg(value_name = "TABLE")]
    table: PathBuf,

    #[arg(short, long, value_enum, default_value = "pretrain")]
    mode: Mode,

    /// JSON dataset config; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    max_len: Option<usize>,

    /// Comma-separated task names for multi-task modes
    #[arg(long, value_delimiter = ',')]
    tasks: Vec<String>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long, default_value_t = 8)]
    batch_size: usize,
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => DatasetConfig::from_json_file(path)?,
        None => DatasetConfig::default(),
    };
    if let Some(max_len) = cli.max_len {
        config.max_len = max_len;
    }
    if !cli.tasks.is_empty() {
        config.tasks = cli.tasks.clone();
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    let table = Arc::new(PatientTable::from_json_lines_file(&cli.table, config.max_len)?);
    let tokenizer = Arc::new(ConceptTokenizer::fit_table(&table)?);
    info!(vocab_size = tokenizer.vocab_size, "Fitted concept tokenizer");

    let dataset = EhrDataset::new(table, tokenizer, cli.mode.into(), config)?;
    for (task, count) in dataset.task_to_index().counts() {
        info!(task, examples = count, "Task examples");
    }

    let items = (0..dataset.len().min(cli.batch_size))
        .map(|i| dataset.try_get(i))
        .collect::<Result<Vec<_>>>()?;
    if items.is_empty() {
        info!("Dataset is empty, nothing to batch");
        return Ok(());
    }

    let device = Default::default();
    let batch: EhrBatch<InferBackend> = EhrBatcher::new().batch(items, &device);
    let [b, s] = batch.concept_ids.dims();
    let labels = match &batch.labels {
        BatchLabels::Tokens(t) => format!("{:?}", t.dims()),
        BatchLabels::Scalar(t) => format!("{:?}", t.dims()),
    };
    info!(
        batch = b,
        seq_len = s,
        labels = %labels,
        attention_mask = batch.attention_mask.is_some(),
        tasks = ?batch.tasks,
        "First batch OK"
    );
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Cli::parse()) {
        error!(error = %e, "ehr-data failed");
        std::process::exit(1);
    }
}
