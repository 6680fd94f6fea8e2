use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ftvec::config::{Loss, Model, TrainParams};
use ftvec::prelude::*;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModelArg {
    Skipgram,
    Cbow,
    Supervised,
}

impl From<ModelArg> for Model {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Skipgram => Model::SkipGram,
            ModelArg::Cbow => Model::Cbow,
            ModelArg::Supervised => Model::Supervised,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LossArg {
    Ns,
    Hs,
    Softmax,
}

impl From<LossArg> for Loss {
    fn from(arg: LossArg) -> Self {
        match arg {
            LossArg::Ns => Loss::NegativeSampling,
            LossArg::Hs => Loss::HierarchicalSoftmax,
            LossArg::Softmax => Loss::Softmax,
        }
    }
}

#[derive(Parser)]
#[command(name = "fv-train")]
#[command(about = "Train a fastText model through the fastText command-line tool")]
#[command(version)]
struct Cli {
    /// Training corpus, one sentence per line.
    corpus: PathBuf,

    /// Output base path; <base>.bin and <base>.vec are written.
    output: PathBuf,

    /// Path of the fastText binary (FASTTEXT_BIN or PATH when absent).
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Model type.
    #[arg(long, value_enum, default_value = "skipgram")]
    model: ModelArg,

    /// Loss function.
    #[arg(long, value_enum, default_value = "ns")]
    loss: LossArg,

    /// Embedding dimensionality.
    #[arg(long, default_value_t = 100)]
    dim: u32,

    /// Number of training epochs.
    #[arg(long, default_value_t = 5)]
    epoch: u32,

    /// Minimal number of word occurrences.
    #[arg(long, default_value_t = 5)]
    min_count: u32,

    /// Minimal character n-gram length.
    #[arg(long, default_value_t = 3)]
    minn: u32,

    /// Maximal character n-gram length.
    #[arg(long, default_value_t = 6)]
    maxn: u32,

    /// Learning rate.
    #[arg(long, default_value_t = 0.05)]
    lr: f64,

    /// Number of trainer threads.
    #[arg(long, default_value_t = 12)]
    threads: u32,

    /// Also write the loaded model in the native format.
    #[arg(long)]
    native: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let params = TrainParams {
        model: cli.model.into(),
        loss: cli.loss.into(),
        dims: cli.dim,
        epochs: cli.epoch,
        min_count: cli.min_count,
        min_n: cli.minn,
        max_n: cli.maxn,
        lr: cli.lr,
        threads: cli.threads,
        ..TrainParams::default()
    };

    let trainer = match cli.binary {
        Some(binary) => FastTextCli::new(binary),
        None => FastTextCli::from_env(),
    };

    let model = trainer.train(&params, &cli.corpus, &cli.output)?;

    let embeddings = model.load().with_context(|| {
        format!(
            "Cannot load trained model: {}",
            model.bin_path().display()
        )
    })?;

    println!(
        "Trained {} embeddings of dimensionality {}",
        embeddings.len(),
        embeddings.dims()
    );
    println!("Binary model: {}", model.bin_path().display());
    println!("Text vectors: {}", model.vec_path().display());

    if let Some(native) = cli.native {
        let f = File::create(&native)
            .with_context(|| format!("Cannot create output file: {}", native.display()))?;
        let mut writer = BufWriter::new(f);
        embeddings.write_embeddings(&mut writer)?;
        println!("Native model: {}", native.display());
    }

    Ok(())
}
