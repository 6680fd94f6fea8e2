use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ftvec_utils::{read_embeddings, write_embeddings, EmbeddingFormat};

#[derive(Parser)]
#[command(name = "fv-convert")]
#[command(about = "Convert embeddings between formats")]
#[command(version)]
struct Cli {
    /// Input embeddings file.
    input: PathBuf,

    /// Output embeddings file.
    output: PathBuf,

    /// Input format.
    #[arg(short = 'f', long, value_enum, default_value = "textdims")]
    from: EmbeddingFormat,

    /// Output format.
    #[arg(short = 't', long, value_enum, default_value = "ftvec")]
    to: EmbeddingFormat,

    /// Write unnormalized vectors to text formats.
    #[arg(long)]
    unnormalized: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let embeddings = read_embeddings(&cli.input, cli.from)?;
    write_embeddings(&embeddings, &cli.output, cli.to, cli.unnormalized)?;

    Ok(())
}
