use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ftvec::prelude::*;
use ftvec_utils::{read_embeddings, EmbeddingFormat};

#[derive(Parser)]
#[command(name = "fv-similar")]
#[command(about = "Find words that are similar to query words")]
#[command(version)]
struct Cli {
    /// Embeddings file.
    embeddings: PathBuf,

    /// Embedding format.
    #[arg(short, long, value_enum, default_value = "ftvec")]
    format: EmbeddingFormat,

    /// Return K nearest neighbors.
    #[arg(short = 'k', long, default_value_t = 10)]
    neighbors: usize,

    /// Input words, one per line (stdin when absent).
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let embeddings = read_embeddings(&cli.embeddings, cli.format)?;

    let reader: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(File::open(path).with_context(|| {
            format!("Cannot open input file: {}", path.display())
        })?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    for line in reader.lines() {
        let line = line.context("Cannot read line")?.trim().to_owned();
        if line.is_empty() {
            continue;
        }

        let results = match embeddings.word_similarity(&line, cli.neighbors, None) {
            Some(results) => results,
            None => {
                eprintln!("Cannot compute embedding for: {}", line);
                continue;
            }
        };

        for similar in results {
            println!("{}\t{}", similar.word(), similar.cosine_similarity());
        }
    }

    Ok(())
}
