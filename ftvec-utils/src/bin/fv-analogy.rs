use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ftvec::prelude::*;
use ftvec_utils::{read_embeddings, EmbeddingFormat};

#[derive(Parser)]
#[command(name = "fv-analogy")]
#[command(about = "Answer analogy queries: a is to b as c is to ?")]
#[command(version)]
struct Cli {
    /// Embeddings file.
    embeddings: PathBuf,

    /// Embedding format.
    #[arg(short, long, value_enum, default_value = "ftvec")]
    format: EmbeddingFormat,

    /// Return K answers per query.
    #[arg(short = 'k', long, default_value_t = 10)]
    answers: usize,

    /// Input queries, three words per line (stdin when absent).
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
        let line = line.context("Cannot read line")?;
        let words: Vec<_> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        if words.len() != 3 {
            eprintln!("Expected 3 query words, got: {}", words.len());
            continue;
        }

        match embeddings.analogy([words[0], words[1], words[2]], cli.answers, None) {
            Ok(results) => {
                for answer in results {
                    println!("{}\t{}", answer.word(), answer.cosine_similarity());
                }
            }
            Err(present) => {
                let missing: Vec<_> = words
                    .iter()
                    .zip(present.iter())
                    .filter(|(_, &present)| !present)
                    .map(|(&word, _)| word)
                    .collect();
                eprintln!("Cannot compute embeddings for: {}", missing.join(", "));
            }
        }
    }

    Ok(())
}
