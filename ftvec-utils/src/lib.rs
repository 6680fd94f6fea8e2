//! Shared helpers for the ftvec command-line tools.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use ftvec::prelude::*;

/// Embedding file formats supported by the tools.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum EmbeddingFormat {
    /// fastText binary model (`.bin`).
    #[value(name = "fasttext")]
    FastText,
    /// Text, one word and its vector per line.
    Text,
    /// Text with a leading shape line (`.vec`).
    #[value(name = "textdims")]
    TextDims,
    /// The native ftvec format.
    Ftvec,
}

/// Read embeddings from a file in the given format.
pub fn read_embeddings(
    path: &Path,
    format: EmbeddingFormat,
) -> Result<Embeddings<VocabWrap, NdArray>> {
    let f = File::open(path)
        .with_context(|| format!("Cannot open embeddings file: {}", path.display()))?;
    let mut reader = BufReader::new(f);

    let embeddings = match format {
        EmbeddingFormat::FastText => Embeddings::read_fasttext(&mut reader)?.into(),
        EmbeddingFormat::Text => Embeddings::read_text(&mut reader)?.into(),
        EmbeddingFormat::TextDims => Embeddings::read_text_dims(&mut reader)?.into(),
        EmbeddingFormat::Ftvec => Embeddings::read_embeddings(&mut reader)?,
    };

    Ok(embeddings)
}

/// Write embeddings to a file in the given format.
pub fn write_embeddings(
    embeddings: &Embeddings<VocabWrap, NdArray>,
    path: &Path,
    format: EmbeddingFormat,
    unnormalize: bool,
) -> Result<()> {
    let f = File::create(path)
        .with_context(|| format!("Cannot create embeddings file: {}", path.display()))?;
    let mut writer = BufWriter::new(f);

    match format {
        EmbeddingFormat::FastText => {
            bail!("Writing fastText binary models is not supported")
        }
        EmbeddingFormat::Text => embeddings.write_text(&mut writer, unnormalize)?,
        EmbeddingFormat::TextDims => embeddings.write_text_dims(&mut writer, unnormalize)?,
        EmbeddingFormat::Ftvec => embeddings.write_embeddings(&mut writer)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::EmbeddingFormat;

    #[test]
    fn format_names_parse() {
        assert_eq!(
            EmbeddingFormat::from_str("fasttext", false).unwrap(),
            EmbeddingFormat::FastText
        );
        assert_eq!(
            EmbeddingFormat::from_str("textdims", false).unwrap(),
            EmbeddingFormat::TextDims
        );
        assert_eq!(
            EmbeddingFormat::from_str("ftvec", false).unwrap(),
            EmbeddingFormat::Ftvec
        );
        assert!(EmbeddingFormat::from_str("word2vec", false).is_err());
    }
}
