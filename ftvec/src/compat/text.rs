//! Readers and writers for text formats.
//!
//! This module provides two readers/writers:
//!
//! 1. `ReadTextDims`/`WriteTextDims`: the format the fastText trainer
//!    writes to `.vec` files. The data is preceded by a line with the
//!    shape of the embedding matrix. This format is also used by
//!    word2vec's text output.
//! 2. `ReadText`/`WriteText`: the same format without the shape line,
//!    as used by GloVe.
//!
//! In both formats, each line contains a word followed by its
//! embedding. The word and the vector components are separated by a
//! space.

use std::io::{BufRead, Write};

use itertools::Itertools;
use ndarray::{Array2, CowArray};

use crate::embeddings::Embeddings;
use crate::error::{Error, Result};
use crate::norms::NdNorms;
use crate::storage::{NdArray, Storage, StorageViewMut};
use crate::util::{l2_normalize_array, read_number};
use crate::vocab::{SimpleVocab, Vocab};

/// Read embeddings from a text stream.
///
/// The text should contain one word embedding per line in the
/// following format:
///
/// *word0 component_1 component_2 ... component_n*
pub trait ReadText<R>
where
    Self: Sized,
    R: BufRead,
{
    /// Read the embeddings from the given buffered reader.
    fn read_text(reader: &mut R) -> Result<Self>;

    /// Read the embeddings from the given buffered reader.
    ///
    /// In contrast to `read_text`, this constructor does not fail
    /// when a token contains invalid UTF-8. Instead, invalid UTF-8
    /// is replaced by the replacement character.
    fn read_text_lossy(reader: &mut R) -> Result<Self>;
}

impl<R> ReadText<R> for Embeddings<SimpleVocab, NdArray>
where
    R: BufRead,
{
    fn read_text(reader: &mut R) -> Result<Self> {
        let (metadata, vocab, mut storage, _) = Self::read_text_raw(reader, false)?.into_parts();
        let norms = NdNorms(l2_normalize_array(storage.view_mut()));

        Ok(Embeddings::new(metadata, vocab, storage, norms))
    }

    fn read_text_lossy(reader: &mut R) -> Result<Self> {
        let (metadata, vocab, mut storage, _) = Self::read_text_raw(reader, true)?.into_parts();
        let norms = NdNorms(l2_normalize_array(storage.view_mut()));

        Ok(Embeddings::new(metadata, vocab, storage, norms))
    }
}

pub(crate) trait ReadTextRaw<R>
where
    Self: Sized,
    R: BufRead,
{
    /// Read the unnormalized embeddings from the given buffered reader.
    fn read_text_raw(reader: &mut R, lossy: bool) -> Result<Self>;
}

impl<R> ReadTextRaw<R> for Embeddings<SimpleVocab, NdArray>
where
    R: BufRead,
{
    fn read_text_raw(reader: &mut R, lossy: bool) -> Result<Self> {
        read_embeds(reader, None, lossy)
    }
}

/// Read embeddings from a text stream with a leading shape line.
///
/// The first line of the stream must hold the shape of the embedding
/// matrix:
///
/// *vocab_size n_components*
///
/// The remainder of the stream contains one word embedding per line,
/// as in [`ReadText`]. This is the format the fastText trainer writes
/// to `.vec` files.
pub trait ReadTextDims<R>
where
    Self: Sized,
    R: BufRead,
{
    /// Read the embeddings from the given buffered reader.
    fn read_text_dims(reader: &mut R) -> Result<Self>;

    /// Read the embeddings from the given buffered reader.
    ///
    /// In contrast to `read_text_dims`, this constructor does not
    /// fail when a token contains invalid UTF-8. Instead, invalid
    /// UTF-8 is replaced by the replacement character.
    fn read_text_dims_lossy(reader: &mut R) -> Result<Self>;
}

impl<R> ReadTextDims<R> for Embeddings<SimpleVocab, NdArray>
where
    R: BufRead,
{
    fn read_text_dims(reader: &mut R) -> Result<Self> {
        let (metadata, vocab, mut storage, _) =
            Self::read_text_dims_raw(reader, false)?.into_parts();
        let norms = NdNorms(l2_normalize_array(storage.view_mut()));

        Ok(Embeddings::new(metadata, vocab, storage, norms))
    }

    fn read_text_dims_lossy(reader: &mut R) -> Result<Self> {
        let (metadata, vocab, mut storage, _) =
            Self::read_text_dims_raw(reader, true)?.into_parts();
        let norms = NdNorms(l2_normalize_array(storage.view_mut()));

        Ok(Embeddings::new(metadata, vocab, storage, norms))
    }
}

pub(crate) trait ReadTextDimsRaw<R>
where
    Self: Sized,
    R: BufRead,
{
    /// Read the unnormalized embeddings from the given buffered reader.
    fn read_text_dims_raw(reader: &mut R, lossy: bool) -> Result<Self>;
}

impl<R> ReadTextDimsRaw<R> for Embeddings<SimpleVocab, NdArray>
where
    R: BufRead,
{
    fn read_text_dims_raw(reader: &mut R, lossy: bool) -> Result<Self> {
        let n_words = read_number(reader, b' ')?;
        let embed_len = read_number(reader, b'\n')?;

        read_embeds(reader, Some((n_words, embed_len)), lossy)
    }
}

fn read_embeds<R>(
    reader: &mut R,
    shape: Option<(usize, usize)>,
    lossy: bool,
) -> Result<Embeddings<SimpleVocab, NdArray>>
where
    R: BufRead,
{
    let (mut words, mut data) = if let Some((n_words, dims)) = shape {
        (
            Vec::with_capacity(n_words),
            Vec::with_capacity(n_words * dims),
        )
    } else {
        (Vec::new(), Vec::new())
    };

    loop {
        let mut buf = Vec::new();
        match reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| Error::read_error("Cannot read line from embedding file", e))?
        {
            0 => break,
            n => {
                if buf[n - 1] == b'\n' {
                    buf.pop();
                }
            }
        };

        let line = if lossy {
            String::from_utf8_lossy(&buf).into_owned()
        } else {
            String::from_utf8(buf)
                .map_err(|e| Error::Format(format!("Token contains invalid UTF-8: {}", e)))?
        };

        let mut parts = line
            .split(|c: char| c.is_ascii_whitespace())
            .filter(|part| !part.is_empty());

        let word = parts
            .next()
            .ok_or_else(|| Error::Format(String::from("Spurious empty line")))?
            .trim_matches(|c: char| c.is_ascii_whitespace());
        words.push(word.to_owned());

        for part in parts {
            data.push(part.parse().map_err(|e| {
                Error::Format(format!("Cannot parse vector component '{}': {}", part, e))
            })?);
        }
    }

    let shape = if let Some((n_words, dims)) = shape {
        if words.len() != n_words {
            return Err(Error::Format(format!(
                "Incorrect vocabulary size, expected: {}, got: {}",
                n_words,
                words.len()
            )));
        }

        if data.len() / n_words != dims {
            return Err(Error::Format(format!(
                "Incorrect embedding dimensionality, expected: {}, got: {}",
                dims,
                data.len() / n_words,
            )));
        };

        (n_words, dims)
    } else {
        if words.is_empty() {
            return Err(Error::Format(String::from("Cannot read empty embedding file")));
        }

        let dims = data.len() / words.len();
        (words.len(), dims)
    };

    let matrix = Array2::from_shape_vec(shape, data)?;

    Ok(Embeddings::new_without_norms(
        None,
        SimpleVocab::new(words),
        NdArray::new(matrix),
    ))
}

/// Write embeddings as text.
///
/// The written text contains one word embedding per line in the
/// following format:
///
/// *word0 component_1 component_2 ... component_n*
pub trait WriteText<W>
where
    W: Write,
{
    /// Write the embeddings to the given writer.
    ///
    /// If `unnormalize` is `true`, the norms are used to restore the
    /// original vector magnitudes.
    fn write_text(&self, writer: &mut W, unnormalize: bool) -> Result<()>;
}

impl<W, V, S> WriteText<W> for Embeddings<V, S>
where
    W: Write,
    V: Vocab,
    S: Storage,
{
    fn write_text(&self, write: &mut W, unnormalize: bool) -> Result<()> {
        for (word, embed_norm) in self.iter_with_norms() {
            let embed = if unnormalize {
                CowArray::from(embed_norm.into_unnormalized())
            } else {
                embed_norm.embedding
            };

            let embed_str = embed.view().iter().map(ToString::to_string).join(" ");
            writeln!(write, "{} {}", word, embed_str)
                .map_err(|e| Error::write_error("Cannot write word embedding", e))?;
        }

        Ok(())
    }
}

/// Write embeddings as text, preceded by the matrix shape.
pub trait WriteTextDims<W>
where
    W: Write,
{
    /// Write the embeddings to the given writer.
    ///
    /// If `unnormalize` is `true`, the norms are used to restore the
    /// original vector magnitudes.
    fn write_text_dims(&self, writer: &mut W, unnormalize: bool) -> Result<()>;
}

impl<W, V, S> WriteTextDims<W> for Embeddings<V, S>
where
    W: Write,
    V: Vocab,
    S: Storage,
{
    fn write_text_dims(&self, write: &mut W, unnormalize: bool) -> Result<()> {
        writeln!(write, "{} {}", self.vocab().words_len(), self.dims())
            .map_err(|e| Error::write_error("Cannot write word embedding matrix shape", e))?;
        self.write_text(write, unnormalize)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use approx::assert_abs_diff_eq;

    use super::{ReadText, ReadTextDims, ReadTextDimsRaw, ReadTextRaw, WriteText, WriteTextDims};
    use crate::embeddings::Embeddings;
    use crate::storage::{NdArray, StorageView};
    use crate::vocab::{SimpleVocab, Vocab};

    const TEST_TEXT: &str = "boot 1 0 0\nschip 0.8 0.2 0\nauto -1 0 0.5\n";
    const TEST_TEXT_DIMS: &str = "3 3\nboot 1 0 0\nschip 0.8 0.2 0\nauto -1 0 0.5\n";

    fn read_text_fixture() -> Embeddings<SimpleVocab, NdArray> {
        Embeddings::read_text_raw(&mut Cursor::new(TEST_TEXT), false).unwrap()
    }

    #[test]
    fn read_text() {
        let embeddings = read_text_fixture();
        assert_eq!(embeddings.vocab().words(), &["boot", "schip", "auto"]);
        assert_eq!(embeddings.dims(), 3);
        assert_abs_diff_eq!(
            embeddings.storage().view()[(0, 0)],
            1f32,
            epsilon = 1e-6
        );
    }

    #[test]
    fn read_text_dims() {
        let dims_embeddings =
            Embeddings::read_text_dims_raw(&mut Cursor::new(TEST_TEXT_DIMS), false).unwrap();
        let embeddings = read_text_fixture();

        assert_eq!(dims_embeddings.vocab().words(), embeddings.vocab().words());
        assert_eq!(
            dims_embeddings.storage().view(),
            embeddings.storage().view()
        );
    }

    #[test]
    fn read_text_normalizes_embeddings() {
        let embeddings = Embeddings::read_text(&mut Cursor::new(TEST_TEXT)).unwrap();
        for (_, embedding) in &embeddings {
            assert_abs_diff_eq!(
                embedding.view().dot(&embedding.view()),
                1f32,
                epsilon = 1e-5
            );
        }
    }

    #[test]
    fn read_text_dims_rejects_wrong_vocab_size() {
        let text = "4 3\nboot 1 0 0\nschip 0.8 0.2 0\n";
        assert!(Embeddings::read_text_dims(&mut Cursor::new(text)).is_err());
    }

    #[test]
    fn read_text_dims_rejects_wrong_dims() {
        let text = "2 4\nboot 1 0 0\nschip 0.8 0.2 0\n";
        assert!(Embeddings::read_text_dims(&mut Cursor::new(text)).is_err());
    }

    #[test]
    fn read_text_rejects_garbage_components() {
        let text = "boot 1 niet 0\n";
        assert!(Embeddings::read_text(&mut Cursor::new(text)).is_err());
    }

    #[test]
    fn fails_on_invalid_utf8() {
        let mut text = b"boot 1 0 0\nsch".to_vec();
        text.push(0xfd);
        text.extend_from_slice(b"p 0.8 0.2 0\n");
        assert!(Embeddings::read_text(&mut Cursor::new(&text)).is_err());
    }

    #[test]
    fn read_lossy_replaces_invalid_utf8() {
        let mut text = b"boot 1 0 0\nsch".to_vec();
        text.push(0xfd);
        text.extend_from_slice(b"p 0.8 0.2 0\n");
        let embeddings = Embeddings::read_text_lossy(&mut Cursor::new(&text)).unwrap();
        let words = embeddings.vocab().words();
        assert_eq!(words, &["boot", "sch\u{fffd}p"]);
    }

    #[test]
    fn text_roundtrip() {
        let embeddings = read_text_fixture();

        let mut output = Vec::new();
        embeddings.write_text(&mut output, false).unwrap();

        assert_eq!(TEST_TEXT, String::from_utf8_lossy(&output));
    }

    #[test]
    fn text_dims_roundtrip() {
        let embeddings =
            Embeddings::read_text_dims_raw(&mut Cursor::new(TEST_TEXT_DIMS), false).unwrap();

        let mut output = Vec::new();
        embeddings.write_text_dims(&mut output, false).unwrap();

        assert_eq!(TEST_TEXT_DIMS, String::from_utf8_lossy(&output));
    }

    #[test]
    fn unnormalized_write_restores_magnitudes() {
        // Read with normalization, write the unnormalized vectors
        // back, and compare against a raw read.
        let check = read_text_fixture();
        let embeddings = Embeddings::read_text(&mut Cursor::new(TEST_TEXT)).unwrap();

        let mut output = Vec::new();
        embeddings.write_text(&mut output, true).unwrap();

        let restored = Embeddings::read_text_raw(&mut Cursor::new(&output), false).unwrap();

        for (restored_row, check_row) in restored
            .storage()
            .view()
            .outer_iter()
            .zip(check.storage().view().outer_iter())
        {
            for (a, b) in restored_row.iter().zip(check_row.iter()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
            }
        }
    }
}
