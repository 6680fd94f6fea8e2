//! Reader for the fastText binary model format.
//!
//! The `.bin` file a trainer invocation produces contains the training
//! configuration, the vocabulary, and a matrix holding the word rows
//! followed by the subword bucket rows. fastText stores word
//! embeddings without their subword contributions; they are averaged
//! in at load time, so lookups behave like fastText's own.

use std::io::BufRead;

use byteorder::{LittleEndian, ReadBytesExt};
use ndarray::{s, Array2, ErrorKind as ShapeErrorKind, ShapeError};
use serde::Serialize;
use toml::Value;

use crate::config::{Loss, Model};
use crate::embeddings::Embeddings;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::norms::NdNorms;
use crate::storage::{NdArray, Storage, StorageViewMut};
use crate::subword::SubwordIndexer;
use crate::util::{l2_normalize_array, read_string};
use crate::vocab::{SubwordVocab, Vocab};

const FASTTEXT_FILEFORMAT_MAGIC: u32 = 793_712_314;
const FASTTEXT_VERSION: u32 = 12;

/// Read embeddings in the fastText binary format.
pub trait ReadFastText
where
    Self: Sized,
{
    /// Read embeddings in the fastText binary format.
    fn read_fasttext(reader: &mut impl BufRead) -> Result<Self>;
}

impl ReadFastText for Embeddings<SubwordVocab, NdArray> {
    fn read_fasttext(mut reader: &mut impl BufRead) -> Result<Self> {
        let magic = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read fastText magic", e))?;
        if magic != FASTTEXT_FILEFORMAT_MAGIC {
            return Err(Error::Format(format!(
                "Expected {} as magic, got: {}",
                FASTTEXT_FILEFORMAT_MAGIC, magic
            )));
        }

        let version = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read fastText version", e))?;
        if version > FASTTEXT_VERSION {
            return Err(Error::Format(format!(
                "Expected version <= {}, got: {}",
                FASTTEXT_VERSION, version
            )));
        }

        let config = Config::read(&mut reader)?;

        let vocab = read_vocab(&config, &mut reader)?;

        let is_quantized = reader
            .read_u8()
            .map_err(|e| Error::read_error("Cannot read quantization information", e))?;
        if is_quantized == 1 {
            return Err(Error::Format(String::from(
                "Quantized fastText models are not supported",
            )));
        }

        // Read and prepare storage.
        let mut storage = read_matrix(&mut reader)?;

        // Verify that vocab and storage shapes match.
        if storage.shape().0 != vocab.words_len() + config.buckets as usize {
            return Err(Error::Shape(ShapeError::from_kind(
                ShapeErrorKind::IncompatibleShape,
            )));
        }

        add_subword_embeddings(&vocab, &mut storage);
        let norms = NdNorms(l2_normalize_array(
            storage.view_mut().slice_mut(s![0..vocab.words_len(), ..]),
        ));

        let metadata = Value::try_from(config)
            .map_err(|e| Error::Format(format!("Cannot serialize model metadata to TOML: {}", e)))?;

        Ok(Embeddings::new(
            Some(Metadata(metadata)),
            vocab,
            storage,
            norms,
        ))
    }
}

/// Persisted fastText model configuration.
#[derive(Clone, Copy, Debug, Serialize)]
struct Config {
    dims: u32,
    window_size: u32,
    epoch: u32,
    min_count: u32,
    neg: u32,
    word_ngrams: u32,
    loss: Loss,
    model: Model,
    buckets: u32,
    min_n: u32,
    max_n: u32,
    lr_update_rate: u32,
    sampling_threshold: f64,
}

impl Config {
    fn read<R>(reader: &mut R) -> Result<Config>
    where
        R: BufRead,
    {
        let dims = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read number of dimensions", e))?;
        let window_size = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read window size", e))?;
        let epoch = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read number of epochs", e))?;
        let min_count = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read minimum count", e))?;
        let neg = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read negative samples", e))?;
        let word_ngrams = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read word n-gram length", e))?;
        let loss = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read loss type", e))?;
        let loss =
            Loss::from_u32(loss).ok_or_else(|| Error::Format(format!("Unknown loss: {}", loss)))?;
        let model = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read model type", e))?;
        let model = Model::from_u32(model)
            .ok_or_else(|| Error::Format(format!("Unknown model: {}", model)))?;
        let buckets = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read number of buckets", e))?;
        let min_n = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read minimum subword length", e))?;
        let max_n = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read maximum subword length", e))?;
        let lr_update_rate = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read LR update rate", e))?;
        let sampling_threshold = reader
            .read_f64::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read sampling threshold", e))?;

        Ok(Config {
            dims,
            window_size,
            epoch,
            min_count,
            neg,
            word_ngrams,
            loss,
            model,
            buckets,
            min_n,
            max_n,
            lr_update_rate,
            sampling_threshold,
        })
    }
}

/// Add subword embeddings to word embeddings.
///
/// fastText stores word embeddings without subword embeddings. This
/// function adds the subword embeddings.
fn add_subword_embeddings(vocab: &SubwordVocab, embeds: &mut NdArray) {
    for (idx, word) in vocab.words().iter().enumerate() {
        if let Some(indices) = vocab.subword_indices(word) {
            let n_embeds = indices.len() + 1;

            // Sum the embedding and its subword embeddings.
            let mut embed = embeds.embedding(idx).into_owned();
            for subword_idx in indices {
                embed += &embeds.embedding(subword_idx).view();
            }

            // Compute the average embedding.
            embed /= n_embeds as f32;

            embeds.view_mut().row_mut(idx).assign(&embed);
        }
    }
}

/// Read the embedding matrix.
fn read_matrix<R>(reader: &mut R) -> Result<NdArray>
where
    R: BufRead,
{
    let m = reader
        .read_u64::<LittleEndian>()
        .map_err(|e| Error::read_error("Cannot read number of embedding matrix rows", e))?;
    let m = usize::try_from(m).map_err(|_| Error::Overflow)?;
    let n = reader
        .read_u64::<LittleEndian>()
        .map_err(|e| Error::read_error("Cannot read number of embedding matrix columns", e))?;
    let n = usize::try_from(n).map_err(|_| Error::Overflow)?;

    let mut data = vec![0.0; m * n];
    reader
        .read_f32_into::<LittleEndian>(&mut data)
        .map_err(|e| Error::read_error("Cannot read embeddings", e))?;

    let data = Array2::from_shape_vec((m, n), data)?;

    Ok(NdArray::new(data))
}

/// Read the vocabulary.
fn read_vocab<R>(config: &Config, reader: &mut R) -> Result<SubwordVocab>
where
    R: BufRead,
{
    let size = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| Error::read_error("Cannot read vocabulary size", e))?;
    reader
        .read_u32::<LittleEndian>()
        .map_err(|e| Error::read_error("Cannot read number of words", e))?;

    let n_labels = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| Error::read_error("Cannot read number of labels", e))?;
    if n_labels > 0 {
        return Err(Error::Format(String::from(
            "fastText prediction models are not supported",
        )));
    }

    reader
        .read_u64::<LittleEndian>()
        .map_err(|e| Error::read_error("Cannot read number of tokens", e))?;

    let prune_idx_size = reader
        .read_i64::<LittleEndian>()
        .map_err(|e| Error::read_error("Cannot read pruned vocabulary size", e))?;
    if prune_idx_size > 0 {
        return Err(Error::Format(String::from(
            "Pruned vocabularies are not supported",
        )));
    }

    let mut words = Vec::with_capacity(size as usize);
    for _ in 0..size {
        let word = read_string(reader, 0, false)?;
        reader
            .read_u64::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read word frequency", e))?;
        let entry_type = reader
            .read_u8()
            .map_err(|e| Error::read_error("Cannot read entry type", e))?;
        if entry_type != 0 {
            return Err(Error::Format(String::from("Non-word entry")));
        }

        words.push(word)
    }

    Ok(SubwordVocab::new(
        words,
        config.min_n,
        config.max_n,
        SubwordIndexer::new(config.buckets as usize),
    ))
}
