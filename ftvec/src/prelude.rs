//! Prelude exports the most commonly-used types and traits.

pub use crate::compat::fasttext::ReadFastText;

pub use crate::compat::text::{ReadText, ReadTextDims, WriteText, WriteTextDims};

pub use crate::config::{Loss, Model, TrainParams};

pub use crate::embeddings::Embeddings;

#[cfg(feature = "memmap")]
pub use crate::io::MmapEmbeddings;

pub use crate::io::{ReadEmbeddings, ReadMetadata, WriteEmbeddings};

pub use crate::metadata::Metadata;

#[cfg(feature = "memmap")]
pub use crate::storage::MmapMatrix;

pub use crate::storage::{NdArray, Storage, StorageView};

pub use crate::similarity::{
    Analogy, EmbeddingSimilarity, OddOneOut, PairSimilarity, WordSimilarity,
};

pub use crate::train::{FastTextCli, TrainedModel};

pub use crate::vocab::{SimpleVocab, SubwordVocab, Vocab, VocabWrap};
