//! Word embeddings.

use std::io::{Read, Seek, Write};
use std::iter::Enumerate;
use std::slice;

#[cfg(feature = "memmap")]
use std::fs::File;
#[cfg(feature = "memmap")]
use std::io::BufReader;

use ndarray::{Array1, CowArray, Ix1};

use crate::error::{Error, Result};
#[cfg(feature = "memmap")]
use crate::io::{MmapChunk, MmapEmbeddings};
use crate::io::{ChunkIdentifier, Header, ReadChunk, ReadEmbeddings, WriteChunk, WriteEmbeddings};
use crate::metadata::Metadata;
use crate::norms::{NdNorms, Norms};
use crate::storage::Storage;
#[cfg(feature = "memmap")]
use crate::storage::MmapMatrix;
use crate::util::l2_normalize;
use crate::vocab::{SimpleVocab, SubwordVocab, Vocab, VocabWrap, WordIndex};

/// Word embeddings.
///
/// This data structure stores a vocabulary and the corresponding
/// embedding matrix and provides dictionary-like lookups of word
/// vectors. Similarity and analogy queries are provided through the
/// traits in the [`similarity`](crate::similarity) module.
pub struct Embeddings<V, S> {
    metadata: Option<Metadata>,
    norms: Option<NdNorms>,
    storage: S,
    vocab: V,
}

impl<V, S> Embeddings<V, S> {
    /// Construct embeddings from a vocabulary, storage, and norms.
    pub fn new(metadata: Option<Metadata>, vocab: V, storage: S, norms: NdNorms) -> Self {
        Embeddings {
            metadata,
            norms: Some(norms),
            storage,
            vocab,
        }
    }

    pub(crate) fn new_without_norms(metadata: Option<Metadata>, vocab: V, storage: S) -> Self {
        Embeddings {
            metadata,
            norms: None,
            storage,
            vocab,
        }
    }

    /// Decompose the embeddings into metadata, vocabulary, storage,
    /// and norms.
    pub fn into_parts(self) -> (Option<Metadata>, V, S, Option<NdNorms>) {
        (self.metadata, self.vocab, self.storage, self.norms)
    }

    /// Get the metadata.
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Set the metadata, returning the old metadata.
    pub fn set_metadata(&mut self, metadata: Option<Metadata>) -> Option<Metadata> {
        std::mem::replace(&mut self.metadata, metadata)
    }

    /// Get the norms.
    pub fn norms(&self) -> Option<&NdNorms> {
        self.norms.as_ref()
    }

    /// Get the embedding storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Get the vocabulary.
    pub fn vocab(&self) -> &V {
        &self.vocab
    }
}

impl<V, S> Embeddings<V, S>
where
    S: Storage,
{
    /// Return the embedding dimensionality.
    pub fn dims(&self) -> usize {
        self.storage.dims()
    }
}

impl<V, S> Embeddings<V, S>
where
    V: Vocab,
{
    /// Return the number of words for which embeddings are stored.
    pub fn len(&self) -> usize {
        self.vocab.words_len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.words_len() == 0
    }
}

impl<V, S> Embeddings<V, S>
where
    V: Vocab,
    S: Storage,
{
    /// Check whether a word is in the vocabulary.
    ///
    /// Out-of-vocabulary words that can be represented through
    /// subword units are not considered part of the vocabulary.
    pub fn contains(&self, word: &str) -> bool {
        matches!(self.vocab.idx(word), Some(WordIndex::Word(_)))
    }

    /// Get the embedding of a word.
    ///
    /// The embedding is l2-normalized. For an out-of-vocabulary word,
    /// the embedding is the normalized average of its subword
    /// embeddings; `None` is returned when the word cannot be
    /// represented at all.
    pub fn embedding(&self, word: &str) -> Option<CowArray<f32, Ix1>> {
        match self.vocab.idx(word)? {
            WordIndex::Word(idx) => Some(self.storage.embedding(idx)),
            WordIndex::Subword(indices) => {
                let mut embed = Array1::zeros(self.storage.dims());
                for idx in &indices {
                    embed += &self.storage.embedding(*idx).view();
                }
                embed /= indices.len() as f32;
                l2_normalize(embed.view_mut());

                Some(CowArray::from(embed))
            }
        }
    }

    /// Get the embedding of a word together with its original norm.
    ///
    /// The norm of an out-of-vocabulary embedding is *1*.
    pub fn embedding_with_norm(&self, word: &str) -> Option<EmbeddingWithNorm> {
        match self.vocab.idx(word)? {
            WordIndex::Word(idx) => Some(EmbeddingWithNorm {
                embedding: self.storage.embedding(idx),
                norm: self.norms.as_ref().map(|n| n.norm(idx)).unwrap_or(1.),
            }),
            WordIndex::Subword(indices) => {
                let mut embed = Array1::zeros(self.storage.dims());
                for idx in &indices {
                    embed += &self.storage.embedding(*idx).view();
                }
                embed /= indices.len() as f32;
                l2_normalize(embed.view_mut());

                Some(EmbeddingWithNorm {
                    embedding: CowArray::from(embed),
                    norm: 1.,
                })
            }
        }
    }

    /// Get an iterator over pairs of words and the corresponding embeddings.
    pub fn iter(&self) -> Iter<S> {
        Iter {
            storage: &self.storage,
            inner: self.vocab.words().iter().enumerate(),
        }
    }

    /// Get an iterator over words, embeddings, and norms.
    pub fn iter_with_norms(&self) -> IterWithNorms<S> {
        IterWithNorms {
            storage: &self.storage,
            norms: self.norms.as_ref(),
            inner: self.vocab.words().iter().enumerate(),
        }
    }
}

/// An embedding with its original l2 norm.
pub struct EmbeddingWithNorm<'a> {
    pub embedding: CowArray<'a, f32, Ix1>,
    pub norm: f32,
}

impl<'a> EmbeddingWithNorm<'a> {
    /// Reconstruct the unnormalized embedding.
    pub fn into_unnormalized(self) -> Array1<f32> {
        let mut unnormalized = self.embedding.into_owned();
        unnormalized *= self.norm;
        unnormalized
    }
}

impl<'a, V, S> IntoIterator for &'a Embeddings<V, S>
where
    V: Vocab,
    S: Storage,
{
    type Item = (&'a str, CowArray<'a, f32, Ix1>);
    type IntoIter = Iter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over words and embeddings.
pub struct Iter<'a, S> {
    storage: &'a S,
    inner: Enumerate<slice::Iter<'a, String>>,
}

impl<'a, S> Iterator for Iter<'a, S>
where
    S: Storage,
{
    type Item = (&'a str, CowArray<'a, f32, Ix1>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(idx, word)| (word.as_str(), self.storage.embedding(idx)))
    }
}

/// Iterator over words, embeddings, and norms.
pub struct IterWithNorms<'a, S> {
    storage: &'a S,
    norms: Option<&'a NdNorms>,
    inner: Enumerate<slice::Iter<'a, String>>,
}

impl<'a, S> Iterator for IterWithNorms<'a, S>
where
    S: Storage,
{
    type Item = (&'a str, EmbeddingWithNorm<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(idx, word)| {
            (
                word.as_str(),
                EmbeddingWithNorm {
                    embedding: self.storage.embedding(idx),
                    norm: self.norms.map(|n| n.norm(idx)).unwrap_or(1.),
                },
            )
        })
    }
}

impl<S> From<Embeddings<SimpleVocab, S>> for Embeddings<VocabWrap, S> {
    fn from(embeddings: Embeddings<SimpleVocab, S>) -> Self {
        let (metadata, vocab, storage, norms) = embeddings.into_parts();
        Embeddings {
            metadata,
            norms,
            storage,
            vocab: vocab.into(),
        }
    }
}

impl<S> From<Embeddings<SubwordVocab, S>> for Embeddings<VocabWrap, S> {
    fn from(embeddings: Embeddings<SubwordVocab, S>) -> Self {
        let (metadata, vocab, storage, norms) = embeddings.into_parts();
        Embeddings {
            metadata,
            norms,
            storage,
            vocab: vocab.into(),
        }
    }
}

impl<V, S> ReadEmbeddings for Embeddings<V, S>
where
    V: ReadChunk,
    S: ReadChunk,
{
    fn read_embeddings<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek,
    {
        let header = Header::read_chunk(read)?;
        let chunks = header.chunk_identifiers();
        if chunks.is_empty() {
            return Err(Error::Format(String::from(
                "Embedding file does not contain chunks",
            )));
        }

        let metadata = if chunks[0] == ChunkIdentifier::Metadata {
            Some(Metadata::read_chunk(read)?)
        } else {
            None
        };

        let vocab = V::read_chunk(read)?;
        let storage = S::read_chunk(read)?;
        let norms = if chunks.last() == Some(&ChunkIdentifier::NdNorms) {
            Some(NdNorms::read_chunk(read)?)
        } else {
            None
        };

        Ok(Embeddings {
            metadata,
            norms,
            storage,
            vocab,
        })
    }
}

#[cfg(feature = "memmap")]
impl<V> MmapEmbeddings for Embeddings<V, MmapMatrix>
where
    V: ReadChunk,
{
    fn mmap_embeddings(read: &mut BufReader<File>) -> Result<Self> {
        let header = Header::read_chunk(read)?;
        let chunks = header.chunk_identifiers();
        if chunks.is_empty() {
            return Err(Error::Format(String::from(
                "Embedding file does not contain chunks",
            )));
        }

        let metadata = if chunks[0] == ChunkIdentifier::Metadata {
            Some(Metadata::read_chunk(read)?)
        } else {
            None
        };

        let vocab = V::read_chunk(read)?;
        let storage = MmapMatrix::mmap_chunk(read)?;
        let norms = if chunks.last() == Some(&ChunkIdentifier::NdNorms) {
            Some(NdNorms::read_chunk(read)?)
        } else {
            None
        };

        Ok(Embeddings {
            metadata,
            norms,
            storage,
            vocab,
        })
    }
}

impl<V, S> WriteEmbeddings for Embeddings<V, S>
where
    V: WriteChunk,
    S: WriteChunk,
{
    fn write_embeddings<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek,
    {
        let mut chunk_identifiers = Vec::new();
        if let Some(metadata) = &self.metadata {
            chunk_identifiers.push(metadata.chunk_identifier());
        }
        chunk_identifiers.push(self.vocab.chunk_identifier());
        chunk_identifiers.push(self.storage.chunk_identifier());
        if let Some(norms) = &self.norms {
            chunk_identifiers.push(norms.chunk_identifier());
        }

        Header::new(chunk_identifiers).write_chunk(write)?;

        if let Some(metadata) = &self.metadata {
            metadata.write_chunk(write)?;
        }
        self.vocab.write_chunk(write)?;
        self.storage.write_chunk(write)?;
        if let Some(norms) = &self.norms {
            norms.write_chunk(write)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek, SeekFrom};

    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, Array1, Array2};

    use super::Embeddings;
    use crate::io::{ReadEmbeddings, WriteEmbeddings};
    use crate::norms::NdNorms;
    use crate::storage::{NdArray, Storage};
    use crate::subword::SubwordIndexer;
    use crate::util::l2_normalize_array;
    use crate::vocab::{SimpleVocab, SubwordVocab, Vocab, VocabWrap};

    fn test_simple_embeddings() -> Embeddings<SimpleVocab, NdArray> {
        let vocab = SimpleVocab::new(vec![
            "zeppelin".to_owned(),
            "luchtschip".to_owned(),
            "ballon".to_owned(),
        ]);
        let mut matrix = Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) as f32 + 1.);
        let norms = NdNorms(l2_normalize_array(matrix.view_mut()));

        Embeddings::new(None, vocab, NdArray::new(matrix), norms)
    }

    fn test_subword_embeddings() -> Embeddings<SubwordVocab, NdArray> {
        let vocab = SubwordVocab::new(
            vec!["dag".to_owned(), "nacht".to_owned()],
            3,
            6,
            SubwordIndexer::new(8),
        );
        // Two word rows followed by eight bucket rows.
        let mut matrix = Array2::from_shape_fn((10, 4), |(r, c)| (r * 4 + c) as f32 + 1.);
        let norms = NdNorms(l2_normalize_array(
            matrix.view_mut().slice_mut(ndarray::s![0..2, ..]),
        ));

        Embeddings::new(None, vocab, NdArray::new(matrix), norms)
    }

    #[test]
    fn embedding_lookup() {
        let embeddings = test_simple_embeddings();
        assert!(embeddings.contains("zeppelin"));
        assert!(!embeddings.contains("fiets"));
        assert_eq!(embeddings.len(), 3);
        assert_eq!(embeddings.dims(), 4);

        let embedding = embeddings.embedding("luchtschip").unwrap();
        assert_abs_diff_eq!(embedding.view().dot(&embedding.view()), 1f32, epsilon = 1e-6);

        assert!(embeddings.embedding("fiets").is_none());
    }

    #[test]
    fn embedding_with_norm_roundtrips_magnitude() {
        let embeddings = test_simple_embeddings();
        let with_norm = embeddings.embedding_with_norm("zeppelin").unwrap();
        let unnormalized = with_norm.into_unnormalized();
        assert_abs_diff_eq!(
            unnormalized.view().dot(&arr1(&[1f32, 0., 0., 0.]).view()),
            1f32,
            epsilon = 1e-5
        );
    }

    #[test]
    fn oov_embedding_is_normalized_subword_average() {
        let embeddings = test_subword_embeddings();

        let embedding = embeddings.embedding("dagen").unwrap();
        assert_abs_diff_eq!(embedding.view().dot(&embedding.view()), 1f32, epsilon = 1e-5);

        // Verify against a direct computation from the subword rows.
        let indices = embeddings.vocab().subword_indices("dagen").unwrap();
        let mut check: Array1<f32> = Array1::zeros(4);
        for idx in &indices {
            check += &embeddings.storage().embedding(*idx).view();
        }
        check /= indices.len() as f32;
        let norm = check.view().dot(&check.view()).sqrt();
        check /= norm;

        for (a, b) in embedding.view().iter().zip(check.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
    }

    #[test]
    fn iter_yields_words_in_order() {
        let embeddings = test_simple_embeddings();
        let words: Vec<_> = embeddings.iter().map(|(word, _)| word).collect();
        assert_eq!(words, &["zeppelin", "luchtschip", "ballon"]);
    }

    #[test]
    fn native_format_simple_roundtrip() {
        let check = test_simple_embeddings();
        let mut cursor = Cursor::new(Vec::new());
        check.write_embeddings(&mut cursor).unwrap();
        cursor.seek(SeekFrom::Start(0)).unwrap();

        let embeddings: Embeddings<SimpleVocab, NdArray> =
            Embeddings::read_embeddings(&mut cursor).unwrap();
        assert_eq!(embeddings.vocab().words(), check.vocab().words());
        assert_eq!(embeddings.storage().shape(), check.storage().shape());
        assert_eq!(embeddings.norms().unwrap().0, check.norms().unwrap().0);
    }

    #[test]
    fn native_format_subword_roundtrip() {
        let check = test_subword_embeddings();
        let mut cursor = Cursor::new(Vec::new());
        check.write_embeddings(&mut cursor).unwrap();
        cursor.seek(SeekFrom::Start(0)).unwrap();

        let embeddings: Embeddings<SubwordVocab, NdArray> =
            Embeddings::read_embeddings(&mut cursor).unwrap();
        assert_eq!(embeddings.vocab().words(), check.vocab().words());
        assert_eq!(
            embeddings.vocab().vocab_len(),
            check.vocab().vocab_len()
        );

        // Out-of-vocabulary lookups must survive the roundtrip.
        let check_oov = check.embedding("dagen").unwrap();
        let oov = embeddings.embedding("dagen").unwrap();
        for (a, b) in oov.view().iter().zip(check_oov.view().iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn native_format_wrapped_vocab_roundtrip() {
        let check = test_subword_embeddings();
        let mut cursor = Cursor::new(Vec::new());
        check.write_embeddings(&mut cursor).unwrap();
        cursor.seek(SeekFrom::Start(0)).unwrap();

        let embeddings: Embeddings<VocabWrap, NdArray> =
            Embeddings::read_embeddings(&mut cursor).unwrap();
        assert_eq!(embeddings.vocab().words(), check.vocab().words());
        assert!(embeddings.embedding("dagen").is_some());
    }
}
