//! Embedding vocabularies.

use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::size_of;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fnv::FnvHashMap;

use crate::error::{Error, Result};
use crate::io::{ChunkIdentifier, ReadChunk, WriteChunk};
use crate::subword::{SubwordIndexer, SubwordIndices as StrSubwordIndices};

/// Embedding vocabularies.
pub trait Vocab {
    /// Get the index of a token.
    fn idx(&self, word: &str) -> Option<WordIndex>;

    /// Get the number of words in the vocabulary.
    fn words_len(&self) -> usize;

    /// Get the total length of this vocabulary, including subword buckets.
    fn vocab_len(&self) -> usize;

    /// Get the words in the vocabulary.
    fn words(&self) -> &[String];
}

/// Index of a vocabulary word.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WordIndex {
    /// The index of an in-vocabulary word.
    Word(usize),

    /// The subword indices of an out-of-vocabulary word.
    Subword(Vec<usize>),
}

impl WordIndex {
    pub fn word(&self) -> Option<usize> {
        match self {
            WordIndex::Word(idx) => Some(*idx),
            WordIndex::Subword(_) => None,
        }
    }

    pub fn subword(&self) -> Option<&[usize]> {
        match self {
            WordIndex::Word(_) => None,
            WordIndex::Subword(indices) => Some(indices),
        }
    }
}

/// Vocabulary without subword units.
///
/// This vocabulary is used for tables read from text formats, where
/// only in-vocabulary words have an embedding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SimpleVocab {
    indices: FnvHashMap<String, usize>,
    words: Vec<String>,
}

impl SimpleVocab {
    /// Construct a simple vocabulary.
    ///
    /// Words are assigned indices in the given order.
    ///
    /// Panics when there are duplicate words.
    pub fn new(words: impl Into<Vec<String>>) -> Self {
        let words = words.into();
        let indices = create_indices(&words);
        assert_eq!(
            words.len(),
            indices.len(),
            "words contained duplicate entries."
        );

        SimpleVocab { indices, words }
    }
}

impl Vocab for SimpleVocab {
    fn idx(&self, word: &str) -> Option<WordIndex> {
        self.indices.get(word).cloned().map(WordIndex::Word)
    }

    fn words_len(&self) -> usize {
        self.indices.len()
    }

    fn vocab_len(&self) -> usize {
        self.words_len()
    }

    fn words(&self) -> &[String] {
        &self.words
    }
}

/// Vocabulary with fastText subword units.
///
/// Words that are not in the vocabulary are resolved through the
/// bucket indices of their character n-grams, offset by the number of
/// in-vocabulary words.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubwordVocab {
    indexer: SubwordIndexer,
    indices: FnvHashMap<String, usize>,
    words: Vec<String>,
    min_n: u32,
    max_n: u32,
}

impl SubwordVocab {
    const BOW: char = '<';
    const EOW: char = '>';

    /// Construct a subword vocabulary.
    ///
    /// Words are assigned indices in the given order. N-grams in the
    /// range *[min_n, max_n]* are mapped to buckets by the given
    /// indexer.
    ///
    /// Panics when there are duplicate words.
    pub fn new(words: impl Into<Vec<String>>, min_n: u32, max_n: u32, indexer: SubwordIndexer) -> Self {
        let words = words.into();
        let indices = create_indices(&words);
        assert_eq!(
            words.len(),
            indices.len(),
            "words contained duplicate entries."
        );
        assert!(
            words.len().checked_add(indexer.buckets()).is_some(),
            "vocab and subword sizes cannot be represented by the native word size"
        );

        SubwordVocab {
            indexer,
            indices,
            words,
            min_n,
            max_n,
        }
    }

    /// Get the vocab's indexer.
    pub fn indexer(&self) -> &SubwordIndexer {
        &self.indexer
    }

    /// Get the lower bound of the generated n-gram lengths.
    pub fn min_n(&self) -> u32 {
        self.min_n
    }

    /// Get the upper bound of the generated n-gram lengths.
    pub fn max_n(&self) -> u32 {
        self.max_n
    }

    /// Get the subword indices of a word.
    ///
    /// Indices are offsets into the embedding matrix, past the
    /// in-vocabulary rows.
    pub fn subword_indices(&self, word: &str) -> Option<Vec<usize>> {
        let bracketed = self.bracket(word);
        let indices = bracketed
            .as_str()
            .subword_indices(self.min_n as usize, self.max_n as usize, &self.indexer)
            .into_iter()
            .map(|idx| idx as usize + self.words_len())
            .collect::<Vec<_>>();

        if indices.is_empty() {
            None
        } else {
            Some(indices)
        }
    }

    /// Get the n-grams of a word together with their subword indices.
    pub fn ngram_indices(&self, word: &str) -> Option<Vec<(String, usize)>> {
        let bracketed = self.bracket(word);
        let ngram_indices = bracketed
            .as_str()
            .ngram_indices(self.min_n as usize, self.max_n as usize, &self.indexer)
            .into_iter()
            .map(|(ngram, idx)| (ngram, idx as usize + self.words_len()))
            .collect::<Vec<_>>();

        if ngram_indices.is_empty() {
            None
        } else {
            Some(ngram_indices)
        }
    }

    fn bracket(&self, word: impl AsRef<str>) -> String {
        let mut bracketed = String::with_capacity(word.as_ref().len() + 2);
        bracketed.push(Self::BOW);
        bracketed.push_str(word.as_ref());
        bracketed.push(Self::EOW);

        bracketed
    }
}

impl Vocab for SubwordVocab {
    fn idx(&self, word: &str) -> Option<WordIndex> {
        // If the word is known, return its index.
        if let Some(idx) = self.indices.get(word).cloned() {
            return Some(WordIndex::Word(idx));
        }

        // Otherwise, return the subword indices.
        self.subword_indices(word).map(WordIndex::Subword)
    }

    fn words_len(&self) -> usize {
        self.indices.len()
    }

    fn vocab_len(&self) -> usize {
        self.words_len() + self.indexer.buckets()
    }

    fn words(&self) -> &[String] {
        &self.words
    }
}

/// Vocabulary types wrapper.
///
/// This wrapper is used when the vocabulary type of an embedding file
/// is not known ahead of time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VocabWrap {
    Simple(SimpleVocab),
    Subword(SubwordVocab),
}

impl From<SimpleVocab> for VocabWrap {
    fn from(v: SimpleVocab) -> Self {
        VocabWrap::Simple(v)
    }
}

impl From<SubwordVocab> for VocabWrap {
    fn from(v: SubwordVocab) -> Self {
        VocabWrap::Subword(v)
    }
}

impl Vocab for VocabWrap {
    fn idx(&self, word: &str) -> Option<WordIndex> {
        match self {
            VocabWrap::Simple(inner) => inner.idx(word),
            VocabWrap::Subword(inner) => inner.idx(word),
        }
    }

    fn words_len(&self) -> usize {
        match self {
            VocabWrap::Simple(inner) => inner.words_len(),
            VocabWrap::Subword(inner) => inner.words_len(),
        }
    }

    fn vocab_len(&self) -> usize {
        match self {
            VocabWrap::Simple(inner) => inner.vocab_len(),
            VocabWrap::Subword(inner) => inner.vocab_len(),
        }
    }

    fn words(&self) -> &[String] {
        match self {
            VocabWrap::Simple(inner) => inner.words(),
            VocabWrap::Subword(inner) => inner.words(),
        }
    }
}

fn create_indices(words: &[String]) -> FnvHashMap<String, usize> {
    let mut indices = FnvHashMap::default();
    indices.reserve(words.len());
    for (idx, word) in words.iter().enumerate() {
        indices.insert(word.clone(), idx);
    }

    indices
}

pub(crate) fn read_vocab_items<R>(read: &mut R, len: usize) -> Result<Vec<String>>
where
    R: Read,
{
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        let item_len = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read item length", e))?
            as usize;
        let mut bytes = vec![0; item_len];
        read.read_exact(&mut bytes)
            .map_err(|e| Error::read_error("Cannot read item", e))?;
        let item = String::from_utf8(bytes)
            .map_err(|e| Error::Format(format!("Item contains invalid UTF-8: {}", e)))?;
        items.push(item);
    }
    Ok(items)
}

pub(crate) fn write_vocab_items<W>(write: &mut W, items: &[String]) -> Result<()>
where
    W: Write,
{
    for word in items {
        write
            .write_u32::<LittleEndian>(word.len() as u32)
            .map_err(|e| Error::write_error("Cannot write token length", e))?;
        write
            .write_all(word.as_bytes())
            .map_err(|e| Error::write_error("Cannot write token", e))?;
    }
    Ok(())
}

impl ReadChunk for SimpleVocab {
    fn read_chunk<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek,
    {
        ChunkIdentifier::ensure_chunk_type(read, ChunkIdentifier::SimpleVocab)?;

        // Read and discard chunk length.
        read.read_u64::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read vocabulary chunk length", e))?;

        let vocab_len = read
            .read_u64::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read vocabulary length", e))?
            as usize;

        let words = read_vocab_items(read, vocab_len)?;

        Ok(SimpleVocab::new(words))
    }
}

impl WriteChunk for SimpleVocab {
    fn chunk_identifier(&self) -> ChunkIdentifier {
        ChunkIdentifier::SimpleVocab
    }

    fn write_chunk<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek,
    {
        // Chunk size: vocabulary size (u64), for each word: word
        // length in bytes (u32), word bytes (variable-length).
        let chunk_len = size_of::<u64>()
            + self
                .words
                .iter()
                .map(|w| w.len() + size_of::<u32>())
                .sum::<usize>();

        write
            .write_u32::<LittleEndian>(ChunkIdentifier::SimpleVocab as u32)
            .map_err(|e| Error::write_error("Cannot write vocabulary chunk identifier", e))?;
        write
            .write_u64::<LittleEndian>(chunk_len as u64)
            .map_err(|e| Error::write_error("Cannot write vocabulary chunk length", e))?;
        write
            .write_u64::<LittleEndian>(self.words.len() as u64)
            .map_err(|e| Error::write_error("Cannot write vocabulary length", e))?;

        write_vocab_items(write, self.words())?;

        Ok(())
    }
}

impl ReadChunk for SubwordVocab {
    fn read_chunk<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek,
    {
        ChunkIdentifier::ensure_chunk_type(read, ChunkIdentifier::SubwordVocab)?;

        // Read and discard chunk length.
        read.read_u64::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read vocabulary chunk length", e))?;

        let vocab_len = read
            .read_u64::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read vocabulary length", e))?
            as usize;
        let min_n = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read minimum n-gram length", e))?;
        let max_n = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read maximum n-gram length", e))?;
        let buckets = read
            .read_u64::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read number of buckets", e))?;
        let buckets = usize::try_from(buckets).map_err(|_| Error::Overflow)?;

        let words = read_vocab_items(read, vocab_len)?;

        Ok(SubwordVocab::new(
            words,
            min_n,
            max_n,
            SubwordIndexer::new(buckets),
        ))
    }
}

impl WriteChunk for SubwordVocab {
    fn chunk_identifier(&self) -> ChunkIdentifier {
        ChunkIdentifier::SubwordVocab
    }

    fn write_chunk<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek,
    {
        // Chunk size: vocabulary size (u64), minimum and maximum
        // n-gram length (2 * u32), number of buckets (u64), for each
        // word: word length in bytes (u32), word bytes
        // (variable-length).
        let chunk_len = size_of::<u64>()
            + 2 * size_of::<u32>()
            + size_of::<u64>()
            + self
                .words
                .iter()
                .map(|w| w.len() + size_of::<u32>())
                .sum::<usize>();

        write
            .write_u32::<LittleEndian>(ChunkIdentifier::SubwordVocab as u32)
            .map_err(|e| Error::write_error("Cannot write vocabulary chunk identifier", e))?;
        write
            .write_u64::<LittleEndian>(chunk_len as u64)
            .map_err(|e| Error::write_error("Cannot write vocabulary chunk length", e))?;
        write
            .write_u64::<LittleEndian>(self.words.len() as u64)
            .map_err(|e| Error::write_error("Cannot write vocabulary length", e))?;
        write
            .write_u32::<LittleEndian>(self.min_n)
            .map_err(|e| Error::write_error("Cannot write minimum n-gram length", e))?;
        write
            .write_u32::<LittleEndian>(self.max_n)
            .map_err(|e| Error::write_error("Cannot write maximum n-gram length", e))?;
        write
            .write_u64::<LittleEndian>(self.indexer.buckets() as u64)
            .map_err(|e| Error::write_error("Cannot write number of buckets", e))?;

        write_vocab_items(write, self.words())?;

        Ok(())
    }
}

impl ReadChunk for VocabWrap {
    fn read_chunk<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek,
    {
        let chunk_id = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read chunk identifier", e))?;
        read.seek(SeekFrom::Current(-(size_of::<u32>() as i64)))
            .map_err(|e| Error::read_error("Cannot seek to vocabulary chunk start", e))?;

        let chunk_id = ChunkIdentifier::try_from(chunk_id)
            .ok_or_else(|| Error::Format(format!("Unknown chunk identifier: {}", chunk_id)))?;
        match chunk_id {
            ChunkIdentifier::SimpleVocab => SimpleVocab::read_chunk(read).map(VocabWrap::Simple),
            ChunkIdentifier::SubwordVocab => SubwordVocab::read_chunk(read).map(VocabWrap::Subword),
            unknown => Err(Error::Format(format!(
                "Not a vocabulary chunk: {}",
                unknown
            ))),
        }
    }
}

impl WriteChunk for VocabWrap {
    fn chunk_identifier(&self) -> ChunkIdentifier {
        match self {
            VocabWrap::Simple(inner) => inner.chunk_identifier(),
            VocabWrap::Subword(inner) => inner.chunk_identifier(),
        }
    }

    fn write_chunk<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek,
    {
        match self {
            VocabWrap::Simple(inner) => inner.write_chunk(write),
            VocabWrap::Subword(inner) => inner.write_chunk(write),
        }
    }
}
