//! Traits and chunk machinery for reading and writing embeddings.
//!
//! This module provides the traits for reading embeddings in the
//! native format ([`ReadEmbeddings`]), memory mapping the embedding
//! matrix ([`MmapEmbeddings`]), and writing embeddings
//! ([`WriteEmbeddings`]). A file in the native format starts with a
//! header carrying the magic, the format version, and the identifiers
//! of the chunks that follow.

use std::fmt::{self, Display};
#[cfg(feature = "memmap")]
use std::fs::File;
#[cfg(feature = "memmap")]
use std::io::BufReader;
use std::io::{Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

const MAGIC: [u8; 4] = [b'F', b'T', b'V', b'C'];

const FORMAT_VERSION: u32 = 0;

/// Chunk identifiers of the native format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ChunkIdentifier {
    Header = 0,
    SimpleVocab = 1,
    SubwordVocab = 2,
    NdArray = 3,
    NdNorms = 4,
    Metadata = 5,
}

impl ChunkIdentifier {
    pub fn try_from(identifier: u32) -> Option<Self> {
        use self::ChunkIdentifier::*;

        match identifier {
            1 => Some(SimpleVocab),
            2 => Some(SubwordVocab),
            3 => Some(NdArray),
            4 => Some(NdNorms),
            5 => Some(Metadata),
            _ => None,
        }
    }

    /// Read and ensure that the chunk has the given identifier.
    pub fn ensure_chunk_type<R>(read: &mut R, identifier: ChunkIdentifier) -> Result<()>
    where
        R: Read,
    {
        let chunk_id = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read chunk identifier", e))?;
        let chunk_id = ChunkIdentifier::try_from(chunk_id)
            .ok_or_else(|| Error::Format(format!("Unknown chunk identifier: {}", chunk_id)))?;
        if chunk_id != identifier {
            return Err(Error::Format(format!(
                "Invalid chunk identifier, expected: {}, got: {}",
                identifier, chunk_id
            )));
        }

        Ok(())
    }
}

impl Display for ChunkIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::ChunkIdentifier::*;

        match self {
            Header => write!(f, "Header"),
            SimpleVocab => write!(f, "SimpleVocab"),
            SubwordVocab => write!(f, "SubwordVocab"),
            NdArray => write!(f, "NdArray"),
            NdNorms => write!(f, "NdNorms"),
            Metadata => write!(f, "Metadata"),
        }
    }
}

pub(crate) trait TypeId {
    /// Read and ensure that the data type is equal to `Self`.
    fn ensure_data_type<R>(read: &mut R) -> Result<()>
    where
        R: Read;

    fn type_id() -> u32;
}

impl TypeId for f32 {
    fn ensure_data_type<R>(read: &mut R) -> Result<()>
    where
        R: Read,
    {
        let type_id = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read type identifier", e))?;
        if type_id != Self::type_id() {
            return Err(Error::Format(format!(
                "Invalid type, expected: {}, got: {}",
                Self::type_id(),
                type_id
            )));
        }

        Ok(())
    }

    fn type_id() -> u32 {
        10
    }
}

pub trait ReadChunk
where
    Self: Sized,
{
    fn read_chunk<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek;
}

pub trait WriteChunk {
    /// Get the identifier of a chunk.
    fn chunk_identifier(&self) -> ChunkIdentifier;

    fn write_chunk<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek;
}

/// Memory-mappable chunks.
#[cfg(feature = "memmap")]
pub trait MmapChunk
where
    Self: Sized,
{
    /// Memory map a chunk.
    ///
    /// The reader must be positioned at the start of the chunk.
    fn mmap_chunk(read: &mut BufReader<File>) -> Result<Self>;
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) struct Header {
    chunk_identifiers: Vec<ChunkIdentifier>,
}

impl Header {
    pub fn new(chunk_identifiers: impl Into<Vec<ChunkIdentifier>>) -> Self {
        Header {
            chunk_identifiers: chunk_identifiers.into(),
        }
    }

    pub fn chunk_identifiers(&self) -> &[ChunkIdentifier] {
        &self.chunk_identifiers
    }
}

impl ReadChunk for Header {
    fn read_chunk<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek,
    {
        let mut magic = [0u8; 4];
        read.read_exact(&mut magic)
            .map_err(|e| Error::read_error("Cannot read magic", e))?;

        if magic != MAGIC {
            return Err(Error::Format(format!(
                "Expected 'FTVC' as magic, got: {}",
                String::from_utf8_lossy(&magic).into_owned()
            )));
        }

        let version = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read format version", e))?;
        if version != FORMAT_VERSION {
            return Err(Error::Format(format!("Unknown format version: {}", version)));
        }

        let chunk_identifiers_len = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read chunk identifiers length", e))?
            as usize;
        let mut chunk_identifiers = Vec::with_capacity(chunk_identifiers_len);
        for _ in 0..chunk_identifiers_len {
            let identifier = read
                .read_u32::<LittleEndian>()
                .map_err(|e| Error::read_error("Cannot read chunk identifier", e))?;
            let chunk_identifier = ChunkIdentifier::try_from(identifier)
                .ok_or_else(|| Error::Format(format!("Unknown chunk identifier: {}", identifier)))?;
            chunk_identifiers.push(chunk_identifier);
        }

        Ok(Header { chunk_identifiers })
    }
}

impl WriteChunk for Header {
    fn chunk_identifier(&self) -> ChunkIdentifier {
        ChunkIdentifier::Header
    }

    fn write_chunk<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek,
    {
        write
            .write_all(&MAGIC)
            .map_err(|e| Error::write_error("Cannot write magic", e))?;
        write
            .write_u32::<LittleEndian>(FORMAT_VERSION)
            .map_err(|e| Error::write_error("Cannot write format version", e))?;
        write
            .write_u32::<LittleEndian>(self.chunk_identifiers.len() as u32)
            .map_err(|e| Error::write_error("Cannot write chunk identifiers length", e))?;

        for &identifier in &self.chunk_identifiers {
            write
                .write_u32::<LittleEndian>(identifier as u32)
                .map_err(|e| Error::write_error("Cannot write chunk identifier", e))?;
        }

        Ok(())
    }
}

/// Read embeddings in the native format.
///
/// Implementations are provided for the vocabulary and storage types
/// in this crate.
///
/// ```no_run
/// use std::fs::File;
/// use std::io::BufReader;
///
/// use ftvec::prelude::*;
///
/// let mut reader = BufReader::new(File::open("model.ftv").unwrap());
/// let embeddings: Embeddings<VocabWrap, NdArray> =
///     Embeddings::read_embeddings(&mut reader).unwrap();
/// ```
pub trait ReadEmbeddings
where
    Self: Sized,
{
    /// Read the embeddings.
    fn read_embeddings<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek;
}

/// Read embeddings metadata in the native format.
///
/// Reading only the metadata is typically much faster than reading
/// the embeddings with `ReadEmbeddings`.
pub trait ReadMetadata
where
    Self: Sized,
{
    /// Read the metadata.
    fn read_metadata<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek;
}

/// Memory-map embeddings in the native format.
///
/// The embedding matrix is [memory
/// mapped](https://en.wikipedia.org/wiki/Mmap) rather than read into
/// memory. This leads to considerable memory savings, since the
/// operating system loads the relevant pages from disk on demand.
#[cfg(feature = "memmap")]
pub trait MmapEmbeddings
where
    Self: Sized,
{
    fn mmap_embeddings(read: &mut BufReader<File>) -> Result<Self>;
}

/// Write embeddings in the native format.
///
/// Writing in the native format is supported regardless of the format
/// the embeddings were read from.
pub trait WriteEmbeddings {
    fn write_embeddings<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek;
}
