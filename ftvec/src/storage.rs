//! Embedding matrix storage.

use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::size_of;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{Array2, ArrayView2, ArrayViewMut2, CowArray, Ix1};

use crate::error::{Error, Result};
use crate::io::{ChunkIdentifier, ReadChunk, TypeId, WriteChunk};
use crate::util::padding;

/// Embedding matrix storage.
pub trait Storage {
    /// Get the embedding at the given row.
    fn embedding(&self, idx: usize) -> CowArray<f32, Ix1>;

    /// Get the matrix shape as *(rows, columns)*.
    fn shape(&self) -> (usize, usize);

    /// Get the embedding dimensionality.
    fn dims(&self) -> usize {
        self.shape().1
    }
}

/// Storage that provides a view of the embedding matrix.
pub trait StorageView: Storage {
    /// Get a view of the embedding matrix.
    fn view(&self) -> ArrayView2<f32>;
}

/// Storage that provides a mutable view of the embedding matrix.
pub(crate) trait StorageViewMut: Storage {
    /// Get a mutable view of the embedding matrix.
    fn view_mut(&mut self) -> ArrayViewMut2<f32>;
}

/// In-memory `ndarray` matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct NdArray {
    inner: Array2<f32>,
}

impl NdArray {
    pub fn new(arr: Array2<f32>) -> Self {
        NdArray { inner: arr }
    }

    /// Unwrap the underlying matrix.
    pub fn into_inner(self) -> Array2<f32> {
        self.inner
    }
}

impl From<Array2<f32>> for NdArray {
    fn from(arr: Array2<f32>) -> Self {
        NdArray::new(arr)
    }
}

impl Storage for NdArray {
    fn embedding(&self, idx: usize) -> CowArray<f32, Ix1> {
        CowArray::from(self.inner.row(idx))
    }

    fn shape(&self) -> (usize, usize) {
        self.inner.dim()
    }
}

impl StorageView for NdArray {
    fn view(&self) -> ArrayView2<f32> {
        self.inner.view()
    }
}

impl StorageViewMut for NdArray {
    fn view_mut(&mut self) -> ArrayViewMut2<f32> {
        self.inner.view_mut()
    }
}

impl ReadChunk for NdArray {
    fn read_chunk<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek,
    {
        ChunkIdentifier::ensure_chunk_type(read, ChunkIdentifier::NdArray)?;

        // Read and discard chunk length.
        read.read_u64::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read embedding matrix chunk length", e))?;

        let rows = read
            .read_u64::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read number of embedding matrix rows", e))?;
        let rows = usize::try_from(rows).map_err(|_| Error::Overflow)?;
        let cols = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read number of embedding matrix columns", e))?
            as usize;

        // The components of the embedding matrix should be of type f32.
        f32::ensure_data_type(read)?;

        let n_padding = padding::<f32>(
            read.stream_position()
                .map_err(|e| Error::read_error("Cannot get file position for computing padding", e))?,
        );
        read.seek(SeekFrom::Current(n_padding as i64))
            .map_err(|e| Error::read_error("Cannot skip padding", e))?;

        let mut data = vec![0f32; rows * cols];
        read.read_f32_into::<LittleEndian>(&mut data)
            .map_err(|e| Error::read_error("Cannot read embedding matrix", e))?;

        let matrix = Array2::from_shape_vec((rows, cols), data)?;

        Ok(NdArray::new(matrix))
    }
}

impl WriteChunk for NdArray {
    fn chunk_identifier(&self) -> ChunkIdentifier {
        ChunkIdentifier::NdArray
    }

    fn write_chunk<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek,
    {
        write
            .write_u32::<LittleEndian>(ChunkIdentifier::NdArray as u32)
            .map_err(|e| Error::write_error("Cannot write embedding matrix chunk identifier", e))?;

        let n_padding = padding::<f32>(
            write
                .stream_position()
                .map_err(|e| Error::write_error("Cannot get file position for computing padding", e))?,
        );

        let (rows, cols) = self.shape();

        // Chunk size: rows (u64), columns (u32), type id (u32),
        // padding ([0,4) bytes), matrix.
        let chunk_len = size_of::<u64>()
            + size_of::<u32>()
            + size_of::<u32>()
            + n_padding as usize
            + rows * cols * size_of::<f32>();
        write
            .write_u64::<LittleEndian>(chunk_len as u64)
            .map_err(|e| Error::write_error("Cannot write embedding matrix chunk length", e))?;

        write
            .write_u64::<LittleEndian>(rows as u64)
            .map_err(|e| Error::write_error("Cannot write number of embedding matrix rows", e))?;
        write
            .write_u32::<LittleEndian>(cols as u32)
            .map_err(|e| Error::write_error("Cannot write number of embedding matrix columns", e))?;
        write
            .write_u32::<LittleEndian>(f32::type_id())
            .map_err(|e| Error::write_error("Cannot write embedding matrix type identifier", e))?;

        let padding = vec![0u8; n_padding as usize];
        write
            .write_all(&padding)
            .map_err(|e| Error::write_error("Cannot write padding", e))?;

        for &val in self.inner.iter() {
            write
                .write_f32::<LittleEndian>(val)
                .map_err(|e| Error::write_error("Cannot write embedding matrix component", e))?;
        }

        Ok(())
    }
}

#[cfg(feature = "memmap")]
mod mmap {
    use std::fs::File;
    use std::io::{BufReader, Seek, SeekFrom};
    use std::mem::size_of;

    use byteorder::{LittleEndian, ReadBytesExt};
    #[cfg(target_endian = "big")]
    use byteorder::ByteOrder;
    use memmap2::{Mmap, MmapOptions};
    use ndarray::{ArrayView2, CowArray, Dimension, Ix1, Ix2};

    use super::{Storage, StorageView};
    use crate::error::{Error, Result};
    use crate::io::{ChunkIdentifier, MmapChunk, TypeId};
    use crate::util::padding;

    /// Memory-mapped embedding matrix.
    #[derive(Debug)]
    pub struct MmapMatrix {
        map: Mmap,
        shape: Ix2,
    }

    impl Storage for MmapMatrix {
        fn embedding(&self, idx: usize) -> CowArray<f32, Ix1> {
            // Alignment is ok, padding guarantees that the matrix is
            // at a multiple of 4.
            #[allow(clippy::cast_ptr_alignment, unused_mut)]
            let mut embedding =
                unsafe { ArrayView2::from_shape_ptr(self.shape, self.map.as_ptr() as *const f32) }
                    .row(idx)
                    .to_owned();

            #[cfg(target_endian = "big")]
            LittleEndian::from_slice_f32(
                embedding
                    .as_slice_mut()
                    .expect("Cannot borrow vector as mutable slice"),
            );

            CowArray::from(embedding)
        }

        fn shape(&self) -> (usize, usize) {
            self.shape.into_pattern()
        }
    }

    #[cfg(target_endian = "little")]
    impl StorageView for MmapMatrix {
        fn view(&self) -> ArrayView2<f32> {
            // Alignment is ok, padding guarantees that the matrix is
            // at a multiple of 4.
            #[allow(clippy::cast_ptr_alignment)]
            unsafe {
                ArrayView2::from_shape_ptr(self.shape, self.map.as_ptr() as *const f32)
            }
        }
    }

    impl MmapChunk for MmapMatrix {
        fn mmap_chunk(read: &mut BufReader<File>) -> Result<Self> {
            ChunkIdentifier::ensure_chunk_type(read, ChunkIdentifier::NdArray)?;

            // Read and discard chunk length.
            read.read_u64::<LittleEndian>()
                .map_err(|e| Error::read_error("Cannot read embedding matrix chunk length", e))?;

            let rows = read
                .read_u64::<LittleEndian>()
                .map_err(|e| Error::read_error("Cannot read number of embedding matrix rows", e))?;
            let rows = usize::try_from(rows).map_err(|_| Error::Overflow)?;
            let cols = read.read_u32::<LittleEndian>().map_err(|e| {
                Error::read_error("Cannot read number of embedding matrix columns", e)
            })? as usize;
            let shape = Ix2(rows, cols);

            // The components of the embedding matrix should be of type f32.
            f32::ensure_data_type(read)?;

            let n_padding = padding::<f32>(read.stream_position().map_err(|e| {
                Error::read_error("Cannot get file position for computing padding", e)
            })?);
            read.seek(SeekFrom::Current(n_padding as i64))
                .map_err(|e| Error::read_error("Cannot skip padding", e))?;

            // Set up memory mapping.
            let matrix_len = shape.size() * size_of::<f32>();
            let offset = read.stream_position().map_err(|e| {
                Error::read_error(
                    "Cannot get file position for memory mapping embedding matrix",
                    e,
                )
            })?;
            let mut mmap_opts = MmapOptions::new();
            let map = unsafe {
                mmap_opts
                    .offset(offset)
                    .len(matrix_len)
                    .map(&*read.get_ref())
                    .map_err(|e| Error::read_error("Cannot memory map embedding matrix", e))?
            };

            // Position the reader after the matrix.
            read.seek(SeekFrom::Current(matrix_len as i64))
                .map_err(|e| Error::read_error("Cannot skip embedding matrix", e))?;

            Ok(MmapMatrix { map, shape })
        }
    }
}

#[cfg(feature = "memmap")]
pub use mmap::MmapMatrix;
