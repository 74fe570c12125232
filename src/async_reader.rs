use bytes::Bytes;

use crate::cache::{DirCacheResult, DirectoryCache, NoCache};
use crate::compression::decompress;
use crate::directory::{DirEntry, Directory};
use crate::error::{PmtError, PmtResult};
use crate::header::{HEADER_SIZE, Header};
use crate::tile::TileId;

/// Root plus leaf level covers every archive this crate writes; a deeper
/// chain of leaf pointers indicates a corrupt or adversarial archive.
const MAX_DIRECTORY_DEPTH: usize = 4;

/// A reader for `PMTiles` v3 archives over any [`AsyncBackend`].
///
/// The header and the parsed root directory are loaded once at open time;
/// after that the reader is immutable and safe to share between tasks.
pub struct AsyncPmTilesReader<B, C = NoCache> {
    backend: B,
    cache: C,
    header: Header,
    root_directory: Directory,
}

impl<B: AsyncBackend + Sync + Send> AsyncPmTilesReader<B, NoCache> {
    /// Opens an archive from a backend, validating the header and root directory.
    ///
    /// # Errors
    /// Fails on backend I/O errors or when the source is not a valid
    /// `PMTiles` v3 archive.
    pub async fn try_from_source(backend: B) -> PmtResult<Self> {
        Self::try_from_cached_source(backend, NoCache).await
    }
}

impl<B: AsyncBackend + Sync + Send, C: DirectoryCache + Sync + Send> AsyncPmTilesReader<B, C> {
    /// Opens an archive from a backend with a leaf directory cache.
    ///
    /// # Errors
    /// Fails on backend I/O errors or when the source is not a valid
    /// `PMTiles` v3 archive.
    pub async fn try_from_cached_source(backend: B, cache: C) -> PmtResult<Self> {
        let header_bytes = backend.read_exact(0, HEADER_SIZE).await?;
        let header = Header::try_from_bytes(&header_bytes)?;

        let root_directory = Self::read_directory_with_backend(
            &backend,
            &header,
            header.root_offset,
            header.root_length,
        )
        .await?;

        Ok(Self {
            backend,
            cache,
            header,
            root_directory,
        })
    }

    /// The archive header.
    #[must_use]
    pub fn get_header(&self) -> &Header {
        &self.header
    }

    /// The archive's JSON metadata as decompressed bytes.
    ///
    /// The blob is passed through untouched; by spec it contains a UTF-8
    /// encoded JSON object.
    ///
    /// # Errors
    /// Fails on backend I/O errors or an undecodable metadata section.
    pub async fn get_metadata(&self) -> PmtResult<Bytes> {
        if self.header.metadata_length == 0 {
            return Ok(Bytes::new());
        }
        let metadata = self
            .backend
            .read_exact(self.header.metadata_offset, usize_length(self.header.metadata_length)?)
            .await?;
        let decompressed = decompress(self.header.internal_compression, &metadata).await?;
        Ok(Bytes::from(decompressed))
    }

    /// Fetches a tile payload, decompressed with the archive's tile compression.
    ///
    /// Returns `Ok(None)` for tiles that are not in the archive; empty tile
    /// entries behave the same as missing ones.
    ///
    /// # Errors
    /// Fails on backend I/O errors or a malformed archive, never for a
    /// missing tile.
    pub async fn get_tile(&self, coord: impl Into<TileId>) -> PmtResult<Option<Bytes>> {
        let tile_id = coord.into();
        let Some(entry) = self.find_tile_entry(tile_id).await? else {
            return Ok(None);
        };
        if entry.length == 0 {
            // Empty placeholder entry.
            return Ok(None);
        }

        let data = self
            .backend
            .read_exact(
                self.header.data_offset + entry.offset,
                entry.length as usize,
            )
            .await?;
        let decompressed = decompress(self.header.tile_compression, &data).await?;
        Ok(Some(Bytes::from(decompressed)))
    }

    async fn find_tile_entry(&self, tile_id: TileId) -> PmtResult<Option<DirEntry>> {
        let mut next = match self.root_directory.find_tile_id(tile_id) {
            None => return Ok(None),
            Some(entry) if !entry.is_leaf() => return Ok(Some(entry.clone())),
            Some(entry) => entry.clone(),
        };

        // The root was level one.
        for _ in 1..MAX_DIRECTORY_DEPTH {
            match self.find_entry_in_leaf(&next, tile_id).await? {
                None => return Ok(None),
                Some(entry) if !entry.is_leaf() => return Ok(Some(entry)),
                Some(entry) => next = entry,
            }
        }

        Err(PmtError::InvalidArchive("directories nested deeper than four levels"))
    }

    async fn find_entry_in_leaf(
        &self,
        leaf: &DirEntry,
        tile_id: TileId,
    ) -> PmtResult<Option<DirEntry>> {
        let offset = self.header.leaf_offset + leaf.offset;
        match self.cache.get_dir_entry(offset, tile_id).await {
            DirCacheResult::Found(entry) => Ok(Some(entry)),
            DirCacheResult::NotFound => Ok(None),
            DirCacheResult::NotCached => {
                log::trace!("fetching leaf directory at offset {offset} ({} bytes)", leaf.length);
                let directory = self.read_directory(offset, u64::from(leaf.length)).await?;
                let entry = directory.find_tile_id(tile_id).cloned();
                self.cache.insert_dir(offset, directory).await;
                Ok(entry)
            }
        }
    }

    async fn read_directory(&self, offset: u64, length: u64) -> PmtResult<Directory> {
        Self::read_directory_with_backend(&self.backend, &self.header, offset, length).await
    }

    async fn read_directory_with_backend(
        backend: &B,
        header: &Header,
        offset: u64,
        length: u64,
    ) -> PmtResult<Directory> {
        let directory_bytes = backend.read_exact(offset, usize_length(length)?).await?;
        let decompressed = decompress(header.internal_compression, &directory_bytes).await?;
        Directory::try_from(Bytes::from(decompressed))
    }
}

fn usize_length(length: u64) -> PmtResult<usize> {
    usize::try_from(length).map_err(|_| PmtError::InvalidArchive("section length overflows usize"))
}

/// A backend supplying byte ranges of an archive, usually via range requests.
///
/// Ranges must be valid for the underlying source; the reader never asks for
/// bytes past the sections the header declares. Reads from a single
/// `get_tile` call are logically sequential, but no ordering is required
/// across calls.
pub trait AsyncBackend {
    /// Reads exactly `length` bytes starting at `offset`.
    fn read_exact(
        &self,
        offset: u64,
        length: usize,
    ) -> impl Future<Output = PmtResult<Bytes>> + Send;
}

/// In-memory backend over a byte buffer, primarily for tests and embedders
/// that already hold the whole archive.
impl AsyncBackend for Bytes {
    async fn read_exact(&self, offset: u64, length: usize) -> PmtResult<Bytes> {
        let start = usize_length(offset)?;
        let end = start
            .checked_add(length)
            .ok_or(PmtError::InvalidArchive("range end overflows usize"))?;
        if end > self.len() {
            return Err(PmtError::Reading(std::io::Error::from(
                std::io::ErrorKind::UnexpectedEof,
            )));
        }
        Ok(self.slice(start..end))
    }
}
