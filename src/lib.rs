//! Reader and writer for the [`PMTiles` v3](https://github.com/protomaps/PMTiles)
//! single-file map-tile archive format.
//!
//! A `PMTiles` archive packs a tile pyramid behind a two-level directory so
//! that any tile can be fetched with a handful of range reads. The reader
//! works against any [`AsyncBackend`] — local buffers here, HTTP or object
//! stores in downstream crates — and the writer produces archives through a
//! plain [`std::io::Write`] sink, deduplicating identical tiles as they are
//! added.
//!
//! ## Writing
//! ```
//! use pmtiles3::{PmTilesWriter, TileCoord, TileType};
//!
//! let mut archive = Vec::new();
//! let mut writer = PmTilesWriter::new(TileType::Png)
//!     .max_zoom(0)
//!     .create(&mut archive)
//!     .unwrap();
//! writer.add_tile(TileCoord::new(0, 0, 0).unwrap(), b"tile bytes").unwrap();
//! writer.finalize().unwrap();
//! assert!(!archive.is_empty());
//! ```
//!
//! ## Reading
//! ```
//! # use pmtiles3::{AsyncPmTilesReader, PmtResult, TileCoord};
//! # async fn example(archive: bytes::Bytes) -> PmtResult<()> {
//! let reader = AsyncPmTilesReader::try_from_source(archive).await?;
//! let tile = reader.get_tile(TileCoord::new(0, 0, 0)?).await?;
//! # Ok(())
//! # }
//! ```

mod async_reader;
pub use async_reader::{AsyncBackend, AsyncPmTilesReader};

mod cache;
pub use cache::{DirCacheResult, DirectoryCache, LruDirCache, NoCache};

mod compression;
mod directory;
mod error;
mod header;
mod tile;
mod varint;
#[cfg(feature = "write")]
mod writer;

pub use directory::{DirEntry, Directory};
pub use error::{PmtError, PmtResult};
pub use header::{Compression, HEADER_SIZE, Header, MAX_INITIAL_BYTES, TileType};
pub use tile::{MAX_TILE_ID, MAX_ZOOM, PYRAMID_SIZE_BY_ZOOM, TileCoord, TileId};
#[cfg(feature = "write")]
pub use writer::{PmTilesArchiveWriter, PmTilesWriter};
