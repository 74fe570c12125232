use thiserror::Error;

use crate::header::Compression;

/// Convenience alias for the result type used throughout this crate.
pub type PmtResult<T> = Result<T, PmtError>;

/// Errors that can occur while reading or writing `PMTiles` archives.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PmtError {
    /// The archive does not start with the `PMTiles` magic number.
    #[error("invalid magic number")]
    InvalidMagicNumber,
    /// The archive uses a `PMTiles` version other than 3.
    #[error("unsupported PMTiles version {0}")]
    UnsupportedPmTilesVersion(u8),
    /// The header is too short or otherwise unparsable.
    #[error("invalid PMTiles header")]
    InvalidHeader,
    /// The header carries a compression byte outside the known range.
    #[error("invalid compression type value")]
    InvalidCompression,
    /// The requested compression is not compiled into this build.
    #[error("unsupported compression {0:?}")]
    UnsupportedCompression(Compression),
    /// The header carries a tile type byte outside the known range.
    #[error("invalid tile type value")]
    InvalidTileType,
    /// A varint or directory section ended before its value did.
    #[error("unexpected end of buffer")]
    UnexpectedEndOfBuffer,
    /// A varint did not terminate within the 10 bytes a `u64` permits.
    #[error("varint exceeds 10 bytes")]
    VarintTooLong,
    /// A directory could not be decoded.
    #[error("malformed directory: {0}")]
    InvalidDirectory(&'static str),
    /// The archive structure is inconsistent beyond a single directory.
    #[error("malformed archive: {0}")]
    InvalidArchive(&'static str),
    /// Tile coordinates outside the `2^z` by `2^z` grid, or `z > 31`.
    #[error("invalid tile coordinates {z}/{x}/{y}")]
    InvalidTileCoordinates {
        /// Zoom level of the rejected coordinates.
        z: u8,
        /// Column of the rejected coordinates.
        x: u32,
        /// Row of the rejected coordinates.
        y: u32,
    },
    /// A tile ID beyond the last tile of zoom 31.
    #[error("invalid tile id {0}")]
    InvalidTileId(u64),
    /// Writer was configured with `min_zoom` above `max_zoom`.
    #[error("min zoom {min} exceeds max zoom {max}")]
    InvalidZoomRange {
        /// The configured minimum zoom.
        min: u8,
        /// The configured maximum zoom.
        max: u8,
    },
    /// `finalize` was called before any tile was added.
    #[error("archive contains no tiles")]
    EmptyArchive,
    /// A directory entry length does not fit into a `u32`.
    #[error("directory entry size exceeds u32")]
    IndexEntryOverflow,
    /// An error surfaced by the backend or sink.
    #[error(transparent)]
    Reading(#[from] std::io::Error),
}
