use std::io::Write;
use std::num::NonZeroU64;

use bytes::Buf;

use crate::error::{PmtError, PmtResult};

/// Size of the fixed header at the start of every archive.
pub const HEADER_SIZE: usize = 127;

/// Header plus root directory must fit into the first 16 KiB of the archive,
/// so a reader can fetch both with a single initial range request.
pub const MAX_INITIAL_BYTES: usize = 16_384;

static V3_MAGIC: &[u8] = b"PMTiles";

/// The fixed 127-byte header of a `PMTiles` v3 archive.
///
/// All offsets are absolute file offsets; geographic bounds and center are
/// stored in their on-disk form, degrees scaled by `10^7` (E7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Format version, always 3.
    pub version: u8,
    /// Absolute offset of the root directory.
    pub root_offset: u64,
    /// Byte length of the compressed root directory.
    pub root_length: u64,
    /// Absolute offset of the JSON metadata.
    pub metadata_offset: u64,
    /// Byte length of the compressed JSON metadata.
    pub metadata_length: u64,
    /// Absolute offset of the leaf directories section.
    pub leaf_offset: u64,
    /// Byte length of the leaf directories section, zero for single-level archives.
    pub leaf_length: u64,
    /// Absolute offset of the tile data section.
    pub data_offset: u64,
    /// Byte length of the tile data section.
    pub data_length: u64,
    /// The number of addressable tiles, `None` if unknown.
    pub n_addressed_tiles: Option<NonZeroU64>,
    /// The number of tile entries across all directories, `None` if unknown.
    pub n_tile_entries: Option<NonZeroU64>,
    /// The number of distinct tile blobs in the data section, `None` if unknown.
    pub n_tile_contents: Option<NonZeroU64>,
    /// Whether tile data is laid out in ascending tile-ID order of first use.
    pub clustered: bool,
    /// Compression of directories and metadata.
    pub internal_compression: Compression,
    /// Compression of tile payloads.
    pub tile_compression: Compression,
    /// Payload format of the tiles.
    pub tile_type: TileType,
    /// Lowest zoom level present.
    pub min_zoom: u8,
    /// Highest zoom level present.
    pub max_zoom: u8,
    /// Western bound, degrees times `10^7`.
    pub min_longitude_e7: i32,
    /// Southern bound, degrees times `10^7`.
    pub min_latitude_e7: i32,
    /// Eastern bound, degrees times `10^7`.
    pub max_longitude_e7: i32,
    /// Northern bound, degrees times `10^7`.
    pub max_latitude_e7: i32,
    /// Suggested zoom for an initial view.
    pub center_zoom: u8,
    /// Center longitude, degrees times `10^7`.
    pub center_longitude_e7: i32,
    /// Center latitude, degrees times `10^7`.
    pub center_latitude_e7: i32,
}

/// Compression applied to directories, metadata, or tile payloads.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum Compression {
    /// The archive does not declare its compression.
    Unknown,
    /// Uncompressed.
    None,
    /// RFC 1952 gzip.
    Gzip,
    /// Raw Brotli stream.
    Brotli,
    /// Framed Zstandard.
    Zstd,
}

impl TryFrom<u8> for Compression {
    type Error = PmtError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::None),
            2 => Ok(Self::Gzip),
            3 => Ok(Self::Brotli),
            4 => Ok(Self::Zstd),
            _ => Err(PmtError::InvalidCompression),
        }
    }
}

impl From<Compression> for u8 {
    fn from(compression: Compression) -> Self {
        match compression {
            Compression::Unknown => 0,
            Compression::None => 1,
            Compression::Gzip => 2,
            Compression::Brotli => 3,
            Compression::Zstd => 4,
        }
    }
}

/// Payload format of the tiles in an archive.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum TileType {
    /// The archive does not declare its tile type.
    Unknown,
    /// Mapbox vector tiles.
    Mvt,
    /// PNG raster tiles.
    Png,
    /// JPEG raster tiles.
    Jpeg,
    /// WebP raster tiles.
    Webp,
}

impl TryFrom<u8> for TileType {
    type Error = PmtError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Mvt),
            2 => Ok(Self::Png),
            3 => Ok(Self::Jpeg),
            4 => Ok(Self::Webp),
            _ => Err(PmtError::InvalidTileType),
        }
    }
}

impl From<TileType> for u8 {
    fn from(tile_type: TileType) -> Self {
        match tile_type {
            TileType::Unknown => 0,
            TileType::Mvt => 1,
            TileType::Png => 2,
            TileType::Jpeg => 3,
            TileType::Webp => 4,
        }
    }
}

impl Header {
    /// Parses a header from the first 127 bytes of `bytes`.
    ///
    /// Longer buffers are accepted; anything past the header is ignored.
    ///
    /// # Errors
    /// Fails on a short buffer, a wrong magic number, a version other than 3,
    /// or out-of-range compression/tile-type bytes.
    pub fn try_from_bytes(bytes: &[u8]) -> PmtResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(PmtError::InvalidHeader);
        }
        if &bytes[0..V3_MAGIC.len()] != V3_MAGIC {
            // v2 archives start with a bare "PM" magic.
            return if bytes.starts_with(b"PM") {
                Err(PmtError::UnsupportedPmTilesVersion(2))
            } else {
                Err(PmtError::InvalidMagicNumber)
            };
        }

        let mut buf = &bytes[V3_MAGIC.len()..HEADER_SIZE];
        let version = buf.get_u8();
        if version != 3 {
            return Err(PmtError::UnsupportedPmTilesVersion(version));
        }

        Ok(Self {
            version,
            root_offset: buf.get_u64_le(),
            root_length: buf.get_u64_le(),
            metadata_offset: buf.get_u64_le(),
            metadata_length: buf.get_u64_le(),
            leaf_offset: buf.get_u64_le(),
            leaf_length: buf.get_u64_le(),
            data_offset: buf.get_u64_le(),
            data_length: buf.get_u64_le(),
            n_addressed_tiles: NonZeroU64::new(buf.get_u64_le()),
            n_tile_entries: NonZeroU64::new(buf.get_u64_le()),
            n_tile_contents: NonZeroU64::new(buf.get_u64_le()),
            clustered: buf.get_u8() == 1,
            internal_compression: buf.get_u8().try_into()?,
            tile_compression: buf.get_u8().try_into()?,
            tile_type: buf.get_u8().try_into()?,
            min_zoom: buf.get_u8(),
            max_zoom: buf.get_u8(),
            min_longitude_e7: buf.get_i32_le(),
            min_latitude_e7: buf.get_i32_le(),
            max_longitude_e7: buf.get_i32_le(),
            max_latitude_e7: buf.get_i32_le(),
            center_zoom: buf.get_u8(),
            center_longitude_e7: buf.get_i32_le(),
            center_latitude_e7: buf.get_i32_le(),
        })
    }

    /// Serializes the header as exactly 127 bytes.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(V3_MAGIC)?;
        writer.write_all(&[self.version])?;
        for value in [
            self.root_offset,
            self.root_length,
            self.metadata_offset,
            self.metadata_length,
            self.leaf_offset,
            self.leaf_length,
            self.data_offset,
            self.data_length,
            self.n_addressed_tiles.map_or(0, NonZeroU64::get),
            self.n_tile_entries.map_or(0, NonZeroU64::get),
            self.n_tile_contents.map_or(0, NonZeroU64::get),
        ] {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.write_all(&[
            u8::from(self.clustered),
            self.internal_compression.into(),
            self.tile_compression.into(),
            self.tile_type.into(),
            self.min_zoom,
            self.max_zoom,
        ])?;
        for value in [
            self.min_longitude_e7,
            self.min_latitude_e7,
            self.max_longitude_e7,
            self.max_latitude_e7,
        ] {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.write_all(&[self.center_zoom])?;
        writer.write_all(&self.center_longitude_e7.to_le_bytes())?;
        writer.write_all(&self.center_latitude_e7.to_le_bytes())?;
        Ok(())
    }

    /// Western bound in decimal degrees.
    #[must_use]
    pub fn min_longitude(&self) -> f64 {
        f64::from(self.min_longitude_e7) / 1e7
    }

    /// Southern bound in decimal degrees.
    #[must_use]
    pub fn min_latitude(&self) -> f64 {
        f64::from(self.min_latitude_e7) / 1e7
    }

    /// Eastern bound in decimal degrees.
    #[must_use]
    pub fn max_longitude(&self) -> f64 {
        f64::from(self.max_longitude_e7) / 1e7
    }

    /// Northern bound in decimal degrees.
    #[must_use]
    pub fn max_latitude(&self) -> f64 {
        f64::from(self.max_latitude_e7) / 1e7
    }

    /// Center longitude in decimal degrees.
    #[must_use]
    pub fn center_longitude(&self) -> f64 {
        f64::from(self.center_longitude_e7) / 1e7
    }

    /// Center latitude in decimal degrees.
    #[must_use]
    pub fn center_latitude(&self) -> f64 {
        f64::from(self.center_latitude_e7) / 1e7
    }

    #[cfg(feature = "write")]
    pub(crate) fn new(tile_compression: Compression, tile_type: TileType) -> Self {
        Self {
            version: 3,
            root_offset: 0,
            root_length: 0,
            metadata_offset: 0,
            metadata_length: 0,
            leaf_offset: 0,
            leaf_length: 0,
            data_offset: 0,
            data_length: 0,
            n_addressed_tiles: None,
            n_tile_entries: None,
            n_tile_contents: None,
            clustered: true,
            internal_compression: Compression::Gzip,
            tile_compression,
            tile_type,
            min_zoom: 0,
            max_zoom: 22,
            min_longitude_e7: -1_800_000_000,
            min_latitude_e7: -900_000_000,
            max_longitude_e7: 1_800_000_000,
            max_latitude_e7: 900_000_000,
            center_zoom: 0,
            center_longitude_e7: 0,
            center_latitude_e7: 0,
        }
    }
}
