use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{BufWriter, Write};
use std::num::NonZeroU64;

use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};

use crate::PmtError::UnsupportedCompression;
use crate::directory::write_entries;
use crate::header::{HEADER_SIZE, MAX_INITIAL_BYTES};
use crate::{Compression, DirEntry, Header, PmtError, PmtResult, TileId, TileType};

/// Maximum size of the compressed root directory in bytes.
const MAX_ROOT_DIR_BYTES: usize = MAX_INITIAL_BYTES - HEADER_SIZE;

/// A root directory with this many entries cannot fit the root budget even
/// when compressed; skip straight to the leaf layout.
const MAX_ROOT_ENTRIES: usize = 16_384;

/// Entries per leaf directory in the first partitioning attempt.
const INITIAL_LEAF_SIZE: usize = 4_096;

/// Builder for creating a new archive writer.
pub struct PmTilesWriter {
    header: Header,
    metadata: Vec<u8>,
}

/// `PMTiles` archive writer.
///
/// Tiles are deduplicated as they arrive; the archive itself is laid out and
/// emitted in one strictly sequential pass when [`finalize`](Self::finalize)
/// is called, so the sink only needs [`Write`].
pub struct PmTilesArchiveWriter<W: Write> {
    sink: W,
    header: Header,
    metadata: Vec<u8>,
    /// Unique compressed tile blobs, in order of first arrival.
    contents: Vec<Vec<u8>>,
    /// Index into `contents` by blob hash.
    content_by_hash: HashMap<[u8; 32], usize>,
    /// Index into `contents` by tile ID. Ordered, so finalization walks the
    /// Hilbert curve.
    tiles: BTreeMap<u64, usize>,
}

pub(crate) trait WriteTo {
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()>;

    fn write_compressed_to<W: Write>(
        &self,
        writer: &mut W,
        compression: Compression,
    ) -> PmtResult<()> {
        match compression {
            Compression::None => self.write_to(writer)?,
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(writer, flate2::Compression::default());
                self.write_to(&mut encoder)?;
                encoder.finish()?;
            }
            #[cfg(feature = "brotli")]
            Compression::Brotli => {
                let mut encoder = brotli::CompressorWriter::new(writer, 4096, 11, 22);
                self.write_to(&mut encoder)?;
                encoder.flush()?;
            }
            #[cfg(feature = "zstd")]
            Compression::Zstd => {
                let mut encoder = zstd::stream::write::Encoder::new(writer, 0)?;
                self.write_to(&mut encoder)?;
                encoder.finish()?;
            }
            v => Err(UnsupportedCompression(v))?,
        }
        Ok(())
    }
}

impl WriteTo for [u8] {
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self)
    }
}

impl WriteTo for [DirEntry] {
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write_entries(self, writer)
    }
}

impl PmTilesWriter {
    /// Create a new `PMTiles` writer with default values.
    #[must_use]
    pub fn new(tile_type: TileType) -> Self {
        let tile_compression = match tile_type {
            TileType::Mvt => Compression::Gzip,
            _ => Compression::None,
        };
        let header = Header::new(tile_compression, tile_type);
        Self {
            header,
            metadata: b"{}".to_vec(),
        }
    }

    /// Set the compression for metadata and directories.
    #[must_use]
    pub fn internal_compression(mut self, compression: Compression) -> Self {
        self.header.internal_compression = compression;
        self
    }

    /// Set the compression for tile data.
    #[must_use]
    pub fn tile_compression(mut self, compression: Compression) -> Self {
        self.header.tile_compression = compression;
        self
    }

    /// Set the minimum zoom level of the tiles.
    #[must_use]
    pub fn min_zoom(mut self, level: u8) -> Self {
        self.header.min_zoom = level;
        self
    }

    /// Set the maximum zoom level of the tiles.
    #[must_use]
    pub fn max_zoom(mut self, level: u8) -> Self {
        self.header.max_zoom = level;
        self
    }

    /// Set the geographic bounds of the tiles, in decimal degrees.
    #[must_use]
    pub fn bounds(mut self, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        self.header.min_longitude_e7 = to_e7(min_lon);
        self.header.min_latitude_e7 = to_e7(min_lat);
        self.header.max_longitude_e7 = to_e7(max_lon);
        self.header.max_latitude_e7 = to_e7(max_lat);
        self
    }

    /// Set the center zoom level.
    #[must_use]
    pub fn center_zoom(mut self, level: u8) -> Self {
        self.header.center_zoom = level;
        self
    }

    /// Set the center position, in decimal degrees.
    #[must_use]
    pub fn center(mut self, lon: f64, lat: f64) -> Self {
        self.header.center_longitude_e7 = to_e7(lon);
        self.header.center_latitude_e7 = to_e7(lat);
        self
    }

    /// Set the metadata, which must contain a valid JSON object.
    ///
    /// If the tile type is MVT, the object must contain a `vector_layers` key
    /// as described in the `TileJSON` 3.0 specification.
    #[must_use]
    pub fn metadata(mut self, metadata: &str) -> Self {
        self.metadata = metadata.as_bytes().to_vec();
        self
    }

    /// Create a `PMTiles` archive writer emitting into `sink`.
    ///
    /// # Errors
    /// Fails with [`PmtError::InvalidZoomRange`] when the configured minimum
    /// zoom exceeds the maximum.
    pub fn create<W: Write>(self, sink: W) -> PmtResult<PmTilesArchiveWriter<W>> {
        if self.header.min_zoom > self.header.max_zoom {
            return Err(PmtError::InvalidZoomRange {
                min: self.header.min_zoom,
                max: self.header.max_zoom,
            });
        }
        Ok(PmTilesArchiveWriter {
            sink,
            header: self.header,
            metadata: self.metadata,
            contents: Vec::new(),
            content_by_hash: HashMap::new(),
            tiles: BTreeMap::new(),
        })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_e7(degrees: f64) -> i32 {
    (degrees * 1e7).round() as i32
}

impl<W: Write> PmTilesArchiveWriter<W> {
    /// Add a tile to the writer.
    ///
    /// The payload is compressed with the configured tile compression and
    /// deduplicated against previously added tiles. Adding the same
    /// coordinates twice replaces the earlier payload. Empty payloads are
    /// ignored; readers report those tiles as absent.
    ///
    /// # Errors
    /// Fails when compression fails or a blob exceeds the format's entry size.
    pub fn add_tile(&mut self, coord: impl Into<TileId>, data: &[u8]) -> PmtResult<()> {
        self.add_tile_by_id(coord.into(), data, self.header.tile_compression)
    }

    /// Add a pre-compressed tile to the writer.
    ///
    /// Use this method only if you manage the compression aspects before
    /// storing the tile; the payload is recorded as if it were already
    /// encoded with the archive's tile compression. Otherwise use
    /// [`add_tile`](Self::add_tile).
    ///
    /// # Errors
    /// Fails when a blob exceeds the format's entry size.
    pub fn add_raw_tile(&mut self, coord: impl Into<TileId>, data: &[u8]) -> PmtResult<()> {
        self.add_tile_by_id(coord.into(), data, Compression::None)
    }

    fn add_tile_by_id(
        &mut self,
        tile_id: TileId,
        data: &[u8],
        tile_compression: Compression,
    ) -> PmtResult<()> {
        if data.is_empty() {
            // The format cannot represent stored empty tiles.
            return Ok(());
        }

        let mut blob = Vec::with_capacity(data.len());
        data.write_compressed_to(&mut blob, tile_compression)?;
        into_u32(blob.len())?;

        let digest: [u8; 32] = Sha256::digest(&blob).into();
        let index = match self.content_by_hash.entry(digest) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let index = self.contents.len();
                self.contents.push(blob);
                entry.insert(index);
                index
            }
        };

        // Last write wins for repeated coordinates.
        self.tiles.insert(tile_id.value(), index);
        Ok(())
    }

    /// Replace the metadata blob, which must contain a valid JSON object.
    pub fn set_metadata(&mut self, metadata: impl Into<Vec<u8>>) {
        self.metadata = metadata.into();
    }

    /// Finish writing the `PMTiles` archive.
    ///
    /// Computes the complete file layout, then emits header, root directory,
    /// metadata, leaf directories and tile data in order. Consuming the
    /// writer makes a second finalization unrepresentable.
    ///
    /// # Errors
    /// Fails with [`PmtError::EmptyArchive`] when no tiles were added, or on
    /// sink and compression errors.
    pub fn finalize(self) -> PmtResult<()> {
        let Self {
            sink,
            mut header,
            metadata,
            contents,
            content_by_hash: _,
            tiles,
        } = self;

        if tiles.is_empty() {
            return Err(PmtError::EmptyArchive);
        }

        // Walk tiles in ID order, assigning each distinct blob its offset at
        // first reference. Emitting blobs in that same order keeps the data
        // section clustered no matter the order tiles arrived in.
        let mut offsets: Vec<Option<u64>> = vec![None; contents.len()];
        let mut emit_order: Vec<usize> = Vec::with_capacity(contents.len());
        let mut data_length = 0_u64;
        let mut entries: Vec<DirEntry> = Vec::new();
        for (&tile_id, &index) in &tiles {
            let length = into_u32(contents[index].len())?;
            let offset = if let Some(offset) = offsets[index] {
                offset
            } else {
                let offset = data_length;
                offsets[index] = Some(offset);
                emit_order.push(index);
                data_length += u64::from(length);
                offset
            };

            if let Some(last) = entries.last_mut() {
                // Grow the run when the ID is consecutive and the blob identical.
                if last.offset == offset && tile_id == last.tile_id + u64::from(last.run_length) {
                    last.run_length += 1;
                    continue;
                }
            }
            entries.push(DirEntry {
                tile_id,
                offset,
                length,
                run_length: 1,
            });
        }

        header.n_addressed_tiles = NonZeroU64::new(tiles.len() as u64);
        header.n_tile_entries = NonZeroU64::new(entries.len() as u64);
        header.n_tile_contents = NonZeroU64::new(emit_order.len() as u64);
        header.clustered = true;

        let (root_bytes, leaves_bytes) = build_directories(&entries, header.internal_compression)?;

        let mut metadata_bytes = Vec::new();
        metadata
            .as_slice()
            .write_compressed_to(&mut metadata_bytes, header.internal_compression)?;

        header.root_offset = HEADER_SIZE as u64;
        header.root_length = root_bytes.len() as u64;
        header.metadata_offset = header.root_offset + header.root_length;
        header.metadata_length = metadata_bytes.len() as u64;
        header.leaf_offset = header.metadata_offset + header.metadata_length;
        header.leaf_length = leaves_bytes.len() as u64;
        header.data_offset = header.leaf_offset + header.leaf_length;
        header.data_length = data_length;

        log::debug!(
            "writing archive: {} addressed tiles, {} entries, {} unique blobs, {} leaf bytes",
            tiles.len(),
            entries.len(),
            emit_order.len(),
            leaves_bytes.len(),
        );

        let mut out = BufWriter::new(sink);
        header.write_to(&mut out)?;
        out.write_all(&root_bytes)?;
        out.write_all(&metadata_bytes)?;
        out.write_all(&leaves_bytes)?;
        for index in emit_order {
            out.write_all(&contents[index])?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Builds the serialized, compressed root directory and leaf section.
///
/// Same approach as go-pmtiles and planetiler: a single-level root when it
/// fits the budget, otherwise a root of leaf pointers over fixed-size entry
/// chunks, doubling the chunk size until the root fits.
fn build_directories(
    entries: &[DirEntry],
    compression: Compression,
) -> PmtResult<(Vec<u8>, Vec<u8>)> {
    if entries.len() < MAX_ROOT_ENTRIES {
        let mut root = Vec::new();
        entries.write_compressed_to(&mut root, compression)?;
        if root.len() <= MAX_ROOT_DIR_BYTES {
            return Ok((root, Vec::new()));
        }
    }

    let mut leaf_size = INITIAL_LEAF_SIZE;
    loop {
        let (root, leaves) = build_roots_leaves(entries, leaf_size, compression)?;
        if root.len() <= MAX_ROOT_DIR_BYTES {
            log::debug!(
                "split {} entries into leaves of up to {leaf_size} entries",
                entries.len()
            );
            return Ok((root, leaves));
        }
        leaf_size *= 2;
    }
}

fn build_roots_leaves(
    entries: &[DirEntry],
    leaf_size: usize,
    compression: Compression,
) -> PmtResult<(Vec<u8>, Vec<u8>)> {
    let mut root_entries = Vec::with_capacity(entries.len().div_ceil(leaf_size));
    let mut leaves = Vec::new();
    for chunk in entries.chunks(leaf_size) {
        let start = leaves.len();
        chunk.write_compressed_to(&mut leaves, compression)?;
        root_entries.push(DirEntry {
            tile_id: chunk[0].tile_id,
            offset: start as u64,
            length: into_u32(leaves.len() - start)?,
            run_length: 0,
        });
    }

    let mut root = Vec::new();
    root_entries.as_slice().write_compressed_to(&mut root, compression)?;
    Ok((root, leaves))
}

fn into_u32(v: usize) -> PmtResult<u32> {
    v.try_into().map_err(|_| PmtError::IndexEntryOverflow)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{MAX_ROOT_DIR_BYTES, PmTilesWriter};
    use crate::{
        AsyncPmTilesReader, Compression, LruDirCache, PmtError, TileCoord, TileId, TileType,
    };

    fn coord(z: u8, x: u32, y: u32) -> TileCoord {
        TileCoord::new(z, x, y).unwrap()
    }

    async fn open(archive: Vec<u8>) -> AsyncPmTilesReader<Bytes> {
        AsyncPmTilesReader::try_from_source(Bytes::from(archive))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn single_tile_archive() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .max_zoom(0)
            .create(&mut archive)
            .unwrap();
        writer.add_tile(coord(0, 0, 0), b"hello").unwrap();
        writer.finalize().unwrap();

        let reader = open(archive).await;
        let header = reader.get_header();
        assert_eq!(header.n_addressed_tiles.map(u64::from), Some(1));
        assert_eq!(header.n_tile_entries.map(u64::from), Some(1));
        assert_eq!(header.n_tile_contents.map(u64::from), Some(1));
        assert_eq!(header.internal_compression, Compression::Gzip);
        assert!(header.clustered);

        let tile = reader.get_tile(coord(0, 0, 0)).await.unwrap();
        assert_eq!(tile.as_deref(), Some(b"hello".as_slice()));
        assert_eq!(reader.get_tile(coord(1, 0, 0)).await.unwrap(), None);
        assert_eq!(reader.get_tile(coord(5, 11, 12)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn consecutive_identical_tiles_share_one_run() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .max_zoom(1)
            .create(&mut archive)
            .unwrap();

        // Tile IDs 1, 2, 3 in Hilbert order.
        assert_eq!(TileId::from(coord(1, 0, 0)).value(), 1);
        assert_eq!(TileId::from(coord(1, 0, 1)).value(), 2);
        assert_eq!(TileId::from(coord(1, 1, 1)).value(), 3);

        let payload = [0xab_u8; 10];
        writer.add_tile(coord(1, 0, 0), &payload).unwrap();
        writer.add_tile(coord(1, 0, 1), &payload).unwrap();
        writer.add_tile(coord(1, 1, 1), &payload).unwrap();
        writer.finalize().unwrap();

        let reader = open(archive).await;
        let header = reader.get_header();
        assert_eq!(header.n_addressed_tiles.map(u64::from), Some(3));
        assert_eq!(header.n_tile_entries.map(u64::from), Some(1));
        assert_eq!(header.n_tile_contents.map(u64::from), Some(1));
        assert_eq!(header.leaf_length, 0);

        for c in [coord(1, 0, 0), coord(1, 0, 1), coord(1, 1, 1)] {
            let tile = reader.get_tile(c).await.unwrap();
            assert_eq!(tile.as_deref(), Some(payload.as_slice()));
        }
        // The remaining zoom-1 tile was never added.
        assert_eq!(reader.get_tile(coord(1, 1, 0)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn nonconsecutive_duplicates_dedup_without_rle() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .internal_compression(Compression::None)
            .create(&mut archive)
            .unwrap();

        writer.add_tile(TileId::new(0).unwrap(), b"ABC").unwrap();
        writer.add_tile(TileId::new(1).unwrap(), b"X").unwrap();
        writer.add_tile(TileId::new(2).unwrap(), b"ABC").unwrap();
        writer.finalize().unwrap();

        let reader = open(archive).await;
        let header = reader.get_header();
        assert_eq!(header.n_addressed_tiles.map(u64::from), Some(3));
        assert_eq!(header.n_tile_entries.map(u64::from), Some(3));
        assert_eq!(header.n_tile_contents.map(u64::from), Some(2));
        // Two unique blobs of 3 and 1 bytes.
        assert_eq!(header.data_length, 4);

        let a = reader.get_tile(TileId::new(0).unwrap()).await.unwrap();
        let c = reader.get_tile(TileId::new(2).unwrap()).await.unwrap();
        assert_eq!(a.as_deref(), Some(b"ABC".as_slice()));
        assert_eq!(a, c);
        let b = reader.get_tile(TileId::new(1).unwrap()).await.unwrap();
        assert_eq!(b.as_deref(), Some(b"X".as_slice()));
    }

    #[tokio::test]
    async fn gzip_tile_compression_roundtrip() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Mvt)
            .create(&mut archive)
            .unwrap();

        let payload = b"a vector tile body that gzip can shrink shrink shrink shrink";
        writer.add_tile(coord(3, 1, 2), payload).unwrap();
        writer.finalize().unwrap();

        let reader = open(archive).await;
        assert_eq!(reader.get_header().tile_compression, Compression::Gzip);
        let tile = reader.get_tile(coord(3, 1, 2)).await.unwrap();
        assert_eq!(tile.as_deref(), Some(payload.as_slice()));
    }

    #[tokio::test]
    async fn raw_tiles_bypass_compression() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Mvt)
            .tile_compression(Compression::Gzip)
            .create(&mut archive)
            .unwrap();

        // Pre-compress one payload by hand.
        let mut precompressed = Vec::new();
        {
            use std::io::Write as _;
            let mut encoder = flate2::write::GzEncoder::new(
                &mut precompressed,
                flate2::Compression::default(),
            );
            encoder.write_all(b"manual").unwrap();
            encoder.finish().unwrap();
        }
        writer
            .add_raw_tile(TileId::new(0).unwrap(), &precompressed)
            .unwrap();
        writer.add_tile(TileId::new(1).unwrap(), b"regular").unwrap();
        writer.finalize().unwrap();

        let reader = open(archive).await;
        let raw = reader.get_tile(TileId::new(0).unwrap()).await.unwrap();
        assert_eq!(raw.as_deref(), Some(b"manual".as_slice()));
        let regular = reader.get_tile(TileId::new(1).unwrap()).await.unwrap();
        assert_eq!(regular.as_deref(), Some(b"regular".as_slice()));
    }

    #[tokio::test]
    async fn last_write_wins_for_repeated_coordinates() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .create(&mut archive)
            .unwrap();

        writer.add_tile(coord(0, 0, 0), b"first").unwrap();
        writer.add_tile(coord(0, 0, 0), b"second").unwrap();
        writer.finalize().unwrap();

        let reader = open(archive).await;
        let header = reader.get_header();
        assert_eq!(header.n_addressed_tiles.map(u64::from), Some(1));
        // The orphaned first blob is not emitted.
        assert_eq!(header.n_tile_contents.map(u64::from), Some(1));
        assert_eq!(header.data_length, 6);

        let tile = reader.get_tile(coord(0, 0, 0)).await.unwrap();
        assert_eq!(tile.as_deref(), Some(b"second".as_slice()));
    }

    #[tokio::test]
    async fn metadata_roundtrips_byte_exact() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .metadata(r#"{"name":"x"}"#)
            .create(&mut archive)
            .unwrap();
        writer.add_tile(coord(0, 0, 0), b"t").unwrap();
        writer.finalize().unwrap();

        let reader = open(archive).await;
        let metadata = reader.get_metadata().await.unwrap();
        assert_eq!(&metadata[..], br#"{"name":"x"}"#);
    }

    #[tokio::test]
    async fn set_metadata_replaces_builder_value() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .metadata(r#"{"name":"x"}"#)
            .create(&mut archive)
            .unwrap();
        writer.add_tile(coord(0, 0, 0), b"t").unwrap();
        writer.set_metadata(br#"{"name":"y","attribution":"test"}"#.to_vec());
        writer.finalize().unwrap();

        let reader = open(archive).await;
        let metadata = reader.get_metadata().await.unwrap();
        assert_eq!(&metadata[..], br#"{"name":"y","attribution":"test"}"#);
    }

    #[tokio::test]
    async fn empty_payloads_read_back_as_absent() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .create(&mut archive)
            .unwrap();
        writer.add_tile(coord(0, 0, 0), b"").unwrap();
        writer.add_tile(coord(1, 0, 0), b"real").unwrap();
        writer.finalize().unwrap();

        let reader = open(archive).await;
        assert_eq!(reader.get_header().n_addressed_tiles.map(u64::from), Some(1));
        assert_eq!(reader.get_tile(coord(0, 0, 0)).await.unwrap(), None);
        assert!(reader.get_tile(coord(1, 0, 0)).await.unwrap().is_some());
    }

    #[test]
    fn empty_writer_cannot_finalize() {
        let mut archive = Vec::new();
        let writer = PmTilesWriter::new(TileType::Png)
            .create(&mut archive)
            .unwrap();
        assert!(matches!(writer.finalize(), Err(PmtError::EmptyArchive)));
        assert!(archive.is_empty());
    }

    #[test]
    fn inverted_zoom_range_is_rejected() {
        let result = PmTilesWriter::new(TileType::Png)
            .min_zoom(10)
            .max_zoom(5)
            .create(std::io::sink());
        assert!(matches!(
            result,
            Err(PmtError::InvalidZoomRange { min: 10, max: 5 })
        ));
    }

    #[test]
    fn unknown_internal_compression_fails_finalize() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .internal_compression(Compression::Unknown)
            .create(&mut archive)
            .unwrap();
        writer.add_tile(TileId::new(0).unwrap(), b"t").unwrap();
        assert!(matches!(
            writer.finalize(),
            Err(PmtError::UnsupportedCompression(Compression::Unknown))
        ));
    }

    #[tokio::test]
    async fn header_bounds_and_center_roundtrip() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .min_zoom(2)
            .max_zoom(9)
            .bounds(11.154_026, 43.727_012_5, 11.328_939_5, 43.832_545_5)
            .center(11.241_482_7, 43.779_779)
            .center_zoom(7)
            .create(&mut archive)
            .unwrap();
        writer.add_tile(coord(2, 1, 1), b"t").unwrap();
        writer.finalize().unwrap();

        let reader = open(archive).await;
        let header = reader.get_header();
        assert_eq!(header.min_zoom, 2);
        assert_eq!(header.max_zoom, 9);
        assert_eq!(header.center_zoom, 7);
        assert_eq!(header.min_longitude_e7, 111_540_260);
        assert_eq!(header.max_latitude_e7, 438_325_455);
        assert_eq!(header.center_longitude_e7, 112_414_827);
        assert_eq!(header.center_latitude_e7, 437_797_790);
    }

    /// Every probed tile of a two-level archive must resolve through a leaf.
    #[tokio::test]
    async fn two_level_directory_archive() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            // Uncompressed directories overflow the root budget quickly, and
            // keep this test fast.
            .internal_compression(Compression::None)
            .create(&mut archive)
            .unwrap();

        // Non-consecutive IDs with unique payloads: no run aggregation, no dedup.
        let num_tiles = 20_000_u64;
        for n in 0..num_tiles {
            let tile_id = TileId::new(n * 2).unwrap();
            writer.add_tile(tile_id, &n.to_le_bytes()).unwrap();
        }
        writer.finalize().unwrap();

        let reader = AsyncPmTilesReader::try_from_cached_source(
            Bytes::from(archive),
            LruDirCache::default(),
        )
        .await
        .unwrap();
        let header = reader.get_header();
        assert_eq!(header.n_addressed_tiles.map(u64::from), Some(num_tiles));
        assert_eq!(header.n_tile_entries.map(u64::from), Some(num_tiles));
        assert!(header.leaf_length > 0, "expected a two-level directory");
        assert!(header.root_length <= MAX_ROOT_DIR_BYTES as u64);

        for n in [0, 1, 4_095, 4_096, 9_999, num_tiles - 1] {
            let tile = reader
                .get_tile(TileId::new(n * 2).unwrap())
                .await
                .unwrap()
                .unwrap_or_else(|| panic!("tile {n} missing"));
            assert_eq!(&tile[..], n.to_le_bytes());

            // The odd IDs in between were never written.
            let absent = reader.get_tile(TileId::new(n * 2 + 1).unwrap()).await.unwrap();
            assert_eq!(absent, None);
        }
    }

    #[tokio::test]
    async fn corrupted_archives_are_rejected_at_open() {
        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .create(&mut archive)
            .unwrap();
        writer.add_tile(coord(0, 0, 0), b"t").unwrap();
        writer.finalize().unwrap();

        let mut bad_magic = archive.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            AsyncPmTilesReader::try_from_source(Bytes::from(bad_magic)).await,
            Err(PmtError::InvalidMagicNumber)
        ));

        // The version byte sits right after the seven magic bytes.
        let mut bad_version = archive.clone();
        bad_version[7] = 4;
        assert!(matches!(
            AsyncPmTilesReader::try_from_source(Bytes::from(bad_version)).await,
            Err(PmtError::UnsupportedPmTilesVersion(4))
        ));

        assert!(
            AsyncPmTilesReader::try_from_source(Bytes::from(archive))
                .await
                .is_ok()
        );
    }

    /// The root directory always fits the initial-request budget.
    #[tokio::test]
    async fn root_directory_fits_initial_request_budget() {
        for num_tiles in [1_u64, 100, 20_000] {
            let mut archive = Vec::new();
            let mut writer = PmTilesWriter::new(TileType::Png)
                .internal_compression(Compression::None)
                .create(&mut archive)
                .unwrap();
            for n in 0..num_tiles {
                writer
                    .add_tile(TileId::new(n * 3).unwrap(), &n.to_le_bytes())
                    .unwrap();
            }
            writer.finalize().unwrap();

            let reader = open(archive).await;
            let header = reader.get_header();
            assert!(header.root_length as usize <= MAX_ROOT_DIR_BYTES);
            assert_eq!(header.root_offset, 127);
        }
    }
}
