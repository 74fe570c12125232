use std::fmt::{Debug, Formatter};

use bytes::{Buf, Bytes};

use crate::error::{PmtError, PmtResult};
use crate::tile::TileId;
use crate::varint;

/// One directory entry: a run of tiles, or a pointer to a leaf directory.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// The first tile ID this entry covers.
    pub tile_id: u64,
    /// Byte offset relative to the tile data section (tile runs) or the leaf
    /// directories section (leaf pointers).
    pub offset: u64,
    /// Byte length of the tile blob or the compressed leaf directory.
    pub length: u32,
    /// Number of consecutive tile IDs sharing this blob; `0` marks a leaf pointer.
    pub run_length: u32,
}

impl DirEntry {
    /// Whether this entry points at a leaf directory rather than tile data.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.run_length == 0
    }
}

/// A parsed directory: entries sorted by tile ID, non-overlapping.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<DirEntry>,
}

impl Debug for Directory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Directory [entries: {}]", self.entries.len()))
    }
}

impl Directory {
    /// Wraps a sorted entry list as a directory.
    #[must_use]
    pub fn from_entries(entries: Vec<DirEntry>) -> Self {
        Self { entries }
    }

    /// The entries of this directory, sorted by tile ID.
    #[must_use]
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// Number of entries in this directory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this directory has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the entry responsible for `tile_id`, if any.
    ///
    /// A tile entry matches when `tile_id` falls inside its half-open run
    /// `[entry.tile_id, entry.tile_id + run_length)`. A leaf pointer matches
    /// any `tile_id` at or past its first tile, up to the next entry; whether
    /// the leaf actually contains the tile is decided one level down.
    #[must_use]
    pub fn find_tile_id(&self, tile_id: TileId) -> Option<&DirEntry> {
        let tile_id = tile_id.value();
        match self.entries.binary_search_by(|e| e.tile_id.cmp(&tile_id)) {
            Ok(index) => self.entries.get(index),
            Err(0) => None,
            Err(insertion) => {
                let previous = self.entries.get(insertion - 1)?;
                if previous.is_leaf()
                    || tile_id - previous.tile_id < u64::from(previous.run_length)
                {
                    Some(previous)
                } else {
                    None
                }
            }
        }
    }
}

impl TryFrom<Bytes> for Directory {
    type Error = PmtError;

    fn try_from(buffer: Bytes) -> PmtResult<Self> {
        let mut buf = buffer;
        let n_entries = usize::try_from(varint::read_varint(&mut buf)?)
            .map_err(|_| PmtError::InvalidDirectory("entry count overflows usize"))?;

        // Every entry takes at least one byte in each of the four value sections.
        if n_entries > buf.remaining() / 4 {
            return Err(PmtError::InvalidDirectory("entry count exceeds buffer size"));
        }

        let mut entries = vec![DirEntry::default(); n_entries];

        let mut next_tile_id = 0_u64;
        for entry in &mut entries {
            next_tile_id = next_tile_id
                .checked_add(varint::read_varint(&mut buf)?)
                .ok_or(PmtError::InvalidDirectory("tile id overflows u64"))?;
            entry.tile_id = next_tile_id;
        }

        for entry in &mut entries {
            entry.run_length = u32::try_from(varint::read_varint(&mut buf)?)
                .map_err(|_| PmtError::InvalidDirectory("run length overflows u32"))?;
        }

        for entry in &mut entries {
            entry.length = u32::try_from(varint::read_varint(&mut buf)?)
                .map_err(|_| PmtError::InvalidDirectory("length overflows u32"))?;
        }

        let mut previous: Option<(u64, u32)> = None;
        for entry in &mut entries {
            let code = varint::read_varint(&mut buf)?;
            entry.offset = if code == 0 {
                // Elided offset: this blob directly follows the previous one.
                let (offset, length) = previous
                    .ok_or(PmtError::InvalidDirectory("offset elision on first entry"))?;
                offset + u64::from(length)
            } else {
                code - 1
            };
            previous = Some((entry.offset, entry.length));
        }

        if buf.has_remaining() {
            return Err(PmtError::InvalidDirectory("trailing bytes after offsets"));
        }

        Ok(Self { entries })
    }
}

/// Serializes `entries` in the five-section directory layout: count, tile-ID
/// deltas, run lengths, lengths, then offsets with contiguous-follow elision.
#[cfg(feature = "write")]
pub(crate) fn write_entries<W: std::io::Write>(
    entries: &[DirEntry],
    writer: &mut W,
) -> std::io::Result<()> {
    varint::write_varint(entries.len() as u64, writer)?;

    let mut last_id = 0_u64;
    for entry in entries {
        varint::write_varint(entry.tile_id - last_id, writer)?;
        last_id = entry.tile_id;
    }

    for entry in entries {
        varint::write_varint(u64::from(entry.run_length), writer)?;
    }

    for entry in entries {
        varint::write_varint(u64::from(entry.length), writer)?;
    }

    let mut next_byte = 0_u64;
    for (index, entry) in entries.iter().enumerate() {
        if index > 0 && entry.offset == next_byte {
            varint::write_varint(0, writer)?;
        } else {
            varint::write_varint(entry.offset + 1, writer)?;
        }
        next_byte = entry.offset + u64::from(entry.length);
    }

    Ok(())
}
