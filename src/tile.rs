#![allow(clippy::unreadable_literal)]

use std::fmt;

use crate::error::{PmtError, PmtResult};

/// The highest zoom level addressable by a 64-bit tile ID.
pub const MAX_ZOOM: u8 = 31;

/// The pre-computed sizes of the tile pyramid for each zoom level.
///
/// `PYRAMID_SIZE_BY_ZOOM[z]` is the number of tiles in all zoom levels below
/// `z`, i.e. the tile ID of `z/0/0`.
///
/// ```
/// # use pmtiles3::PYRAMID_SIZE_BY_ZOOM;
/// for z in 0..32 {
///     let tiles_at_z = 4_u64.pow(z as u32);
///     assert_eq!(PYRAMID_SIZE_BY_ZOOM[z + 1], PYRAMID_SIZE_BY_ZOOM[z] + tiles_at_z);
/// }
/// ```
pub const PYRAMID_SIZE_BY_ZOOM: [u64; 33] = [
    /*  0 */ 0,
    /*  1 */ 1,
    /*  2 */ 5,
    /*  3 */ 21,
    /*  4 */ 85,
    /*  5 */ 341,
    /*  6 */ 1365,
    /*  7 */ 5461,
    /*  8 */ 21845,
    /*  9 */ 87381,
    /* 10 */ 349525,
    /* 11 */ 1398101,
    /* 12 */ 5592405,
    /* 13 */ 22369621,
    /* 14 */ 89478485,
    /* 15 */ 357913941,
    /* 16 */ 1431655765,
    /* 17 */ 5726623061,
    /* 18 */ 22906492245,
    /* 19 */ 91625968981,
    /* 20 */ 366503875925,
    /* 21 */ 1466015503701,
    /* 22 */ 5864062014805,
    /* 23 */ 23456248059221,
    /* 24 */ 93824992236885,
    /* 25 */ 375299968947541,
    /* 26 */ 1501199875790165,
    /* 27 */ 6004799503160661,
    /* 28 */ 24019198012642645,
    /* 29 */ 96076792050570581,
    /* 30 */ 384307168202282325,
    /* 31 */ 1537228672809129301,
    // one past the end of zoom 31; at z32 (base + 4^32) would overflow u64
    /* 32 */ 6148914691236517205,
];

/// The largest valid tile ID, the last tile of zoom 31.
pub const MAX_TILE_ID: u64 = PYRAMID_SIZE_BY_ZOOM[32] - 1;

/// A 64-bit tile identifier, unique across all zoom levels.
///
/// IDs order tiles along a Hilbert curve per zoom level, so tiles that are
/// close on the map tend to be close in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(u64);

impl TileId {
    /// Creates a tile ID from its integer value.
    ///
    /// # Errors
    /// Returns [`PmtError::InvalidTileId`] for values past the last tile of zoom 31.
    pub fn new(value: u64) -> PmtResult<Self> {
        if value > MAX_TILE_ID {
            return Err(PmtError::InvalidTileId(value));
        }
        Ok(Self(value))
    }

    /// The raw integer value of this tile ID.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The `(z, x, y)` coordinates of this tile.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn coord(self) -> TileCoord {
        // The last base <= id determines the zoom; the remainder is the
        // position on that zoom's Hilbert curve.
        let zoom = PYRAMID_SIZE_BY_ZOOM.partition_point(|&base| base <= self.0) - 1;
        let (x, y) = hilbert_coords(zoom as u8, self.0 - PYRAMID_SIZE_BY_ZOOM[zoom]);
        TileCoord {
            z: zoom as u8,
            x,
            y,
        }
    }
}

impl From<TileCoord> for TileId {
    fn from(coord: TileCoord) -> Self {
        Self(PYRAMID_SIZE_BY_ZOOM[usize::from(coord.z)] + hilbert_index(coord.z, coord.x, coord.y))
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A tile address as zoom, column and row.
///
/// Values are validated on construction, so every `TileCoord` maps to a valid
/// [`TileId`] and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    z: u8,
    x: u32,
    y: u32,
}

impl TileCoord {
    /// Creates a coordinate, validating it against the `2^z` by `2^z` grid.
    ///
    /// # Errors
    /// Returns [`PmtError::InvalidTileCoordinates`] if `z > 31` or `x`/`y`
    /// do not fit the grid at `z`.
    pub fn new(z: u8, x: u32, y: u32) -> PmtResult<Self> {
        if z > MAX_ZOOM || u64::from(x) >= 1 << z || u64::from(y) >= 1 << z {
            return Err(PmtError::InvalidTileCoordinates { z, x, y });
        }
        Ok(Self { z, x, y })
    }

    /// The zoom level.
    #[must_use]
    pub const fn z(self) -> u8 {
        self.z
    }

    /// The column, counted from the left edge.
    #[must_use]
    pub const fn x(self) -> u32 {
        self.x
    }

    /// The row, counted from the top edge.
    #[must_use]
    pub const fn y(self) -> u32 {
        self.y
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Position of `(x, y)` on the Hilbert curve over the `2^z` by `2^z` grid.
///
/// Iterative bit-plane walk from the most significant plane down. At each
/// plane the quadrant contributes `s^2` curve steps, then the remaining low
/// bits are rotated into the quadrant's local frame.
fn hilbert_index(z: u8, x: u32, y: u32) -> u64 {
    let mut x = u64::from(x);
    let mut y = u64::from(y);
    let mut d = 0_u64;
    let mut s = (1_u64 << z) >> 1;
    while s > 0 {
        let rx = u64::from(x & s != 0);
        let ry = u64::from(y & s != 0);
        d += s * s * ((3 * rx) ^ ry);
        x &= s - 1;
        y &= s - 1;
        if ry == 0 {
            if rx == 1 {
                x = s - 1 - x;
                y = s - 1 - y;
            }
            std::mem::swap(&mut x, &mut y);
        }
        s >>= 1;
    }
    d
}

/// Inverse of [`hilbert_index`]: `(x, y)` for curve position `d` at zoom `z`.
#[allow(clippy::cast_possible_truncation)]
fn hilbert_coords(z: u8, mut d: u64) -> (u32, u32) {
    let mut x = 0_u64;
    let mut y = 0_u64;
    let mut s = 1_u64;
    while s < 1_u64 << z {
        let rx = 1 & (d >> 1);
        let ry = 1 & (d ^ rx);
        if ry == 0 {
            if rx == 1 {
                x = s - 1 - x;
                y = s - 1 - y;
            }
            std::mem::swap(&mut x, &mut y);
        }
        x += s * rx;
        y += s * ry;
        d >>= 2;
        s <<= 1;
    }
    // Both are below 2^z <= 2^31.
    (x as u32, y as u32)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{MAX_TILE_ID, TileCoord, TileId};
    use crate::PmtError;

    fn tile_id(z: u8, x: u32, y: u32) -> u64 {
        TileId::from(TileCoord::new(z, x, y).unwrap()).value()
    }

    #[rstest]
    #[case(0, 0, 0, 0)]
    #[case(1, 0, 0, 1)]
    #[case(1, 0, 1, 2)]
    #[case(1, 1, 1, 3)]
    #[case(1, 1, 0, 4)]
    #[case(2, 0, 0, 5)]
    #[case(2, 1, 3, 11)]
    #[case(3, 3, 0, 26)]
    #[case(5, 16, 16, 853)]
    #[case(7, 34, 51, 8438)]
    #[case(10, 512, 512, 873813)]
    #[case(12, 2048, 2048, 13981013)]
    #[case(20, 0, 0, 366503875925)]
    #[case(28, 0, 0, 24019198012642645)]
    fn reference_ids(#[case] z: u8, #[case] x: u32, #[case] y: u32, #[case] id: u64) {
        assert_eq!(tile_id(z, x, y), id);

        let coord = TileId::new(id).unwrap().coord();
        assert_eq!((coord.z(), coord.x(), coord.y()), (z, x, y));
    }

    #[test]
    fn bijective_at_low_zooms() {
        let mut previous_end = 0;
        for z in 0..=8_u8 {
            let dim = 1_u32 << z;
            let mut seen = vec![false; (u64::from(dim) * u64::from(dim)) as usize];
            for x in 0..dim {
                for y in 0..dim {
                    let id = TileId::from(TileCoord::new(z, x, y).unwrap());
                    let offset = id.value() - previous_end;
                    assert!(!seen[offset as usize], "duplicate id {id} at {z}/{x}/{y}");
                    seen[offset as usize] = true;

                    let coord = id.coord();
                    assert_eq!((coord.z(), coord.x(), coord.y()), (z, x, y));
                }
            }
            assert!(seen.iter().all(|&s| s), "zoom {z} does not cover its id range");
            previous_end += u64::from(dim) * u64::from(dim);
        }
    }

    #[test]
    fn roundtrip_extremes() {
        for z in 0..=31_u8 {
            let dim = ((1_u64 << z) - 1) as u32;
            for (x, y) in [(0, 0), (dim, 0), (0, dim), (dim, dim), (dim / 2, dim / 3)] {
                let coord = TileCoord::new(z, x, y).unwrap();
                let back = TileId::from(coord).coord();
                assert_eq!(back, coord, "roundtrip failed at {coord}");
            }
        }
    }

    #[test]
    fn id_bounds() {
        // The Hilbert curve ends at the top-right corner of the grid.
        assert_eq!(
            TileId::new(MAX_TILE_ID).unwrap().coord(),
            TileCoord::new(31, (1 << 31) - 1, 0).unwrap()
        );
        assert!(matches!(
            TileId::new(MAX_TILE_ID + 1),
            Err(PmtError::InvalidTileId(_))
        ));
    }

    #[test]
    fn coord_bounds() {
        assert!(TileCoord::new(0, 0, 0).is_ok());
        assert!(matches!(
            TileCoord::new(0, 0, 1),
            Err(PmtError::InvalidTileCoordinates { .. })
        ));
        assert!(matches!(
            TileCoord::new(32, 0, 0),
            Err(PmtError::InvalidTileCoordinates { .. })
        ));
        assert!(TileCoord::new(31, (1 << 31) - 1, (1 << 31) - 1).is_ok());
        assert!(TileCoord::new(5, 32, 0).is_err());
    }
}
