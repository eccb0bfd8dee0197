//! Slippy-map tile addressing.
//!
//! Positions are geographic `(lat, lon)` pairs stored as `DVec2 { x: lat,
//! y: lon }`. A [`Grid`] is one tile of the standard web-mercator tile
//! pyramid at some zoom level.

use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::fmt;

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Integer tile coordinate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grid {
    pub x: u16,
    pub y: u16,
}

impl Grid {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// The (2·radius+1)² neighbourhood around `self`, clipped to the tile
    /// range of `zoom`.
    pub fn surrounding(self, radius: u16, zoom: u8) -> BTreeSet<Grid> {
        let max = tiles_per_axis(zoom) as i64 - 1;
        let r = radius as i64;
        let mut grids = BTreeSet::new();
        for x in self.x as i64 - r..=self.x as i64 + r {
            for y in self.y as i64 - r..=self.y as i64 + r {
                if (0..=max).contains(&x) && (0..=max).contains(&y) {
                    grids.insert(Grid::new(x as u16, y as u16));
                }
            }
        }
        grids
    }

    /// Geographic bounds of this tile.
    pub fn tile(self, zoom: u8) -> Tile {
        let north = latitude_of(self.y as f64, zoom);
        let south = latitude_of(self.y as f64 + 1.0, zoom);
        let west = longitude_of(self.x as f64, zoom);
        let east = longitude_of(self.x as f64 + 1.0, zoom);
        Tile {
            north,
            south,
            west,
            east,
        }
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grid({}, {})", self.x, self.y)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}

fn tiles_per_axis(zoom: u8) -> u32 {
    1u32 << zoom
}

fn longitude_of(x: f64, zoom: u8) -> f64 {
    x / tiles_per_axis(zoom) as f64 * 360.0 - 180.0
}

fn latitude_of(y: f64, zoom: u8) -> f64 {
    let n = PI - 2.0 * PI * y / tiles_per_axis(zoom) as f64;
    n.sinh().atan().to_degrees()
}

/// The tile containing `(lat, lon)` at `zoom`, clamped to the valid range.
pub fn grid_of(lat: f64, lon: f64, zoom: u8) -> Grid {
    let n = tiles_per_axis(zoom) as f64;
    let lat_rad = lat.to_radians();
    let x = ((lon + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();
    let clamp = |v: f64| {
        if v.is_nan() {
            0
        } else {
            v.clamp(0.0, n - 1.0) as u16
        }
    };
    Grid::new(clamp(x), clamp(y))
}

/// [`grid_of`] for a position vector.
pub fn grid_at(pos: DVec2, zoom: u8) -> Grid {
    grid_of(pos.x, pos.y, zoom)
}

// ---------------------------------------------------------------------------
// Tile
// ---------------------------------------------------------------------------

/// Geographic bounds of a grid cell, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub north: f64,
    pub south: f64,
    pub west: f64,
    pub east: f64,
}

impl Tile {
    /// `(lat span, lon span)`.
    pub fn range(&self) -> DVec2 {
        DVec2::new(self.north - self.south, self.east - self.west)
    }

    /// Centre as `(lat, lon)`.
    pub fn middle(&self) -> DVec2 {
        let range = self.range();
        DVec2::new(self.north - range.x / 2.0, self.west + range.y / 2.0)
    }

    /// Centre of cell `(row, col)` when the tile is split into
    /// `resolution × resolution` cells, rows running north to south.
    pub fn cell_centre(&self, row: u32, col: u32, resolution: u32) -> DVec2 {
        let range = self.range();
        let res = resolution as f64;
        DVec2::new(
            self.north - (row as f64 + 0.5) * range.x / res,
            self.west + (col as f64 + 0.5) * range.y / res,
        )
    }

    pub fn contains(&self, pos: DVec2) -> bool {
        pos.x <= self.north && pos.x >= self.south && pos.y >= self.west && pos.y <= self.east
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
