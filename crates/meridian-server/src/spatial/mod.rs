//! Spatial partitioning: the tile grid, chunk bookkeeping, the point
//! quadtree and per-observer areas of interest.

pub mod aoi;
pub mod chunk;
pub mod grid;
pub mod quadtree;

pub use aoi::Aoi;
pub use chunk::ChunkMap;
pub use grid::{grid_at, grid_of, Grid, Tile};
pub use quadtree::{QuadEntity, QuadTree, Rect};
