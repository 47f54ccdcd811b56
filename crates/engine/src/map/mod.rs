mod land_area;
mod passability;
mod tile_map;

use thiserror::Error;

use crate::coordinates::Tile;

pub use land_area::{footprint_center, footprint_min_tile, LandArea};
pub use passability::{DynamicPassability, DynamicPassabilityKind, PassabilityMap, TerrainPassability};
pub use tile_map::{MapLayerType, TileMap, MAX_LAYERS, MAX_STATIC_ENTITY_TILE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("tile ({}, {}) is outside the {width}x{height} map", .tile.x, .tile.y)]
    TileOutOfBounds { tile: Tile, width: i32, height: i32 },
    #[error("owner-only passability at tile ({}, {}) requires an owner", .tile.x, .tile.y)]
    OwnerRequired { tile: Tile },
}
