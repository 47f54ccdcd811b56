use crate::coordinates::{Feet, Tile, FEET_PER_TILE};
use crate::types::Size;

/// Tiles covered by a building (or any multi-tile entity).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LandArea {
    tiles: Vec<Tile>,
}

impl LandArea {
    pub fn from_footprint(min_tile: Tile, size: Size) -> Self {
        let mut tiles = Vec::with_capacity((size.width.max(0) * size.height.max(0)) as usize);
        for dy in 0..size.height {
            for dx in 0..size.width {
                tiles.push(min_tile.offset(dx, dy));
            }
        }
        Self { tiles }
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn contains(&self, tile: Tile) -> bool {
        self.tiles.contains(&tile)
    }

    /// Inclusive tile bounds `(min, max)`.
    pub fn bounds(&self) -> Option<(Tile, Tile)> {
        let first = *self.tiles.first()?;
        let mut min = first;
        let mut max = first;
        for tile in &self.tiles[1..] {
            min.x = min.x.min(tile.x);
            min.y = min.y.min(tile.y);
            max.x = max.x.max(tile.x);
            max.y = max.y.max(tile.y);
        }
        Some((min, max))
    }

    /// Feet rectangle `(min corner, max corner)` spanned by the area.
    pub fn bounds_in_feet(&self) -> Option<(Feet, Feet)> {
        let (min, max) = self.bounds()?;
        Some((
            min.to_feet(),
            Feet::new(
                (max.x + 1) as f32 * FEET_PER_TILE,
                (max.y + 1) as f32 * FEET_PER_TILE,
            ),
        ))
    }

    /// Squared tile distance from `tile` to the closest tile of the area.
    pub fn nearest_distance_squared(&self, tile: Tile) -> Option<i32> {
        self.tiles
            .iter()
            .map(|candidate| {
                let dx = candidate.x - tile.x;
                let dy = candidate.y - tile.y;
                dx * dx + dy * dy
            })
            .min()
    }
}

/// Minimum tile of a footprint whose centre sits at `position`.
pub fn footprint_min_tile(position: Feet, size: Size) -> Tile {
    let half = FEET_PER_TILE / 2.0;
    Feet::new(
        position.x - size.width as f32 * half,
        position.y - size.height as f32 * half,
    )
    .to_tile()
}

/// Centre of the footprint starting at `min_tile`.
pub fn footprint_center(min_tile: Tile, size: Size) -> Feet {
    let half = FEET_PER_TILE / 2.0;
    let corner = min_tile.to_feet();
    Feet::new(
        corner.x + size.width as f32 * half,
        corner.y + size.height as f32 * half,
    )
}
