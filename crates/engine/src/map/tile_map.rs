use tracing::error;

use crate::coordinates::{Feet, Tile, FEET_PER_TILE};
use crate::types::{EntityId, Size};

use super::MapError;

pub const MAX_LAYERS: usize = 4;
/// Largest building edge in tiles; bounds the purge scan in `remove_static_entity`.
pub const MAX_STATIC_ENTITY_TILE_SIZE: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapLayerType {
    Ground,
    OnGround,
    Static,
    Units,
}

impl MapLayerType {
    pub const ALL: [MapLayerType; MAX_LAYERS] = [
        MapLayerType::Ground,
        MapLayerType::OnGround,
        MapLayerType::Static,
        MapLayerType::Units,
    ];

    const fn index(self) -> usize {
        match self {
            MapLayerType::Ground => 0,
            MapLayerType::OnGround => 1,
            MapLayerType::Static => 2,
            MapLayerType::Units => 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MapCell {
    entities: Vec<EntityId>,
}

/// Layered occupancy grid. Each cell keeps entity ids in insertion order.
#[derive(Debug, Clone, Default)]
pub struct TileMap {
    width: i32,
    height: i32,
    layers: [Vec<MapCell>; MAX_LAYERS],
}

impl TileMap {
    pub fn new(width: i32, height: i32) -> Self {
        let mut map = Self::default();
        map.init(width, height);
        map
    }

    pub fn init(&mut self, width: i32, height: i32) {
        self.width = width.max(0);
        self.height = height.max(0);
        let cells = (self.width * self.height) as usize;
        for layer in &mut self.layers {
            layer.clear();
            layer.resize_with(cells, MapCell::default);
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn is_valid_tile(&self, tile: Tile) -> bool {
        tile.x >= 0 && tile.y >= 0 && tile.x < self.width && tile.y < self.height
    }

    pub fn add_entity(
        &mut self,
        layer: MapLayerType,
        tile: Tile,
        entity: EntityId,
    ) -> Result<(), MapError> {
        let index = self.index_of(tile)?;
        let cell = &mut self.layers[layer.index()][index];
        if !cell.entities.contains(&entity) {
            cell.entities.push(entity);
        }
        Ok(())
    }

    /// Registers a multi-tile entity on every tile of its footprint.
    pub fn add_static_entity(
        &mut self,
        min_tile: Tile,
        size: Size,
        entity: EntityId,
    ) -> Result<(), MapError> {
        for dy in 0..size.height {
            for dx in 0..size.width {
                self.index_of(min_tile.offset(dx, dy))?;
            }
        }
        for dy in 0..size.height {
            for dx in 0..size.width {
                self.add_entity(MapLayerType::Static, min_tile.offset(dx, dy), entity)?;
            }
        }
        Ok(())
    }

    pub fn remove_entity(&mut self, layer: MapLayerType, tile: Tile, entity: EntityId) -> bool {
        let Some(index) = self.checked_index(tile) else {
            error!(x = tile.x, y = tile.y, entity = entity.0, "tile_map_remove_out_of_bounds");
            return false;
        };
        let cell = &mut self.layers[layer.index()][index];
        match cell.entities.iter().position(|candidate| *candidate == entity) {
            Some(position) => {
                cell.entities.remove(position);
                true
            }
            None => false,
        }
    }

    /// Purges a (possibly multi-tile) static entity around `tile`.
    pub fn remove_static_entity(&mut self, tile: Tile, entity: EntityId) -> usize {
        let reach = MAX_STATIC_ENTITY_TILE_SIZE - 1;
        let mut removed = 0;
        for y in (tile.y - reach)..=(tile.y + reach) {
            for x in (tile.x - reach)..=(tile.x + reach) {
                let Some(index) = self.checked_index(Tile::new(x, y)) else {
                    continue;
                };
                let cell = &mut self.layers[MapLayerType::Static.index()][index];
                let before = cell.entities.len();
                cell.entities.retain(|candidate| *candidate != entity);
                removed += before - cell.entities.len();
            }
        }
        removed
    }

    pub fn remove_all_entities(&mut self) {
        for layer in &mut self.layers {
            for cell in layer.iter_mut() {
                cell.entities.clear();
            }
        }
    }

    pub fn entity(&self, layer: MapLayerType, tile: Tile) -> Option<EntityId> {
        self.entities(layer, tile).first().copied()
    }

    pub fn entities(&self, layer: MapLayerType, tile: Tile) -> &[EntityId] {
        match self.checked_index(tile) {
            Some(index) => &self.layers[layer.index()][index].entities,
            None => &[],
        }
    }

    pub fn is_occupied(&self, layer: MapLayerType, tile: Tile) -> bool {
        !self.entities(layer, tile).is_empty()
    }

    pub fn is_occupied_by_another(
        &self,
        layer: MapLayerType,
        tile: Tile,
        self_id: EntityId,
    ) -> bool {
        self.entities(layer, tile)
            .iter()
            .any(|candidate| *candidate != self_id)
    }

    /// Walks the segment in quarter-tile steps; off-map samples count as blocked.
    pub fn intersects_static_obstacle(&self, start: Feet, end: Feet) -> bool {
        let delta = end - start;
        let step = FEET_PER_TILE / 4.0;
        let samples = ((delta.length() / step).ceil() as i32).max(1);
        for i in 0..=samples {
            let t = i as f32 / samples as f32;
            let tile = (start + delta * t).to_tile();
            if !self.is_valid_tile(tile) || self.is_occupied(MapLayerType::Static, tile) {
                return true;
            }
        }
        false
    }

    fn checked_index(&self, tile: Tile) -> Option<usize> {
        if self.is_valid_tile(tile) {
            Some((tile.y * self.width + tile.x) as usize)
        } else {
            None
        }
    }

    fn index_of(&self, tile: Tile) -> Result<usize, MapError> {
        self.checked_index(tile).ok_or(MapError::TileOutOfBounds {
            tile,
            width: self.width,
            height: self.height,
        })
    }
}
