use tracing::error;

use crate::coordinates::{Feet, Tile, FEET_PER_TILE};
use crate::map::LandArea;
use crate::types::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum RevealStatus {
    #[default]
    None,
    Unexplored,
    Explored,
    Visible,
}

/// One player's reveal grid plus the fog-tile entities drawn over unexplored cells.
#[derive(Debug, Clone, Default)]
pub struct FogOfWar {
    width: i32,
    height: i32,
    statuses: Vec<RevealStatus>,
    fog_entities: Vec<Option<EntityId>>,
    revealed_fog_entities: Vec<EntityId>,
}

impl FogOfWar {
    pub fn new(width: i32, height: i32, initial: RevealStatus) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        let cells = (width * height) as usize;
        Self {
            width,
            height,
            statuses: vec![initial; cells],
            fog_entities: vec![None; cells],
            revealed_fog_entities: Vec::new(),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn status(&self, tile: Tile) -> RevealStatus {
        self.index(tile)
            .map(|index| self.statuses[index])
            .unwrap_or(RevealStatus::None)
    }

    pub fn set_fog_entity(&mut self, tile: Tile, entity: EntityId) {
        match self.index(tile) {
            Some(index) => self.fog_entities[index] = Some(entity),
            None => error!(x = tile.x, y = tile.y, "fog_entity_out_of_bounds"),
        }
    }

    pub fn fog_entity(&self, tile: Tile) -> Option<EntityId> {
        self.index(tile).and_then(|index| self.fog_entities[index])
    }

    /// Fog tiles uncovered since the last call. The simulator destroys them.
    pub fn take_revealed_fog_entities(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.revealed_fog_entities)
    }

    pub fn has_revealed_fog_entities(&self) -> bool {
        !self.revealed_fog_entities.is_empty()
    }

    pub fn mark_tile_as_explored(&mut self, tile: Tile) {
        self.set_status(tile, RevealStatus::Explored);
    }

    pub fn mark_feet_as_explored(&mut self, feet: Feet) {
        self.set_status(feet.to_tile(), RevealStatus::Explored);
    }

    /// Marks every tile within `line_of_sight` feet of `feet` as explored.
    pub fn mark_as_explored(&mut self, feet: Feet, line_of_sight: f32) {
        self.mark_circle(feet.to_tile(), line_of_sight, RevealStatus::Explored);
    }

    pub fn mark_as_visible(&mut self, tile: Tile, line_of_sight: f32) {
        self.mark_circle(tile, line_of_sight, RevealStatus::Visible);
    }

    /// Radius is measured from the nearest tile of `land_area`.
    pub fn mark_land_area_as_explored(&mut self, land_area: &LandArea, line_of_sight: f32) {
        self.mark_land_area(land_area, line_of_sight, RevealStatus::Explored);
    }

    pub fn mark_land_area_as_visible(&mut self, land_area: &LandArea, line_of_sight: f32) {
        self.mark_land_area(land_area, line_of_sight, RevealStatus::Visible);
    }

    pub fn reveal_all(&mut self) {
        for y in 0..self.height {
            for x in 0..self.width {
                self.set_status(Tile::new(x, y), RevealStatus::Explored);
            }
        }
    }

    fn mark_circle(&mut self, center: Tile, line_of_sight: f32, status: RevealStatus) {
        let radius = (line_of_sight / FEET_PER_TILE).max(0.0);
        let reach = radius.ceil() as i32;
        let radius_squared = radius * radius;
        for y in (center.y - reach)..=(center.y + reach) {
            for x in (center.x - reach)..=(center.x + reach) {
                let dx = (x - center.x) as f32;
                let dy = (y - center.y) as f32;
                if dx * dx + dy * dy <= radius_squared {
                    self.set_status(Tile::new(x, y), status);
                }
            }
        }
    }

    fn mark_land_area(&mut self, land_area: &LandArea, line_of_sight: f32, status: RevealStatus) {
        let Some((min, max)) = land_area.bounds() else {
            return;
        };
        let radius = (line_of_sight / FEET_PER_TILE).max(0.0);
        let reach = radius.ceil() as i32;
        let radius_squared = radius * radius;
        for y in (min.y - reach)..=(max.y + reach) {
            for x in (min.x - reach)..=(max.x + reach) {
                let tile = Tile::new(x, y);
                let Some(distance_squared) = land_area.nearest_distance_squared(tile) else {
                    continue;
                };
                if distance_squared as f32 <= radius_squared {
                    self.set_status(tile, status);
                }
            }
        }
    }

    fn set_status(&mut self, tile: Tile, status: RevealStatus) {
        let Some(index) = self.index(tile) else {
            return;
        };
        self.statuses[index] = status;
        if matches!(status, RevealStatus::Explored | RevealStatus::Visible) {
            if let Some(entity) = self.fog_entities[index].take() {
                self.revealed_fog_entities.push(entity);
            }
        }
    }

    fn index(&self, tile: Tile) -> Option<usize> {
        if tile.x >= 0 && tile.y >= 0 && tile.x < self.width && tile.y < self.height {
            Some((tile.y * self.width + tile.x) as usize)
        } else {
            None
        }
    }
}
