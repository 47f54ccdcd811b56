use crate::coordinates::Tile;
use crate::types::{PlayerId, Size};

use super::MapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TerrainPassability {
    PassableForLand,
    PassableForWater,
    #[default]
    PassableForAny,
    BlockedForAny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DynamicPassability {
    #[default]
    PassableForAny,
    BlockedForAny,
    PassableForOwnerOrAllied(PlayerId),
}

/// Setter-side discriminant; the owner travels separately so a missing one can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicPassabilityKind {
    PassableForAny,
    BlockedForAny,
    PassableForOwnerOrAllied,
}

#[derive(Debug, Clone, Default)]
pub struct PassabilityMap {
    width: i32,
    height: i32,
    terrain: Vec<TerrainPassability>,
    dynamic: Vec<DynamicPassability>,
}

impl PassabilityMap {
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        let cells = (width * height) as usize;
        Self {
            width,
            height,
            terrain: vec![TerrainPassability::default(); cells],
            dynamic: vec![DynamicPassability::default(); cells],
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

    pub fn set_terrain(
        &mut self,
        tile: Tile,
        passability: TerrainPassability,
    ) -> Result<(), MapError> {
        let index = self.index_of(tile)?;
        self.terrain[index] = passability;
        Ok(())
    }

    pub fn terrain(&self, tile: Tile) -> Option<TerrainPassability> {
        self.checked_index(tile).map(|index| self.terrain[index])
    }

    pub fn set_dynamic(
        &mut self,
        tile: Tile,
        kind: DynamicPassabilityKind,
        owner: Option<PlayerId>,
    ) -> Result<(), MapError> {
        let index = self.index_of(tile)?;
        let value = match (kind, owner) {
            (DynamicPassabilityKind::PassableForAny, _) => DynamicPassability::PassableForAny,
            (DynamicPassabilityKind::BlockedForAny, _) => DynamicPassability::BlockedForAny,
            (DynamicPassabilityKind::PassableForOwnerOrAllied, Some(owner)) => {
                DynamicPassability::PassableForOwnerOrAllied(owner)
            }
            (DynamicPassabilityKind::PassableForOwnerOrAllied, None) => {
                return Err(MapError::OwnerRequired { tile });
            }
        };
        self.dynamic[index] = value;
        Ok(())
    }

    /// Applies the same dynamic passability to a rectangular footprint.
    pub fn set_dynamic_area(
        &mut self,
        min_tile: Tile,
        size: Size,
        kind: DynamicPassabilityKind,
        owner: Option<PlayerId>,
    ) -> Result<(), MapError> {
        for dy in 0..size.height {
            for dx in 0..size.width {
                self.set_dynamic(min_tile.offset(dx, dy), kind, owner)?;
            }
        }
        Ok(())
    }

    pub fn dynamic(&self, tile: Tile) -> Option<DynamicPassability> {
        self.checked_index(tile).map(|index| self.dynamic[index])
    }

    pub fn is_passable_for(&self, tile: Tile, player: PlayerId) -> bool {
        let Some(index) = self.checked_index(tile) else {
            return false;
        };
        if self.terrain[index] != TerrainPassability::PassableForAny {
            return false;
        }
        match self.dynamic[index] {
            DynamicPassability::PassableForAny => true,
            DynamicPassability::BlockedForAny => false,
            DynamicPassability::PassableForOwnerOrAllied(owner) => owner == player,
        }
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
