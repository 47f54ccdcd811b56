use tracing::{debug, error};

use crate::components::{CompBuilding, CompEntityInfo, CompPlayer, CompResource, CompTransform};
use crate::coordinates::{Coordinates, Feet};
use crate::ecs::GameState;
use crate::fog::RevealStatus;
use crate::map::{DynamicPassabilityKind, MapLayerType, PassabilityMap, TileMap};
use crate::player::PlayerManager;
use crate::types::{EntityId, PlayerId, Size};

/// Everything the simulator owns: entity state, spatial indices, players and the view.
pub struct World {
    pub state: GameState,
    pub tile_map: TileMap,
    pub passability: PassabilityMap,
    pub players: PlayerManager,
    pub coordinates: Coordinates,
}

impl World {
    pub fn new(
        world_size: Size,
        window_size: Size,
        player_count: usize,
        initial_fog: RevealStatus,
    ) -> Self {
        Self {
            state: GameState::new(),
            tile_map: TileMap::new(world_size.width, world_size.height),
            passability: PassabilityMap::new(world_size.width, world_size.height),
            players: PlayerManager::new(
                player_count,
                world_size.width,
                world_size.height,
                initial_fog,
            ),
            coordinates: Coordinates::new(world_size, window_size),
        }
    }

    pub fn player_of(&self, entity: EntityId) -> Option<PlayerId> {
        self.state
            .get_component::<CompPlayer>(entity)
            .map(|owner| owner.player)
    }

    pub fn position_of(&self, entity: EntityId) -> Option<Feet> {
        self.state
            .get_component::<CompTransform>(entity)
            .map(|transform| transform.position)
    }

    /// Whether `entity` still participates in the simulation.
    pub fn is_active(&self, entity: EntityId) -> bool {
        self.state.is_alive(entity)
            && !self.state.is_pending_destroy(entity)
            && !self
                .state
                .get_component::<CompEntityInfo>(entity)
                .is_some_and(|info| info.is_destroyed)
    }

    /// Unregisters a doomed entity from the spatial indices and its owner.
    /// Runs before the entity's components are dropped.
    pub fn release_entity(&mut self, entity: EntityId) {
        let Some(transform) = self.state.get_component::<CompTransform>(entity).copied() else {
            self.players.forget_entity(entity);
            return;
        };
        let tile = transform.tile();

        if let Some(building) = self.state.get_component::<CompBuilding>(entity) {
            // Ghosts have no land area and never blocked anything.
            let footprint = building
                .land_area
                .tiles()
                .first()
                .map(|&min_tile| (min_tile, building.size));
            self.tile_map.remove_static_entity(tile, entity);
            if let Some((min_tile, size)) = footprint {
                if let Err(err) = self.passability.set_dynamic_area(
                    min_tile,
                    size,
                    DynamicPassabilityKind::PassableForAny,
                    None,
                ) {
                    error!(error = %err, entity = entity.0, "release_passability_failed");
                }
            }
        } else if self.state.has_component::<CompResource>(entity) {
            self.tile_map.remove_static_entity(tile, entity);
            if let Err(err) =
                self.passability
                    .set_dynamic(tile, DynamicPassabilityKind::PassableForAny, None)
            {
                error!(error = %err, entity = entity.0, "release_passability_failed");
            }
        } else if self.tile_map.is_valid_tile(tile) {
            self.tile_map.remove_entity(MapLayerType::Units, tile, entity);
        }

        self.players.forget_entity(entity);
        debug!(entity = entity.0, x = tile.x, y = tile.y, "entity_released");
    }

    /// Drains the deferred destroy queue, releasing each entity first.
    pub fn apply_pending_destroys(&mut self) -> Vec<EntityId> {
        let pending = self.state.pending_destroys().to_vec();
        for entity in &pending {
            self.release_entity(*entity);
        }
        self.state.apply_pending_destroys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::{Feet, Tile};
    use crate::map::LandArea;
    use crate::types::ResourceType;

    fn world() -> World {
        World::new(Size::new(10, 10), Size::new(200, 200), 2, RevealStatus::Unexplored)
    }

    #[test]
    fn destroying_a_resource_frees_its_tile() {
        let mut world = world();
        let tree = world.state.create_entity();
        let tile = Tile::new(3, 3);
        world
            .state
            .add_component(tree, CompTransform::new(tile.center_in_feet()));
        world
            .state
            .add_component(tree, CompResource::new(ResourceType::Wood, 50));
        world
            .tile_map
            .add_entity(MapLayerType::Static, tile, tree)
            .expect("register tree");
        world
            .passability
            .set_dynamic(tile, DynamicPassabilityKind::BlockedForAny, None)
            .expect("block tree tile");

        world.state.destroy_entity(tree);
        assert!(!world.is_active(tree));
        assert_eq!(world.apply_pending_destroys(), vec![tree]);

        assert!(!world.tile_map.is_occupied(MapLayerType::Static, tile));
        assert!(world.passability.is_passable_for(tile, 0));
        assert!(!world.state.is_alive(tree));
    }

    #[test]
    fn destroying_a_building_clears_its_footprint() {
        let mut world = world();
        let house = world.state.create_entity();
        let min = Tile::new(2, 2);
        let size = Size::new(2, 2);
        let mut building = CompBuilding::new(size);
        building.land_area = LandArea::from_footprint(min, size);
        world
            .state
            .add_component(house, CompTransform::new(Feet::new(768.0, 768.0)));
        world.state.add_component(house, building);
        world
            .tile_map
            .add_static_entity(min, size, house)
            .expect("register house");
        world
            .passability
            .set_dynamic_area(min, size, DynamicPassabilityKind::BlockedForAny, None)
            .expect("block footprint");

        world.state.destroy_entity(house);
        world.apply_pending_destroys();

        for tile in LandArea::from_footprint(min, size).tiles() {
            assert!(!world.tile_map.is_occupied(MapLayerType::Static, *tile));
            assert!(world.passability.is_passable_for(*tile, 1));
        }
    }

    #[test]
    fn released_footprint_leaves_neighbours_and_ghosts_alone() {
        let mut world = world();
        let wall = Tile::new(4, 2);
        world
            .passability
            .set_dynamic(wall, DynamicPassabilityKind::BlockedForAny, None)
            .expect("block neighbour");

        let house = world.state.create_entity();
        let min = Tile::new(2, 2);
        let size = Size::new(2, 2);
        let mut building = CompBuilding::new(size);
        building.land_area = LandArea::from_footprint(min, size);
        world
            .state
            .add_component(house, CompTransform::new(Feet::new(768.0, 768.0)));
        world.state.add_component(house, building);
        world
            .tile_map
            .add_static_entity(min, size, house)
            .expect("register house");
        world
            .passability
            .set_dynamic_area(min, size, DynamicPassabilityKind::BlockedForAny, None)
            .expect("block footprint");

        // A ghost over the same tiles was never placed, so releasing it frees nothing.
        let ghost = world.state.create_entity();
        world
            .state
            .add_component(ghost, CompTransform::new(Feet::new(768.0, 768.0)));
        world.state.add_component(ghost, CompBuilding::new(size));
        world.state.destroy_entity(ghost);
        world.apply_pending_destroys();
        assert!(!world.passability.is_passable_for(min, 0));

        world.state.destroy_entity(house);
        world.apply_pending_destroys();
        assert!(world.passability.is_passable_for(Tile::new(3, 3), 0));
        assert!(!world.passability.is_passable_for(wall, 0));
    }

    #[test]
    fn destroying_a_unit_clears_units_layer_and_ownership() {
        let mut world = world();
        let unit = world.state.create_entity();
        let tile = Tile::new(1, 1);
        world
            .state
            .add_component(unit, CompTransform::new(tile.center_in_feet()));
        world.state.add_component(unit, CompPlayer { player: 1 });
        world
            .tile_map
            .add_entity(MapLayerType::Units, tile, unit)
            .expect("register unit");
        world.players.player_mut(1).expect("player").add_entity(unit);

        world.state.destroy_entity(unit);
        world.apply_pending_destroys();

        assert!(!world.tile_map.is_occupied(MapLayerType::Units, tile));
        assert_eq!(world.players.owner_of(unit), None);
    }
}
