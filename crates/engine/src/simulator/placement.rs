use tracing::{debug, warn};

use crate::components::{CompBuilding, CompEntityInfo, CompTransform};
use crate::coordinates::{Feet, Tile};
use crate::events::{Event, EventPublisher};
use crate::factory::{can_place, EntityFactory};
use crate::map::{footprint_center, footprint_min_tile};
use crate::types::{EntityId, EntityType, PlayerId};
use crate::world::World;

/// The ghost building that follows the cursor between a build request and
/// its placement or cancellation.
#[derive(Debug, Default)]
pub struct BuildingPlacement {
    ghost: Option<EntityId>,
}

impl BuildingPlacement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ghost(&self) -> Option<EntityId> {
        self.ghost
    }

    pub fn is_active(&self) -> bool {
        self.ghost.is_some()
    }

    pub fn start(
        &mut self,
        world: &mut World,
        factory: &EntityFactory,
        events: &EventPublisher,
        entity_type: EntityType,
        player: PlayerId,
        at: Feet,
    ) {
        self.cancel(world, events);
        match factory.create_building_ghost(world, entity_type, player, at) {
            Ok(ghost) => {
                self.ghost = Some(ghost);
                self.move_to(world, at);
                events.publish(Event::BuildingPlacementStarted { entity: ghost });
                debug!(entity = ghost.0, entity_type = ?entity_type, player, "placement_started");
            }
            Err(err) => warn!(error = %err, entity_type = ?entity_type, "placement_start_failed"),
        }
    }

    /// Snaps the ghost's footprint to the tile grid under `at` and re-checks it.
    pub fn move_to(&mut self, world: &mut World, at: Feet) {
        let Some(ghost) = self.ghost else {
            return;
        };
        let Some(size) = world
            .state
            .get_component::<CompBuilding>(ghost)
            .map(|building| building.size)
        else {
            return;
        };
        let min_tile = footprint_min_tile(at, size);
        let position = footprint_center(min_tile, size);
        let valid = can_place(world, min_tile, size);

        let mut changed = false;
        if let Some(transform) = world.state.get_component_mut::<CompTransform>(ghost) {
            if transform.position != position {
                transform.position = position;
                changed = true;
            }
        }
        if let Some(building) = world.state.get_component_mut::<CompBuilding>(ghost) {
            if building.valid_placement != valid {
                building.valid_placement = valid;
                changed = true;
            }
        }
        if changed {
            world.state.mark_dirty(ghost);
        }
    }

    /// Places the ghost where it stands. Returns the footprint's minimum tile
    /// on success; an invalid spot keeps the placement going.
    pub fn place(
        &mut self,
        world: &mut World,
        factory: &EntityFactory,
        events: &EventPublisher,
    ) -> Option<Tile> {
        let ghost = self.ghost?;
        let building = world.state.get_component::<CompBuilding>(ghost)?;
        if !building.valid_placement {
            debug!(entity = ghost.0, "placement_rejected");
            return None;
        }
        let size = building.size;
        let min_tile = footprint_min_tile(world.position_of(ghost)?, size);
        if let Err(err) = factory.place_building(world, ghost, min_tile) {
            warn!(error = %err, entity = ghost.0, "placement_failed");
            return None;
        }
        self.ghost = None;
        events.publish(Event::BuildingPlaced {
            entity: ghost,
            tile: min_tile,
        });
        events.publish(Event::BuildingPlacementFinished { entity: ghost });
        Some(min_tile)
    }

    pub fn cancel(&mut self, world: &mut World, events: &EventPublisher) {
        let Some(ghost) = self.ghost.take() else {
            return;
        };
        if let Some(info) = world.state.get_component_mut::<CompEntityInfo>(ghost) {
            info.is_destroyed = true;
        }
        world.state.mark_dirty(ghost);
        world.state.destroy_entity(ghost);
        events.publish(Event::BuildingPlacementFinished { entity: ghost });
        debug!(entity = ghost.0, "placement_cancelled");
    }
}
