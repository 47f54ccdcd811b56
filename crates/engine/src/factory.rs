//! Spawns fully wired entities from the defs database.
//!
//! Besides attaching components, spawning registers the entity with every
//! index that needs to know about it: the tile map, passability, the owning
//! player and (through a `TrackingRequest`) the vision system.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::components::{
    CompAction, CompAnimation, CompBuilding, CompEntityInfo, CompGraphics, CompHealth,
    CompPlayer, CompResource, CompResourceGatherer, CompSelectible, CompTransform,
    CompUIElement, CompUnit, CompVision, SelectionIndicator, UiElementKind,
};
use crate::content::DefDatabase;
use crate::coordinates::{Feet, Tile, TILE_PIXEL_HEIGHT, TILE_PIXEL_WIDTH};
use crate::ecs::CompDirty;
use crate::events::{Event, EventPublisher, TrackingArea};
use crate::map::{
    footprint_center, DynamicPassabilityKind, LandArea, MapError, MapLayerType, TerrainPassability,
};
use crate::types::{
    Color, EntityId, EntityType, GraphicLayer, LineOfSightShape, PlayerId, ScreenRect, Size,
};
use crate::world::World;

const UNIT_BOUNDING_BOX: ScreenRect = ScreenRect::new(-12, -40, 24, 44);
const UNIT_SELECTION_RADIUS_PX: i32 = 16;
const SELECTION_BOX_COLOR: Color = Color::rgba(240, 240, 240, 255);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpawnError {
    #[error("no definition for {0:?}")]
    UnknownDef(EntityType),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error("tile ({}, {}) is already occupied", .0.x, .0.y)]
    Occupied(Tile),
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
    #[error("{0} is not a building waiting for placement")]
    NotAGhost(EntityId),
}

#[derive(Debug, Clone)]
pub struct EntityFactory {
    defs: Arc<DefDatabase>,
    events: EventPublisher,
}

impl EntityFactory {
    pub fn new(defs: Arc<DefDatabase>, events: EventPublisher) -> Self {
        Self { defs, events }
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn defs(&self) -> &DefDatabase {
        &self.defs
    }

    pub fn create_villager(
        &self,
        world: &mut World,
        player: PlayerId,
        position: Feet,
    ) -> Result<EntityId, SpawnError> {
        self.create_unit(world, EntityType::Villager, player, position)
    }

    pub fn create_militia(
        &self,
        world: &mut World,
        player: PlayerId,
        position: Feet,
    ) -> Result<EntityId, SpawnError> {
        self.create_unit(world, EntityType::Militia, player, position)
    }

    pub fn create_unit(
        &self,
        world: &mut World,
        entity_type: EntityType,
        player: PlayerId,
        position: Feet,
    ) -> Result<EntityId, SpawnError> {
        let def = self
            .defs
            .unit(entity_type)
            .ok_or(SpawnError::UnknownDef(entity_type))?;
        if world.players.player(player).is_none() {
            return Err(SpawnError::UnknownPlayer(player));
        }
        let tile = position.to_tile();
        if !world.tile_map.is_valid_tile(tile) {
            return Err(MapError::TileOutOfBounds {
                tile,
                width: world.tile_map.width(),
                height: world.tile_map.height(),
            }
            .into());
        }
        if world.tile_map.is_occupied(MapLayerType::Static, tile) {
            return Err(SpawnError::Occupied(tile));
        }

        let id = world.state.create_entity();
        let state = &mut world.state;
        state.add_component(id, CompEntityInfo::new(entity_type));
        state.add_component(
            id,
            CompTransform::new(position)
                .with_speed(def.speed)
                .with_goal_radius(def.collision_radius / 2.0)
                .with_collision_radius(def.collision_radius),
        );
        state.add_component(
            id,
            CompUnit {
                attack_damage_per_second: def.attack_damage_per_second,
                repair_per_second: def.repair_per_second,
                ..CompUnit::default()
            },
        );
        state.add_component(id, CompAction::default());
        state.add_component(
            id,
            CompAnimation {
                frame: 0,
                animations: def.animations.clone(),
            },
        );
        state.add_component(id, CompPlayer { player });
        state.add_component(id, CompHealth::new(def.hit_points));
        state.add_component(
            id,
            CompVision {
                line_of_sight: def.line_of_sight,
                shape: LineOfSightShape::Circle,
                has_vision: true,
            },
        );
        if def.can_gather() {
            state.add_component(
                id,
                CompResourceGatherer::new(def.carry_capacity, def.gather_speed),
            );
        }
        state.add_component(
            id,
            CompSelectible::uniform(
                UNIT_BOUNDING_BOX,
                SelectionIndicator::Ellipse {
                    radius_px: UNIT_SELECTION_RADIUS_PX,
                },
            ),
        );
        state.add_component(id, graphics(id, entity_type, Some(player), Size::ONE));
        state.add_component(id, CompDirty::default());
        state.mark_dirty(id);

        world.tile_map.add_entity(MapLayerType::Units, tile, id)?;
        if let Some(owner) = world.players.player_mut(player) {
            owner.add_entity(id);
            owner.fog.mark_as_visible(tile, def.line_of_sight);
        }
        self.events.publish(Event::TrackingRequest {
            entity: id,
            area: TrackingArea::Center(position),
            line_of_sight: def.line_of_sight,
            shape: LineOfSightShape::Circle,
        });
        debug!(entity = id.0, entity_type = ?entity_type, player, x = tile.x, y = tile.y, "unit_spawned");
        Ok(id)
    }

    pub fn create_tree(&self, world: &mut World, tile: Tile) -> Result<EntityId, SpawnError> {
        self.create_resource(world, EntityType::Tree, tile, 0)
    }

    pub fn create_resource(
        &self,
        world: &mut World,
        entity_type: EntityType,
        tile: Tile,
        variation: u8,
    ) -> Result<EntityId, SpawnError> {
        let def = self
            .defs
            .resource(entity_type)
            .ok_or(SpawnError::UnknownDef(entity_type))?;
        ensure_free(world, LandArea::from_footprint(tile, Size::ONE).tiles())?;

        let id = world.state.create_entity();
        let state = &mut world.state;
        state.add_component(
            id,
            CompEntityInfo {
                variation,
                ..CompEntityInfo::new(entity_type)
            },
        );
        state.add_component(
            id,
            CompTransform::new(tile.center_in_feet()).with_collision_radius(def.collision_radius),
        );
        state.add_component(id, CompResource::new(def.resource_type, def.amount));
        state.add_component(id, tile_selectible(Size::ONE));
        let mut resource_graphics = graphics(id, entity_type, None, Size::ONE);
        resource_graphics.variation = variation;
        state.add_component(id, resource_graphics);
        state.add_component(id, CompDirty::default());
        state.mark_dirty(id);

        world.tile_map.add_entity(MapLayerType::Static, tile, id)?;
        world
            .passability
            .set_dynamic(tile, DynamicPassabilityKind::BlockedForAny, None)?;
        Ok(id)
    }

    /// Spawns a building on its footprint. Unconstructed buildings start as
    /// construction sites with zero progress.
    pub fn create_building(
        &self,
        world: &mut World,
        entity_type: EntityType,
        player: PlayerId,
        min_tile: Tile,
        constructed: bool,
    ) -> Result<EntityId, SpawnError> {
        let size = self.building_size(entity_type)?;
        ensure_free(world, LandArea::from_footprint(min_tile, size).tiles())?;
        let id = self.create_building_ghost(
            world,
            entity_type,
            player,
            footprint_center(min_tile, size),
        )?;
        if let Err(err) = self.place_building(world, id, min_tile) {
            world.state.destroy_entity(id);
            return Err(err);
        }
        if constructed {
            if let Some(building) = world.state.get_component_mut::<CompBuilding>(id) {
                building.is_constructed = true;
                building.construction_progress_ms = building.build_time_ms;
            }
        }
        Ok(id)
    }

    /// A building that follows the cursor until it is placed. It occupies no tiles.
    pub fn create_building_ghost(
        &self,
        world: &mut World,
        entity_type: EntityType,
        player: PlayerId,
        position: Feet,
    ) -> Result<EntityId, SpawnError> {
        let def = self
            .defs
            .building(entity_type)
            .ok_or(SpawnError::UnknownDef(entity_type))?;
        if world.players.player(player).is_none() {
            return Err(SpawnError::UnknownPlayer(player));
        }

        let id = world.state.create_entity();
        let state = &mut world.state;
        state.add_component(id, CompEntityInfo::new(entity_type));
        let radius = def.size.width.max(def.size.height) as f32 * 128.0;
        state.add_component(
            id,
            CompTransform::new(position).with_collision_radius(radius),
        );
        state.add_component(
            id,
            CompBuilding {
                is_placing: true,
                is_constructed: false,
                line_of_sight: def.line_of_sight,
                build_time_ms: def.build_time_ms,
                ..CompBuilding::new(def.size)
            },
        );
        state.add_component(id, CompPlayer { player });
        state.add_component(id, graphics(id, entity_type, Some(player), def.size));
        state.add_component(id, CompDirty::default());
        state.mark_dirty(id);
        Ok(id)
    }

    /// Turns a placing ghost into a construction site on `min_tile`.
    pub fn place_building(
        &self,
        world: &mut World,
        entity: EntityId,
        min_tile: Tile,
    ) -> Result<(), SpawnError> {
        let Some(building) = world.state.get_component::<CompBuilding>(entity) else {
            return Err(SpawnError::NotAGhost(entity));
        };
        if !building.is_placing {
            return Err(SpawnError::NotAGhost(entity));
        }
        let size = building.size;
        let line_of_sight = building.line_of_sight;
        let land_area = LandArea::from_footprint(min_tile, size);
        ensure_free(world, land_area.tiles())?;
        let Some(player) = world.player_of(entity) else {
            return Err(SpawnError::NotAGhost(entity));
        };
        let entity_type = world
            .state
            .get_component::<CompEntityInfo>(entity)
            .map(|info| info.entity_type)
            .unwrap_or_default();
        let hit_points = self
            .defs
            .building(entity_type)
            .map(|def| def.hit_points)
            .unwrap_or(1);

        world.tile_map.add_static_entity(min_tile, size, entity)?;
        world
            .passability
            .set_dynamic_area(min_tile, size, DynamicPassabilityKind::BlockedForAny, None)?;

        let state = &mut world.state;
        if let Some(building) = state.get_component_mut::<CompBuilding>(entity) {
            building.is_placing = false;
            building.valid_placement = true;
            building.land_area = land_area.clone();
        }
        if let Some(transform) = state.get_component_mut::<CompTransform>(entity) {
            transform.position = footprint_center(min_tile, size);
        }
        state.add_component(entity, CompHealth::new(hit_points));
        state.add_component(entity, tile_selectible(size));
        state.add_component(
            entity,
            CompVision {
                line_of_sight,
                shape: LineOfSightShape::RoundedSquare,
                has_vision: true,
            },
        );
        state.mark_dirty(entity);

        if let Some(owner) = world.players.player_mut(player) {
            owner.add_entity(entity);
            owner.fog.mark_land_area_as_visible(&land_area, line_of_sight);
        }
        self.events.publish(Event::TrackingRequest {
            entity,
            area: TrackingArea::LandArea(land_area),
            line_of_sight,
            shape: LineOfSightShape::RoundedSquare,
        });
        debug!(entity = entity.0, x = min_tile.x, y = min_tile.y, "building_placed");
        Ok(())
    }

    pub fn building_size(&self, entity_type: EntityType) -> Result<Size, SpawnError> {
        self.defs
            .building(entity_type)
            .map(|def| def.size)
            .ok_or(SpawnError::UnknownDef(entity_type))
    }

    pub fn create_tile(
        &self,
        world: &mut World,
        tile: Tile,
        variation: u8,
    ) -> Result<EntityId, SpawnError> {
        if !world.tile_map.is_valid_tile(tile) {
            return Err(MapError::TileOutOfBounds {
                tile,
                width: world.tile_map.width(),
                height: world.tile_map.height(),
            }
            .into());
        }
        let id = world.state.create_entity();
        let state = &mut world.state;
        state.add_component(
            id,
            CompEntityInfo {
                variation,
                ..CompEntityInfo::new(EntityType::Tile)
            },
        );
        state.add_component(id, CompTransform::new(tile.center_in_feet()));
        let mut tile_graphics = graphics(id, EntityType::Tile, None, Size::ONE);
        tile_graphics.layer = GraphicLayer::Ground;
        tile_graphics.variation = variation;
        state.add_component(id, tile_graphics);
        state.add_component(id, CompDirty::default());
        state.mark_dirty(id);
        world.tile_map.add_entity(MapLayerType::Ground, tile, id)?;
        Ok(id)
    }

    /// Covers an unexplored tile of `player`'s map. The fog grid hands the
    /// entity back for destruction once the tile is revealed.
    pub fn create_fog(
        &self,
        world: &mut World,
        player: PlayerId,
        tile: Tile,
    ) -> Result<EntityId, SpawnError> {
        let Some(owner) = world.players.player(player) else {
            return Err(SpawnError::UnknownPlayer(player));
        };
        if owner.fog.fog_entity(tile).is_some() {
            return Err(SpawnError::Occupied(tile));
        }
        if !world.tile_map.is_valid_tile(tile) {
            return Err(MapError::TileOutOfBounds {
                tile,
                width: world.tile_map.width(),
                height: world.tile_map.height(),
            }
            .into());
        }
        let id = world.state.create_entity();
        let state = &mut world.state;
        state.add_component(id, CompEntityInfo::new(EntityType::Fog));
        state.add_component(id, CompTransform::new(tile.center_in_feet()));
        let mut fog_graphics = graphics(id, EntityType::Fog, None, Size::ONE);
        fog_graphics.layer = GraphicLayer::Fog;
        state.add_component(id, fog_graphics);
        state.add_component(id, CompDirty::default());
        state.mark_dirty(id);
        if let Some(owner) = world.players.player_mut(player) {
            owner.fog.set_fog_entity(tile, id);
        }
        Ok(id)
    }

    /// The drag rectangle shown while box-selecting. Starts hidden.
    pub fn create_selection_box(&self, world: &mut World) -> EntityId {
        let id = world.state.create_entity();
        let state = &mut world.state;
        state.add_component(id, CompEntityInfo::new(EntityType::UiElement));
        state.add_component(
            id,
            CompUIElement {
                kind: UiElementKind::SelectionBox,
                rect: ScreenRect::default(),
                color: SELECTION_BOX_COLOR,
                is_enabled: false,
            },
        );
        let mut ui_graphics = graphics(id, EntityType::UiElement, None, Size::ONE);
        ui_graphics.layer = GraphicLayer::Ui;
        ui_graphics.ui_rect = Some(ScreenRect::default());
        ui_graphics.is_enabled = false;
        state.add_component(id, ui_graphics);
        state.add_component(id, CompDirty::default());
        state.mark_dirty(id);
        id
    }
}

fn graphics(
    id: EntityId,
    entity_type: EntityType,
    player: Option<PlayerId>,
    land_size: Size,
) -> CompGraphics {
    CompGraphics {
        entity_type,
        player,
        land_size,
        layer: GraphicLayer::Entities,
        ..CompGraphics::new(id)
    }
}

/// Selection rhombus matching an isometric footprint.
fn tile_selectible(size: Size) -> CompSelectible {
    let span = size.width + size.height;
    let width_px = span * TILE_PIXEL_WIDTH as i32 / 2;
    let height_px = span * TILE_PIXEL_HEIGHT as i32 / 2;
    CompSelectible::uniform(
        ScreenRect::new(-width_px / 2, -height_px, width_px, height_px * 3 / 2),
        SelectionIndicator::Rhombus {
            width_px,
            height_px,
        },
    )
}

/// Every tile must be on the map and free of static entities and units.
fn ensure_free(world: &World, tiles: &[Tile]) -> Result<(), SpawnError> {
    for &tile in tiles {
        if !world.tile_map.is_valid_tile(tile) {
            return Err(MapError::TileOutOfBounds {
                tile,
                width: world.tile_map.width(),
                height: world.tile_map.height(),
            }
            .into());
        }
        if world.tile_map.is_occupied(MapLayerType::Static, tile)
            || world.tile_map.is_occupied(MapLayerType::Units, tile)
            || world.passability.terrain(tile) != Some(TerrainPassability::PassableForAny)
        {
            return Err(SpawnError::Occupied(tile));
        }
    }
    Ok(())
}

/// Whether a footprint starting at `min_tile` could be placed right now.
pub fn can_place(world: &World, min_tile: Tile, size: Size) -> bool {
    ensure_free(world, LandArea::from_footprint(min_tile, size).tiles()).is_ok()
}
