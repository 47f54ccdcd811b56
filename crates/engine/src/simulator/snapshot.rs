use crate::commands::CommandKind;
use crate::components::{
    AddonKind, CompAction, CompAnimation, CompBuilding, CompEntityInfo, CompGraphics, CompHealth,
    CompSelectible, CompTransform, CompUIElement, CompUnit, DebugOverlay, GraphicAddon,
    SelectionIndicator,
};
use crate::types::{Color, EntityId, UnitAction};
use crate::world::World;

const SELECTION_COLOR: Color = Color::rgba(90, 230, 90, 255);
const HEALTH_COLOR: Color = Color::rgba(60, 200, 60, 255);
const CONSTRUCTION_COLOR: Color = Color::rgba(230, 190, 60, 255);
const VALID_PLACEMENT_SHADING: Color = Color::rgba(150, 255, 150, 170);
const INVALID_PLACEMENT_SHADING: Color = Color::rgba(255, 110, 110, 170);

/// Rebuilds the render view of `entity` from its simulation components.
pub(super) fn refresh_graphics(world: &mut World, entity: EntityId, debug_overlays: bool) {
    let Some(graphics) = world.state.get_component_mut::<CompGraphics>(entity) else {
        return;
    };
    let mut addons = std::mem::take(&mut graphics.addons);
    let mut overlays = std::mem::take(&mut graphics.debug_overlays);
    addons.clear();
    overlays.clear();

    let state = &world.state;
    let info = state.get_component::<CompEntityInfo>(entity).copied();
    let transform = state.get_component::<CompTransform>(entity).copied();
    let ui_element = state.get_component::<CompUIElement>(entity).copied();
    let building = state.get_component::<CompBuilding>(entity);
    let is_destroyed =
        state.is_pending_destroy(entity) || info.is_some_and(|info| info.is_destroyed);

    let mut action = state
        .get_component::<CompAction>(entity)
        .map(|action| action.action)
        .unwrap_or_default();
    let frame = state
        .get_component::<CompAnimation>(entity)
        .map(|animation| animation.frame)
        .unwrap_or_default();

    let mut shading = Color::WHITE;
    if let Some(building) = building {
        if building.is_placing {
            shading = if building.valid_placement {
                VALID_PLACEMENT_SHADING
            } else {
                INVALID_PLACEMENT_SHADING
            };
        } else if !building.is_constructed {
            action = UnitAction::Building;
            addons.push(GraphicAddon {
                kind: AddonKind::HealthBar {
                    fraction: building.construction_fraction(),
                },
                color: CONSTRUCTION_COLOR,
            });
        }
    }

    if let Some(selectible) = state
        .get_component::<CompSelectible>(entity)
        .filter(|selectible| selectible.is_selected)
    {
        let kind = match selectible.selection_indicator {
            SelectionIndicator::Ellipse { radius_px } => AddonKind::Circle { radius_px },
            SelectionIndicator::Rhombus {
                width_px,
                height_px,
            } => AddonKind::Rhombus {
                width_px,
                height_px,
            },
        };
        addons.push(GraphicAddon {
            kind,
            color: SELECTION_COLOR,
        });
        if let Some(health) = state.get_component::<CompHealth>(entity) {
            addons.push(GraphicAddon {
                kind: AddonKind::HealthBar {
                    fraction: health.current as f32 / health.max.max(1) as f32,
                },
                color: HEALTH_COLOR,
            });
        }
    }

    if debug_overlays {
        if let Some(transform) = transform {
            if transform.collision_radius > 0.0 {
                overlays.push(DebugOverlay::CollisionCircle {
                    radius_feet: transform.collision_radius,
                });
            }
            overlays.push(DebugOverlay::Anchor);
        }
        let next_waypoint = state
            .get_component::<CompUnit>(entity)
            .and_then(|unit| unit.commands.current())
            .and_then(|command| match command.kind() {
                CommandKind::Move(movement) => movement.remaining_waypoints().first().copied(),
                _ => None,
            });
        if let Some(to) = next_waypoint {
            overlays.push(DebugOverlay::PathLine { to });
        }
    }

    if let Some(element) = ui_element {
        shading = element.color;
    }

    let Some(graphics) = world.state.get_component_mut::<CompGraphics>(entity) else {
        return;
    };
    if let Some(info) = info {
        graphics.entity_type = info.entity_type;
        graphics.entity_sub_type = info.entity_sub_type;
        graphics.variation = info.variation;
    }
    match ui_element {
        Some(element) => {
            graphics.position_in_feet = None;
            graphics.ui_rect = Some(element.rect);
            graphics.is_enabled = element.is_enabled;
        }
        None => {
            graphics.position_in_feet = transform.map(|transform| transform.position);
        }
    }
    if let Some(transform) = transform {
        graphics.direction = transform.direction();
    }
    graphics.action = action;
    graphics.frame = frame;
    graphics.shading = shading;
    graphics.is_destroyed = is_destroyed;
    graphics.addons = addons;
    graphics.debug_overlays = overlays;
}

/// Field-wise copy that keeps `dst`'s vector allocations.
pub(super) fn copy_graphics(dst: &mut CompGraphics, src: &CompGraphics) {
    let CompGraphics {
        entity_id,
        position_in_feet,
        ui_rect,
        entity_type,
        entity_sub_type,
        variation,
        player,
        direction,
        action,
        frame,
        land_size,
        layer,
        shading,
        addons,
        debug_overlays,
        is_destroyed,
        is_enabled,
    } = src;
    dst.entity_id = *entity_id;
    dst.position_in_feet = *position_in_feet;
    dst.ui_rect = *ui_rect;
    dst.entity_type = *entity_type;
    dst.entity_sub_type = *entity_sub_type;
    dst.variation = *variation;
    dst.player = *player;
    dst.direction = *direction;
    dst.action = *action;
    dst.frame = *frame;
    dst.land_size = *land_size;
    dst.layer = *layer;
    dst.shading = *shading;
    dst.addons.clone_from(addons);
    dst.debug_overlays.clone_from(debug_overlays);
    dst.is_destroyed = *is_destroyed;
    dst.is_enabled = *is_enabled;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::world;
    use crate::coordinates::Tile;
    use crate::factory::test_support::factory;
    use crate::types::EntityType;

    #[test]
    fn construction_sites_render_as_building_action_with_progress() {
        let (factory, _receiver) = factory();
        let mut world = world(10);
        let site = factory
            .create_building(&mut world, EntityType::House, 0, Tile::new(2, 2), false)
            .expect("site");
        world
            .state
            .get_component_mut::<CompBuilding>(site)
            .expect("building")
            .construction_progress_ms = 7500;

        refresh_graphics(&mut world, site, false);
        let graphics = world.state.get_component::<CompGraphics>(site).expect("graphics");
        assert_eq!(graphics.action, UnitAction::Building);
        assert_eq!(graphics.player, Some(0));
        assert_eq!(graphics.addons.len(), 1);
        assert!(matches!(
            graphics.addons[0].kind,
            AddonKind::HealthBar { fraction } if (fraction - 0.5).abs() < 1e-6
        ));
    }

    #[test]
    fn selected_units_carry_indicator_and_debug_overlays() {
        let (factory, _receiver) = factory();
        let mut world = world(10);
        let villager = factory
            .create_villager(&mut world, 0, Tile::new(3, 3).center_in_feet())
            .expect("villager");
        world
            .state
            .get_component_mut::<CompSelectible>(villager)
            .expect("selectible")
            .is_selected = true;

        refresh_graphics(&mut world, villager, true);
        let graphics = world.state.get_component::<CompGraphics>(villager).expect("graphics");
        assert_eq!(graphics.position_in_feet, Some(Tile::new(3, 3).center_in_feet()));
        assert!(matches!(graphics.addons[0].kind, AddonKind::Circle { radius_px: 16 }));
        assert!(graphics
            .debug_overlays
            .contains(&DebugOverlay::CollisionCircle { radius_feet: 32.0 }));

        let mut copy = CompGraphics::default();
        copy_graphics(&mut copy, graphics);
        assert_eq!(&copy, graphics);
    }

    #[test]
    fn placing_ghost_is_tinted_by_validity() {
        let (factory, _receiver) = factory();
        let mut world = world(10);
        let ghost = factory
            .create_building_ghost(
                &mut world,
                EntityType::House,
                0,
                Tile::new(4, 4).center_in_feet(),
            )
            .expect("ghost");
        world
            .state
            .get_component_mut::<CompBuilding>(ghost)
            .expect("building")
            .valid_placement = false;

        refresh_graphics(&mut world, ghost, false);
        let graphics = world.state.get_component::<CompGraphics>(ghost).expect("graphics");
        assert_eq!(graphics.shading, INVALID_PLACEMENT_SHADING);
        assert_eq!(graphics.action, UnitAction::Idle);
    }
}
