use tracing::debug;

use crate::commands::CommandKind;
use crate::components::{
    CompBuilding, CompHealth, CompPlayer, CompResource, CompResourceGatherer, CompSelectible,
    CompTransform, CompUIElement, CompUnit,
};
use crate::coordinates::{Feet, ScreenUnits};
use crate::events::{Event, EventPublisher};
use crate::map::MapLayerType;
use crate::types::{EntityId, PlayerId, ScreenRect};
use crate::world::World;

/// Releases closer than this to the press point count as a click, not a drag.
pub const CLICK_THRESHOLD_PX: i32 = 4;

/// Selection state and order issuing for one player.
#[derive(Debug)]
pub struct UnitManager {
    player: PlayerId,
    selected: Vec<EntityId>,
    drag_start: Option<(i32, i32)>,
    selection_box: Option<EntityId>,
}

impl UnitManager {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            selected: Vec::new(),
            drag_start: None,
            selection_box: None,
        }
    }

    pub fn set_selection_box(&mut self, entity: EntityId) {
        self.selection_box = Some(entity);
    }

    pub fn selected(&self) -> &[EntityId] {
        &self.selected
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_start.is_some()
    }

    pub fn begin_drag(&mut self, x: i32, y: i32) {
        self.drag_start = Some((x, y));
    }

    pub fn drag_to(&mut self, world: &mut World, x: i32, y: i32) {
        let Some((start_x, start_y)) = self.drag_start else {
            return;
        };
        if is_click(start_x, start_y, x, y) {
            return;
        }
        self.show_selection_box(world, Some(ScreenRect::from_corners(start_x, start_y, x, y)));
    }

    /// Completes a left click or drag. Returns false when a UI element consumed the click.
    pub fn finish_drag(
        &mut self,
        world: &mut World,
        events: &EventPublisher,
        x: i32,
        y: i32,
    ) -> bool {
        let Some((start_x, start_y)) = self.drag_start.take() else {
            return false;
        };
        self.show_selection_box(world, None);

        if is_click(start_x, start_y, x, y) {
            if self.ui_element_at(world, x, y).is_some() {
                return false;
            }
            let picked = hit_test(world, x, y).into_iter().collect();
            self.select(world, events, picked);
        } else {
            let area = ScreenRect::from_corners(start_x, start_y, x, y);
            let picked = self.own_units_in(world, area);
            self.select(world, events, picked);
        }
        true
    }

    /// Replaces the selection and publishes it.
    pub fn select(&mut self, world: &mut World, events: &EventPublisher, entities: Vec<EntityId>) {
        for entity in self.selected.drain(..) {
            set_selected(world, entity, false);
        }
        for &entity in &entities {
            set_selected(world, entity, true);
        }
        self.selected = entities;
        debug!(count = self.selected.len(), "selection_changed");
        events.publish(Event::UnitSelection {
            entities: self.selected.clone(),
        });
    }

    /// Right click: one command request per selected unit this player owns.
    pub fn command_at(&self, world: &World, events: &EventPublisher, x: i32, y: i32) {
        if self.selected.is_empty() || self.ui_element_at(world, x, y).is_some() {
            return;
        }
        let target = hit_test(world, x, y);
        let feet = world
            .coordinates
            .screen_units_to_feet(ScreenUnits::new(x as f32, y as f32));

        for &unit in &self.selected {
            if !world.state.has_component::<CompUnit>(unit) || world.player_of(unit) != Some(self.player)
            {
                continue;
            }
            let Some(command) = command_for(world, unit, target, feet) else {
                continue;
            };
            events.publish(Event::CommandRequest {
                entity: unit,
                command,
            });
        }
    }

    pub fn forget(&mut self, destroyed: &[EntityId]) {
        self.selected.retain(|entity| !destroyed.contains(entity));
    }

    fn show_selection_box(&self, world: &mut World, rect: Option<ScreenRect>) {
        let Some(entity) = self.selection_box else {
            return;
        };
        let Some(element) = world.state.get_component_mut::<CompUIElement>(entity) else {
            return;
        };
        element.is_enabled = rect.is_some();
        if let Some(rect) = rect {
            element.rect = rect;
        }
        world.state.mark_dirty(entity);
    }

    fn ui_element_at(&self, world: &World, x: i32, y: i32) -> Option<EntityId> {
        world
            .state
            .entities_with::<CompUIElement>()
            .into_iter()
            .filter(|&entity| Some(entity) != self.selection_box)
            .find(|&entity| {
                world
                    .state
                    .get_component::<CompUIElement>(entity)
                    .is_some_and(|element| element.is_enabled && element.rect.contains(x, y))
            })
    }

    fn own_units_in(&self, world: &World, area: ScreenRect) -> Vec<EntityId> {
        world
            .state
            .entities_with2::<CompUnit, CompSelectible>()
            .into_iter()
            .filter(|&entity| world.is_active(entity) && world.player_of(entity) == Some(self.player))
            .filter(|&entity| screen_bounds(world, entity).is_some_and(|bounds| bounds.intersects(area)))
            .collect()
    }
}

fn is_click(start_x: i32, start_y: i32, x: i32, y: i32) -> bool {
    (x - start_x).abs() <= CLICK_THRESHOLD_PX && (y - start_y).abs() <= CLICK_THRESHOLD_PX
}

fn set_selected(world: &mut World, entity: EntityId, is_selected: bool) {
    if let Some(selectible) = world.state.get_component_mut::<CompSelectible>(entity) {
        if selectible.is_selected != is_selected {
            selectible.is_selected = is_selected;
            world.state.mark_dirty(entity);
        }
    }
}

/// Selection box of `entity` in window pixels.
fn screen_bounds(world: &World, entity: EntityId) -> Option<ScreenRect> {
    let transform = world.state.get_component::<CompTransform>(entity)?;
    let selectible = world.state.get_component::<CompSelectible>(entity)?;
    let anchor = world.coordinates.feet_to_screen_units(transform.position);
    Some(
        selectible
            .bounding_box(transform.direction())
            .offset(anchor.x.round() as i32, anchor.y.round() as i32),
    )
}

/// Topmost world entity under the cursor: units by their selection box, then
/// the static and on-ground occupants of the tile.
pub fn hit_test(world: &World, x: i32, y: i32) -> Option<EntityId> {
    let mut best: Option<(f32, EntityId)> = None;
    for entity in world.state.entities_with2::<CompUnit, CompSelectible>() {
        if !world.is_active(entity) {
            continue;
        }
        if !screen_bounds(world, entity).is_some_and(|bounds| bounds.contains(x, y)) {
            continue;
        }
        let Some(position) = world.position_of(entity) else {
            continue;
        };
        let z = world.coordinates.z_order(position);
        if best.map_or(true, |(best_z, _)| z > best_z) {
            best = Some((z, entity));
        }
    }
    if let Some((_, entity)) = best {
        return Some(entity);
    }

    let tile = world
        .coordinates
        .checked_screen_units_to_tiles(ScreenUnits::new(x as f32, y as f32))?;
    [MapLayerType::Static, MapLayerType::OnGround]
        .into_iter()
        .flat_map(|layer| world.tile_map.entities(layer, tile).iter().rev())
        .copied()
        .find(|&entity| world.is_active(entity) && world.state.has_component::<CompSelectible>(entity))
}

fn command_for(
    world: &World,
    unit: EntityId,
    target: Option<EntityId>,
    feet: Feet,
) -> Option<CommandKind> {
    let state = &world.state;
    let worker = state.has_component::<CompResourceGatherer>(unit);
    if let Some(target) = target.filter(|&target| target != unit) {
        let own = world.player_of(unit);
        let target_owner = state.get_component::<CompPlayer>(target).map(|owner| owner.player);

        if state.has_component::<CompResource>(target) && worker {
            return Some(CommandKind::gather(target));
        }
        if let Some(building) = state.get_component::<CompBuilding>(target) {
            if target_owner == own && worker && !building.is_constructed {
                return Some(CommandKind::build(target));
            }
            let damaged = state
                .get_component::<CompHealth>(target)
                .is_some_and(CompHealth::is_damaged);
            let repairs = state
                .get_component::<CompUnit>(unit)
                .is_some_and(|unit| unit.repair_per_second > 0.0);
            if target_owner == own && building.is_constructed && damaged && repairs {
                return Some(CommandKind::repair(target));
            }
        }
        let attacks = state
            .get_component::<CompUnit>(unit)
            .is_some_and(|unit| unit.attack_damage_per_second > 0.0);
        if target_owner.is_some()
            && target_owner != own
            && attacks
            && state.has_component::<CompHealth>(target)
        {
            return Some(CommandKind::attack(target));
        }
    }
    world
        .coordinates
        .is_inside_map(feet)
        .then(|| CommandKind::move_to(feet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::world;
    use crate::coordinates::Tile;
    use crate::events::event_channel;
    use crate::factory::test_support::factory;
    use crate::types::EntityType;

    fn screen_of(world: &World, feet: Feet) -> (i32, i32) {
        let screen = world.coordinates.feet_to_screen_units(feet);
        (screen.x.round() as i32, screen.y.round() as i32)
    }

    #[test]
    fn click_selects_the_unit_under_the_cursor() {
        let (factory, _receiver) = factory();
        let (events, receiver) = event_channel();
        let mut world = world(10);
        let position = Tile::new(4, 4).center_in_feet();
        let villager = factory
            .create_villager(&mut world, 0, position)
            .expect("villager");
        let mut units = UnitManager::new(0);

        let (x, y) = screen_of(&world, position);
        units.begin_drag(x, y - 10);
        assert!(units.finish_drag(&mut world, &events, x + 1, y - 10));

        assert_eq!(units.selected(), &[villager]);
        assert!(world
            .state
            .get_component::<CompSelectible>(villager)
            .expect("selectible")
            .is_selected);
        assert_eq!(
            receiver.try_recv().expect("selection event"),
            Event::UnitSelection {
                entities: vec![villager]
            }
        );
    }

    #[test]
    fn drag_selects_only_own_units() {
        let (factory, _receiver) = factory();
        let (events, _events_rx) = event_channel();
        let mut world = world(10);
        let mine = factory
            .create_villager(&mut world, 0, Tile::new(2, 2).center_in_feet())
            .expect("own villager");
        factory
            .create_villager(&mut world, 1, Tile::new(3, 3).center_in_feet())
            .expect("enemy villager");
        let mut units = UnitManager::new(0);

        units.begin_drag(0, 0);
        units.drag_to(&mut world, 640, 480);
        assert!(units.is_dragging());
        units.finish_drag(&mut world, &events, 640, 480);

        assert_eq!(units.selected(), &[mine]);
    }

    #[test]
    fn selection_box_follows_the_drag() {
        let (factory, _receiver) = factory();
        let (events, _events_rx) = event_channel();
        let mut world = world(10);
        let selection_box = factory.create_selection_box(&mut world);
        let mut units = UnitManager::new(0);
        units.set_selection_box(selection_box);

        units.begin_drag(10, 10);
        units.drag_to(&mut world, 50, 30);
        let element = *world
            .state
            .get_component::<CompUIElement>(selection_box)
            .expect("ui element");
        assert!(element.is_enabled);
        assert_eq!(element.rect, ScreenRect::new(10, 10, 40, 20));

        units.finish_drag(&mut world, &events, 50, 30);
        assert!(!world
            .state
            .get_component::<CompUIElement>(selection_box)
            .expect("ui element")
            .is_enabled);
    }

    #[test]
    fn right_click_picks_command_by_target() {
        let (factory, _receiver) = factory();
        let mut world = world(12);
        let villager = factory
            .create_villager(&mut world, 0, Tile::new(1, 1).center_in_feet())
            .expect("villager");
        let tree = factory.create_tree(&mut world, Tile::new(6, 6)).expect("tree");
        let site = factory
            .create_building(&mut world, EntityType::House, 0, Tile::new(8, 2), false)
            .expect("site");
        let enemy = factory
            .create_militia(&mut world, 1, Tile::new(2, 9).center_in_feet())
            .expect("enemy");

        let feet = Feet::new(900.0, 900.0);
        assert_eq!(
            command_for(&world, villager, Some(tree), feet),
            Some(CommandKind::gather(tree))
        );
        assert_eq!(
            command_for(&world, villager, Some(site), feet),
            Some(CommandKind::build(site))
        );
        assert_eq!(
            command_for(&world, villager, Some(enemy), feet),
            Some(CommandKind::attack(enemy))
        );
        assert!(matches!(
            command_for(&world, villager, None, feet),
            Some(CommandKind::Move(_))
        ));
        assert_eq!(command_for(&world, villager, None, Feet::new(-5.0, 0.0)), None);
    }

    #[test]
    fn right_click_publishes_requests_for_selected_units() {
        let (factory, _receiver) = factory();
        let (events, receiver) = event_channel();
        let mut world = world(12);
        let villager = factory
            .create_villager(&mut world, 0, Tile::new(1, 1).center_in_feet())
            .expect("villager");
        let tree = factory.create_tree(&mut world, Tile::new(6, 6)).expect("tree");
        let mut units = UnitManager::new(0);
        units.select(&mut world, &events, vec![villager]);
        receiver.try_recv().expect("selection event");

        let (x, y) = screen_of(&world, Tile::new(6, 6).center_in_feet());
        units.command_at(&world, &events, x, y);
        assert_eq!(
            receiver.try_recv().expect("command request"),
            Event::CommandRequest {
                entity: villager,
                command: CommandKind::gather(tree),
            }
        );
    }
}
