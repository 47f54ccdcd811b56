//! Line-of-sight tracking between entities.
//!
//! Trackers are registered from `TrackingRequest` events. Each tick the system
//! re-evaluates which units and static entities every tracker can see and
//! publishes `WithinLineOfSight` / `OutOfLineOfSight` only when that changes.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::components::CompTransform;
use crate::coordinates::{Feet, Tile};
use crate::events::{Event, EventPublisher, TrackingArea};
use crate::map::MapLayerType;
use crate::types::{EntityId, LineOfSightShape};
use crate::world::World;

/// Stride of the composite `tracker * MAX_ENTITIES + target` key.
const MAX_ENTITIES: u64 = 1 << 32;

const CANDIDATE_LAYERS: [MapLayerType; 2] = [MapLayerType::Units, MapLayerType::Static];

#[derive(Debug, Clone, PartialEq)]
struct Tracker {
    area: TrackingArea,
    line_of_sight: f32,
    shape: LineOfSightShape,
}

impl Tracker {
    /// Feet rectangle the tracker sees from, before the line of sight is added.
    fn origin(&self, world: &World, entity: EntityId) -> Option<(Feet, Feet)> {
        match &self.area {
            TrackingArea::Center(registered) => {
                let center = world.position_of(entity).unwrap_or(*registered);
                Some((center, center))
            }
            TrackingArea::LandArea(land_area) => land_area.bounds_in_feet(),
        }
    }

    fn sees(&self, min: Feet, max: Feet, target: Feet) -> bool {
        let los_squared = self.line_of_sight * self.line_of_sight;
        match self.shape {
            LineOfSightShape::Circle if min == max => target.distance_squared(min) <= los_squared,
            // A land area is a rectangle; its rounded square is the rectangle
            // grown by the line of sight with circular corners.
            LineOfSightShape::Circle | LineOfSightShape::RoundedSquare => {
                let nearest = Feet::new(target.x.clamp(min.x, max.x), target.y.clamp(min.y, max.y));
                target.distance_squared(nearest) <= los_squared
            }
        }
    }
}

fn composite_key(tracker: EntityId, target: EntityId) -> u64 {
    u64::from(tracker.0) * MAX_ENTITIES + u64::from(target.0)
}

#[derive(Debug, Default)]
pub struct VisionSystem {
    trackers: BTreeMap<EntityId, Tracker>,
    in_sight: HashSet<u64>,
    scratch: Vec<EntityId>,
}

impl VisionSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(
        &mut self,
        entity: EntityId,
        area: TrackingArea,
        line_of_sight: f32,
        shape: LineOfSightShape,
    ) {
        debug!(entity = entity.0, line_of_sight, shape = ?shape, "vision_tracking_started");
        self.trackers.insert(
            entity,
            Tracker {
                area,
                line_of_sight: line_of_sight.max(0.0),
                shape,
            },
        );
    }

    pub fn untrack(&mut self, entity: EntityId) -> bool {
        self.trackers.remove(&entity).is_some()
    }

    pub fn is_tracking(&self, entity: EntityId) -> bool {
        self.trackers.contains_key(&entity)
    }

    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_in_sight(&self, tracker: EntityId, target: EntityId) -> bool {
        self.in_sight.contains(&composite_key(tracker, target))
    }

    /// Re-evaluates every tracker. Trackers whose entity left the simulation
    /// are dropped and their targets reported out of sight.
    pub fn update(&mut self, world: &World, events: &EventPublisher) {
        let mut retired = Vec::new();
        for (&tracker_id, tracker) in &self.trackers {
            if !world.is_active(tracker_id) {
                retired.push(tracker_id);
                continue;
            }
            let Some((min, max)) = tracker.origin(world, tracker_id) else {
                continue;
            };
            collect_candidates(world, tracker, min, max, &mut self.scratch);

            for &target in &self.scratch {
                if target == tracker_id {
                    continue;
                }
                let Some(transform) = world.state.get_component::<CompTransform>(target) else {
                    continue;
                };
                let visible = world.is_active(target) && tracker.sees(min, max, transform.position);
                let key = composite_key(tracker_id, target);
                if visible && self.in_sight.insert(key) {
                    events.publish(Event::WithinLineOfSight {
                        tracker: tracker_id,
                        target,
                    });
                } else if !visible && self.in_sight.remove(&key) {
                    events.publish(Event::OutOfLineOfSight {
                        tracker: tracker_id,
                        target,
                    });
                }
            }
        }

        // Targets that walked out of the candidate window or vanished.
        let stale: Vec<u64> = self
            .in_sight
            .iter()
            .copied()
            .filter(|key| {
                let tracker = EntityId((key / MAX_ENTITIES) as u32);
                let target = EntityId((key % MAX_ENTITIES) as u32);
                if retired.contains(&tracker) || !world.is_active(target) {
                    return true;
                }
                let Some(state) = self.trackers.get(&tracker) else {
                    return true;
                };
                let Some((min, max)) = state.origin(world, tracker) else {
                    return true;
                };
                world
                    .position_of(target)
                    .map_or(true, |position| !state.sees(min, max, position))
            })
            .collect();
        for key in stale {
            self.in_sight.remove(&key);
            events.publish(Event::OutOfLineOfSight {
                tracker: EntityId((key / MAX_ENTITIES) as u32),
                target: EntityId((key % MAX_ENTITIES) as u32),
            });
        }

        for tracker in retired {
            self.trackers.remove(&tracker);
            debug!(entity = tracker.0, "vision_tracking_stopped");
        }
    }
}

/// Gathers entities from the tiles under the tracker's bounding box, deduplicated.
fn collect_candidates(
    world: &World,
    tracker: &Tracker,
    min: Feet,
    max: Feet,
    out: &mut Vec<EntityId>,
) {
    out.clear();
    let los = tracker.line_of_sight;
    let low = Feet::new(min.x - los, min.y - los).to_tile();
    let high = Feet::new(max.x + los, max.y + los).to_tile();
    let last_x = world.tile_map.width() - 1;
    let last_y = world.tile_map.height() - 1;
    let (x0, x1) = (low.x.max(0), high.x.min(last_x));
    let (y0, y1) = (low.y.max(0), high.y.min(last_y));

    for y in y0..=y1 {
        for x in x0..=x1 {
            let tile = Tile::new(x, y);
            for layer in CANDIDATE_LAYERS {
                out.extend_from_slice(world.tile_map.entities(layer, tile));
            }
        }
    }
    out.sort_unstable();
    out.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::CompEntityInfo;
    use crate::events::event_channel;
    use crate::fog::RevealStatus;
    use crate::map::LandArea;
    use crate::types::{EntityType, Size};

    fn world() -> World {
        World::new(Size::new(20, 20), Size::new(640, 480), 2, RevealStatus::Unexplored)
    }

    fn spawn(world: &mut World, position: Feet) -> EntityId {
        let id = world.state.create_entity();
        world.state.add_component(id, CompEntityInfo::new(EntityType::Villager));
        world.state.add_component(id, CompTransform::new(position));
        world
            .tile_map
            .add_entity(MapLayerType::Units, position.to_tile(), id)
            .expect("register unit");
        id
    }

    fn move_unit(world: &mut World, id: EntityId, to: Feet) {
        let from = world.position_of(id).expect("position").to_tile();
        world.tile_map.remove_entity(MapLayerType::Units, from, id);
        world
            .tile_map
            .add_entity(MapLayerType::Units, to.to_tile(), id)
            .expect("register unit");
        world
            .state
            .get_component_mut::<CompTransform>(id)
            .expect("transform")
            .position = to;
    }

    #[test]
    fn circle_tracker_reports_entry_and_exit_once() {
        let mut world = world();
        let (events, receiver) = event_channel();
        let watcher = spawn(&mut world, Feet::new(1280.0, 1280.0));
        let walker = spawn(&mut world, Feet::new(1280.0 + 900.0, 1280.0));

        let mut vision = VisionSystem::new();
        vision.track(
            watcher,
            TrackingArea::Center(Feet::new(1280.0, 1280.0)),
            512.0,
            LineOfSightShape::Circle,
        );

        vision.update(&world, &events);
        assert!(receiver.try_recv().is_err());

        move_unit(&mut world, walker, Feet::new(1280.0 + 500.0, 1280.0));
        vision.update(&world, &events);
        vision.update(&world, &events);
        assert_eq!(
            receiver.try_iter().collect::<Vec<_>>(),
            vec![Event::WithinLineOfSight {
                tracker: watcher,
                target: walker
            }]
        );
        assert!(vision.is_in_sight(watcher, walker));

        move_unit(&mut world, walker, Feet::new(1280.0 + 2000.0, 1280.0));
        vision.update(&world, &events);
        vision.update(&world, &events);
        assert_eq!(
            receiver.try_iter().collect::<Vec<_>>(),
            vec![Event::OutOfLineOfSight {
                tracker: watcher,
                target: walker
            }]
        );
    }

    #[test]
    fn rounded_square_excludes_corner_outside_radius() {
        let mut world = world();
        let (events, receiver) = event_channel();
        let building = world.state.create_entity();
        world
            .state
            .add_component(building, CompEntityInfo::new(EntityType::TownCenter));
        world
            .state
            .add_component(building, CompTransform::new(Feet::new(1536.0, 1536.0)));
        // Footprint tiles (5,5)..(6,6) span feet 1280..1792.
        let area = LandArea::from_footprint(Tile::new(5, 5), Size::new(2, 2));

        let beside = spawn(&mut world, Feet::new(1792.0 + 250.0, 1500.0));
        let corner_far = spawn(&mut world, Feet::new(1792.0 + 200.0, 1792.0 + 200.0));
        let corner_near = spawn(&mut world, Feet::new(1792.0 + 150.0, 1792.0 + 150.0));

        let mut vision = VisionSystem::new();
        vision.track(building, TrackingArea::LandArea(area), 256.0, LineOfSightShape::RoundedSquare);
        vision.update(&world, &events);

        let seen: Vec<EntityId> = receiver
            .try_iter()
            .filter_map(|event| match event {
                Event::WithinLineOfSight { target, .. } => Some(target),
                _ => None,
            })
            .collect();
        assert!(seen.contains(&beside));
        assert!(seen.contains(&corner_near));
        assert!(!seen.contains(&corner_far));
    }

    #[test]
    fn destroyed_targets_and_trackers_are_released() {
        let mut world = world();
        let (events, receiver) = event_channel();
        let watcher = spawn(&mut world, Feet::new(1280.0, 1280.0));
        let target = spawn(&mut world, Feet::new(1380.0, 1280.0));
        let mut vision = VisionSystem::new();
        vision.track(
            watcher,
            TrackingArea::Center(Feet::new(1280.0, 1280.0)),
            512.0,
            LineOfSightShape::Circle,
        );
        vision.update(&world, &events);
        let _ = receiver.try_iter().count();

        world.state.destroy_entity(target);
        vision.update(&world, &events);
        assert_eq!(
            receiver.try_iter().collect::<Vec<_>>(),
            vec![Event::OutOfLineOfSight {
                tracker: watcher,
                target
            }]
        );

        world.state.destroy_entity(watcher);
        vision.update(&world, &events);
        assert!(!vision.is_tracking(watcher));
        assert_eq!(vision.tracker_count(), 0);
    }

    #[test]
    fn composite_key_separates_pairs() {
        assert_ne!(
            composite_key(EntityId(1), EntityId(2)),
            composite_key(EntityId(2), EntityId(1))
        );
        assert_eq!(composite_key(EntityId(3), EntityId(4)), 3 * (1 << 32) + 4);
    }
}
