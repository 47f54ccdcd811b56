use tracing::{debug, error};

use crate::components::{CompPlayer, CompTransform};
use crate::coordinates::Feet;
use crate::events::Event;
use crate::map::MapLayerType;
use crate::types::{EntityId, UnitAction};
use crate::world::World;

use super::{animate, CommandContext};

/// Soft push applied when a unit's next step overlaps its neighbours.
pub const REPULSION_FEET_PER_SECOND: f32 = 160.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MoveCommand {
    goal: Feet,
    waypoints: Vec<Feet>,
    next_waypoint: usize,
}

impl MoveCommand {
    pub fn new(goal: Feet) -> Self {
        Self {
            goal,
            waypoints: Vec::new(),
            next_waypoint: 0,
        }
    }

    pub fn goal(&self) -> Feet {
        self.goal
    }

    pub fn remaining_waypoints(&self) -> &[Feet] {
        self.waypoints.get(self.next_waypoint..).unwrap_or(&[])
    }

    pub(super) fn on_queue(&mut self, ctx: &mut CommandContext<'_>) {
        let Some(transform) = ctx.world.state.get_component::<CompTransform>(ctx.entity) else {
            error!(entity = ctx.entity.0, "move_without_transform");
            return;
        };
        let start = transform.position;
        let player = ctx
            .world
            .state
            .get_component::<CompPlayer>(ctx.entity)
            .map(|owner| owner.player)
            .unwrap_or_default();

        let path = ctx
            .pathfinder
            .find_path(&ctx.world.passability, player, start, self.goal);
        let goal_tile = self.goal.to_tile();

        // The first node is the tile the unit already stands on.
        self.waypoints = path.into_iter().skip(1).collect();
        match self.waypoints.last_mut() {
            Some(last) if last.to_tile() == goal_tile => *last = self.goal,
            Some(_) => {}
            None if start.to_tile() == goal_tile => self.waypoints.push(self.goal),
            None => {}
        }
        self.next_waypoint = 0;
        debug!(
            entity = ctx.entity.0,
            waypoints = self.waypoints.len(),
            "move_path_planned"
        );
    }

    pub(super) fn execute(&mut self, ctx: &mut CommandContext<'_>) -> bool {
        let entity = ctx.entity;
        let Some(transform) = ctx.world.state.get_component::<CompTransform>(entity).copied()
        else {
            error!(entity = entity.0, "move_without_transform");
            return true;
        };
        if transform.position.distance_squared(self.goal) <= transform.goal_radius_squared() {
            return true;
        }

        let waypoint = loop {
            let Some(waypoint) = self.waypoints.get(self.next_waypoint).copied() else {
                debug!(entity = entity.0, "move_waypoints_exhausted");
                return true;
            };
            if transform.position.distance_squared(waypoint) <= transform.goal_radius_squared() {
                self.next_waypoint += 1;
                continue;
            }
            break waypoint;
        };

        if transform.speed() <= 0.0 {
            error!(entity = entity.0, "move_without_speed");
            return true;
        }

        let delta = waypoint - transform.position;
        let Some(direction) = delta.normalized() else {
            self.next_waypoint += 1;
            return false;
        };
        let dt = ctx.delta_seconds();
        let step = (transform.speed() * dt).min(delta.length());
        let candidate = transform.position + direction * step;

        animate(ctx, UnitAction::Move);

        let Some(resolved) = resolve_collision(ctx.world, entity, &transform, candidate, dt) else {
            debug!(entity = entity.0, "move_step_rejected");
            self.next_waypoint += 1;
            return false;
        };

        let state = &mut ctx.world.state;
        if let Some(current) = state.get_component_mut::<CompTransform>(entity) {
            current.face_towards(waypoint);
            current.position = resolved;
        }
        state.mark_dirty(entity);

        let old_tile = transform.tile();
        let new_tile = resolved.to_tile();
        if old_tile != new_tile {
            let tile_map = &mut ctx.world.tile_map;
            tile_map.remove_entity(MapLayerType::Units, old_tile, entity);
            if let Err(err) = tile_map.add_entity(MapLayerType::Units, new_tile, entity) {
                error!(error = %err, entity = entity.0, "unit_tile_update_failed");
            }
            ctx.events.publish(Event::UnitTileMovement {
                entity,
                new_tile,
                old_feet: transform.position,
            });
        }
        false
    }
}

/// Checks a proposed step against buildings, other units and crowding.
/// Returns the position to commit, or `None` when the step is rejected.
fn resolve_collision(
    world: &World,
    entity: EntityId,
    transform: &CompTransform,
    candidate: Feet,
    dt_seconds: f32,
) -> Option<Feet> {
    let tile_map = &world.tile_map;
    let tile = candidate.to_tile();
    if !tile_map.is_valid_tile(tile) || tile_map.is_occupied(MapLayerType::Static, tile) {
        return None;
    }
    if tile != transform.tile() && tile_map.is_occupied_by_another(MapLayerType::Units, tile, entity)
    {
        return None;
    }

    let mut push = Feet::default();
    for dy in -1..=1 {
        for dx in -1..=1 {
            for other in tile_map.entities(MapLayerType::Units, tile.offset(dx, dy)) {
                if *other == entity {
                    continue;
                }
                let Some(other_transform) = world.state.get_component::<CompTransform>(*other)
                else {
                    continue;
                };
                let min_distance = transform.collision_radius + other_transform.collision_radius;
                if candidate.distance_squared(other_transform.position)
                    >= min_distance * min_distance
                {
                    continue;
                }
                if let Some(unit) = (candidate - other_transform.position).normalized() {
                    push += unit;
                }
            }
        }
    }

    let Some(push_direction) = push.normalized() else {
        return Some(candidate);
    };
    let pushed = candidate + push_direction * (REPULSION_FEET_PER_SECOND * dt_seconds);
    let pushed_tile = pushed.to_tile();
    let pushed_is_free = tile_map.is_valid_tile(pushed_tile)
        && !tile_map.is_occupied(MapLayerType::Static, pushed_tile)
        && (pushed_tile == transform.tile()
            || !tile_map.is_occupied_by_another(MapLayerType::Units, pushed_tile, entity));
    if pushed_is_free {
        Some(pushed)
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{spawn_unit, world};
    use super::super::{CommandKind, CommandRunner, IDLE_PRIORITY};
    use super::*;
    use crate::components::CompAction;
    use crate::coordinates::Tile;
    use crate::events::event_channel;
    use crate::map::TerrainPassability;

    fn position(world: &World, entity: EntityId) -> Feet {
        world.position_of(entity).expect("position")
    }

    #[test]
    fn walks_to_goal_and_completes() {
        let mut world = world(10);
        let (events, receiver) = event_channel();
        let start = Tile::new(1, 1).center_in_feet();
        let goal = Feet::new(1100.0, 400.0);
        let unit = spawn_unit(&mut world, start, 0);
        let mut runner = CommandRunner::new();
        runner.enqueue(&mut world, &events, unit, CommandKind::Idle, IDLE_PRIORITY);
        runner.issue(&mut world, &events, unit, CommandKind::move_to(goal));

        for _ in 0..400 {
            runner.tick(&mut world, &events, 16, 60);
        }

        assert!(position(&world, unit).distance(goal) <= 16.0);
        assert!(world
            .tile_map
            .entities(MapLayerType::Units, goal.to_tile())
            .contains(&unit));
        assert!(!world
            .tile_map
            .entities(MapLayerType::Units, start.to_tile())
            .contains(&unit));
        let action = world.state.get_component::<CompAction>(unit).expect("action");
        assert_eq!(action.action, UnitAction::Idle);

        let movements: Vec<_> = receiver
            .try_iter()
            .filter(|event| matches!(event, Event::UnitTileMovement { .. }))
            .collect();
        assert!(!movements.is_empty());
        match movements.last() {
            Some(Event::UnitTileMovement { new_tile, .. }) => assert_eq!(*new_tile, goal.to_tile()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn step_never_overshoots_waypoint() {
        let mut world = world(4);
        let (events, _receiver) = event_channel();
        let start = Feet::new(100.0, 100.0);
        let goal = Feet::new(110.0, 100.0);
        let unit = spawn_unit(&mut world, start, 0);
        if let Some(transform) = world.state.get_component_mut::<CompTransform>(unit) {
            transform.set_goal_radius(0.5);
        }
        let mut runner = CommandRunner::new();
        runner.issue(&mut world, &events, unit, CommandKind::move_to(goal));
        runner.tick(&mut world, &events, 100, 60);

        assert_eq!(position(&world, unit), goal);
    }

    #[test]
    fn static_obstacle_rejects_step_and_drops_waypoint() {
        let mut world = world(6);
        let (events, _receiver) = event_channel();
        let start = Tile::new(1, 1).center_in_feet();
        let unit = spawn_unit(&mut world, start, 0);
        let mut runner = CommandRunner::new();
        runner.issue(&mut world, &events, unit, CommandKind::move_to(Tile::new(3, 1).center_in_feet()));

        // A building lands on the route after planning.
        world
            .tile_map
            .add_entity(MapLayerType::Static, Tile::new(2, 1), EntityId(99))
            .expect("block");
        for _ in 0..40 {
            runner.tick(&mut world, &events, 16, 60);
        }
        assert_eq!(position(&world, unit).to_tile(), Tile::new(1, 1));
    }

    #[test]
    fn unit_without_speed_gives_up() {
        let mut world = world(6);
        let (events, _receiver) = event_channel();
        let unit = spawn_unit(&mut world, Feet::new(100.0, 100.0), 0);
        if let Some(transform) = world.state.get_component_mut::<CompTransform>(unit) {
            transform.set_speed(0.0);
        }
        let mut runner = CommandRunner::new();
        runner.issue(&mut world, &events, unit, CommandKind::move_to(Feet::new(900.0, 900.0)));
        runner.tick(&mut world, &events, 16, 60);

        let queue = &world
            .state
            .get_component::<crate::components::CompUnit>(unit)
            .expect("unit")
            .commands;
        assert!(queue.is_empty());
        assert_eq!(position(&world, unit), Feet::new(100.0, 100.0));
    }

    #[test]
    fn path_detours_around_blocked_terrain() {
        let mut world = world(6);
        let (events, _receiver) = event_channel();
        for y in 0..4 {
            world
                .passability
                .set_terrain(Tile::new(2, y), TerrainPassability::BlockedForAny)
                .expect("wall");
        }
        let unit = spawn_unit(&mut world, Tile::new(0, 0).center_in_feet(), 0);
        let goal = Tile::new(4, 0).center_in_feet();
        let mut runner = CommandRunner::new();
        runner.issue(&mut world, &events, unit, CommandKind::move_to(goal));

        let queue = &world
            .state
            .get_component::<crate::components::CompUnit>(unit)
            .expect("unit")
            .commands;
        let Some(CommandKind::Move(command)) = queue.current().map(|command| command.kind())
        else {
            panic!("move queued");
        };
        let tiles: Vec<Tile> = command
            .remaining_waypoints()
            .iter()
            .map(|feet| feet.to_tile())
            .collect();
        assert!(tiles.iter().all(|tile| tile.x != 2 || tile.y >= 4));
        assert_eq!(tiles.last(), Some(&Tile::new(4, 0)));
    }

    #[test]
    fn overlapping_neighbours_push_apart() {
        let mut world = world(6);
        let start = Feet::new(600.0, 600.0);
        let unit = spawn_unit(&mut world, start, 0);
        spawn_unit(&mut world, Feet::new(640.0, 600.0), 1);
        let transform = *world
            .state
            .get_component::<CompTransform>(unit)
            .expect("transform");

        let resolved = resolve_collision(&world, unit, &transform, Feet::new(610.0, 600.0), 0.1)
            .expect("not rejected");
        // Pushed back along -x by 16 feet.
        assert!((resolved.x - 594.0).abs() < 1e-3);
        assert!((resolved.y - 600.0).abs() < 1e-3);
    }

    #[test]
    fn push_into_a_third_units_tile_keeps_the_candidate() {
        let mut world = world(6);
        let unit = spawn_unit(&mut world, Feet::new(500.0, 300.0), 0);
        spawn_unit(&mut world, Feet::new(480.0, 300.0), 1);
        spawn_unit(&mut world, Feet::new(700.0, 300.0), 1);
        let transform = *world
            .state
            .get_component::<CompTransform>(unit)
            .expect("transform");

        // The push alone would carry the unit over x = 512 into the third unit's tile.
        let resolved = resolve_collision(&world, unit, &transform, Feet::new(505.0, 300.0), 0.1)
            .expect("not rejected");
        assert_eq!(resolved, Feet::new(505.0, 300.0));
        assert_eq!(resolved.to_tile(), Tile::new(1, 1));
    }

    #[test]
    fn entering_an_occupied_tile_is_rejected() {
        let mut world = world(6);
        let unit = spawn_unit(&mut world, Feet::new(500.0, 300.0), 0);
        spawn_unit(&mut world, Feet::new(700.0, 300.0), 1);
        let transform = *world
            .state
            .get_component::<CompTransform>(unit)
            .expect("transform");

        assert_eq!(
            resolve_collision(&world, unit, &transform, Feet::new(520.0, 300.0), 0.1),
            None
        );
    }
}
