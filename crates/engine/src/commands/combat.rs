use tracing::{info, warn};

use crate::components::{CompBuilding, CompEntityInfo, CompHealth, CompUnit};
use crate::types::{EntityId, UnitAction};

use super::{animate, face, Approach, ApproachStatus, CommandContext, CommandKind};

/// Accumulates `rate_per_second * delta_ms` in thousandths and returns the whole points earned.
fn accrue(progress_milli: &mut u32, rate_per_second: f32, delta_ms: u32) -> u32 {
    *progress_milli += (rate_per_second * delta_ms as f32).round() as u32;
    let whole = *progress_milli / 1000;
    *progress_milli %= 1000;
    whole
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttackCommand {
    pub(super) approach: Approach,
}

impl AttackCommand {
    pub fn new(target: EntityId) -> Self {
        Self {
            approach: Approach::new(target),
        }
    }

    pub fn target(&self) -> EntityId {
        self.approach.target()
    }

    pub(super) fn execute(
        &mut self,
        ctx: &mut CommandContext<'_>,
        children: &mut Vec<CommandKind>,
    ) -> bool {
        let entity = ctx.entity;
        let target = self.approach.target();
        let alive = ctx.world.is_active(target)
            && ctx
                .world
                .state
                .get_component::<CompHealth>(target)
                .is_some_and(|health| health.current > 0);
        if !alive {
            animate(ctx, UnitAction::Idle);
            return true;
        }
        let damage_per_second = ctx
            .world
            .state
            .get_component::<CompUnit>(entity)
            .map_or(0.0, |unit| unit.attack_damage_per_second);
        if damage_per_second <= 0.0 {
            warn!(entity = entity.0, target = target.0, "attack_without_damage");
            animate(ctx, UnitAction::Idle);
            return true;
        }

        match self.approach.step(ctx, children) {
            ApproachStatus::InRange => {}
            ApproachStatus::Moving => return false,
            ApproachStatus::Failed => {
                animate(ctx, UnitAction::Idle);
                return true;
            }
        }

        face(ctx, self.approach.target_position());
        animate(ctx, UnitAction::Attack);

        let delta_ms = ctx.delta_ms;
        let state = &mut ctx.world.state;
        let Some(health) = state.get_component_mut::<CompHealth>(target) else {
            return true;
        };
        let damage = accrue(&mut health.progress_milli, damage_per_second, delta_ms);
        if damage == 0 {
            return false;
        }
        health.current = health.current.saturating_sub(damage);
        let killed = health.current == 0;
        state.mark_dirty(target);
        if !killed {
            return false;
        }

        if let Some(info) = state.get_component_mut::<CompEntityInfo>(target) {
            info.is_destroyed = true;
        }
        state.destroy_entity(target);
        info!(entity = entity.0, target = target.0, "target_destroyed");
        animate(ctx, UnitAction::Idle);
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepairCommand {
    pub(super) approach: Approach,
}

impl RepairCommand {
    pub fn new(target: EntityId) -> Self {
        Self {
            approach: Approach::new(target),
        }
    }

    pub fn target(&self) -> EntityId {
        self.approach.target()
    }

    /// Restores a constructed building's health until it is full.
    pub(super) fn execute(
        &mut self,
        ctx: &mut CommandContext<'_>,
        children: &mut Vec<CommandKind>,
    ) -> bool {
        let entity = ctx.entity;
        let target = self.approach.target();
        let state = &ctx.world.state;
        let repairable = ctx.world.is_active(target)
            && state
                .get_component::<CompBuilding>(target)
                .is_some_and(|building| building.is_constructed)
            && state
                .get_component::<CompHealth>(target)
                .is_some_and(CompHealth::is_damaged);
        if !repairable {
            animate(ctx, UnitAction::Idle);
            return true;
        }
        let repair_per_second = state
            .get_component::<CompUnit>(entity)
            .map_or(0.0, |unit| unit.repair_per_second);
        if repair_per_second <= 0.0 {
            warn!(entity = entity.0, target = target.0, "repair_without_rate");
            animate(ctx, UnitAction::Idle);
            return true;
        }

        match self.approach.step(ctx, children) {
            ApproachStatus::InRange => {}
            ApproachStatus::Moving => return false,
            ApproachStatus::Failed => {
                animate(ctx, UnitAction::Idle);
                return true;
            }
        }

        face(ctx, self.approach.target_position());
        animate(ctx, UnitAction::Repair);

        let delta_ms = ctx.delta_ms;
        let state = &mut ctx.world.state;
        let Some(health) = state.get_component_mut::<CompHealth>(target) else {
            return true;
        };
        let restored = accrue(&mut health.progress_milli, repair_per_second, delta_ms);
        if restored == 0 {
            return false;
        }
        health.current = (health.current + restored).min(health.max);
        let repaired = !health.is_damaged();
        state.mark_dirty(target);
        if !repaired {
            return false;
        }
        info!(entity = entity.0, target = target.0, "building_repaired");
        animate(ctx, UnitAction::Idle);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{spawn_unit, world};
    use super::super::{CommandRunner, IDLE_PRIORITY};
    use super::*;
    use crate::components::{CompAction, CompTransform};
    use crate::coordinates::Feet;
    use crate::ecs::CompDirty;
    use crate::events::event_channel;
    use crate::types::{EntityType, Size};

    #[test]
    fn accrue_carries_fractions_between_ticks() {
        let mut progress = 0;
        assert_eq!(accrue(&mut progress, 25.0, 16), 0);
        assert_eq!(progress, 400);
        assert_eq!(accrue(&mut progress, 25.0, 16), 0);
        assert_eq!(accrue(&mut progress, 25.0, 16), 1);
        assert_eq!(progress, 200);
    }

    #[test]
    fn attack_destroys_target_at_zero_health() {
        let mut world = world(8);
        let (events, _receiver) = event_channel();
        let attacker = spawn_unit(&mut world, Feet::new(300.0, 300.0), 0);
        world
            .state
            .get_component_mut::<CompUnit>(attacker)
            .expect("unit")
            .attack_damage_per_second = 125.0;
        let victim = spawn_unit(&mut world, Feet::new(400.0, 300.0), 1);
        world.state.add_component(victim, CompHealth::new(4));

        let mut runner = CommandRunner::new();
        runner.enqueue(&mut world, &events, attacker, CommandKind::Idle, IDLE_PRIORITY);
        runner.issue(&mut world, &events, attacker, CommandKind::attack(victim));

        runner.tick(&mut world, &events, 16, 60);
        assert_eq!(
            world.state.get_component::<CompHealth>(victim).expect("health").current,
            2
        );
        assert_eq!(
            world.state.get_component::<CompAction>(attacker).expect("action").action,
            UnitAction::Attack
        );

        runner.tick(&mut world, &events, 16, 60);
        let info = world.state.get_component::<CompEntityInfo>(victim).expect("info");
        assert!(info.is_destroyed);
        assert!(world.state.is_pending_destroy(victim));
        assert_eq!(
            world.state.get_component::<CompAction>(attacker).expect("action").action,
            UnitAction::Idle
        );
    }

    #[test]
    fn repair_restores_damaged_building_to_full() {
        let mut world = world(8);
        let (events, _receiver) = event_channel();
        let worker = spawn_unit(&mut world, Feet::new(300.0, 300.0), 0);
        world
            .state
            .get_component_mut::<CompUnit>(worker)
            .expect("unit")
            .repair_per_second = 62.5;

        let house = world.state.create_entity();
        world
            .state
            .add_component(house, CompEntityInfo::new(EntityType::House));
        world.state.add_component(
            house,
            CompTransform::new(Feet::new(600.0, 300.0)).with_collision_radius(256.0),
        );
        world.state.add_component(house, CompBuilding::new(Size::new(2, 2)));
        let mut health = CompHealth::new(10);
        health.current = 8;
        world.state.add_component(house, health);
        world.state.add_component(house, CompDirty::default());

        let mut runner = CommandRunner::new();
        runner.enqueue(&mut world, &events, worker, CommandKind::Idle, IDLE_PRIORITY);
        runner.issue(&mut world, &events, worker, CommandKind::repair(house));

        runner.tick(&mut world, &events, 16, 60);
        assert_eq!(
            world.state.get_component::<CompHealth>(house).expect("health").current,
            9
        );
        runner.tick(&mut world, &events, 16, 60);
        assert_eq!(
            world.state.get_component::<CompHealth>(house).expect("health").current,
            10
        );
        let queue = &world.state.get_component::<CompUnit>(worker).expect("unit").commands;
        assert!(queue.current().expect("idle").kind().is_idle());
    }

    #[test]
    fn repair_ignores_unfinished_buildings() {
        let mut world = world(8);
        let (events, _receiver) = event_channel();
        let worker = spawn_unit(&mut world, Feet::new(300.0, 300.0), 0);
        world
            .state
            .get_component_mut::<CompUnit>(worker)
            .expect("unit")
            .repair_per_second = 62.5;
        let site = world.state.create_entity();
        world.state.add_component(site, CompTransform::new(Feet::new(500.0, 300.0)));
        let mut building = CompBuilding::new(Size::new(1, 1));
        building.is_constructed = false;
        world.state.add_component(site, building);
        let mut health = CompHealth::new(10);
        health.current = 1;
        world.state.add_component(site, health);

        let mut runner = CommandRunner::new();
        runner.enqueue(&mut world, &events, worker, CommandKind::Idle, IDLE_PRIORITY);
        runner.issue(&mut world, &events, worker, CommandKind::repair(site));
        runner.tick(&mut world, &events, 16, 60);

        assert_eq!(
            world.state.get_component::<CompHealth>(site).expect("health").current,
            1
        );
    }
}
