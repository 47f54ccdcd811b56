use tracing::info;

use crate::components::{CompBuilding, CompEntityInfo, CompPlayer};
use crate::events::Event;
use crate::types::{EntityId, UnitAction};

use super::{animate, face, Approach, ApproachStatus, CommandContext, CommandKind};

#[derive(Debug, Clone, PartialEq)]
pub struct BuildCommand {
    pub(super) approach: Approach,
}

impl BuildCommand {
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
        let target = self.approach.target();
        let needs_work = ctx.world.is_active(target)
            && ctx
                .world
                .state
                .get_component::<CompBuilding>(target)
                .is_some_and(|building| !building.is_constructed && !building.is_placing);
        if !needs_work {
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
        animate(ctx, UnitAction::Building);

        let delta_ms = ctx.delta_ms;
        let state = &mut ctx.world.state;
        let Some(building) = state.get_component_mut::<CompBuilding>(target) else {
            return true;
        };
        building.construction_progress_ms =
            (building.construction_progress_ms + delta_ms).min(building.build_time_ms);
        let finished = building.construction_progress_ms >= building.build_time_ms;
        if finished {
            building.is_constructed = true;
        }
        state.mark_dirty(target);
        if !finished {
            return false;
        }

        let entity_type = state
            .get_component::<CompEntityInfo>(target)
            .map(|info| info.entity_type);
        let player = state
            .get_component::<CompPlayer>(target)
            .map(|owner| owner.player);
        if let (Some(entity_type), Some(player)) = (entity_type, player) {
            ctx.events.publish(Event::BuildingConstructed {
                entity: target,
                entity_type,
                player,
            });
        }
        info!(builder = ctx.entity.0, building = target.0, "building_constructed");
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
    use crate::world::World;

    fn spawn_site(world: &mut World, position: Feet, build_time_ms: u32) -> EntityId {
        let site = world.state.create_entity();
        world
            .state
            .add_component(site, CompEntityInfo::new(EntityType::House));
        world.state.add_component(
            site,
            CompTransform::new(position).with_collision_radius(256.0),
        );
        let mut building = CompBuilding::new(Size::new(2, 2));
        building.is_constructed = false;
        building.build_time_ms = build_time_ms;
        world.state.add_component(site, building);
        world.state.add_component(site, CompPlayer { player: 0 });
        world.state.add_component(site, CompDirty::default());
        site
    }

    #[test]
    fn builder_completes_site_and_announces_it() {
        let mut world = world(10);
        let (events, receiver) = event_channel();
        let unit = spawn_unit(&mut world, Feet::new(300.0, 300.0), 0);
        let site = spawn_site(&mut world, Feet::new(600.0, 600.0), 160);

        let mut runner = CommandRunner::new();
        runner.enqueue(&mut world, &events, unit, CommandKind::Idle, IDLE_PRIORITY);
        runner.issue(&mut world, &events, unit, CommandKind::build(site));

        for _ in 0..9 {
            runner.tick(&mut world, &events, 16, 60);
        }
        let building = world.state.get_component::<CompBuilding>(site).expect("site");
        assert!(!building.is_constructed);
        assert_eq!(building.construction_progress_ms, 144);
        assert_eq!(
            world.state.get_component::<CompAction>(unit).expect("action").action,
            UnitAction::Building
        );

        runner.tick(&mut world, &events, 16, 60);
        let building = world.state.get_component::<CompBuilding>(site).expect("site");
        assert!(building.is_constructed);
        assert_eq!(building.construction_fraction(), 1.0);
        assert_eq!(
            world.state.get_component::<CompAction>(unit).expect("action").action,
            UnitAction::Idle
        );

        let announced: Vec<Event> = receiver
            .try_iter()
            .filter(|event| matches!(event, Event::BuildingConstructed { .. }))
            .collect();
        assert_eq!(
            announced,
            vec![Event::BuildingConstructed {
                entity: site,
                entity_type: EntityType::House,
                player: 0,
            }]
        );
    }

    #[test]
    fn finished_building_is_not_rebuilt() {
        let mut world = world(10);
        let (events, _receiver) = event_channel();
        let unit = spawn_unit(&mut world, Feet::new(300.0, 300.0), 0);
        let site = spawn_site(&mut world, Feet::new(600.0, 600.0), 160);
        world
            .state
            .get_component_mut::<CompBuilding>(site)
            .expect("site")
            .is_constructed = true;

        let mut runner = CommandRunner::new();
        runner.enqueue(&mut world, &events, unit, CommandKind::Idle, IDLE_PRIORITY);
        runner.issue(&mut world, &events, unit, CommandKind::build(site));
        runner.tick(&mut world, &events, 16, 60);

        let building = world.state.get_component::<CompBuilding>(site).expect("site");
        assert_eq!(building.construction_progress_ms, 0);
    }
}
