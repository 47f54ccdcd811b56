use tracing::{info, warn};

use crate::components::{CompEntityInfo, CompResource, CompResourceGatherer};
use crate::types::{EntityId, ResourceType, UnitAction};

use super::{animate, face, Approach, ApproachStatus, CommandContext, CommandKind};

#[derive(Debug, Clone, PartialEq)]
pub struct GatherCommand {
    pub(super) approach: Approach,
}

impl GatherCommand {
    pub fn new(target: EntityId) -> Self {
        Self {
            approach: Approach::new(target),
        }
    }

    pub fn target(&self) -> EntityId {
        self.approach.target()
    }

    /// Keeps gathering until the target runs dry, then idles.
    pub(super) fn execute(
        &mut self,
        ctx: &mut CommandContext<'_>,
        children: &mut Vec<CommandKind>,
    ) -> bool {
        let entity = ctx.entity;
        let target = self.approach.target();
        if !ctx.world.is_active(target) {
            animate(ctx, UnitAction::Idle);
            return true;
        }
        let Some(resource) = ctx.world.state.get_component::<CompResource>(target).copied() else {
            warn!(entity = entity.0, target = target.0, "gather_target_not_a_resource");
            animate(ctx, UnitAction::Idle);
            return true;
        };
        if resource.resource.amount == 0 {
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

        let resource_type = resource.resource.resource_type;
        face(ctx, self.approach.target_position());
        animate(ctx, gather_action(resource_type));

        let delta_ms = ctx.delta_ms;
        let state = &mut ctx.world.state;
        let Some(gatherer) = state.get_component_mut::<CompResourceGatherer>(entity) else {
            warn!(entity = entity.0, "gather_without_gatherer");
            animate(ctx, UnitAction::Idle);
            return true;
        };
        if gatherer.gathered_type != Some(resource_type) {
            gatherer.gathered_type = Some(resource_type);
            gatherer.gathered_amount = 0;
            gatherer.progress_milli = 0;
        }
        gatherer.progress_milli += (gatherer.gather_speed * delta_ms as f32).round() as u32;
        let whole_units = gatherer.progress_milli / 1000;
        gatherer.progress_milli %= 1000;

        let taken = whole_units.min(resource.resource.amount);
        gatherer.gathered_amount += taken;
        let delivery = if gatherer.gathered_amount >= gatherer.capacity {
            let amount = gatherer.gathered_amount;
            gatherer.gathered_amount = 0;
            Some(amount)
        } else {
            None
        };

        let remaining = resource.resource.amount - taken;
        if let Some(target_resource) = state.get_component_mut::<CompResource>(target) {
            target_resource.resource.amount = remaining;
        }

        if let Some(amount) = delivery {
            deliver(ctx, resource_type, amount);
        }

        if remaining == 0 {
            let state = &mut ctx.world.state;
            if let Some(info) = state.get_component_mut::<CompEntityInfo>(target) {
                info.is_destroyed = true;
            }
            state.mark_dirty(target);
            state.destroy_entity(target);
            info!(entity = entity.0, target = target.0, "resource_depleted");
            animate(ctx, UnitAction::Idle);
            return true;
        }
        false
    }
}

fn gather_action(resource_type: ResourceType) -> UnitAction {
    match resource_type {
        ResourceType::Wood => UnitAction::Chopping,
        ResourceType::Food | ResourceType::Gold | ResourceType::Stone => UnitAction::Mining,
    }
}

fn deliver(ctx: &mut CommandContext<'_>, resource_type: ResourceType, amount: u32) {
    let Some(player) = ctx.world.player_of(ctx.entity) else {
        return;
    };
    if let Some(owner) = ctx.world.players.player_mut(player) {
        owner.add_resource(resource_type, amount);
        info!(
            entity = ctx.entity.0,
            player,
            resource = ?resource_type,
            amount,
            total = owner.resource(resource_type),
            "resources_delivered"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{spawn_unit, world};
    use super::super::{CommandRunner, IDLE_PRIORITY};
    use super::*;
    use crate::components::{CompAction, CompTransform, CompUnit};
    use crate::coordinates::Feet;
    use crate::ecs::CompDirty;
    use crate::events::event_channel;
    use crate::map::MapLayerType;
    use crate::types::EntityType;
    use crate::world::World;

    fn spawn_tree(world: &mut World, position: Feet, wood: u32) -> EntityId {
        let tree = world.state.create_entity();
        world.state.add_component(tree, CompEntityInfo::new(EntityType::Tree));
        world.state.add_component(
            tree,
            CompTransform::new(position).with_collision_radius(64.0),
        );
        world
            .state
            .add_component(tree, CompResource::new(ResourceType::Wood, wood));
        world.state.add_component(tree, CompDirty::default());
        world
            .tile_map
            .add_entity(MapLayerType::Static, position.to_tile(), tree)
            .expect("register tree");
        tree
    }

    #[test]
    fn gathering_depletes_tree_in_two_seconds() {
        let mut world = world(8);
        let (events, _receiver) = event_channel();
        let unit = spawn_unit(&mut world, Feet::new(0.0, 0.0), 0);
        world
            .state
            .add_component(unit, CompResourceGatherer::new(10, 10.0));
        let tree = spawn_tree(&mut world, Feet::new(10.0, 0.0), 20);

        let mut runner = CommandRunner::new();
        runner.enqueue(&mut world, &events, unit, CommandKind::Idle, IDLE_PRIORITY);
        runner.issue(&mut world, &events, unit, CommandKind::gather(tree));

        for _ in 0..124 {
            runner.tick(&mut world, &events, 16, 60);
        }
        let resource = world
            .state
            .get_component::<CompResource>(tree)
            .expect("tree still alive");
        assert_eq!(resource.resource.amount, 1);
        assert_eq!(
            world.state.get_component::<CompAction>(unit).expect("action").action,
            UnitAction::Chopping
        );

        runner.tick(&mut world, &events, 16, 60);

        let resource = world.state.get_component::<CompResource>(tree).expect("tree");
        assert_eq!(resource.resource.amount, 0);
        let info = world.state.get_component::<CompEntityInfo>(tree).expect("info");
        assert!(info.is_destroyed);
        assert!(world.state.is_pending_destroy(tree));
        assert_eq!(
            world.state.get_component::<CompAction>(unit).expect("action").action,
            UnitAction::Idle
        );
        let player = world.players.player(0).expect("player");
        assert_eq!(player.resource(ResourceType::Wood), 20);
        let queue = &world.state.get_component::<CompUnit>(unit).expect("unit").commands;
        assert!(queue.current().expect("idle").kind().is_idle());
    }

    #[test]
    fn distant_target_spawns_approach_move_first() {
        let mut world = world(12);
        let (events, _receiver) = event_channel();
        let unit = spawn_unit(&mut world, Feet::new(128.0, 128.0), 0);
        world
            .state
            .add_component(unit, CompResourceGatherer::new(10, 10.0));
        let tree = spawn_tree(&mut world, Feet::new(8.0 * 256.0 + 128.0, 128.0), 50);

        let mut runner = CommandRunner::new();
        runner.issue(&mut world, &events, unit, CommandKind::gather(tree));
        runner.tick(&mut world, &events, 16, 60);

        let queue = &world.state.get_component::<CompUnit>(unit).expect("unit").commands;
        assert_eq!(queue.len(), 2);
        let current = queue.current().expect("child move");
        assert!(matches!(current.kind(), CommandKind::Move(_)));

        for _ in 0..600 {
            runner.tick(&mut world, &events, 16, 60);
        }
        let resource = world.state.get_component::<CompResource>(tree).expect("tree");
        assert!(resource.resource.amount < 50);
    }
}
