//! Per-unit command queues and the command kinds they run.
//!
//! Each unit owns a [`CommandQueue`] ordered by priority, then by queue order.
//! Once per tick the runner pops the top command, executes it, pushes it back
//! if it is not finished, then queues any child commands it asked for at a
//! higher priority so they preempt it on the next tick.

mod build;
mod combat;
mod gather;
mod movement;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use tracing::{debug, warn};

use crate::components::{CompAction, CompAnimation, CompTransform, CompUnit};
use crate::coordinates::Feet;
use crate::events::EventPublisher;
use crate::pathfinding::PathFinderAStar;
use crate::types::{EntityId, UnitAction};
use crate::world::World;

pub use build::BuildCommand;
pub use combat::{AttackCommand, RepairCommand};
pub use gather::GatherCommand;
pub use movement::{MoveCommand, REPULSION_FEET_PER_SECOND};

pub const IDLE_PRIORITY: i32 = 0;
pub const USER_PRIORITY: i32 = 100;
pub const CHILD_PRIORITY_OFFSET: i32 = 10;
/// Slack added to both collision radii when deciding a target is within reach.
pub const APPROACH_TOLERANCE_FEET: f32 = 256.0;
pub const MAX_APPROACH_ATTEMPTS: u8 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Idle,
    Move(MoveCommand),
    GatherResource(GatherCommand),
    Build(BuildCommand),
    Attack(AttackCommand),
    Repair(RepairCommand),
}

impl CommandKind {
    pub fn move_to(goal: Feet) -> Self {
        CommandKind::Move(MoveCommand::new(goal))
    }

    pub fn gather(target: EntityId) -> Self {
        CommandKind::GatherResource(GatherCommand::new(target))
    }

    pub fn build(target: EntityId) -> Self {
        CommandKind::Build(BuildCommand::new(target))
    }

    pub fn attack(target: EntityId) -> Self {
        CommandKind::Attack(AttackCommand::new(target))
    }

    pub fn repair(target: EntityId) -> Self {
        CommandKind::Repair(RepairCommand::new(target))
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, CommandKind::Idle)
    }

    fn on_queue(&mut self, ctx: &mut CommandContext<'_>) {
        match self {
            CommandKind::Idle => {}
            CommandKind::Move(command) => command.on_queue(ctx),
            CommandKind::GatherResource(command) => command.approach.on_queue(ctx.world),
            CommandKind::Build(command) => command.approach.on_queue(ctx.world),
            CommandKind::Attack(command) => command.approach.on_queue(ctx.world),
            CommandKind::Repair(command) => command.approach.on_queue(ctx.world),
        }
    }

    fn on_start(&self, ctx: &CommandContext<'_>) {
        debug!(entity = ctx.entity.0, command = %self, "command_started");
    }

    /// Runs one tick. Returns true once the command is finished.
    fn on_execute(&mut self, ctx: &mut CommandContext<'_>, children: &mut Vec<CommandKind>) -> bool {
        match self {
            CommandKind::Idle => {
                animate(ctx, UnitAction::Idle);
                false
            }
            CommandKind::Move(command) => command.execute(ctx),
            CommandKind::GatherResource(command) => command.execute(ctx, children),
            CommandKind::Build(command) => command.execute(ctx, children),
            CommandKind::Attack(command) => command.execute(ctx, children),
            CommandKind::Repair(command) => command.execute(ctx, children),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Idle => write!(f, "Idle"),
            CommandKind::Move(command) => write!(
                f,
                "Move(to {:.0},{:.0}, {} waypoints left)",
                command.goal().x,
                command.goal().y,
                command.remaining_waypoints().len()
            ),
            CommandKind::GatherResource(command) => {
                write!(f, "GatherResource({})", command.approach.target())
            }
            CommandKind::Build(command) => write!(f, "Build({})", command.approach.target()),
            CommandKind::Attack(command) => write!(f, "Attack({})", command.approach.target()),
            CommandKind::Repair(command) => write!(f, "Repair({})", command.approach.target()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Command {
    priority: i32,
    sequence: u64,
    started: bool,
    kind: CommandKind,
}

impl Command {
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl Ord for Command {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Command {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Command {}

#[derive(Debug, Default)]
pub struct CommandQueue {
    heap: BinaryHeap<Command>,
    next_sequence: u64,
}

impl CommandQueue {
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The command that runs next tick.
    pub fn current(&self) -> Option<&Command> {
        self.heap.peek()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.heap.iter()
    }

    /// Drops every command except the idle fallback.
    pub fn clear_orders(&mut self) {
        self.heap.retain(|command| command.kind.is_idle());
    }

    fn push(&mut self, ctx: &mut CommandContext<'_>, mut kind: CommandKind, priority: i32) {
        kind.on_queue(ctx);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Command {
            priority,
            sequence,
            started: false,
            kind,
        });
    }

    fn run_tick(&mut self, ctx: &mut CommandContext<'_>) {
        let Some(mut command) = self.heap.pop() else {
            return;
        };
        if !command.started {
            command.kind.on_start(ctx);
            command.started = true;
        }

        let mut children = Vec::new();
        let complete = command.kind.on_execute(ctx, &mut children);
        let child_priority = command.priority + CHILD_PRIORITY_OFFSET;
        if complete {
            debug!(entity = ctx.entity.0, command = %command.kind, "command_completed");
        } else {
            self.heap.push(command);
        }
        for child in children {
            self.push(ctx, child, child_priority);
        }
    }
}

/// Borrowed simulation services handed to a command while it runs.
pub struct CommandContext<'a> {
    pub world: &'a mut World,
    pub pathfinder: &'a mut PathFinderAStar,
    pub events: &'a EventPublisher,
    pub entity: EntityId,
    pub delta_ms: u32,
    pub ticks_per_second: u32,
    pub total_ticks: u64,
}

impl CommandContext<'_> {
    pub fn delta_seconds(&self) -> f32 {
        self.delta_ms as f32 / 1000.0
    }
}

/// Owns the pathfinder and the tick counter that paces animations.
#[derive(Debug, Default)]
pub struct CommandRunner {
    pathfinder: PathFinderAStar,
    total_ticks: u64,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    pub fn enqueue(
        &mut self,
        world: &mut World,
        events: &EventPublisher,
        entity: EntityId,
        kind: CommandKind,
        priority: i32,
    ) {
        let Some(mut queue) = take_queue(world, entity) else {
            warn!(entity = entity.0, command = %kind, "command_target_not_a_unit");
            return;
        };
        let mut ctx = CommandContext {
            world: &mut *world,
            pathfinder: &mut self.pathfinder,
            events,
            entity,
            delta_ms: 0,
            ticks_per_second: 1,
            total_ticks: self.total_ticks,
        };
        queue.push(&mut ctx, kind, priority);
        restore_queue(world, entity, queue);
    }

    /// Replaces the unit's current orders with `kind`.
    pub fn issue(
        &mut self,
        world: &mut World,
        events: &EventPublisher,
        entity: EntityId,
        kind: CommandKind,
    ) {
        if let Some(unit) = world.state.get_component_mut::<CompUnit>(entity) {
            unit.commands.clear_orders();
        }
        self.enqueue(world, events, entity, kind, USER_PRIORITY);
    }

    pub fn tick(
        &mut self,
        world: &mut World,
        events: &EventPublisher,
        delta_ms: u32,
        ticks_per_second: u32,
    ) {
        self.total_ticks += 1;
        for entity in world.state.entities_with::<CompUnit>() {
            if !world.is_active(entity) {
                continue;
            }
            let Some(mut queue) = take_queue(world, entity) else {
                continue;
            };
            let mut ctx = CommandContext {
                world: &mut *world,
                pathfinder: &mut self.pathfinder,
                events,
                entity,
                delta_ms,
                ticks_per_second,
                total_ticks: self.total_ticks,
            };
            queue.run_tick(&mut ctx);
            restore_queue(world, entity, queue);
        }
    }
}

fn take_queue(world: &mut World, entity: EntityId) -> Option<CommandQueue> {
    world
        .state
        .get_component_mut::<CompUnit>(entity)
        .map(|unit| std::mem::take(&mut unit.commands))
}

fn restore_queue(world: &mut World, entity: EntityId, queue: CommandQueue) {
    if let Some(unit) = world.state.get_component_mut::<CompUnit>(entity) {
        unit.commands = queue;
    }
}

/// Switches the unit to `action` and advances its animation on the shared tick clock.
pub(crate) fn animate(ctx: &mut CommandContext<'_>, action: UnitAction) {
    let entity = ctx.entity;
    let ticks_per_second = ctx.ticks_per_second.max(1);
    let total_ticks = ctx.total_ticks;
    let state = &mut ctx.world.state;

    let mut changed = false;
    if let Some(current) = state.get_component_mut::<CompAction>(entity) {
        if current.action != action {
            current.action = action;
            changed = true;
        }
    }
    if let Some(animation) = state.get_component_mut::<CompAnimation>(entity) {
        if changed {
            animation.frame = 0;
        }
        if let Some(clip) = animation.animation(action) {
            if clip.frames > 1 && clip.speed > 0 {
                let ticks_per_frame = (ticks_per_second / clip.speed as u32).max(1) as u64;
                if total_ticks % ticks_per_frame == 0 {
                    let next = animation.frame + 1;
                    let frame = if next < clip.frames {
                        next
                    } else if clip.repeatable {
                        0
                    } else {
                        clip.frames - 1
                    };
                    if frame != animation.frame {
                        animation.frame = frame;
                        changed = true;
                    }
                }
            }
        }
    }
    if changed {
        state.mark_dirty(entity);
    }
}

/// Turns the unit towards `target`, marking it dirty when the facing changes.
pub(crate) fn face(ctx: &mut CommandContext<'_>, target: Feet) {
    let entity = ctx.entity;
    let Some(transform) = ctx.world.state.get_component_mut::<CompTransform>(entity) else {
        return;
    };
    let before = transform.direction();
    transform.face_towards(target);
    if transform.direction() != before {
        ctx.world.state.mark_dirty(entity);
    }
}

pub(crate) enum ApproachStatus {
    InRange,
    Moving,
    Failed,
}

/// Shared "walk up to a target" precondition of the targeted commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Approach {
    target: EntityId,
    target_position: Feet,
    attempts: u8,
}

impl Approach {
    fn new(target: EntityId) -> Self {
        Self {
            target,
            target_position: Feet::default(),
            attempts: 0,
        }
    }

    pub fn target(&self) -> EntityId {
        self.target
    }

    pub fn target_position(&self) -> Feet {
        self.target_position
    }

    fn on_queue(&mut self, world: &World) {
        if let Some(position) = world.position_of(self.target) {
            self.target_position = position;
        }
    }

    /// In range when the centres are within both collision radii plus the tolerance.
    /// Otherwise queues a child move, giving up after [`MAX_APPROACH_ATTEMPTS`].
    pub(crate) fn step(
        &mut self,
        ctx: &mut CommandContext<'_>,
        children: &mut Vec<CommandKind>,
    ) -> ApproachStatus {
        let state = &ctx.world.state;
        let Some(own) = state.get_component::<CompTransform>(ctx.entity) else {
            return ApproachStatus::Failed;
        };
        let Some(target) = state.get_component::<CompTransform>(self.target) else {
            return ApproachStatus::Failed;
        };
        self.target_position = target.position;

        let reach = own.collision_radius + target.collision_radius + APPROACH_TOLERANCE_FEET;
        if own.position.distance_squared(self.target_position) <= reach * reach {
            return ApproachStatus::InRange;
        }
        if self.attempts >= MAX_APPROACH_ATTEMPTS {
            warn!(
                entity = ctx.entity.0,
                target = self.target.0,
                attempts = self.attempts,
                "approach_gave_up"
            );
            return ApproachStatus::Failed;
        }
        self.attempts += 1;
        children.push(CommandKind::move_to(self.target_position));
        ApproachStatus::Moving
    }
}
