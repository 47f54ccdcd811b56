//! The simulation side of the engine: one [`Simulator`] owns the world and
//! advances it on every `Tick`, then hands a snapshot of the entities whose
//! render-visible state changed to the renderer.

mod placement;
mod snapshot;
mod unit_manager;

use std::sync::Arc;

use tracing::{info, trace};

use crate::app::MetricsHandle;
use crate::commands::{CommandKind, CommandRunner, IDLE_PRIORITY};
use crate::components::{CompEntityInfo, CompGraphics, CompResourceGatherer, CompUnit, CompVision};
use crate::coordinates::{Feet, ScreenUnits, Tile};
use crate::events::{Event, EventHandler, EventPublisher, TrackingArea};
use crate::factory::EntityFactory;
use crate::input::{Key, MouseButton};
use crate::pool::{LocalPool, SharedPool};
use crate::settings::Settings;
use crate::sync::{FrameData, ThreadSynchronizer};
use crate::types::{EntityId, EntityType, LineOfSightShape, PlayerId};
use crate::vision::VisionSystem;
use crate::world::World;

pub use placement::BuildingPlacement;
pub use unit_manager::{hit_test, UnitManager, CLICK_THRESHOLD_PX};

pub const DEFAULT_SNAPSHOT_POOL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatorOptions {
    /// The player whose input this simulator turns into orders.
    pub local_player: PlayerId,
    pub ticks_per_second: u32,
    pub debug_overlays: bool,
    pub snapshot_pool_capacity: usize,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            local_player: 0,
            ticks_per_second: 60,
            debug_overlays: false,
            snapshot_pool_capacity: DEFAULT_SNAPSHOT_POOL_CAPACITY,
        }
    }
}

impl SimulatorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            ticks_per_second: settings.ticks_per_second(),
            debug_overlays: settings.debug_overlays(),
            ..Self::default()
        }
    }
}

pub struct Simulator {
    world: World,
    factory: EntityFactory,
    events: EventPublisher,
    commands: CommandRunner,
    vision: VisionSystem,
    units: UnitManager,
    placement: BuildingPlacement,
    sync: Arc<ThreadSynchronizer<FrameData>>,
    pool: LocalPool<CompGraphics>,
    metrics: Option<MetricsHandle>,
    options: SimulatorOptions,
    cursor: (i32, i32),
    frame_number: u64,
    is_first_tick: bool,
    handoff_closed: bool,
}

impl Simulator {
    pub fn new(
        mut world: World,
        factory: EntityFactory,
        events: EventPublisher,
        sync: Arc<ThreadSynchronizer<FrameData>>,
        shared_pool: Arc<SharedPool<CompGraphics>>,
        options: SimulatorOptions,
    ) -> Self {
        let mut units = UnitManager::new(options.local_player);
        units.set_selection_box(factory.create_selection_box(&mut world));
        // Both slots start with the world's view so the first tick does not reset it.
        let viewport = world.coordinates.viewport_position_in_pixels();
        sync.sender_frame().viewport = viewport;
        sync.receiver_frame().viewport = viewport;
        Self {
            world,
            factory,
            events,
            commands: CommandRunner::new(),
            vision: VisionSystem::new(),
            units,
            placement: BuildingPlacement::new(),
            sync,
            pool: LocalPool::new(options.snapshot_pool_capacity, shared_pool),
            metrics: None,
            options,
            cursor: (0, 0),
            frame_number: 0,
            is_first_tick: true,
            handoff_closed: false,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn factory(&self) -> &EntityFactory {
        &self.factory
    }

    pub fn units(&self) -> &UnitManager {
        &self.units
    }

    pub fn placement(&self) -> &BuildingPlacement {
        &self.placement
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Set once the renderer has shut the handoff down; later ticks are ignored.
    pub fn is_handoff_closed(&self) -> bool {
        self.handoff_closed
    }

    /// Advances the simulation by `delta_ms` and publishes the frame.
    /// Returns false once the renderer has shut the handoff down.
    pub fn tick(&mut self, delta_ms: u32) -> bool {
        self.on_tick_start();
        self.commands.tick(
            &mut self.world,
            &self.events,
            delta_ms,
            self.options.ticks_per_second,
        );
        self.vision.update(&self.world, &self.events);
        self.destroy_revealed_fog();
        self.refresh_dirty_graphics();
        self.publish_snapshot();
        self.on_tick_end()
    }

    fn on_tick_start(&mut self) {
        let viewport = self.sync.sender_frame().viewport;
        self.world
            .coordinates
            .set_viewport_position_in_pixels(viewport);

        if self.is_first_tick {
            self.is_first_tick = false;
            self.world.state.mark_all_dirty();
            for unit in self.world.state.entities_with::<CompUnit>() {
                let is_idle = self
                    .world
                    .state
                    .get_component::<CompUnit>(unit)
                    .is_some_and(|unit| unit.commands.is_empty());
                if is_idle {
                    self.commands.enqueue(
                        &mut self.world,
                        &self.events,
                        unit,
                        CommandKind::Idle,
                        IDLE_PRIORITY,
                    );
                }
            }
            info!(
                entities = self.world.state.entity_count(),
                "simulation_started"
            );
        }
    }

    fn destroy_revealed_fog(&mut self) {
        let mut revealed = Vec::new();
        for player in self.world.players.players_mut() {
            revealed.extend(player.fog.take_revealed_fog_entities());
        }
        if revealed.is_empty() {
            return;
        }
        trace!(count = revealed.len(), "fog_tiles_revealed");
        for fog in revealed {
            if let Some(info) = self.world.state.get_component_mut::<CompEntityInfo>(fog) {
                info.is_destroyed = true;
            }
            self.world.state.mark_dirty(fog);
            self.world.state.destroy_entity(fog);
        }
    }

    fn refresh_dirty_graphics(&mut self) {
        self.world.state.dirty_mut().sort();
        let dirty = self.world.state.dirty().entities().to_vec();
        for entity in dirty {
            snapshot::refresh_graphics(&mut self.world, entity, self.options.debug_overlays);
        }
    }

    fn publish_snapshot(&mut self) {
        let mut frame = self.sync.sender_frame();
        for stale in frame.graphic_updates.drain(..) {
            self.pool.release(stale);
        }
        frame.frame_number = self.frame_number;
        for &entity in self.world.state.dirty().entities() {
            let Some(graphics) = self.world.state.get_component::<CompGraphics>(entity) else {
                continue;
            };
            let mut update = self.pool.acquire();
            snapshot::copy_graphics(&mut update, graphics);
            frame.graphic_updates.push(update);
        }
        trace!(
            frame = self.frame_number,
            updates = frame.graphic_updates.len(),
            "snapshot_published"
        );
    }

    fn on_tick_end(&mut self) -> bool {
        self.world.state.dirty_mut().increment_version();

        let world = &mut self.world;
        let mut destroyed = Vec::new();
        let published = self
            .sync
            .wait_for_receiver(|| destroyed = world.apply_pending_destroys());
        if !destroyed.is_empty() {
            self.units.forget(&destroyed);
            for entity in &destroyed {
                self.vision.untrack(*entity);
            }
            if self
                .placement
                .ghost()
                .is_some_and(|ghost| destroyed.contains(&ghost))
            {
                self.placement = BuildingPlacement::new();
            }
        }

        self.world.state.dirty_mut().clear();
        self.frame_number += 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_tick();
        }
        published
    }

    fn cursor_feet(&self) -> Feet {
        let (x, y) = self.cursor;
        self.world
            .coordinates
            .screen_units_to_feet(ScreenUnits::new(x as f32, y as f32))
    }

    fn request_building(&mut self, entity_type: EntityType) {
        self.events.publish(Event::BuildingRequested {
            entity_type,
            player: self.options.local_player,
            at: self.cursor_feet(),
        });
    }
}

impl EventHandler for Simulator {
    fn on_tick(&mut self, delta_ms: u32) {
        if self.handoff_closed {
            return;
        }
        if !self.tick(delta_ms) {
            self.handoff_closed = true;
            info!(frame = self.frame_number, "simulation_handoff_closed");
        }
    }

    fn on_key_down(&mut self, key: Key) {
        match key {
            Key::Escape => {
                if self.placement.is_active() {
                    self.placement.cancel(&mut self.world, &self.events);
                } else {
                    self.units.select(&mut self.world, &self.events, Vec::new());
                }
            }
            Key::KeyH => self.request_building(EntityType::House),
            Key::KeyT => self.request_building(EntityType::TownCenter),
            Key::F3 => {
                self.options.debug_overlays = !self.options.debug_overlays;
                self.world.state.mark_all_dirty();
                info!(enabled = self.options.debug_overlays, "debug_overlays_toggled");
            }
            _ => {}
        }
    }

    fn on_mouse_move(&mut self, x: i32, y: i32) {
        self.cursor = (x, y);
        if self.placement.is_active() {
            let at = self.cursor_feet();
            self.placement.move_to(&mut self.world, at);
        } else {
            self.units.drag_to(&mut self.world, x, y);
        }
    }

    fn on_mouse_button_down(&mut self, button: MouseButton, x: i32, y: i32) {
        self.cursor = (x, y);
        if button != MouseButton::Left {
            return;
        }
        if self.placement.is_active() {
            self.placement
                .place(&mut self.world, &self.factory, &self.events);
        } else {
            self.units.begin_drag(x, y);
        }
    }

    fn on_mouse_button_up(&mut self, button: MouseButton, x: i32, y: i32) {
        self.cursor = (x, y);
        match button {
            MouseButton::Left => {
                self.units.finish_drag(&mut self.world, &self.events, x, y);
            }
            MouseButton::Right => {
                if self.placement.is_active() {
                    self.placement.cancel(&mut self.world, &self.events);
                } else {
                    self.units.command_at(&self.world, &self.events, x, y);
                }
            }
            MouseButton::Middle => {}
        }
    }

    fn on_command_request(&mut self, entity: EntityId, command: &CommandKind) {
        self.commands
            .issue(&mut self.world, &self.events, entity, command.clone());
    }

    fn on_building_requested(&mut self, entity_type: EntityType, player: PlayerId, at: Feet) {
        self.placement.start(
            &mut self.world,
            &self.factory,
            &self.events,
            entity_type,
            player,
            at,
        );
    }

    fn on_building_placed(&mut self, entity: EntityId, _tile: Tile) {
        let player = self.world.player_of(entity);
        let workers: Vec<EntityId> = self
            .units
            .selected()
            .iter()
            .copied()
            .filter(|&unit| {
                self.world.player_of(unit) == player
                    && self.world.state.has_component::<CompResourceGatherer>(unit)
            })
            .collect();
        for worker in workers {
            self.events.publish(Event::CommandRequest {
                entity: worker,
                command: CommandKind::build(entity),
            });
        }
    }

    fn on_unit_tile_movement(&mut self, entity: EntityId, new_tile: Tile, old_feet: Feet) {
        let Some(owner) = self.world.player_of(entity) else {
            return;
        };
        let Some(line_of_sight) = self
            .world
            .state
            .get_component::<CompVision>(entity)
            .map(|vision| vision.line_of_sight)
        else {
            return;
        };
        if let Some(player) = self.world.players.player_mut(owner) {
            player.fog.mark_as_explored(old_feet, line_of_sight);
            player.fog.mark_as_visible(new_tile, line_of_sight);
        }
    }

    fn on_tracking_request(
        &mut self,
        entity: EntityId,
        area: &TrackingArea,
        line_of_sight: f32,
        shape: LineOfSightShape,
    ) {
        self.vision.track(entity, area.clone(), line_of_sight, shape);
    }
}
