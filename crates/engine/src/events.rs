use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::commands::CommandKind;
use crate::coordinates::{Feet, Tile};
use crate::input::{Key, MouseButton};
use crate::map::LandArea;
use crate::types::{EntityId, EntityType, LineOfSightShape, PlayerId};

/// What a vision tracker measures its line of sight from.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingArea {
    /// Follows the tracker's transform; the position is the one at registration time.
    Center(Feet),
    LandArea(LandArea),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Tick {
        delta_ms: u32,
    },
    KeyDown {
        key: Key,
    },
    KeyUp {
        key: Key,
    },
    MouseMove {
        x: i32,
        y: i32,
    },
    MouseButtonDown {
        button: MouseButton,
        x: i32,
        y: i32,
    },
    MouseButtonUp {
        button: MouseButton,
        x: i32,
        y: i32,
    },
    UnitSelection {
        entities: Vec<EntityId>,
    },
    CommandRequest {
        entity: EntityId,
        command: CommandKind,
    },
    BuildingPlacementStarted {
        entity: EntityId,
    },
    BuildingPlacementFinished {
        entity: EntityId,
    },
    BuildingRequested {
        entity_type: EntityType,
        player: PlayerId,
        at: Feet,
    },
    BuildingPlaced {
        entity: EntityId,
        tile: Tile,
    },
    BuildingConstructed {
        entity: EntityId,
        entity_type: EntityType,
        player: PlayerId,
    },
    UnitTileMovement {
        entity: EntityId,
        new_tile: Tile,
        old_feet: Feet,
    },
    TrackingRequest {
        entity: EntityId,
        area: TrackingArea,
        line_of_sight: f32,
        shape: LineOfSightShape,
    },
    WithinLineOfSight {
        tracker: EntityId,
        target: EntityId,
    },
    OutOfLineOfSight {
        tracker: EntityId,
        target: EntityId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Tick,
    KeyDown,
    KeyUp,
    MouseMove,
    MouseButtonDown,
    MouseButtonUp,
    UnitSelection,
    CommandRequest,
    BuildingPlacementStarted,
    BuildingPlacementFinished,
    BuildingRequested,
    BuildingPlaced,
    BuildingConstructed,
    UnitTileMovement,
    TrackingRequest,
    WithinLineOfSight,
    OutOfLineOfSight,
}

impl EventType {
    pub const COUNT: usize = 17;

    pub const fn index(self) -> usize {
        self as usize
    }
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::Tick { .. } => EventType::Tick,
            Event::KeyDown { .. } => EventType::KeyDown,
            Event::KeyUp { .. } => EventType::KeyUp,
            Event::MouseMove { .. } => EventType::MouseMove,
            Event::MouseButtonDown { .. } => EventType::MouseButtonDown,
            Event::MouseButtonUp { .. } => EventType::MouseButtonUp,
            Event::UnitSelection { .. } => EventType::UnitSelection,
            Event::CommandRequest { .. } => EventType::CommandRequest,
            Event::BuildingPlacementStarted { .. } => EventType::BuildingPlacementStarted,
            Event::BuildingPlacementFinished { .. } => EventType::BuildingPlacementFinished,
            Event::BuildingRequested { .. } => EventType::BuildingRequested,
            Event::BuildingPlaced { .. } => EventType::BuildingPlaced,
            Event::BuildingConstructed { .. } => EventType::BuildingConstructed,
            Event::UnitTileMovement { .. } => EventType::UnitTileMovement,
            Event::TrackingRequest { .. } => EventType::TrackingRequest,
            Event::WithinLineOfSight { .. } => EventType::WithinLineOfSight,
            Event::OutOfLineOfSight { .. } => EventType::OutOfLineOfSight,
        }
    }
}

/// Receives events fanned out by the event loop. Every typed callback
/// defaults to a no-op; `on_event` sees every event after its typed callback.
pub trait EventHandler: Send {
    fn on_tick(&mut self, _delta_ms: u32) {}
    fn on_key_down(&mut self, _key: Key) {}
    fn on_key_up(&mut self, _key: Key) {}
    fn on_mouse_move(&mut self, _x: i32, _y: i32) {}
    fn on_mouse_button_down(&mut self, _button: MouseButton, _x: i32, _y: i32) {}
    fn on_mouse_button_up(&mut self, _button: MouseButton, _x: i32, _y: i32) {}
    fn on_unit_selection(&mut self, _entities: &[EntityId]) {}
    fn on_command_request(&mut self, _entity: EntityId, _command: &CommandKind) {}
    fn on_building_placement_started(&mut self, _entity: EntityId) {}
    fn on_building_placement_finished(&mut self, _entity: EntityId) {}
    fn on_building_requested(&mut self, _entity_type: EntityType, _player: PlayerId, _at: Feet) {}
    fn on_building_placed(&mut self, _entity: EntityId, _tile: Tile) {}
    fn on_building_constructed(
        &mut self,
        _entity: EntityId,
        _entity_type: EntityType,
        _player: PlayerId,
    ) {
    }
    fn on_unit_tile_movement(&mut self, _entity: EntityId, _new_tile: Tile, _old_feet: Feet) {}
    fn on_tracking_request(
        &mut self,
        _entity: EntityId,
        _area: &TrackingArea,
        _line_of_sight: f32,
        _shape: LineOfSightShape,
    ) {
    }
    fn on_within_line_of_sight(&mut self, _tracker: EntityId, _target: EntityId) {}
    fn on_out_of_line_of_sight(&mut self, _tracker: EntityId, _target: EntityId) {}

    fn on_event(&mut self, _event: &Event) {}
}

pub fn dispatch_event(handler: &mut dyn EventHandler, event: &Event) {
    match event {
        Event::Tick { delta_ms } => handler.on_tick(*delta_ms),
        Event::KeyDown { key } => handler.on_key_down(*key),
        Event::KeyUp { key } => handler.on_key_up(*key),
        Event::MouseMove { x, y } => handler.on_mouse_move(*x, *y),
        Event::MouseButtonDown { button, x, y } => handler.on_mouse_button_down(*button, *x, *y),
        Event::MouseButtonUp { button, x, y } => handler.on_mouse_button_up(*button, *x, *y),
        Event::UnitSelection { entities } => handler.on_unit_selection(entities),
        Event::CommandRequest { entity, command } => handler.on_command_request(*entity, command),
        Event::BuildingPlacementStarted { entity } => {
            handler.on_building_placement_started(*entity)
        }
        Event::BuildingPlacementFinished { entity } => {
            handler.on_building_placement_finished(*entity)
        }
        Event::BuildingRequested {
            entity_type,
            player,
            at,
        } => handler.on_building_requested(*entity_type, *player, *at),
        Event::BuildingPlaced { entity, tile } => handler.on_building_placed(*entity, *tile),
        Event::BuildingConstructed {
            entity,
            entity_type,
            player,
        } => handler.on_building_constructed(*entity, *entity_type, *player),
        Event::UnitTileMovement {
            entity,
            new_tile,
            old_feet,
        } => handler.on_unit_tile_movement(*entity, *new_tile, *old_feet),
        Event::TrackingRequest {
            entity,
            area,
            line_of_sight,
            shape,
        } => handler.on_tracking_request(*entity, area, *line_of_sight, *shape),
        Event::WithinLineOfSight { tracker, target } => {
            handler.on_within_line_of_sight(*tracker, *target)
        }
        Event::OutOfLineOfSight { tracker, target } => {
            handler.on_out_of_line_of_sight(*tracker, *target)
        }
    }
    handler.on_event(event);
}

/// Cloneable producer side of the event queue drained by the event loop.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: Sender<Event>,
}

impl EventPublisher {
    pub fn publish(&self, event: Event) {
        if self.sender.send(event).is_err() {
            debug!("event_dropped_without_receiver");
        }
    }
}

pub fn event_channel() -> (EventPublisher, Receiver<Event>) {
    let (sender, receiver) = unbounded();
    (EventPublisher { sender }, receiver)
}
