//! Component types stored in [`GameState`](crate::ecs::GameState).

use std::collections::BTreeMap;

use crate::commands::CommandQueue;
use crate::coordinates::{Feet, ScreenUnits, Tile};
use crate::graphics::TextureId;
use crate::map::LandArea;
use crate::types::{
    Color, Direction, EntityId, EntityType, GraphicLayer, LineOfSightShape, PlayerId,
    ResourceType, ScreenRect, Size, UnitAction,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompEntityInfo {
    pub entity_type: EntityType,
    pub entity_sub_type: u8,
    pub variation: u8,
    pub is_destroyed: bool,
}

impl CompEntityInfo {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompTransform {
    pub position: Feet,
    rotation: f32,
    speed: f32,
    goal_radius: f32,
    goal_radius_squared: f32,
    pub collision_radius: f32,
}

impl Default for CompTransform {
    fn default() -> Self {
        Self::new(Feet::default())
    }
}

impl CompTransform {
    pub fn new(position: Feet) -> Self {
        Self {
            position,
            rotation: 0.0,
            speed: 0.0,
            goal_radius: 0.0,
            goal_radius_squared: 0.0,
            collision_radius: 0.0,
        }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.set_speed(speed);
        self
    }

    pub fn with_goal_radius(mut self, radius: f32) -> Self {
        self.set_goal_radius(radius);
        self
    }

    pub fn with_collision_radius(mut self, radius: f32) -> Self {
        self.collision_radius = radius.max(0.0);
        self
    }

    /// Degrees in `[0, 360)`, 0 facing -y, clockwise.
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        let normalized = degrees.rem_euclid(360.0);
        // rem_euclid can round up to exactly 360.0 for tiny negatives
        self.rotation = if normalized >= 360.0 { 0.0 } else { normalized };
    }

    /// Faces towards `target`. Returns false when already there.
    pub fn face_towards(&mut self, target: Feet) -> bool {
        let delta = target - self.position;
        if delta.length() <= f32::EPSILON {
            return false;
        }
        self.set_rotation(delta.x.atan2(-delta.y).to_degrees());
        true
    }

    /// Unit vector for the current rotation.
    pub fn facing_vector(&self) -> Feet {
        let radians = self.rotation.to_radians();
        Feet::new(radians.sin(), -radians.cos())
    }

    pub fn direction(&self) -> Direction {
        Direction::from_rotation(self.rotation)
    }

    /// Feet per second.
    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = if speed.is_finite() { speed.max(0.0) } else { 0.0 };
    }

    pub fn goal_radius(&self) -> f32 {
        self.goal_radius
    }

    pub fn goal_radius_squared(&self) -> f32 {
        self.goal_radius_squared
    }

    pub fn set_goal_radius(&mut self, radius: f32) {
        self.goal_radius = radius.max(0.0);
        self.goal_radius_squared = self.goal_radius * self.goal_radius;
    }

    pub fn tile(&self) -> Tile {
        self.position.to_tile()
    }
}

#[derive(Debug, Default)]
pub struct CompUnit {
    pub commands: CommandQueue,
    pub attack_damage_per_second: f32,
    pub repair_per_second: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompBuilding {
    pub size: Size,
    pub is_placing: bool,
    pub valid_placement: bool,
    pub line_of_sight: f32,
    pub land_area: LandArea,
    pub is_constructed: bool,
    pub construction_progress_ms: u32,
    pub build_time_ms: u32,
}

impl CompBuilding {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            is_placing: false,
            valid_placement: true,
            line_of_sight: 0.0,
            land_area: LandArea::default(),
            is_constructed: true,
            construction_progress_ms: 0,
            build_time_ms: 0,
        }
    }

    pub fn construction_fraction(&self) -> f32 {
        if self.is_constructed || self.build_time_ms == 0 {
            1.0
        } else {
            (self.construction_progress_ms as f32 / self.build_time_ms as f32).min(1.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionIndicator {
    Ellipse { radius_px: i32 },
    Rhombus { width_px: i32, height_px: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompSelectible {
    /// Screen-pixel boxes relative to the entity's anchor, one per facing.
    pub bounding_boxes: [ScreenRect; Direction::COUNT],
    pub selection_indicator: SelectionIndicator,
    pub is_selected: bool,
}

impl CompSelectible {
    pub fn uniform(bounding_box: ScreenRect, selection_indicator: SelectionIndicator) -> Self {
        Self {
            bounding_boxes: [bounding_box; Direction::COUNT],
            selection_indicator,
            is_selected: false,
        }
    }

    pub fn bounding_box(&self, direction: Direction) -> ScreenRect {
        self.bounding_boxes[direction.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Animation {
    pub frames: u16,
    /// Frames per second.
    pub speed: u16,
    pub repeatable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompAnimation {
    pub frame: u16,
    pub animations: BTreeMap<UnitAction, Animation>,
}

impl CompAnimation {
    pub fn animation(&self, action: UnitAction) -> Option<Animation> {
        self.animations.get(&action).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompAction {
    pub action: UnitAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    pub resource_type: ResourceType,
    pub amount: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompResource {
    pub resource: Resource,
    pub original_amount: u32,
}

impl CompResource {
    pub fn new(resource_type: ResourceType, amount: u32) -> Self {
        Self {
            resource: Resource {
                resource_type,
                amount,
            },
            original_amount: amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompResourceGatherer {
    pub capacity: u32,
    pub gathered_amount: u32,
    pub gathered_type: Option<ResourceType>,
    /// Resource units per second.
    pub gather_speed: f32,
    pub(crate) progress_milli: u32,
}

impl CompResourceGatherer {
    pub fn new(capacity: u32, gather_speed: f32) -> Self {
        Self {
            capacity,
            gathered_amount: 0,
            gathered_type: None,
            gather_speed: gather_speed.max(0.0),
            progress_milli: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompPlayer {
    pub player: PlayerId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompVision {
    pub line_of_sight: f32,
    pub shape: LineOfSightShape,
    pub has_vision: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompHealth {
    pub current: u32,
    pub max: u32,
    pub(crate) progress_milli: u32,
}

impl CompHealth {
    pub fn new(max: u32) -> Self {
        Self {
            current: max,
            max,
            progress_milli: 0,
        }
    }

    pub fn is_damaged(&self) -> bool {
        self.current < self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiElementKind {
    SelectionBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompUIElement {
    pub kind: UiElementKind,
    pub rect: ScreenRect,
    pub color: Color,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddonKind {
    Circle { radius_px: i32 },
    Rhombus { width_px: i32, height_px: i32 },
    HealthBar { fraction: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphicAddon {
    pub kind: AddonKind,
    pub color: Color,
}

impl GraphicAddon {
    /// Ground markers are drawn at the feet and must sort above the tile below.
    pub fn is_ground_marker(&self) -> bool {
        matches!(self.kind, AddonKind::Circle { .. } | AddonKind::Rhombus { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DebugOverlay {
    CollisionCircle { radius_feet: f32 },
    PathLine { to: Feet },
    Anchor,
}

/// Render-facing view of an entity. Written by the simulator, consumed by the renderer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompGraphics {
    pub entity_id: EntityId,
    /// `None` for UI elements, which use `ui_rect` instead.
    pub position_in_feet: Option<Feet>,
    pub ui_rect: Option<ScreenRect>,
    pub entity_type: EntityType,
    pub entity_sub_type: u8,
    pub variation: u8,
    pub player: Option<PlayerId>,
    pub direction: Direction,
    pub action: UnitAction,
    pub frame: u16,
    pub land_size: Size,
    pub layer: GraphicLayer,
    pub shading: Color,
    pub addons: Vec<GraphicAddon>,
    pub debug_overlays: Vec<DebugOverlay>,
    pub is_destroyed: bool,
    pub is_enabled: bool,
}

impl CompGraphics {
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            is_enabled: true,
            ..Self::default()
        }
    }

    pub fn is_big(&self) -> bool {
        self.land_size.is_big()
    }

    pub fn is_ui(&self) -> bool {
        self.position_in_feet.is_none()
    }
}

/// Renderer-owned copy of [`CompGraphics`] plus resolved texture data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompRendering {
    pub graphics: CompGraphics,
    pub texture: Option<TextureId>,
    pub src_rect: ScreenRect,
    pub anchor: (i32, i32),
    pub flip: bool,
    pub position_in_screen_units: ScreenUnits,
    pub additional_z_offset: i32,
}

impl CompRendering {
    pub fn new(graphics: CompGraphics) -> Self {
        Self {
            graphics,
            ..Self::default()
        }
    }
}
