use serde::{Deserialize, Serialize};

pub type PlayerId = u8;

pub const MAX_PLAYERS: usize = 8;
pub const RESOURCE_MAX: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntityId(pub u32);

impl EntityId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Top-level entity category. The discriminant is part of the packed graphics id
/// and must fit in 12 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u16)]
pub enum EntityType {
    #[default]
    Default = 0,
    Villager = 1,
    Militia = 2,
    TownCenter = 10,
    House = 11,
    Tree = 20,
    GoldMine = 21,
    StoneMine = 22,
    Tile = 30,
    Fog = 31,
    UiElement = 40,
}

impl EntityType {
    pub const fn id(self) -> u16 {
        self as u16
    }

    pub fn from_id(id: u16) -> Option<Self> {
        let value = match id {
            0 => EntityType::Default,
            1 => EntityType::Villager,
            2 => EntityType::Militia,
            10 => EntityType::TownCenter,
            11 => EntityType::House,
            20 => EntityType::Tree,
            21 => EntityType::GoldMine,
            22 => EntityType::StoneMine,
            30 => EntityType::Tile,
            31 => EntityType::Fog,
            40 => EntityType::UiElement,
            _ => return None,
        };
        Some(value)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let value = match raw {
            "Default" => EntityType::Default,
            "Villager" => EntityType::Villager,
            "Militia" => EntityType::Militia,
            "TownCenter" => EntityType::TownCenter,
            "House" => EntityType::House,
            "Tree" => EntityType::Tree,
            "GoldMine" => EntityType::GoldMine,
            "StoneMine" => EntityType::StoneMine,
            "Tile" => EntityType::Tile,
            "Fog" => EntityType::Fog,
            "UiElement" => EntityType::UiElement,
            _ => return None,
        };
        Some(value)
    }

    pub const fn is_unit(self) -> bool {
        matches!(self, EntityType::Villager | EntityType::Militia)
    }

    pub const fn is_building(self) -> bool {
        matches!(self, EntityType::TownCenter | EntityType::House)
    }

    pub const fn is_resource(self) -> bool {
        matches!(
            self,
            EntityType::Tree | EntityType::GoldMine | EntityType::StoneMine
        )
    }
}

/// Which animation row plays. Part of the packed graphics id (6 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum UnitAction {
    #[default]
    Idle = 0,
    Move = 1,
    Chopping = 2,
    Mining = 3,
    Building = 4,
    Attack = 5,
    Repair = 6,
}

impl UnitAction {
    pub const ALL: [UnitAction; 7] = [
        UnitAction::Idle,
        UnitAction::Move,
        UnitAction::Chopping,
        UnitAction::Mining,
        UnitAction::Building,
        UnitAction::Attack,
        UnitAction::Repair,
    ];

    pub const fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|action| format!("{action:?}") == raw)
    }
}

/// Eight facings, clockwise from north (-y in feet space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    #[default]
    North = 0,
    NorthEast = 1,
    East = 2,
    SouthEast = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    NorthWest = 7,
}

impl Direction {
    pub const COUNT: usize = 8;
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::COUNT]
    }

    pub fn from_rotation(degrees: f32) -> Self {
        let normalized = degrees.rem_euclid(360.0);
        let sector = (normalized / 45.0).round() as usize;
        Self::from_index(sector)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResourceType {
    Wood = 0,
    Food = 1,
    Gold = 2,
    Stone = 3,
}

impl ResourceType {
    pub const ALL: [ResourceType; RESOURCE_MAX] = [
        ResourceType::Wood,
        ResourceType::Food,
        ResourceType::Gold,
        ResourceType::Stone,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Wood" => Some(ResourceType::Wood),
            "Food" => Some(ResourceType::Food),
            "Gold" => Some(ResourceType::Gold),
            "Stone" => Some(ResourceType::Stone),
            _ => None,
        }
    }
}

/// Draw layers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum GraphicLayer {
    Ground,
    OnGround,
    #[default]
    Entities,
    Sky,
    Fog,
    Ui,
}

impl GraphicLayer {
    pub const COUNT: usize = 6;
    pub const ORDER: [GraphicLayer; GraphicLayer::COUNT] = [
        GraphicLayer::Ground,
        GraphicLayer::OnGround,
        GraphicLayer::Entities,
        GraphicLayer::Sky,
        GraphicLayer::Fog,
        GraphicLayer::Ui,
    ];

    pub const fn index(self) -> usize {
        match self {
            GraphicLayer::Ground => 0,
            GraphicLayer::OnGround => 1,
            GraphicLayer::Entities => 2,
            GraphicLayer::Sky => 3,
            GraphicLayer::Fog => 4,
            GraphicLayer::Ui => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LineOfSightShape {
    #[default]
    Circle,
    RoundedSquare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// Integer rectangle in pixel or screen space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl ScreenRect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Normalised rect spanning two arbitrary corners.
    pub fn from_corners(ax: i32, ay: i32, bx: i32, by: i32) -> Self {
        let x = ax.min(bx);
        let y = ay.min(by);
        Self {
            x,
            y,
            w: (ax - bx).abs(),
            h: (ay - by).abs(),
        }
    }

    pub const fn right(self) -> i32 {
        self.x + self.w
    }

    pub const fn bottom(self) -> i32 {
        self.y + self.h
    }

    pub const fn has_area(self) -> bool {
        self.w > 0 && self.h > 0
    }

    pub const fn contains(self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub const fn intersects(self, other: ScreenRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            w: self.w,
            h: self.h,
        }
    }
}

/// Width and height in tiles (or pixels where noted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const ONE: Size = Size::new(1, 1);

    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub const fn is_big(self) -> bool {
        self.width > 1 || self.height > 1
    }
}

impl Default for Size {
    fn default() -> Self {
        Size::ONE
    }
}
