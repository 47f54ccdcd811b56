use crate::components::CompGraphics;
use crate::types::{Direction, EntityType, PlayerId, UnitAction};

// Field widths, least significant first. The layout is persisted in sprite
// manifests and must not be reordered.
const ENTITY_TYPE_BITS: u32 = 12;
const SUB_TYPE_BITS: u32 = 8;
const ACTION_BITS: u32 = 6;
const VARIATION_BITS: u32 = 8;
const FRAME_BITS: u32 = 10;
const DIRECTION_BITS: u32 = 4;
const PLAYER_BITS: u32 = 4;
const RESERVED_BITS: u32 = 12;

const ENTITY_TYPE_SHIFT: u32 = 0;
const SUB_TYPE_SHIFT: u32 = ENTITY_TYPE_SHIFT + ENTITY_TYPE_BITS;
const ACTION_SHIFT: u32 = SUB_TYPE_SHIFT + SUB_TYPE_BITS;
const VARIATION_SHIFT: u32 = ACTION_SHIFT + ACTION_BITS;
const FRAME_SHIFT: u32 = VARIATION_SHIFT + VARIATION_BITS;
const DIRECTION_SHIFT: u32 = FRAME_SHIFT + FRAME_BITS;
const PLAYER_SHIFT: u32 = DIRECTION_SHIFT + DIRECTION_BITS;
const RESERVED_SHIFT: u32 = PLAYER_SHIFT + PLAYER_BITS;

const _: () = assert!(RESERVED_SHIFT + RESERVED_BITS == 64);

const fn mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

/// Player slot used for entities nobody owns (trees, tiles, fog).
pub const NEUTRAL_PLAYER: u8 = mask(PLAYER_BITS) as u8;
pub const MAX_FRAME: u16 = mask(FRAME_BITS) as u16;

/// Key into the graphics registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GraphicsId {
    pub entity_type: EntityType,
    pub entity_sub_type: u8,
    pub action: UnitAction,
    pub variation: u8,
    pub frame: u16,
    pub direction: Direction,
    pub player: u8,
}

impl GraphicsId {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            player: NEUTRAL_PLAYER,
            ..Self::default()
        }
    }

    pub fn from_graphics(graphics: &CompGraphics) -> Self {
        Self {
            entity_type: graphics.entity_type,
            entity_sub_type: graphics.entity_sub_type,
            action: graphics.action,
            variation: graphics.variation,
            frame: graphics.frame.min(MAX_FRAME),
            direction: graphics.direction,
            player: player_slot(graphics.player),
        }
    }

    pub fn with_action(self, action: UnitAction) -> Self {
        Self { action, ..self }
    }

    pub fn with_frame(self, frame: u16) -> Self {
        Self {
            frame: frame.min(MAX_FRAME),
            ..self
        }
    }

    pub fn with_direction(self, direction: Direction) -> Self {
        Self { direction, ..self }
    }

    pub fn with_player(self, player: Option<PlayerId>) -> Self {
        Self {
            player: player_slot(player),
            ..self
        }
    }

    pub fn pack(self) -> u64 {
        (u64::from(self.entity_type.id()) & mask(ENTITY_TYPE_BITS)) << ENTITY_TYPE_SHIFT
            | u64::from(self.entity_sub_type) << SUB_TYPE_SHIFT
            | (u64::from(self.action.id()) & mask(ACTION_BITS)) << ACTION_SHIFT
            | u64::from(self.variation) << VARIATION_SHIFT
            | (u64::from(self.frame) & mask(FRAME_BITS)) << FRAME_SHIFT
            | (self.direction.index() as u64 & mask(DIRECTION_BITS)) << DIRECTION_SHIFT
            | (u64::from(self.player) & mask(PLAYER_BITS)) << PLAYER_SHIFT
    }

    /// Fails on unknown entity types, actions or directions, or when the
    /// reserved bits are set.
    pub fn unpack(packed: u64) -> Option<Self> {
        if field(packed, RESERVED_SHIFT, RESERVED_BITS) != 0 {
            return None;
        }
        let entity_type =
            EntityType::from_id(field(packed, ENTITY_TYPE_SHIFT, ENTITY_TYPE_BITS) as u16)?;
        let action = UnitAction::from_id(field(packed, ACTION_SHIFT, ACTION_BITS) as u8)?;
        let direction_index = field(packed, DIRECTION_SHIFT, DIRECTION_BITS) as usize;
        if direction_index >= Direction::COUNT {
            return None;
        }
        Some(Self {
            entity_type,
            entity_sub_type: field(packed, SUB_TYPE_SHIFT, SUB_TYPE_BITS) as u8,
            action,
            variation: field(packed, VARIATION_SHIFT, VARIATION_BITS) as u8,
            frame: field(packed, FRAME_SHIFT, FRAME_BITS) as u16,
            direction: Direction::from_index(direction_index),
            player: field(packed, PLAYER_SHIFT, PLAYER_BITS) as u8,
        })
    }
}

fn field(packed: u64, shift: u32, bits: u32) -> u64 {
    (packed >> shift) & mask(bits)
}

fn player_slot(player: Option<PlayerId>) -> u8 {
    match player {
        Some(player) if u64::from(player) < mask(PLAYER_BITS) => player,
        _ => NEUTRAL_PLAYER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityId;

    #[test]
    fn layout_is_stable() {
        let id = GraphicsId {
            entity_type: EntityType::Villager,
            entity_sub_type: 2,
            action: UnitAction::Move,
            variation: 3,
            frame: 5,
            direction: Direction::East,
            player: 1,
        };
        let expected = 1u64
            | 2 << 12
            | 1 << 20
            | 3 << 26
            | 5 << 34
            | 2 << 44
            | 1 << 48;
        assert_eq!(id.pack(), expected);
        assert_eq!(GraphicsId::unpack(expected), Some(id));
    }

    #[test]
    fn unpack_rejects_reserved_bits_and_unknown_types() {
        let base = GraphicsId::new(EntityType::Tree).pack();
        assert!(GraphicsId::unpack(base | 1 << 60).is_none());
        assert!(GraphicsId::unpack(base & !mask(ENTITY_TYPE_BITS) | 0xABC).is_none());
    }

    #[test]
    fn graphics_snapshot_maps_unowned_entities_to_neutral_slot() {
        let mut graphics = CompGraphics::new(EntityId(4));
        graphics.entity_type = EntityType::GoldMine;
        graphics.frame = u16::MAX;
        let id = GraphicsId::from_graphics(&graphics);
        assert_eq!(id.player, NEUTRAL_PLAYER);
        assert_eq!(id.frame, MAX_FRAME);

        graphics.player = Some(3);
        assert_eq!(GraphicsId::from_graphics(&graphics).player, 3);
    }
}
