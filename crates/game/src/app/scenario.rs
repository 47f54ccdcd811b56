//! The starting map: ground tiles, one base per player, resources and the
//! local player's fog.

use rts_engine::coordinates::Tile;
use rts_engine::factory::SpawnError;
use rts_engine::fog::RevealStatus;
use rts_engine::types::{EntityType, PlayerId, Size};
use rts_engine::{EntityFactory, World};
use tracing::{debug, info};

pub(crate) const LOCAL_PLAYER: PlayerId = 0;
pub(crate) const SCENARIO_PLAYER_COUNT: usize = 2;
const VILLAGERS_PER_PLAYER: i32 = 3;
/// Every n-th tile of the forest belt is left open as a pass.
const FOREST_GAP_EVERY: i32 = 5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScenarioSummary {
    pub(crate) tiles: usize,
    pub(crate) fog: usize,
    pub(crate) units: usize,
    pub(crate) buildings: usize,
    pub(crate) resources: usize,
}

pub(crate) fn populate(
    world: &mut World,
    factory: &EntityFactory,
) -> Result<ScenarioSummary, SpawnError> {
    let mut summary = ScenarioSummary::default();
    let width = world.tile_map.width();
    let height = world.tile_map.height();
    let town_center = factory.building_size(EntityType::TownCenter)?;

    for (player, base) in base_tiles(width, height, town_center)
        .into_iter()
        .enumerate()
        .take(world.players.len())
    {
        let player = player as PlayerId;
        factory.create_building(world, EntityType::TownCenter, player, base, true)?;
        summary.buildings += 1;
        for offset in 0..VILLAGERS_PER_PLAYER {
            let tile = Tile::new(base.x + town_center.width + 1, base.y + offset);
            factory.create_villager(world, player, tile.center_in_feet())?;
            summary.units += 1;
        }
        let mines = [
            (EntityType::GoldMine, Tile::new(base.x - 2, base.y + town_center.height + 1)),
            (EntityType::StoneMine, Tile::new(base.x + town_center.width + 1, base.y - 2)),
        ];
        for (entity_type, tile) in mines {
            summary.resources += usize::from(try_resource(world, factory, entity_type, tile));
        }
    }

    // A belt of trees along the anti-diagonal, between the two bases.
    for x in 0..width {
        if x % FOREST_GAP_EVERY == FOREST_GAP_EVERY / 2 {
            continue;
        }
        for y in [height - 1 - x, height - 2 - x] {
            let tile = Tile::new(x, y);
            summary.resources += usize::from(try_resource(world, factory, EntityType::Tree, tile));
        }
    }

    for y in 0..height {
        for x in 0..width {
            factory.create_tile(world, Tile::new(x, y), 0)?;
            summary.tiles += 1;
        }
    }

    // Last, so tiles the bases already see start uncovered.
    for y in 0..height {
        for x in 0..width {
            let tile = Tile::new(x, y);
            let unexplored = world
                .players
                .player(LOCAL_PLAYER)
                .is_some_and(|player| player.fog.status(tile) == RevealStatus::Unexplored);
            if unexplored {
                factory.create_fog(world, LOCAL_PLAYER, tile)?;
                summary.fog += 1;
            }
        }
    }

    info!(
        tiles = summary.tiles,
        fog = summary.fog,
        units = summary.units,
        buildings = summary.buildings,
        resources = summary.resources,
        entities = world.state.entity_count(),
        "scenario_populated"
    );
    Ok(summary)
}

/// Minimum tiles of each player's town center, in opposite quarters of the map.
fn base_tiles(width: i32, height: i32, town_center: Size) -> [Tile; SCENARIO_PLAYER_COUNT] {
    [
        Tile::new(width / 4, height / 4),
        Tile::new(
            width - width / 4 - town_center.width,
            height - height / 4 - town_center.height,
        ),
    ]
}

/// Decorations are best effort: a spot that is off the map or taken is skipped.
fn try_resource(
    world: &mut World,
    factory: &EntityFactory,
    entity_type: EntityType,
    tile: Tile,
) -> bool {
    match factory.create_resource(world, entity_type, tile, 0) {
        Ok(_) => true,
        Err(error) => {
            debug!(entity_type = ?entity_type, x = tile.x, y = tile.y, error = %error, "resource_skipped");
            false
        }
    }
}
