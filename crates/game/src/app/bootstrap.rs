use std::sync::Arc;

use rts_engine::content::BuildingArchetype;
use rts_engine::types::EntityType;
use rts_engine::{
    builtin_def_database, event_channel, load_def_database, resolve_app_paths, AppPaths,
    DefDatabase, EntityFactory, GameSession, GraphicsLoader, GraphicsRegistry, LoopConfig,
    PlaceholderGraphics, Settings, SpriteSheetLoader, World,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::scenario::{self, SCENARIO_PLAYER_COUNT};
use super::settings_store;

const PLACEHOLDER_BUILDINGS: [EntityType; 2] = [EntityType::TownCenter, EntityType::House];

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) session: GameSession,
}

pub(crate) fn build_app() -> Result<AppWiring, String> {
    init_tracing();
    info!("=== RTS Startup ===");

    let paths = resolve_app_paths().map_err(|error| error.to_string())?;
    info!(root = %paths.root.display(), "app_paths_resolved");
    let settings = settings_store::load_or_create(&settings_store::settings_path(&paths.root))?;
    let defs = Arc::new(load_defs(&paths)?);
    let registry = Arc::new(load_graphics(&paths, &defs)?);

    let session = new_session(settings, defs, registry)?;
    let config = LoopConfig::from_settings(&session.settings);
    Ok(AppWiring { config, session })
}

/// Builds the world and fills it with the starting scenario.
pub(crate) fn new_session(
    settings: Settings,
    defs: Arc<DefDatabase>,
    registry: Arc<GraphicsRegistry>,
) -> Result<GameSession, String> {
    let (events, receiver) = event_channel();
    let factory = EntityFactory::new(defs, events.clone());
    let mut world = World::new(
        settings.world_size(),
        settings.window_size(),
        SCENARIO_PLAYER_COUNT,
        settings.initial_fog(),
    );
    scenario::populate(&mut world, &factory)
        .map_err(|error| format!("populate scenario: {error}"))?;

    Ok(GameSession {
        world,
        factory,
        events,
        receiver,
        registry,
        settings,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// The defs file under the root wins; the copy compiled into the binary is
/// the fallback.
fn load_defs(paths: &AppPaths) -> Result<DefDatabase, String> {
    let defs = if paths.defs_path.is_file() {
        load_def_database(&paths.defs_path)
    } else {
        warn!(path = %paths.defs_path.display(), "defs_file_missing_using_builtin");
        builtin_def_database()
    }
    .map_err(|error| format!("compile defs: {error}"))?;
    info!(defs = defs.def_count(), "defs_loaded");
    Ok(defs)
}

fn load_graphics(paths: &AppPaths, defs: &DefDatabase) -> Result<GraphicsRegistry, String> {
    let mut registry = GraphicsRegistry::new();
    let sheets = SpriteSheetLoader::new(&paths.sprite_dir);
    if sheets.has_manifest() {
        sheets
            .load_all(&mut registry)
            .map_err(|error| format!("load sprite sheets: {error}"))?;
    } else {
        info!(dir = %paths.sprite_dir.display(), "sprite_manifest_missing_using_placeholders");
        placeholder_graphics(defs)
            .load_all(&mut registry)
            .map_err(|error| format!("load placeholder graphics: {error}"))?;
    }
    Ok(registry)
}

fn placeholder_graphics(defs: &DefDatabase) -> PlaceholderGraphics {
    let sizes = PLACEHOLDER_BUILDINGS
        .into_iter()
        .filter_map(|entity_type| defs.building(entity_type))
        .map(|def: &BuildingArchetype| (def.entity_type, def.size))
        .collect();
    PlaceholderGraphics::with_building_sizes(sizes)
}

#[cfg(test)]
mod tests {
    use rts_engine::graphics::GraphicsId;
    use rts_engine::settings::WorldSizeType;

    use super::*;

    fn builtin() -> Arc<DefDatabase> {
        Arc::new(builtin_def_database().expect("builtin defs"))
    }

    #[test]
    fn placeholder_graphics_cover_scenario_buildings() {
        let defs = builtin();
        let mut registry = GraphicsRegistry::new();
        placeholder_graphics(&defs)
            .load_all(&mut registry)
            .expect("placeholders");

        for entity_type in PLACEHOLDER_BUILDINGS {
            let id = GraphicsId::new(entity_type).with_player(Some(0));
            assert!(registry.lookup(id).is_some(), "{entity_type:?}");
        }
    }

    #[test]
    fn missing_sprite_manifest_falls_back_to_placeholders() {
        let root = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths {
            root: root.path().to_path_buf(),
            assets_dir: root.path().join("assets"),
            sprite_dir: root.path().join("assets").join("sprites"),
            defs_path: root.path().join("assets").join("missing.xml"),
        };

        let defs = load_defs(&paths).expect("builtin fallback");
        let registry = load_graphics(&paths, &defs).expect("graphics");
        assert!(!registry.is_empty());
    }

    #[test]
    fn new_session_sizes_the_world_from_settings() {
        let mut settings = Settings::default();
        settings.set_world_size_type(WorldSizeType::Test);
        let session = new_session(settings, builtin(), Arc::new(GraphicsRegistry::new()))
            .expect("session");

        assert_eq!(session.world.tile_map.width(), 10);
        assert_eq!(session.world.players.len(), SCENARIO_PLAYER_COUNT);
        assert!(session.world.state.entity_count() > 100);
        assert!(session.receiver.try_recv().is_ok());
    }
}
