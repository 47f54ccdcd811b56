use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod commands;
pub mod components;
pub mod content;
pub mod coordinates;
pub mod ecs;
pub mod event_loop;
pub mod events;
pub mod factory;
pub mod fog;
pub mod graphics;
pub mod input;
pub mod map;
pub mod pathfinding;
pub mod player;
pub mod pool;
pub mod settings;
pub mod simulator;
mod sprite_keys;
pub mod sync;
pub mod types;
pub mod vision;
pub mod world;

pub use app::{
    run_app, run_app_with_metrics, AppError, GameSession, LoopConfig, LoopMetricsSnapshot,
    MetricsHandle, PixelsBackend, RenderBackend, RenderError, Renderer, TileBasedZOrderStrategy,
    ZOrderStrategy, SLOW_FRAME_ENV_VAR,
};
pub use content::{
    builtin_def_database, load_def_database, ContentCompileError, DefDatabase, BUILTIN_DEFS_PATH,
};
pub use event_loop::EventLoop;
pub use events::{event_channel, Event, EventHandler, EventPublisher};
pub use factory::EntityFactory;
pub use graphics::{GraphicsLoader, GraphicsRegistry, PlaceholderGraphics, SpriteSheetLoader};
pub use settings::Settings;
pub use simulator::{Simulator, SimulatorOptions};
pub use sprite_keys::{SpriteKey, SpriteKeyError};
pub use sync::{FrameData, ShutdownOnDrop, StopSource, ThreadSynchronizer};
pub use world::World;

pub const ROOT_ENV_VAR: &str = "RTS_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
    /// Holds `manifest.json` and the PNG sheets it names, when present.
    pub sprite_dir: PathBuf,
    pub defs_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "RTS_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/rts\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    Ok(app_paths_for(root))
}

fn app_paths_for(root: PathBuf) -> AppPaths {
    let assets_dir = root.join("assets");
    AppPaths {
        sprite_dir: assets_dir.join("sprites"),
        defs_path: root.join(BUILTIN_DEFS_PATH),
        assets_dir,
        root,
    }
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_repo_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
