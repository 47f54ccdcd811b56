//! Sprite registry shared by the simulator's snapshots and the renderer.

mod id;
mod loader;
mod registry;

pub use id::{GraphicsId, MAX_FRAME, NEUTRAL_PLAYER};
pub use loader::{
    player_color, GraphicsLoadError, GraphicsLoader, PlaceholderGraphics, SpriteSheetLoader,
    SPRITE_MANIFEST_FILE,
};
pub use registry::{GraphicsEntry, GraphicsRegistry, Texture, TextureId, TextureStore};
