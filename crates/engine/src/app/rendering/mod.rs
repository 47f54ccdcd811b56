mod backend;
mod pixels_backend;
mod renderer;
mod zorder;

pub use backend::{RenderBackend, RenderError};
pub use pixels_backend::PixelsBackend;
pub use renderer::{Renderer, GROUND_MARKER_Z_OFFSET};
pub use zorder::{TileBasedZOrderStrategy, ZOrderStrategy};
