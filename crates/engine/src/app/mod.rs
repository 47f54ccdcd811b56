mod loop_runner;
mod metrics;
mod rendering;

pub use loop_runner::{
    run_app, run_app_with_metrics, AppError, GameSession, LoopConfig, SLOW_FRAME_ENV_VAR,
};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use rendering::{
    PixelsBackend, RenderBackend, RenderError, Renderer, TileBasedZOrderStrategy, ZOrderStrategy,
    GROUND_MARKER_Z_OFFSET,
};
