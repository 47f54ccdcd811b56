use std::env;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event as WindowHostEvent, MouseButton as WinitMouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop as WinitEventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowBuilder};

use crate::event_loop::EventLoop;
use crate::events::{Event, EventPublisher};
use crate::factory::EntityFactory;
use crate::graphics::GraphicsRegistry;
use crate::input::{InputBackend, Key, MouseButton, SharedInput};
use crate::pool::SharedPool;
use crate::settings::Settings;
use crate::simulator::{Simulator, SimulatorOptions};
use crate::sync::{FrameData, ShutdownOnDrop, StopSource, ThreadSynchronizer};
use crate::world::World;

use super::metrics::MetricsHandle;
use super::rendering::{PixelsBackend, RenderError, Renderer};

pub const SLOW_FRAME_ENV_VAR: &str = "RTS_SLOW_FRAME_MS";
const SIMULATION_THREAD_NAME: &str = "simulation";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    pub max_render_fps: Option<u32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "RTS Engine".to_string(),
            window_width: 1280,
            window_height: 720,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            max_render_fps: Some(60),
        }
    }
}

impl LoopConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let window = settings.window_size();
        Self {
            window_width: window.width.max(1) as u32,
            window_height: window.height.max(1) as u32,
            max_render_fps: Some(settings.target_fps()),
            ..Self::default()
        }
    }
}

/// A populated world plus the pieces the simulation writes through.
pub struct GameSession {
    pub world: World,
    pub factory: EntityFactory,
    pub events: EventPublisher,
    pub receiver: Receiver<Event>,
    pub registry: Arc<GraphicsRegistry>,
    pub settings: Settings,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] RenderError),
    #[error("failed to spawn simulation thread: {0}")]
    SpawnSimulation(#[source] std::io::Error),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

/// Opens the window, starts the simulation thread and renders on the
/// calling thread until the window closes.
pub fn run_app(config: LoopConfig, session: GameSession) -> Result<(), AppError> {
    run_app_with_metrics(config, session, MetricsHandle::default())
}

pub fn run_app_with_metrics(
    config: LoopConfig,
    session: GameSession,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let GameSession {
        world,
        factory,
        events,
        receiver,
        registry,
        settings,
    } = session;

    let event_loop = WinitEventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window: &'static Window = Box::leak(Box::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    ));
    let backend = PixelsBackend::new(window).map_err(AppError::CreateRenderer)?;

    let sync = Arc::new(ThreadSynchronizer::<FrameData>::new());
    let shared_pool = SharedPool::new();
    let input = SharedInput::new();
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
    let effective_render_cap = normalize_render_fps_cap(config.max_render_fps);
    let render_frame_target = target_frame_duration(effective_render_cap);
    let timing = settings.timing();

    info!(
        world_width = world.coordinates.world_size_in_tiles().width,
        world_height = world.coordinates.world_size_in_tiles().height,
        entity_count = world.state.entity_count(),
        tick_interval_ms = timing.tick_interval.as_millis() as u64,
        max_frame_delay_ms = timing.max_frame_delay.as_millis() as u64,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        render_fps_cap = %format_render_cap(effective_render_cap),
        "loop_config"
    );

    let mut renderer = Renderer::new(
        backend,
        registry,
        world.coordinates.clone(),
        Arc::clone(&sync),
        Arc::clone(&shared_pool),
        settings.viewport_speed(),
    )
    .with_metrics(metrics_handle.clone(), metrics_log_interval);

    let simulator = Simulator::new(
        world,
        factory,
        events.clone(),
        Arc::clone(&sync),
        shared_pool,
        SimulatorOptions::from_settings(&settings),
    )
    .with_metrics(metrics_handle);
    let mut game_loop = EventLoop::new(
        input.clone(),
        events,
        receiver,
        timing,
        settings.game_speed(),
    );
    game_loop.add_handler(Box::new(simulator));

    let stop = StopSource::new();
    let token = stop.token();
    let mut simulation: Option<JoinHandle<()>> = Some(
        thread::Builder::new()
            .name(SIMULATION_THREAD_NAME.to_string())
            .spawn({
                let shutdown = ShutdownOnDrop::new(Arc::clone(&sync));
                move || {
                    let _shutdown = shutdown;
                    game_loop.run(token);
                }
            })
            .map_err(AppError::SpawnSimulation)?,
    );

    event_loop.set_control_flow(ControlFlow::Poll);
    let mut last_frame_instant = Instant::now();
    let mut last_present_instant = Instant::now();

    event_loop
        .run(move |event, window_target| match event {
            WindowHostEvent::WindowEvent { window_id, event } if window_id == window.id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        info!(reason = "window_close", "shutdown_requested");
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = window.inner_size();
                        if let Err(error) = renderer.resize(size.width, size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        input.set_mouse_position(position.x as i32, position.y as i32);
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        if let Some(button) = map_mouse_button(button) {
                            input.set_mouse_button(button, state == ElementState::Pressed);
                        }
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if let Some(key) = map_physical_key(event.physical_key) {
                            input.set_key(key, event.state == ElementState::Pressed);
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if slow_frame_delay > Duration::ZERO {
                            thread::sleep(slow_frame_delay);
                        }

                        let now = Instant::now();
                        let frame_dt = clamp_frame_delta(
                            now.saturating_duration_since(last_frame_instant),
                            timing.max_frame_delay,
                        );
                        last_frame_instant = now;

                        let cap_sleep = compute_cap_sleep(
                            Instant::now().saturating_duration_since(last_present_instant),
                            render_frame_target,
                        );
                        if cap_sleep > Duration::ZERO {
                            thread::sleep(cap_sleep);
                        }

                        match renderer.frame(&input.keyboard_state(), frame_dt) {
                            Ok(true) => {}
                            Ok(false) => {
                                info!(reason = "simulation_stopped", "shutdown_requested");
                                window_target.exit();
                            }
                            Err(error) => {
                                warn!(error = %error, "renderer_draw_failed");
                                window_target.exit();
                            }
                        }
                        last_present_instant = Instant::now();
                    }
                    _ => {}
                }
            }
            WindowHostEvent::AboutToWait => {
                window.request_redraw();
            }
            WindowHostEvent::LoopExiting => {
                stop.request_stop();
                sync.shutdown();
                if let Some(handle) = simulation.take() {
                    if handle.join().is_err() {
                        warn!("simulation_thread_panicked");
                    }
                }
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

fn map_physical_key(key: PhysicalKey) -> Option<Key> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    let key = match code {
        KeyCode::Escape => Key::Escape,
        KeyCode::ArrowUp => Key::ArrowUp,
        KeyCode::ArrowDown => Key::ArrowDown,
        KeyCode::ArrowLeft => Key::ArrowLeft,
        KeyCode::ArrowRight => Key::ArrowRight,
        KeyCode::KeyW => Key::KeyW,
        KeyCode::KeyA => Key::KeyA,
        KeyCode::KeyS => Key::KeyS,
        KeyCode::KeyD => Key::KeyD,
        KeyCode::KeyH => Key::KeyH,
        KeyCode::KeyT => Key::KeyT,
        KeyCode::F3 => Key::F3,
        _ => return None,
    };
    Some(key)
}

fn map_mouse_button(button: WinitMouseButton) -> Option<MouseButton> {
    match button {
        WinitMouseButton::Left => Some(MouseButton::Left),
        WinitMouseButton::Middle => Some(MouseButton::Middle),
        WinitMouseButton::Right => Some(MouseButton::Right),
        _ => None,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn normalize_render_fps_cap(cap: Option<u32>) -> Option<u32> {
    cap.filter(|value| *value > 0)
}

fn target_frame_duration(max_render_fps: Option<u32>) -> Option<Duration> {
    max_render_fps.map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

fn format_render_cap(cap: Option<u32>) -> String {
    match cap {
        Some(value) => value.to_string(),
        None => "off".to_string(),
    }
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-frame env var value; falling back to config"
                );
                Duration::from_millis(config_slow_frame_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_frame_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "unable to read slow-frame env var; falling back to config"
            );
            Duration::from_millis(config_slow_frame_ms)
        }
    }
}
