use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::app::metrics::{FrameSample, MetricsAccumulator, MetricsHandle};
use crate::components::{AddonKind, CompGraphics, CompRendering, DebugOverlay, GraphicAddon};
use crate::coordinates::{Coordinates, Pixels, FEET_PER_TILE, TILE_PIXEL_HEIGHT};
use crate::graphics::{GraphicsId, GraphicsRegistry};
use crate::input::{Key, KeyboardState};
use crate::pool::{LocalPool, SharedPool};
use crate::sync::{FrameData, ThreadSynchronizer};
use crate::types::{Color, EntityId, ScreenRect};

use super::backend::{RenderBackend, RenderError};
use super::zorder::{TileBasedZOrderStrategy, ZOrderStrategy};

const CLEAR_COLOR: Color = Color::rgba(20, 22, 28, 255);
const HEALTH_BAR_BACKGROUND: Color = Color::rgba(30, 30, 30, 200);
const HEALTH_BAR_WIDTH_PX: i32 = 32;
const HEALTH_BAR_HEIGHT_PX: i32 = 4;
const HEALTH_BAR_GAP_PX: i32 = 4;
const COLLISION_COLOR: Color = Color::rgba(255, 80, 80, 255);
const PATH_COLOR: Color = Color::rgba(255, 230, 90, 255);
const ANCHOR_COLOR: Color = Color::rgba(80, 220, 255, 255);
const ANCHOR_HALF_SIZE_PX: i32 = 3;
/// Lifts entities with a ground marker above neighbours sharing their tile.
pub const GROUND_MARKER_Z_OFFSET: i32 = 64;
const RENDERER_POOL_CAPACITY: usize = 1024;

/// Main-thread consumer of simulator snapshots.
pub struct Renderer<B> {
    backend: B,
    registry: Arc<GraphicsRegistry>,
    coordinates: Coordinates,
    sync: Arc<ThreadSynchronizer<FrameData>>,
    pool: LocalPool<CompGraphics>,
    renderings: HashMap<EntityId, CompRendering>,
    z_order: Box<dyn ZOrderStrategy>,
    missing_graphics: HashSet<u64>,
    viewport_speed: f32,
    metrics: Option<(MetricsHandle, MetricsAccumulator)>,
}

impl<B: RenderBackend> Renderer<B> {
    /// `coordinates` should be a copy of the world's so both threads start
    /// from the same viewport.
    pub fn new(
        backend: B,
        registry: Arc<GraphicsRegistry>,
        mut coordinates: Coordinates,
        sync: Arc<ThreadSynchronizer<FrameData>>,
        shared_pool: Arc<SharedPool<CompGraphics>>,
        viewport_speed: f32,
    ) -> Self {
        coordinates.set_window_size(backend.window_size());
        let z_order = Box::new(TileBasedZOrderStrategy::new(
            coordinates.world_size_in_tiles(),
        ));
        Self {
            backend,
            registry,
            coordinates,
            sync,
            pool: LocalPool::new(RENDERER_POOL_CAPACITY, shared_pool),
            renderings: HashMap::new(),
            z_order,
            missing_graphics: HashSet::new(),
            viewport_speed,
            metrics: None,
        }
    }

    pub fn with_z_order(mut self, z_order: Box<dyn ZOrderStrategy>) -> Self {
        self.z_order = z_order;
        for rendering in self.renderings.values() {
            self.z_order.on_update(None, rendering);
        }
        self
    }

    pub fn with_metrics(mut self, handle: MetricsHandle, interval: Duration) -> Self {
        self.metrics = Some((handle, MetricsAccumulator::new(interval)));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn coordinates(&self) -> &Coordinates {
        &self.coordinates
    }

    pub fn rendering(&self, entity: EntityId) -> Option<&CompRendering> {
        self.renderings.get(&entity)
    }

    pub fn len(&self) -> usize {
        self.renderings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderings.is_empty()
    }

    /// One frame: apply the pending snapshot, scroll, draw, then hand the
    /// viewport back and wait for the next snapshot. Returns false once the
    /// simulation has shut down.
    pub fn frame(
        &mut self,
        keyboard: &KeyboardState,
        frame_dt: Duration,
    ) -> Result<bool, RenderError> {
        let updates = self.apply_updates();
        self.scroll_viewport(keyboard, frame_dt);
        let draw_calls = self.render()?;
        self.record_metrics(FrameSample {
            frame_dt,
            draw_calls,
            updates,
            rendered_entities: self.renderings.len(),
        });
        self.sync.receiver_frame().viewport = self.coordinates.viewport_position_in_pixels();
        Ok(self.sync.wait_for_sender())
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.backend.resize(width, height)?;
        self.coordinates.set_window_size(self.backend.window_size());
        Ok(())
    }

    /// Folds the consumer-side snapshot into the renderer's own copies.
    /// Returns the number of updates applied.
    pub fn apply_updates(&mut self) -> usize {
        let mut updates = mem::take(&mut self.sync.receiver_frame().graphic_updates);
        let count = updates.len();
        for graphics in updates.drain(..) {
            self.apply(graphics);
        }
        self.sync.receiver_frame().graphic_updates = updates;
        count
    }

    fn apply(&mut self, mut graphics: Box<CompGraphics>) {
        let entity = graphics.entity_id;
        let existed = self.renderings.contains_key(&entity);
        let rendering = self.renderings.entry(entity).or_default();
        // The box now holds the previous state and goes back to the pool.
        mem::swap(&mut rendering.graphics, &mut *graphics);

        rendering.additional_z_offset = if rendering
            .graphics
            .addons
            .iter()
            .any(GraphicAddon::is_ground_marker)
        {
            GROUND_MARKER_Z_OFFSET
        } else {
            0
        };
        if rendering.graphics.is_ui() {
            rendering.texture = None;
        } else {
            resolve_texture(&self.registry, &mut self.missing_graphics, rendering);
        }

        self.z_order
            .on_update(existed.then_some(&*graphics), rendering);
        if rendering.graphics.is_destroyed {
            self.renderings.remove(&entity);
        }
        self.pool.release(graphics);
    }

    /// Moves the viewport with the arrow or WASD keys.
    pub fn scroll_viewport(&mut self, keyboard: &KeyboardState, dt: Duration) -> bool {
        let held = |a: Key, b: Key| keyboard.is_down(a) || keyboard.is_down(b);
        let mut dx = 0.0;
        let mut dy = 0.0;
        if held(Key::ArrowLeft, Key::KeyA) {
            dx -= 1.0;
        }
        if held(Key::ArrowRight, Key::KeyD) {
            dx += 1.0;
        }
        if held(Key::ArrowUp, Key::KeyW) {
            dy -= 1.0;
        }
        if held(Key::ArrowDown, Key::KeyS) {
            dy += 1.0;
        }
        if dx == 0.0 && dy == 0.0 {
            return false;
        }
        let distance = self.viewport_speed * dt.as_secs_f32();
        let current = self.coordinates.viewport_position_in_pixels();
        self.coordinates
            .set_viewport_position_in_pixels_with_boundary_checking(Pixels::new(
                current.x + dx * distance,
                current.y + dy * distance,
            ))
    }

    /// Draws and presents one frame. Returns the number of draw calls.
    pub fn render(&mut self) -> Result<u32, RenderError> {
        self.backend.clear(CLEAR_COLOR);
        let mut draw_calls = 0;
        let order = self.z_order.z_order(&self.coordinates);
        for entity in order {
            let Some(rendering) = self.renderings.get_mut(entity) else {
                continue;
            };
            draw_calls += draw_entity(
                &mut self.backend,
                &self.registry,
                &self.coordinates,
                rendering,
            );
        }
        self.backend.present()?;
        Ok(draw_calls)
    }

    fn record_metrics(&mut self, sample: FrameSample) {
        let Some((handle, accumulator)) = self.metrics.as_mut() else {
            return;
        };
        accumulator.record_frame(sample);
        if let Some(snapshot) = accumulator.maybe_snapshot(Instant::now(), handle.tick_count()) {
            handle.publish(snapshot);
            info!(
                fps = snapshot.fps,
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                worst_frame_time_ms = snapshot.worst_frame_time_ms,
                draw_calls = snapshot.draw_calls,
                updates_per_frame = snapshot.updates_per_frame,
                rendered_entities = snapshot.rendered_entities,
                total_ticks = snapshot.total_ticks,
                "loop_metrics"
            );
        }
    }
}

fn resolve_texture(
    registry: &GraphicsRegistry,
    missing: &mut HashSet<u64>,
    rendering: &mut CompRendering,
) {
    let id = GraphicsId::from_graphics(&rendering.graphics);
    match registry.lookup(id) {
        Some(entry) => {
            rendering.texture = Some(entry.texture);
            rendering.src_rect = entry.src_rect;
            rendering.anchor = entry.anchor;
            rendering.flip = entry.flip;
        }
        None => {
            if missing.insert(id.pack()) {
                error!(
                    entity = %rendering.graphics.entity_id,
                    graphics_id = id.pack(),
                    entity_type = ?id.entity_type,
                    action = ?id.action,
                    "graphics_missing"
                );
            }
            rendering.texture = None;
            rendering.src_rect = ScreenRect::default();
            rendering.anchor = (0, 0);
            rendering.flip = false;
        }
    }
}

fn draw_entity<B: RenderBackend>(
    backend: &mut B,
    registry: &GraphicsRegistry,
    coordinates: &Coordinates,
    rendering: &mut CompRendering,
) -> u32 {
    let graphics = &rendering.graphics;
    let Some(feet) = graphics.position_in_feet else {
        return match graphics.ui_rect {
            Some(rect) => {
                backend.draw_rect(rect, graphics.shading, false);
                1
            }
            None => 0,
        };
    };

    let screen = coordinates.feet_to_screen_units(feet);
    rendering.position_in_screen_units = screen;
    let graphics = &rendering.graphics;
    let (x, y) = (screen.x.round() as i32, screen.y.round() as i32);
    let mut draw_calls = 0;

    for addon in graphics.addons.iter().filter(|addon| addon.is_ground_marker()) {
        match addon.kind {
            AddonKind::Circle { radius_px } => {
                backend.draw_circle(x, y, radius_px, addon.color);
                draw_calls += 1;
            }
            AddonKind::Rhombus {
                width_px,
                height_px,
            } => {
                let (half_w, half_h) = (width_px / 2, height_px / 2);
                let corners = [
                    (x, y - half_h),
                    (x + half_w, y),
                    (x, y + half_h),
                    (x - half_w, y),
                ];
                for (index, &from) in corners.iter().enumerate() {
                    backend.draw_line(from, corners[(index + 1) % corners.len()], addon.color);
                }
                draw_calls += 4;
            }
            AddonKind::HealthBar { .. } => {}
        }
    }

    let (anchor_x, anchor_y) = rendering.anchor;
    if let Some(texture) = rendering.texture.and_then(|id| registry.texture(id)) {
        let src = rendering.src_rect;
        let dst = ScreenRect::new(x - anchor_x, y - anchor_y, src.w, src.h);
        backend.draw_textured(texture, src, dst, rendering.flip, graphics.shading);
        draw_calls += 1;
    }

    let mut bar_top = y - anchor_y - HEALTH_BAR_GAP_PX - HEALTH_BAR_HEIGHT_PX;
    for addon in &graphics.addons {
        let AddonKind::HealthBar { fraction } = addon.kind else {
            continue;
        };
        let left = x - HEALTH_BAR_WIDTH_PX / 2;
        let filled = (HEALTH_BAR_WIDTH_PX as f32 * fraction.clamp(0.0, 1.0)).round() as i32;
        backend.draw_rect(
            ScreenRect::new(left, bar_top, HEALTH_BAR_WIDTH_PX, HEALTH_BAR_HEIGHT_PX),
            HEALTH_BAR_BACKGROUND,
            true,
        );
        backend.draw_rect(
            ScreenRect::new(left, bar_top, filled, HEALTH_BAR_HEIGHT_PX),
            addon.color,
            true,
        );
        draw_calls += 2;
        bar_top -= HEALTH_BAR_HEIGHT_PX + 1;
    }

    for overlay in &graphics.debug_overlays {
        match overlay {
            DebugOverlay::CollisionCircle { radius_feet } => {
                let radius = (radius_feet * TILE_PIXEL_HEIGHT / FEET_PER_TILE).round() as i32;
                backend.draw_circle(x, y, radius, COLLISION_COLOR);
                draw_calls += 1;
            }
            DebugOverlay::PathLine { to } => {
                let target = coordinates.feet_to_screen_units(*to);
                backend.draw_line(
                    (x, y),
                    (target.x.round() as i32, target.y.round() as i32),
                    PATH_COLOR,
                );
                draw_calls += 1;
            }
            DebugOverlay::Anchor => {
                backend.draw_line(
                    (x - ANCHOR_HALF_SIZE_PX, y),
                    (x + ANCHOR_HALF_SIZE_PX, y),
                    ANCHOR_COLOR,
                );
                backend.draw_line(
                    (x, y - ANCHOR_HALF_SIZE_PX),
                    (x, y + ANCHOR_HALF_SIZE_PX),
                    ANCHOR_COLOR,
                );
                draw_calls += 2;
            }
        }
    }
    draw_calls
}
