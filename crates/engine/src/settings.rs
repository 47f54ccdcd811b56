use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fog::RevealStatus;
use crate::types::Size;

const MAX_VOLUME: u8 = 100;
const MIN_GAME_SPEED: f32 = 0.25;
const MAX_GAME_SPEED: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorldSizeType {
    Test,
    #[default]
    Demo,
    Tiny,
    Medium,
    Giant,
}

impl WorldSizeType {
    pub const fn tiles(self) -> i32 {
        match self {
            WorldSizeType::Test => 10,
            WorldSizeType::Demo => 50,
            WorldSizeType::Tiny => 120,
            WorldSizeType::Medium => 180,
            WorldSizeType::Giant => 240,
        }
    }

    pub const fn size(self) -> Size {
        Size::new(self.tiles(), self.tiles())
    }
}

/// Persistent user configuration. Unknown fields are ignored and missing ones default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    resolution: Size,
    window_size: Size,
    world_size_type: WorldSizeType,
    fullscreen: bool,
    vsync: bool,
    master_volume: u8,
    music_volume: u8,
    sfx_volume: u8,
    /// Screen pixels per second while a scroll key is held.
    viewport_speed: f32,
    ticks_per_second: u32,
    target_fps: u32,
    max_frame_delay_ms: u32,
    reveal_map: bool,
    max_population: u32,
    game_speed: f32,
    debug_overlays: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resolution: Size::new(1280, 720),
            window_size: Size::new(1280, 720),
            world_size_type: WorldSizeType::Demo,
            fullscreen: false,
            vsync: true,
            master_volume: 80,
            music_volume: 60,
            sfx_volume: 80,
            viewport_speed: 600.0,
            ticks_per_second: 60,
            target_fps: 60,
            max_frame_delay_ms: 250,
            reveal_map: false,
            max_population: 200,
            game_speed: 1.0,
            debug_overlays: false,
        }
    }
}

/// Durations derived from [`Settings`] for the event loop and renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    pub tick_interval: Duration,
    pub max_frame_delay: Duration,
    pub render_frame_target: Duration,
}

impl Settings {
    pub fn resolution(&self) -> Size {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: Size) {
        self.resolution = clamp_size(resolution);
    }

    pub fn window_size(&self) -> Size {
        self.window_size
    }

    pub fn set_window_size(&mut self, window_size: Size) {
        self.window_size = clamp_size(window_size);
    }

    pub fn world_size_type(&self) -> WorldSizeType {
        self.world_size_type
    }

    pub fn set_world_size_type(&mut self, world_size_type: WorldSizeType) {
        self.world_size_type = world_size_type;
    }

    pub fn world_size(&self) -> Size {
        self.world_size_type.size()
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;
    }

    pub fn vsync(&self) -> bool {
        self.vsync
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        self.vsync = vsync;
    }

    pub fn master_volume(&self) -> u8 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: u8) {
        self.master_volume = volume.min(MAX_VOLUME);
    }

    pub fn music_volume(&self) -> u8 {
        self.music_volume
    }

    pub fn set_music_volume(&mut self, volume: u8) {
        self.music_volume = volume.min(MAX_VOLUME);
    }

    pub fn sfx_volume(&self) -> u8 {
        self.sfx_volume
    }

    pub fn set_sfx_volume(&mut self, volume: u8) {
        self.sfx_volume = volume.min(MAX_VOLUME);
    }

    pub fn viewport_speed(&self) -> f32 {
        self.viewport_speed
    }

    pub fn set_viewport_speed(&mut self, speed: f32) {
        if speed.is_finite() && speed > 0.0 {
            self.viewport_speed = speed;
        }
    }

    pub fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second.max(1)
    }

    pub fn set_ticks_per_second(&mut self, ticks_per_second: u32) {
        self.ticks_per_second = ticks_per_second.max(1);
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps.max(1)
    }

    pub fn set_target_fps(&mut self, target_fps: u32) {
        self.target_fps = target_fps.max(1);
    }

    pub fn max_frame_delay_ms(&self) -> u32 {
        self.max_frame_delay_ms.max(1)
    }

    pub fn set_max_frame_delay_ms(&mut self, delay_ms: u32) {
        self.max_frame_delay_ms = delay_ms.max(1);
    }

    pub fn reveal_map(&self) -> bool {
        self.reveal_map
    }

    pub fn set_reveal_map(&mut self, reveal_map: bool) {
        self.reveal_map = reveal_map;
    }

    pub fn initial_fog(&self) -> RevealStatus {
        if self.reveal_map {
            RevealStatus::Explored
        } else {
            RevealStatus::Unexplored
        }
    }

    pub fn max_population(&self) -> u32 {
        self.max_population
    }

    pub fn set_max_population(&mut self, max_population: u32) {
        self.max_population = max_population;
    }

    pub fn game_speed(&self) -> f32 {
        if self.game_speed.is_finite() {
            self.game_speed.clamp(MIN_GAME_SPEED, MAX_GAME_SPEED)
        } else {
            1.0
        }
    }

    pub fn set_game_speed(&mut self, game_speed: f32) {
        if game_speed.is_finite() {
            self.game_speed = game_speed.clamp(MIN_GAME_SPEED, MAX_GAME_SPEED);
        }
    }

    pub fn debug_overlays(&self) -> bool {
        self.debug_overlays
    }

    pub fn set_debug_overlays(&mut self, debug_overlays: bool) {
        self.debug_overlays = debug_overlays;
    }

    pub fn timing(&self) -> LoopTiming {
        LoopTiming {
            tick_interval: Duration::from_secs_f64(1.0 / self.ticks_per_second() as f64),
            max_frame_delay: Duration::from_millis(self.max_frame_delay_ms() as u64),
            render_frame_target: Duration::from_secs_f64(1.0 / self.target_fps() as f64),
        }
    }
}

fn clamp_size(size: Size) -> Size {
    Size::new(size.width.max(1), size.height.max(1))
}
