use std::fs;
use std::path::{Path, PathBuf};

use image::ImageReader;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::coordinates::{TILE_PIXEL_HEIGHT, TILE_PIXEL_WIDTH};
use crate::sprite_keys::{SpriteKey, SpriteKeyError};
use crate::types::{
    Color, Direction, EntityType, PlayerId, ScreenRect, Size, UnitAction, MAX_PLAYERS,
};

use super::id::GraphicsId;
use super::registry::{GraphicsEntry, GraphicsRegistry, Texture, TextureId};

pub const SPRITE_MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum GraphicsLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid sprite manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode sprite sheet {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid sprite key '{key}': {source}")]
    InvalidKey {
        key: String,
        #[source]
        source: SpriteKeyError,
    },
    #[error("sprite rect {rect:?} for {entity_type:?} lies outside sheet '{key}' ({width}x{height})")]
    RectOutOfBounds {
        key: String,
        entity_type: EntityType,
        rect: ScreenRect,
        width: u32,
        height: u32,
    },
}

/// Source of sprites for the graphics registry.
pub trait GraphicsLoader {
    /// Registers every sprite this source provides and returns how many
    /// entries were added or replaced.
    fn load_all(&self, registry: &mut GraphicsRegistry) -> Result<usize, GraphicsLoadError>;
}

const PLAYER_COLORS: [Color; MAX_PLAYERS] = [
    Color::rgba(52, 101, 214, 255),
    Color::rgba(206, 52, 45, 255),
    Color::rgba(62, 170, 72, 255),
    Color::rgba(226, 196, 40, 255),
    Color::rgba(40, 190, 200, 255),
    Color::rgba(170, 70, 190, 255),
    Color::rgba(232, 132, 36, 255),
    Color::rgba(128, 128, 128, 255),
];

const NEUTRAL_COLOR: Color = Color::rgba(180, 180, 180, 255);

pub fn player_color(player: Option<PlayerId>) -> Color {
    player
        .and_then(|player| PLAYER_COLORS.get(player as usize).copied())
        .unwrap_or(NEUTRAL_COLOR)
}

/// Procedurally drawn sprites so the engine runs without any asset files.
#[derive(Debug, Clone)]
pub struct PlaceholderGraphics {
    building_sizes: Vec<(EntityType, Size)>,
}

impl Default for PlaceholderGraphics {
    fn default() -> Self {
        Self {
            building_sizes: vec![
                (EntityType::TownCenter, Size::new(3, 3)),
                (EntityType::House, Size::new(2, 2)),
            ],
        }
    }
}

impl PlaceholderGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Footprints to draw buildings with, normally taken from the defs.
    pub fn with_building_sizes(building_sizes: Vec<(EntityType, Size)>) -> Self {
        Self { building_sizes }
    }
}

impl GraphicsLoader for PlaceholderGraphics {
    fn load_all(&self, registry: &mut GraphicsRegistry) -> Result<usize, GraphicsLoadError> {
        let mut count = 0;

        let grass = diamond_texture(Color::rgba(86, 142, 64, 255));
        count += register_whole(registry, GraphicsId::new(EntityType::Tile), grass, Size::ONE);
        let fog = diamond_texture(Color::rgba(12, 12, 16, 255));
        count += register_whole(registry, GraphicsId::new(EntityType::Fog), fog, Size::ONE);

        let tree = registry.add_texture(tree_texture());
        let tree = bottom_anchored(registry, tree, Size::ONE);
        registry.register(GraphicsId::new(EntityType::Tree), tree);
        count += 1;
        for (entity_type, color) in [
            (EntityType::GoldMine, Color::rgba(222, 184, 54, 255)),
            (EntityType::StoneMine, Color::rgba(150, 150, 156, 255)),
        ] {
            count += register_whole(
                registry,
                GraphicsId::new(entity_type),
                mine_texture(color),
                Size::ONE,
            );
        }

        for player in player_slots() {
            let color = player_color(player);
            for entity_type in [EntityType::Villager, EntityType::Militia] {
                let texture = registry.add_texture(unit_texture(entity_type, color));
                let entry = bottom_anchored(registry, texture, Size::ONE);
                for action in UnitAction::ALL {
                    let id = GraphicsId::new(entity_type)
                        .with_action(action)
                        .with_player(player);
                    registry.register(id, entry);
                    count += 1;
                }
            }
            for &(entity_type, size) in &self.building_sizes {
                let id = GraphicsId::new(entity_type).with_player(player);
                count += register_whole(registry, id, building_texture(size, color, false), size);
                let site = id.with_action(UnitAction::Building);
                count += register_whole(registry, site, building_texture(size, color, true), size);
            }
        }

        info!(
            entries = count,
            textures = registry.textures().len(),
            "placeholder_graphics_loaded"
        );
        Ok(count)
    }
}

fn player_slots() -> impl Iterator<Item = Option<PlayerId>> {
    std::iter::once(None).chain((0..MAX_PLAYERS as PlayerId).map(Some))
}

/// Registers a texture whose anchor is its footprint centre.
fn register_whole(
    registry: &mut GraphicsRegistry,
    id: GraphicsId,
    texture: Texture,
    size: Size,
) -> usize {
    let width = texture.width as i32;
    let height = texture.height as i32;
    let footprint_height = footprint_pixels(size).1;
    let texture = registry.add_texture(texture);
    registry.register(
        id,
        GraphicsEntry {
            texture,
            src_rect: ScreenRect::new(0, 0, width, height),
            anchor: (width / 2, height - footprint_height / 2),
            flip: false,
            size,
        },
    );
    1
}

fn bottom_anchored(
    registry: &GraphicsRegistry,
    texture: TextureId,
    size: Size,
) -> GraphicsEntry {
    let bounds = registry
        .texture(texture)
        .map(Texture::bounds)
        .unwrap_or_default();
    GraphicsEntry {
        texture,
        src_rect: bounds,
        anchor: (bounds.w / 2, bounds.h - 4),
        flip: false,
        size,
    }
}

/// Pixel extent of an isometric footprint.
fn footprint_pixels(size: Size) -> (i32, i32) {
    let span = size.width + size.height;
    (
        span * TILE_PIXEL_WIDTH as i32 / 2,
        span * TILE_PIXEL_HEIGHT as i32 / 2,
    )
}

fn diamond_texture(color: Color) -> Texture {
    let mut texture = Texture::new(TILE_PIXEL_WIDTH as u32, TILE_PIXEL_HEIGHT as u32);
    let bounds = texture.bounds();
    fill_diamond(&mut texture, bounds, color);
    texture
}

fn tree_texture() -> Texture {
    let mut texture = Texture::new(48, 88);
    fill_rect(
        &mut texture,
        ScreenRect::new(20, 52, 8, 32),
        Color::rgba(110, 72, 40, 255),
    );
    fill_ellipse(
        &mut texture,
        ScreenRect::new(4, 0, 40, 60),
        Color::rgba(34, 104, 46, 255),
    );
    texture
}

fn mine_texture(color: Color) -> Texture {
    let mut texture = Texture::new(80, 48);
    fill_ellipse(
        &mut texture,
        ScreenRect::new(0, 8, 80, 40),
        Color::rgba(92, 86, 80, 255),
    );
    fill_ellipse(&mut texture, ScreenRect::new(16, 0, 48, 32), color);
    texture
}

fn unit_texture(entity_type: EntityType, color: Color) -> Texture {
    let mut texture = Texture::new(24, 44);
    fill_ellipse(&mut texture, ScreenRect::new(2, 12, 20, 30), color);
    fill_ellipse(
        &mut texture,
        ScreenRect::new(6, 0, 12, 12),
        Color::rgba(232, 196, 160, 255),
    );
    if entity_type == EntityType::Militia {
        fill_rect(
            &mut texture,
            ScreenRect::new(20, 4, 2, 30),
            Color::rgba(200, 200, 210, 255),
        );
    }
    texture
}

fn building_texture(size: Size, color: Color, under_construction: bool) -> Texture {
    let (width, footprint_height) = footprint_pixels(size);
    let wall_height = if under_construction { 12 } else { 16 * size.height.max(size.width) };
    let mut texture = Texture::new(width as u32, (footprint_height + wall_height) as u32);
    let base = ScreenRect::new(0, wall_height, width, footprint_height);
    let wall = Color::rgba(156, 120, 84, 255);
    fill_diamond(&mut texture, base, if under_construction { NEUTRAL_COLOR } else { wall });
    if under_construction {
        return texture;
    }
    let roof = ScreenRect::new(0, 0, width, footprint_height);
    fill_rect(
        &mut texture,
        ScreenRect::new(0, footprint_height / 2, width, wall_height),
        wall,
    );
    fill_diamond(&mut texture, roof, color);
    texture
}

fn fill_rect(texture: &mut Texture, rect: ScreenRect, color: Color) {
    for y in rect.y.max(0)..rect.bottom() {
        for x in rect.x.max(0)..rect.right() {
            texture.set_pixel(x as u32, y as u32, color.to_array());
        }
    }
}

fn fill_diamond(texture: &mut Texture, rect: ScreenRect, color: Color) {
    fill_shape(texture, rect, color, |dx, dy| dx.abs() + dy.abs() <= 1.0);
}

fn fill_ellipse(texture: &mut Texture, rect: ScreenRect, color: Color) {
    fill_shape(texture, rect, color, |dx, dy| dx * dx + dy * dy <= 1.0);
}

/// Fills pixels whose centre, normalised to [-1, 1] across `rect`, passes `inside`.
fn fill_shape(
    texture: &mut Texture,
    rect: ScreenRect,
    color: Color,
    inside: impl Fn(f32, f32) -> bool,
) {
    if !rect.has_area() {
        return;
    }
    let half_w = rect.w as f32 / 2.0;
    let half_h = rect.h as f32 / 2.0;
    for y in rect.y.max(0)..rect.bottom() {
        for x in rect.x.max(0)..rect.right() {
            let dx = (x - rect.x) as f32 + 0.5 - half_w;
            let dy = (y - rect.y) as f32 + 0.5 - half_h;
            if inside(dx / half_w, dy / half_h) {
                texture.set_pixel(x as u32, y as u32, color.to_array());
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpriteManifest {
    sheets: Vec<SheetManifest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SheetManifest {
    /// Sprite key of the PNG, relative to the sprite directory and without extension.
    image: String,
    entries: Vec<EntryManifest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntryManifest {
    entity_type: EntityType,
    #[serde(default)]
    sub_type: u8,
    #[serde(default)]
    action: UnitAction,
    #[serde(default)]
    variation: u8,
    #[serde(default)]
    direction: Direction,
    #[serde(default)]
    player: Option<PlayerId>,
    #[serde(default)]
    frame: u16,
    /// Consecutive frames laid out left to right, starting at `rect`.
    #[serde(default = "one_frame")]
    frames: u16,
    rect: [i32; 4],
    anchor: [i32; 2],
    #[serde(default)]
    flip: bool,
    #[serde(default)]
    size: Size,
}

fn one_frame() -> u16 {
    1
}

/// Reads `manifest.json` from a sprite directory and decodes the PNG sheets it names.
#[derive(Debug, Clone)]
pub struct SpriteSheetLoader {
    sprite_dir: PathBuf,
}

impl SpriteSheetLoader {
    pub fn new(sprite_dir: impl Into<PathBuf>) -> Self {
        Self {
            sprite_dir: sprite_dir.into(),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.sprite_dir.join(SPRITE_MANIFEST_FILE)
    }

    pub fn has_manifest(&self) -> bool {
        self.manifest_path().is_file()
    }

    fn read_manifest(&self) -> Result<SpriteManifest, GraphicsLoadError> {
        let path = self.manifest_path();
        let raw = fs::read_to_string(&path).map_err(|source| GraphicsLoadError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| GraphicsLoadError::Manifest { path, source })
    }

    fn resolve_sheet_path(&self, key: &str) -> Result<PathBuf, GraphicsLoadError> {
        let key = SpriteKey::parse(key).map_err(|source| GraphicsLoadError::InvalidKey {
            key: key.to_string(),
            source,
        })?;
        Ok(key.sheet_path(&self.sprite_dir))
    }
}

impl GraphicsLoader for SpriteSheetLoader {
    fn load_all(&self, registry: &mut GraphicsRegistry) -> Result<usize, GraphicsLoadError> {
        let manifest = self.read_manifest()?;
        let mut count = 0;
        for sheet in manifest.sheets {
            let path = self.resolve_sheet_path(&sheet.image)?;
            let texture = load_sheet_rgba(&path)?;
            let (width, height) = (texture.width, texture.height);
            let bounds = texture.bounds();
            let texture = registry.add_texture(texture);

            for entry in &sheet.entries {
                let id = GraphicsId {
                    entity_type: entry.entity_type,
                    entity_sub_type: entry.sub_type,
                    action: entry.action,
                    variation: entry.variation,
                    frame: 0,
                    direction: entry.direction,
                    player: 0,
                }
                .with_player(entry.player);
                let [x, y, w, h] = entry.rect;
                for offset in 0..entry.frames.max(1) {
                    let src_rect = ScreenRect::new(x + i32::from(offset) * w, y, w, h);
                    if !src_rect.has_area()
                        || src_rect.x < 0
                        || src_rect.y < 0
                        || src_rect.right() > bounds.w
                        || src_rect.bottom() > bounds.h
                    {
                        return Err(GraphicsLoadError::RectOutOfBounds {
                            key: sheet.image.clone(),
                            entity_type: entry.entity_type,
                            rect: src_rect,
                            width,
                            height,
                        });
                    }
                    registry.register(
                        id.with_frame(entry.frame.saturating_add(offset)),
                        GraphicsEntry {
                            texture,
                            src_rect,
                            anchor: (entry.anchor[0], entry.anchor[1]),
                            flip: entry.flip,
                            size: entry.size,
                        },
                    );
                    count += 1;
                }
            }
            debug!(sheet = %sheet.image, entries = sheet.entries.len(), "sprite_sheet_loaded");
        }
        info!(
            entries = count,
            dir = %self.sprite_dir.display(),
            "sprite_sheets_loaded"
        );
        Ok(count)
    }
}

fn load_sheet_rgba(path: &Path) -> Result<Texture, GraphicsLoadError> {
    let reader = ImageReader::open(path).map_err(|source| GraphicsLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = reader.decode().map_err(|source| GraphicsLoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let image = decoded.to_rgba8();
    let (width, height) = (image.width(), image.height());
    Ok(Texture {
        width,
        height,
        rgba: image.into_raw(),
    })
}
