use std::collections::HashMap;

use crate::types::{Direction, ScreenRect, Size};

use super::id::GraphicsId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TextureId(pub u32);

/// Decoded RGBA8 image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Texture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        (rgba.len() == expected).then_some(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes = self.rgba.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        if let Some(bytes) = self.rgba.get_mut(offset..offset + 4) {
            bytes.copy_from_slice(&color);
        }
    }

    pub fn bounds(&self) -> ScreenRect {
        ScreenRect::new(0, 0, self.width as i32, self.height as i32)
    }
}

#[derive(Debug, Default)]
pub struct TextureStore {
    textures: Vec<Texture>,
}

impl TextureStore {
    pub fn add(&mut self, texture: Texture) -> TextureId {
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(texture);
        id
    }

    pub fn get(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsEntry {
    pub texture: TextureId,
    pub src_rect: ScreenRect,
    /// Pixel inside `src_rect` that sits on the entity's feet position.
    pub anchor: (i32, i32),
    pub flip: bool,
    pub size: Size,
}

/// Sprite lookup keyed by packed [`GraphicsId`]. Filled by a loader before the
/// simulation starts and only read afterwards.
#[derive(Debug, Default)]
pub struct GraphicsRegistry {
    textures: TextureStore,
    entries: HashMap<u64, GraphicsEntry>,
}

impl GraphicsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureId {
        self.textures.add(texture)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id)
    }

    pub fn textures(&self) -> &TextureStore {
        &self.textures
    }

    /// Returns the entry previously stored under the same id, if any.
    pub fn register(&mut self, id: GraphicsId, entry: GraphicsEntry) -> Option<GraphicsEntry> {
        self.entries.insert(id.pack(), entry)
    }

    pub fn get(&self, id: GraphicsId) -> Option<&GraphicsEntry> {
        self.entries.get(&id.pack())
    }

    /// Exact id first, then frame 0, then frame 0 facing north.
    pub fn lookup(&self, id: GraphicsId) -> Option<&GraphicsEntry> {
        self.get(id)
            .or_else(|| self.get(id.with_frame(0)))
            .or_else(|| self.get(id.with_frame(0).with_direction(Direction::North)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
