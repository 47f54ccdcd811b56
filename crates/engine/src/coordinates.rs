use std::ops::{Add, AddAssign, Mul, Sub};

use tracing::error;

use crate::types::Size;

pub const FEET_PER_TILE: f32 = 256.0;
pub const TILE_PIXEL_WIDTH: f32 = 96.0;
pub const TILE_PIXEL_HEIGHT: f32 = 48.0;

/// World position. 256 feet per tile edge.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Feet {
    pub x: f32,
    pub y: f32,
}

impl Feet {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Floors towards negative infinity, so positions just off the map map to -1.
    pub fn to_tile(self) -> Tile {
        Tile::new(
            (self.x / FEET_PER_TILE).floor() as i32,
            (self.y / FEET_PER_TILE).floor() as i32,
        )
    }

    pub fn distance_squared(self, other: Feet) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(self, other: Feet) -> f32 {
        self.distance_squared(other).sqrt()
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn normalized(self) -> Option<Feet> {
        let length = self.length();
        if length <= f32::EPSILON || !length.is_finite() {
            return None;
        }
        Some(Feet::new(self.x / length, self.y / length))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Feet {
    type Output = Feet;

    fn add(self, rhs: Feet) -> Feet {
        Feet::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Feet {
    fn add_assign(&mut self, rhs: Feet) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Feet {
    type Output = Feet;

    fn sub(self, rhs: Feet) -> Feet {
        Feet::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Feet {
    type Output = Feet;

    fn mul(self, rhs: f32) -> Feet {
        Feet::new(self.x * rhs, self.y * rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
}

impl Tile {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Feet of the tile's top (minimum) corner.
    pub fn to_feet(self) -> Feet {
        Feet::new(
            self.x as f32 * FEET_PER_TILE,
            self.y as f32 * FEET_PER_TILE,
        )
    }

    pub fn center_in_feet(self) -> Feet {
        let half = FEET_PER_TILE / 2.0;
        Feet::new(
            self.x as f32 * FEET_PER_TILE + half,
            self.y as f32 * FEET_PER_TILE + half,
        )
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Tile {
        Tile::new(self.x + dx, self.y + dy)
    }

    pub fn is_neighbor_of(self, other: Tile) -> bool {
        let dx = (self.x - other.x).abs();
        let dy = (self.y - other.y).abs();
        dx <= 1 && dy <= 1 && (dx + dy) > 0
    }
}

/// Isometric world pixels with the map's top corner at `(WORLD_W * TPW / 2, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pixels {
    pub x: f32,
    pub y: f32,
}

impl Pixels {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Pixels relative to the window's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenUnits {
    pub x: f32,
    pub y: f32,
}

impl ScreenUnits {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Conversions between the four coordinate spaces plus the viewport.
#[derive(Debug, Clone)]
pub struct Coordinates {
    world_size_in_tiles: Size,
    window_size: Size,
    viewport: Pixels,
}

impl Coordinates {
    pub fn new(world_size_in_tiles: Size, window_size: Size) -> Self {
        let mut coordinates = Self {
            world_size_in_tiles,
            window_size,
            viewport: Pixels::default(),
        };
        coordinates.center_viewport_on(coordinates.world_center_in_feet());
        coordinates
    }

    pub fn world_size_in_tiles(&self) -> Size {
        self.world_size_in_tiles
    }

    pub fn world_size_in_feet(&self) -> Feet {
        Feet::new(
            self.world_size_in_tiles.width as f32 * FEET_PER_TILE,
            self.world_size_in_tiles.height as f32 * FEET_PER_TILE,
        )
    }

    pub fn world_center_in_feet(&self) -> Feet {
        self.world_size_in_feet() * 0.5
    }

    pub fn window_size(&self) -> Size {
        self.window_size
    }

    pub fn set_window_size(&mut self, window_size: Size) {
        self.window_size = window_size;
    }

    pub fn feet_to_pixels(&self, feet: Feet) -> Pixels {
        let origin_x = self.world_size_in_tiles.width as f32 * TILE_PIXEL_WIDTH / 2.0;
        Pixels::new(
            (feet.x - feet.y) * TILE_PIXEL_WIDTH / (2.0 * FEET_PER_TILE) + origin_x,
            (feet.x + feet.y) * TILE_PIXEL_HEIGHT / (2.0 * FEET_PER_TILE),
        )
    }

    pub fn pixels_to_feet(&self, pixels: Pixels) -> Feet {
        let origin_x = self.world_size_in_tiles.width as f32 * TILE_PIXEL_WIDTH / 2.0;
        // a = fx - fy, b = fx + fy
        let a = (pixels.x - origin_x) * (2.0 * FEET_PER_TILE) / TILE_PIXEL_WIDTH;
        let b = pixels.y * (2.0 * FEET_PER_TILE) / TILE_PIXEL_HEIGHT;
        Feet::new((a + b) / 2.0, (b - a) / 2.0)
    }

    pub fn feet_to_screen_units(&self, feet: Feet) -> ScreenUnits {
        let pixels = self.feet_to_pixels(feet);
        ScreenUnits::new(pixels.x - self.viewport.x, pixels.y - self.viewport.y)
    }

    pub fn screen_units_to_feet(&self, screen: ScreenUnits) -> Feet {
        self.pixels_to_feet(Pixels::new(
            screen.x + self.viewport.x,
            screen.y + self.viewport.y,
        ))
    }

    pub fn screen_units_to_tiles(&self, screen: ScreenUnits) -> Tile {
        self.screen_units_to_feet(screen).to_tile()
    }

    pub fn tiles_to_feet(&self, tile: Tile) -> Feet {
        tile.to_feet()
    }

    pub fn tile_center_in_feet(&self, tile: Tile) -> Feet {
        tile.center_in_feet()
    }

    pub fn z_order(&self, feet: Feet) -> f32 {
        let pixels = self.feet_to_pixels(feet);
        pixels.x + pixels.y
    }

    /// Largest z over the map, reached at the east corner.
    pub fn max_z_order(&self) -> f32 {
        let world = self.world_size_in_feet();
        self.z_order(Feet::new(world.x, 0.0))
    }

    pub fn viewport_position_in_pixels(&self) -> Pixels {
        self.viewport
    }

    pub fn set_viewport_position_in_pixels(&mut self, position: Pixels) {
        self.viewport = position;
    }

    pub fn viewport_center_in_pixels(&self) -> Pixels {
        Self::center_for(self.viewport, self.window_size)
    }

    pub fn center_viewport_on(&mut self, feet: Feet) {
        let pixels = self.feet_to_pixels(feet);
        self.viewport = Pixels::new(
            pixels.x - self.window_size.width as f32 / 2.0,
            pixels.y - self.window_size.height as f32 / 2.0,
        );
    }

    /// Moves the viewport to `position` if the screen centre stays on the map,
    /// otherwise slides along the edge on a 2:1 slope. Returns whether it moved.
    pub fn set_viewport_position_in_pixels_with_boundary_checking(
        &mut self,
        position: Pixels,
    ) -> bool {
        if self.center_is_inside(position) {
            self.viewport = position;
            return true;
        }

        let dx = position.x - self.viewport.x;
        let dy = position.y - self.viewport.y;

        if dx != 0.0 {
            let slide = dx.abs() / 2.0;
            for candidate in [
                Pixels::new(position.x, position.y + slide),
                Pixels::new(position.x, position.y - slide),
            ] {
                if self.center_is_inside(candidate) {
                    self.viewport = candidate;
                    return true;
                }
            }
        }

        if dy != 0.0 {
            let slide = dy.abs() * 2.0;
            for candidate in [
                Pixels::new(position.x + slide, position.y),
                Pixels::new(position.x - slide, position.y),
            ] {
                if self.center_is_inside(candidate) {
                    self.viewport = candidate;
                    return true;
                }
            }
        }

        false
    }

    pub fn is_inside_map(&self, feet: Feet) -> bool {
        let world = self.world_size_in_feet();
        feet.x >= 0.0 && feet.y >= 0.0 && feet.x <= world.x && feet.y <= world.y
    }

    pub fn is_valid_tile(&self, tile: Tile) -> bool {
        tile.x >= 0
            && tile.y >= 0
            && tile.x < self.world_size_in_tiles.width
            && tile.y < self.world_size_in_tiles.height
    }

    /// Tile under a screen point, or `None` (logged) when off the map.
    pub fn checked_screen_units_to_tiles(&self, screen: ScreenUnits) -> Option<Tile> {
        let tile = self.screen_units_to_tiles(screen);
        if self.is_valid_tile(tile) {
            Some(tile)
        } else {
            None
        }
    }

    /// Feet to tile with bounds validation; logs invariant violations.
    pub fn checked_feet_to_tile(&self, feet: Feet) -> Option<Tile> {
        let tile = feet.to_tile();
        if self.is_valid_tile(tile) {
            Some(tile)
        } else {
            error!(x = feet.x, y = feet.y, "feet_outside_map");
            None
        }
    }

    fn center_is_inside(&self, viewport: Pixels) -> bool {
        let center = Self::center_for(viewport, self.window_size);
        self.is_inside_map(self.pixels_to_feet(center))
    }

    fn center_for(viewport: Pixels, window: Size) -> Pixels {
        Pixels::new(
            viewport.x + window.width as f32 / 2.0,
            viewport.y + window.height as f32 / 2.0,
        )
    }
}
