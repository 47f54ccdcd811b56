//! Draw ordering for the isometric view.
//!
//! Every non-UI graphic layer keeps its own tile grid of entity ids, updated
//! incrementally from the renderer's snapshots. Ordering walks each grid in
//! row-major order. A multi-tile entity is emitted once, on its southernmost
//! row; rows above it that it blocks are resumed right after it so whatever
//! stands east of the building is drawn on top of it.

use std::collections::HashMap;

use crate::components::{CompGraphics, CompRendering};
use crate::coordinates::{Coordinates, Feet, Tile, FEET_PER_TILE};
use crate::map::footprint_min_tile;
use crate::types::{EntityId, GraphicLayer, ScreenRect, Size};

/// Within-tile z spans `0..2 * FEET_PER_TILE`; the rest is headroom for offsets.
const Z_BUCKETS: usize = 2 * FEET_PER_TILE as usize + 64;
const GRID_LAYERS: usize = GraphicLayer::COUNT - 1;

/// Strategy interface so alternatives (for example per-tile sliced walls) can
/// replace the tile-based ordering.
pub trait ZOrderStrategy: Send {
    /// `previous` is the entity's last applied graphics, if any.
    fn on_update(&mut self, previous: Option<&CompGraphics>, current: &CompRendering);

    /// Visible entities, back to front.
    fn z_order(&mut self, coordinates: &Coordinates) -> &[EntityId];
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    layer: GraphicLayer,
    min_tile: Tile,
    land_size: Size,
    position: Feet,
    z_offset: i32,
    /// Sprite box relative to the feet position, in pixels.
    sprite: ScreenRect,
    ui_rect: ScreenRect,
    is_visible: bool,
}

impl Placement {
    fn from_rendering(rendering: &CompRendering) -> Self {
        let graphics = &rendering.graphics;
        let position = graphics.position_in_feet.unwrap_or_default();
        let land_size = Size::new(
            graphics.land_size.width.max(1),
            graphics.land_size.height.max(1),
        );
        let min_tile = if land_size.is_big() {
            footprint_min_tile(position, land_size)
        } else {
            position.to_tile()
        };
        Self {
            layer: if graphics.is_ui() {
                GraphicLayer::Ui
            } else {
                graphics.layer
            },
            min_tile,
            land_size,
            position,
            z_offset: rendering.additional_z_offset,
            sprite: ScreenRect::new(
                -rendering.anchor.0,
                -rendering.anchor.1,
                rendering.src_rect.w,
                rendering.src_rect.h,
            ),
            ui_rect: graphics.ui_rect.unwrap_or_default(),
            is_visible: graphics.is_enabled && !graphics.is_destroyed,
        }
    }

    fn is_big(&self) -> bool {
        self.land_size.is_big()
    }

    fn occupies_same_tiles(&self, other: &Placement) -> bool {
        self.layer == other.layer
            && self.min_tile == other.min_tile
            && self.land_size == other.land_size
    }

    fn grid(&self) -> Option<usize> {
        match self.layer {
            GraphicLayer::Ui => None,
            layer => Some(layer.index()),
        }
    }
}

#[derive(Debug)]
struct LayerGrid {
    width: i32,
    height: i32,
    tiles: Vec<Vec<EntityId>>,
}

impl LayerGrid {
    fn new(size: Size) -> Self {
        Self {
            width: size.width.max(0),
            height: size.height.max(0),
            tiles: vec![Vec::new(); (size.width.max(0) * size.height.max(0)) as usize],
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x >= 0 && y >= 0 && x < self.width && y < self.height {
            Some((y * self.width + x) as usize)
        } else {
            None
        }
    }

    fn footprint(&self, placement: &Placement) -> impl Iterator<Item = usize> + '_ {
        let min = placement.min_tile;
        let size = placement.land_size;
        (min.y..min.y + size.height)
            .flat_map(move |y| (min.x..min.x + size.width).map(move |x| (x, y)))
            .filter_map(|(x, y)| self.index(x, y))
    }

    fn insert(&mut self, entity: EntityId, placement: &Placement) {
        let indices: Vec<usize> = self.footprint(placement).collect();
        for index in indices {
            self.tiles[index].push(entity);
        }
    }

    fn remove(&mut self, entity: EntityId, placement: &Placement) {
        let indices: Vec<usize> = self.footprint(placement).collect();
        for index in indices {
            self.tiles[index].retain(|&other| other != entity);
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Bucket {
    version: u32,
    entities: Vec<EntityId>,
}

pub struct TileBasedZOrderStrategy {
    grids: Vec<LayerGrid>,
    placements: HashMap<EntityId, Placement>,
    ui: Vec<EntityId>,
    output: Vec<EntityId>,
    // Per-pass scratch.
    window: ScreenRect,
    version: u32,
    claimed: Vec<u32>,
    bucket_version: u32,
    row_cursor: Vec<i32>,
    blocked: HashMap<EntityId, Vec<i32>>,
    buckets: Vec<Bucket>,
    touched: Vec<usize>,
}

impl TileBasedZOrderStrategy {
    pub fn new(world_size: Size) -> Self {
        let tile_count = (world_size.width.max(0) * world_size.height.max(0)) as usize;
        Self {
            grids: (0..GRID_LAYERS).map(|_| LayerGrid::new(world_size)).collect(),
            placements: HashMap::new(),
            ui: Vec::new(),
            output: Vec::new(),
            window: ScreenRect::default(),
            version: 0,
            claimed: vec![0; tile_count],
            bucket_version: 0,
            row_cursor: vec![0; world_size.height.max(0) as usize],
            blocked: HashMap::new(),
            buckets: vec![Bucket::default(); Z_BUCKETS],
            touched: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    fn remove(&mut self, entity: EntityId) {
        let Some(placement) = self.placements.remove(&entity) else {
            return;
        };
        match placement.grid() {
            Some(grid) => self.grids[grid].remove(entity, &placement),
            None => self.ui.retain(|&other| other != entity),
        }
    }

    /// A fresh version releases every tile claimed in the previous pass.
    fn next_version(&mut self) {
        self.version = self.version.wrapping_add(1);
        if self.version == 0 {
            self.claimed.fill(0);
            self.version = 1;
        }
    }

    fn is_on_screen(&self, placement: &Placement, coordinates: &Coordinates) -> bool {
        if !placement.sprite.has_area() {
            return true;
        }
        let anchor = coordinates.feet_to_screen_units(placement.position);
        placement
            .sprite
            .offset(anchor.x.round() as i32, anchor.y.round() as i32)
            .intersects(self.window)
    }

    fn emit(&mut self, entity: EntityId, placement: &Placement, coordinates: &Coordinates) {
        if self.is_on_screen(placement, coordinates) {
            self.output.push(entity);
        }
    }

    fn order_grid(&mut self, grid: usize, coordinates: &Coordinates) {
        self.next_version();
        self.row_cursor.fill(0);
        self.blocked.clear();
        let height = self.grids[grid].height;
        for y in 0..height {
            self.advance_row(grid, y, coordinates, false);
        }
        // Only reachable when a footprint was clipped oddly; emit leftovers anyway.
        let mut leftover: Vec<i32> = self.blocked.drain().flat_map(|(_, rows)| rows).collect();
        leftover.sort_unstable();
        for y in leftover {
            self.advance_row(grid, y, coordinates, true);
        }
    }

    /// Emits row `y` from its cursor until the row ends or a multi-tile entity
    /// that is not yet at its southern row blocks it.
    fn advance_row(&mut self, grid: usize, y: i32, coordinates: &Coordinates, force: bool) {
        let width = self.grids[grid].width;
        while self.row_cursor[y as usize] < width {
            let x = self.row_cursor[y as usize];
            let Some(index) = self.grids[grid].index(x, y) else {
                return;
            };
            if self.claimed[index] == self.version {
                self.row_cursor[y as usize] += 1;
                self.emit_small(grid, index, coordinates);
                continue;
            }

            let big = self.grids[grid].tiles[index].iter().copied().find(|entity| {
                self.placements
                    .get(entity)
                    .is_some_and(|placement| placement.is_visible && placement.is_big())
            });
            if let Some(big) = big {
                let below = self.grids[grid].index(x, y + 1);
                let is_anchor = below
                    .map_or(true, |below| !self.grids[grid].tiles[below].contains(&big));
                if !is_anchor && !force {
                    self.blocked.entry(big).or_default().push(y);
                    return;
                }
            }

            self.row_cursor[y as usize] += 1;
            if let Some(big) = big {
                self.emit_big(grid, big, coordinates);
            }
            self.emit_small(grid, index, coordinates);
        }
    }

    fn emit_big(&mut self, grid: usize, entity: EntityId, coordinates: &Coordinates) {
        let Some(placement) = self.placements.get(&entity).copied() else {
            return;
        };
        self.emit(entity, &placement, coordinates);
        let footprint: Vec<usize> = self.grids[grid].footprint(&placement).collect();
        for index in footprint {
            self.claimed[index] = self.version;
        }
        if let Some(mut rows) = self.blocked.remove(&entity) {
            rows.sort_unstable();
            for row in rows {
                self.advance_row(grid, row, coordinates, false);
            }
        }
    }

    fn emit_small(&mut self, grid: usize, index: usize, coordinates: &Coordinates) {
        self.next_bucket_pass();
        for slot in 0..self.grids[grid].tiles[index].len() {
            let entity = self.grids[grid].tiles[index][slot];
            let Some(placement) = self.placements.get(&entity) else {
                continue;
            };
            if !placement.is_visible || placement.is_big() {
                continue;
            }
            let within_x = placement.position.x.rem_euclid(FEET_PER_TILE);
            let within_y = placement.position.y.rem_euclid(FEET_PER_TILE);
            let z = (within_x + within_y) as i32 + placement.z_offset;
            let z = z.clamp(0, Z_BUCKETS as i32 - 1) as usize;
            let bucket = &mut self.buckets[z];
            if bucket.version != self.bucket_version {
                bucket.version = self.bucket_version;
                bucket.entities.clear();
                self.touched.push(z);
            }
            bucket.entities.push(entity);
        }
        if self.touched.is_empty() {
            return;
        }
        self.touched.sort_unstable();
        let touched = std::mem::take(&mut self.touched);
        for &z in &touched {
            for slot in 0..self.buckets[z].entities.len() {
                let entity = self.buckets[z].entities[slot];
                if let Some(placement) = self.placements.get(&entity).copied() {
                    self.emit(entity, &placement, coordinates);
                }
            }
        }
        self.touched = touched;
        self.touched.clear();
    }

    fn next_bucket_pass(&mut self) {
        self.bucket_version = self.bucket_version.wrapping_add(1);
        if self.bucket_version == 0 {
            for bucket in &mut self.buckets {
                bucket.version = 0;
            }
            self.bucket_version = 1;
        }
    }

    fn order_ui(&mut self) {
        let mut visible: Vec<(i32, EntityId)> = self
            .ui
            .iter()
            .filter_map(|entity| {
                let placement = self.placements.get(entity)?;
                (placement.is_visible && placement.ui_rect.intersects(self.window))
                    .then_some((placement.ui_rect.y, *entity))
            })
            .collect();
        visible.sort_unstable();
        self.output.extend(visible.into_iter().map(|(_, entity)| entity));
    }
}

impl ZOrderStrategy for TileBasedZOrderStrategy {
    fn on_update(&mut self, previous: Option<&CompGraphics>, current: &CompRendering) {
        let entity = current.graphics.entity_id;
        let placement = Placement::from_rendering(current);
        if previous.is_some() && !current.graphics.is_destroyed {
            if let Some(existing) = self.placements.get_mut(&entity) {
                if existing.occupies_same_tiles(&placement) {
                    *existing = placement;
                    return;
                }
            }
        }
        self.remove(entity);
        if current.graphics.is_destroyed {
            return;
        }
        match placement.grid() {
            Some(grid) => self.grids[grid].insert(entity, &placement),
            None => self.ui.push(entity),
        }
        self.placements.insert(entity, placement);
    }

    fn z_order(&mut self, coordinates: &Coordinates) -> &[EntityId] {
        self.output.clear();
        let window = coordinates.window_size();
        self.window = ScreenRect::new(0, 0, window.width, window.height);
        for layer in GraphicLayer::ORDER {
            if layer != GraphicLayer::Ui {
                self.order_grid(layer.index(), coordinates);
            }
        }
        self.order_ui();
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::Pixels;
    use crate::map::footprint_center;

    const WORLD: Size = Size::new(10, 10);

    fn coordinates() -> Coordinates {
        Coordinates::new(WORLD, Size::new(4000, 4000))
    }

    fn rendering(id: u32, position: Feet, land_size: Size) -> CompRendering {
        let mut graphics = CompGraphics::new(EntityId(id));
        graphics.position_in_feet = Some(position);
        graphics.land_size = land_size;
        CompRendering::new(graphics)
    }

    fn unit(id: u32, tile: Tile) -> CompRendering {
        rendering(id, tile.center_in_feet(), Size::ONE)
    }

    fn building(id: u32, min_tile: Tile) -> CompRendering {
        let size = Size::new(2, 2);
        rendering(id, footprint_center(min_tile, size), size)
    }

    fn order(items: &[CompRendering]) -> Vec<u32> {
        let mut strategy = TileBasedZOrderStrategy::new(WORLD);
        for item in items {
            strategy.on_update(None, item);
        }
        ids(&mut strategy, &coordinates())
    }

    fn ids(strategy: &mut TileBasedZOrderStrategy, coordinates: &Coordinates) -> Vec<u32> {
        strategy.z_order(coordinates).iter().map(|id| id.0).collect()
    }

    #[test]
    fn stacked_buildings_draw_north_to_south() {
        assert_eq!(
            order(&[building(2, Tile::new(3, 5)), building(1, Tile::new(3, 3))]),
            vec![1, 2]
        );
        assert_eq!(
            order(&[building(2, Tile::new(5, 3)), building(1, Tile::new(3, 3))]),
            vec![1, 2]
        );
    }

    #[test]
    fn units_west_of_a_building_draw_behind_it() {
        let house = building(1, Tile::new(4, 3));
        assert_eq!(order(&[house.clone(), unit(2, Tile::new(3, 4))]), vec![2, 1]);
        assert_eq!(order(&[house.clone(), unit(2, Tile::new(3, 3))]), vec![2, 1]);
    }

    #[test]
    fn units_east_of_a_building_draw_in_front_of_it() {
        let house = building(1, Tile::new(4, 3));
        assert_eq!(order(&[unit(2, Tile::new(6, 4)), house.clone()]), vec![1, 2]);
        assert_eq!(order(&[unit(2, Tile::new(6, 3)), house.clone()]), vec![1, 2]);
        assert_eq!(
            order(&[unit(3, Tile::new(4, 5)), unit(2, Tile::new(7, 2)), house]),
            vec![2, 1, 3]
        );
    }

    #[test]
    fn big_building_is_emitted_once_at_its_southern_row() {
        let size = Size::new(3, 3);
        let castle = rendering(1, footprint_center(Tile::new(3, 3), size), size);
        let inside = unit(2, Tile::new(4, 4));
        let south = unit(3, Tile::new(4, 6));
        let west = unit(4, Tile::new(2, 5));

        let emitted = order(&[inside, castle, south, west]);
        assert_eq!(emitted.iter().filter(|&&id| id == 1).count(), 1);
        assert_eq!(emitted, vec![4, 1, 2, 3]);
    }

    #[test]
    fn entities_sharing_a_tile_sort_by_depth_within_it() {
        let far = rendering(1, Feet::new(2.0 * 256.0 + 200.0, 2.0 * 256.0 + 200.0), Size::ONE);
        let near = rendering(2, Feet::new(2.0 * 256.0 + 10.0, 2.0 * 256.0 + 10.0), Size::ONE);
        assert_eq!(order(&[far.clone(), near.clone()]), vec![2, 1]);

        let mut lifted = near;
        lifted.additional_z_offset = 500;
        assert_eq!(order(&[far, lifted]), vec![1, 2]);
    }

    #[test]
    fn lower_layers_draw_first_regardless_of_tile() {
        let mut ground = unit(1, Tile::new(9, 9));
        ground.graphics.layer = GraphicLayer::Ground;
        assert_eq!(order(&[unit(2, Tile::new(0, 0)), ground]), vec![1, 2]);
    }

    #[test]
    fn destroyed_and_disabled_entities_are_skipped() {
        let mut strategy = TileBasedZOrderStrategy::new(WORLD);
        let alive = unit(1, Tile::new(1, 1));
        let mut hidden = unit(2, Tile::new(2, 2));
        hidden.graphics.is_enabled = false;
        let mut dying = unit(3, Tile::new(3, 3));
        strategy.on_update(None, &alive);
        strategy.on_update(None, &hidden);
        strategy.on_update(None, &dying);
        assert_eq!(strategy.len(), 3);

        let previous = dying.graphics.clone();
        dying.graphics.is_destroyed = true;
        strategy.on_update(Some(&previous), &dying);

        assert_eq!(strategy.len(), 2);
        assert_eq!(ids(&mut strategy, &coordinates()), vec![1]);
    }

    #[test]
    fn ui_elements_come_last_ordered_by_top_edge() {
        let ui = |id: u32, y: i32| {
            let mut graphics = CompGraphics::new(EntityId(id));
            graphics.ui_rect = Some(ScreenRect::new(0, y, 10, 10));
            CompRendering::new(graphics)
        };
        assert_eq!(
            order(&[ui(1, 50), unit(2, Tile::new(9, 9)), ui(3, 10)]),
            vec![2, 3, 1]
        );
    }

    #[test]
    fn moving_entity_follows_its_new_tile() {
        let mut strategy = TileBasedZOrderStrategy::new(WORLD);
        let mut mover = unit(1, Tile::new(1, 1));
        strategy.on_update(None, &mover);
        strategy.on_update(None, &unit(2, Tile::new(3, 3)));
        assert_eq!(ids(&mut strategy, &coordinates()), vec![1, 2]);

        let previous = mover.graphics.clone();
        mover.graphics.position_in_feet = Some(Tile::new(5, 5).center_in_feet());
        strategy.on_update(Some(&previous), &mover);

        assert_eq!(strategy.len(), 2);
        assert_eq!(ids(&mut strategy, &coordinates()), vec![2, 1]);
    }

    #[test]
    fn sprites_outside_the_window_are_culled() {
        let mut strategy = TileBasedZOrderStrategy::new(WORLD);
        let mut sprite = unit(1, Tile::new(0, 0));
        sprite.src_rect = ScreenRect::new(0, 0, 32, 32);
        sprite.anchor = (16, 32);
        strategy.on_update(None, &sprite);
        strategy.on_update(None, &unit(2, Tile::new(0, 1)));

        let mut coordinates = coordinates();
        assert_eq!(ids(&mut strategy, &coordinates), vec![1, 2]);

        coordinates.set_viewport_position_in_pixels(Pixels::new(100_000.0, 100_000.0));
        assert_eq!(ids(&mut strategy, &coordinates), vec![2]);
    }
}
