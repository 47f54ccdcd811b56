use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::{error, warn};

use crate::coordinates::{Feet, Tile};
use crate::map::PassabilityMap;
use crate::types::PlayerId;

const CARDINAL_COST: f32 = 1.0;
const DIAGONAL_COST: f32 = 1.4;
const NO_PARENT: u32 = u32::MAX;

const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (0, -1),
    (1, 0),
    (0, 1),
    (-1, 0),
    (1, -1),
    (1, 1),
    (-1, 1),
    (-1, -1),
];

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    index: u32,
    f_cost: f32,
    h_cost: f32,
    insertion_order: u64,
}

// BinaryHeap is a max-heap: the "greatest" node is the lowest f, then the earliest insertion.
impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_cost
            .total_cmp(&self.f_cost)
            .then_with(|| other.insertion_order.cmp(&self.insertion_order))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

/// 8-connected A* over a [`PassabilityMap`]. Search buffers are kept between
/// calls so repeated queries on the same map do not reallocate.
#[derive(Debug, Default)]
pub struct PathFinderAStar {
    width: i32,
    best_g: Vec<f32>,
    parent: Vec<u32>,
    closed: Vec<bool>,
    open: BinaryHeap<OpenNode>,
}

impl PathFinderAStar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tile-centre waypoints from `start`'s tile to `goal`'s tile. When the goal
    /// cannot be reached the path ends at the explored tile closest to it.
    pub fn find_path(
        &mut self,
        map: &PassabilityMap,
        player: PlayerId,
        start: Feet,
        goal: Feet,
    ) -> Vec<Feet> {
        self.find_tile_path(map, player, start.to_tile(), goal.to_tile())
            .into_iter()
            .map(Tile::center_in_feet)
            .collect()
    }

    pub fn find_tile_path(
        &mut self,
        map: &PassabilityMap,
        player: PlayerId,
        start: Tile,
        goal: Tile,
    ) -> Vec<Tile> {
        if !map.is_valid_tile(start) {
            error!(x = start.x, y = start.y, "path_start_outside_map");
            return Vec::new();
        }
        if start == goal {
            return vec![start];
        }
        if !map.is_valid_tile(goal) {
            warn!(x = goal.x, y = goal.y, "path_goal_outside_map");
        }

        self.reset(map.width(), map.height());
        let start_index = self.index_of(start);
        let goal_index = map.is_valid_tile(goal).then(|| self.index_of(goal));

        let start_h = heuristic(start, goal);
        self.best_g[start_index as usize] = 0.0;
        self.open.push(OpenNode {
            index: start_index,
            f_cost: start_h,
            h_cost: start_h,
            insertion_order: 0,
        });
        let mut next_insertion = 1u64;
        let mut closest_index = start_index;
        let mut closest_h = start_h;

        while let Some(current) = self.open.pop() {
            let current_index = current.index as usize;
            if self.closed[current_index] {
                continue;
            }
            self.closed[current_index] = true;

            if current.h_cost < closest_h {
                closest_h = current.h_cost;
                closest_index = current.index;
            }
            if Some(current.index) == goal_index {
                return self.reconstruct(current.index);
            }

            let tile = self.tile_of(current.index);
            let current_g = self.best_g[current_index];
            for (dx, dy) in NEIGHBOR_OFFSETS {
                let neighbor = tile.offset(dx, dy);
                if !map.is_passable_for(neighbor, player) {
                    continue;
                }
                let diagonal = dx != 0 && dy != 0;
                if diagonal
                    && (!map.is_passable_for(tile.offset(dx, 0), player)
                        || !map.is_passable_for(tile.offset(0, dy), player))
                {
                    continue;
                }
                let neighbor_index = self.index_of(neighbor);
                if self.closed[neighbor_index as usize] {
                    continue;
                }

                let step = if diagonal { DIAGONAL_COST } else { CARDINAL_COST };
                let tentative_g = current_g + step;
                if tentative_g >= self.best_g[neighbor_index as usize] {
                    continue;
                }
                self.best_g[neighbor_index as usize] = tentative_g;
                self.parent[neighbor_index as usize] = current.index;

                let h_cost = heuristic(neighbor, goal);
                self.open.push(OpenNode {
                    index: neighbor_index,
                    f_cost: tentative_g + h_cost,
                    h_cost,
                    insertion_order: next_insertion,
                });
                next_insertion += 1;
            }
        }

        self.reconstruct(closest_index)
    }

    fn reset(&mut self, width: i32, height: i32) {
        let cells = (width.max(0) * height.max(0)) as usize;
        self.width = width;
        self.best_g.clear();
        self.best_g.resize(cells, f32::INFINITY);
        self.parent.clear();
        self.parent.resize(cells, NO_PARENT);
        self.closed.clear();
        self.closed.resize(cells, false);
        self.open.clear();
    }

    fn reconstruct(&self, target: u32) -> Vec<Tile> {
        let mut path = vec![self.tile_of(target)];
        let mut cursor = target;
        while self.parent[cursor as usize] != NO_PARENT {
            cursor = self.parent[cursor as usize];
            path.push(self.tile_of(cursor));
        }
        path.reverse();
        path
    }

    fn index_of(&self, tile: Tile) -> u32 {
        (tile.y * self.width + tile.x) as u32
    }

    fn tile_of(&self, index: u32) -> Tile {
        let index = index as i32;
        Tile::new(index % self.width, index / self.width)
    }
}

fn heuristic(from: Tile, to: Tile) -> f32 {
    let dx = (to.x - from.x) as f32;
    let dy = (to.y - from.y) as f32;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{DynamicPassabilityKind, TerrainPassability};

    fn block(map: &mut PassabilityMap, tiles: &[(i32, i32)]) {
        for (x, y) in tiles {
            map.set_terrain(Tile::new(*x, *y), TerrainPassability::BlockedForAny)
                .expect("block tile");
        }
    }

    fn assert_valid_path(map: &PassabilityMap, path: &[Tile], player: PlayerId) {
        for tile in path {
            assert!(map.is_passable_for(*tile, player), "blocked tile {tile:?} on path");
        }
        for pair in path.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(a.is_neighbor_of(b), "{a:?} -> {b:?} is not a neighbour step");
            if a.x != b.x && a.y != b.y {
                assert!(map.is_passable_for(Tile::new(a.x, b.y), player));
                assert!(map.is_passable_for(Tile::new(b.x, a.y), player));
            }
        }
    }

    #[test]
    fn straight_line_on_open_map() {
        let map = PassabilityMap::new(50, 50);
        let mut finder = PathFinderAStar::new();
        let path = finder.find_tile_path(&map, 0, Tile::new(0, 0), Tile::new(49, 0));

        assert_eq!(path.len(), 50);
        assert!(path.iter().all(|tile| tile.y == 0));
        assert_eq!(path.first(), Some(&Tile::new(0, 0)));
        assert_eq!(path.last(), Some(&Tile::new(49, 0)));
    }

    #[test]
    fn routes_around_blocked_diagonal() {
        let mut map = PassabilityMap::new(5, 5);
        block(&mut map, &[(1, 1), (2, 2), (3, 3)]);
        let mut finder = PathFinderAStar::new();
        let path = finder.find_tile_path(&map, 0, Tile::new(0, 4), Tile::new(4, 0));

        assert_eq!(path.first(), Some(&Tile::new(0, 4)));
        assert_eq!(path.last(), Some(&Tile::new(4, 0)));
        assert_valid_path(&map, &path, 0);
    }

    #[test]
    fn enclosed_goal_yields_partial_path_to_closest_tile() {
        let mut map = PassabilityMap::new(10, 10);
        block(&mut map, &[(4, 5), (6, 5), (5, 4), (5, 6)]);
        let goal = Tile::new(5, 5);
        let mut finder = PathFinderAStar::new();
        let path = finder.find_tile_path(&map, 0, Tile::new(0, 0), goal);

        assert!(!path.is_empty());
        let last = *path.last().expect("partial path");
        assert_ne!(last, goal);
        assert!(last.is_neighbor_of(goal));
        assert_valid_path(&map, &path, 0);
    }

    #[test]
    fn start_equal_to_goal_is_single_node() {
        let map = PassabilityMap::new(4, 4);
        let mut finder = PathFinderAStar::new();
        let path = finder.find_path(
            &map,
            0,
            Feet::new(300.0, 300.0),
            Feet::new(400.0, 500.0),
        );
        assert_eq!(path, vec![Tile::new(1, 1).center_in_feet()]);
    }

    #[test]
    fn start_outside_map_returns_empty() {
        let map = PassabilityMap::new(4, 4);
        let mut finder = PathFinderAStar::new();
        assert!(finder
            .find_tile_path(&map, 0, Tile::new(-1, 0), Tile::new(2, 2))
            .is_empty());
    }

    #[test]
    fn diagonal_corner_cutting_is_refused() {
        let mut map = PassabilityMap::new(3, 3);
        block(&mut map, &[(1, 0)]);
        let mut finder = PathFinderAStar::new();
        let path = finder.find_tile_path(&map, 0, Tile::new(0, 0), Tile::new(2, 1));

        assert_eq!(path.last(), Some(&Tile::new(2, 1)));
        assert_eq!(path.get(1), Some(&Tile::new(0, 1)));
        assert_valid_path(&map, &path, 0);
    }

    #[test]
    fn owner_only_tiles_route_other_players_around() {
        let mut map = PassabilityMap::new(5, 3);
        for y in 0..2 {
            map.set_dynamic(
                Tile::new(2, y),
                DynamicPassabilityKind::PassableForOwnerOrAllied,
                Some(1),
            )
            .expect("gate");
        }
        let mut finder = PathFinderAStar::new();

        let owner_path = finder.find_tile_path(&map, 1, Tile::new(0, 0), Tile::new(4, 0));
        assert_eq!(owner_path.len(), 5);

        let other_path = finder.find_tile_path(&map, 2, Tile::new(0, 0), Tile::new(4, 0));
        assert_eq!(other_path.last(), Some(&Tile::new(4, 0)));
        assert!(other_path.contains(&Tile::new(2, 2)));
        assert_valid_path(&map, &other_path, 2);
    }

    #[test]
    fn random_obstacle_maps_keep_path_properties() {
        let mut seed = 0x2545_f491u32;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };
        let mut finder = PathFinderAStar::new();
        for _ in 0..20 {
            let mut map = PassabilityMap::new(16, 16);
            for _ in 0..60 {
                let tile = Tile::new((next() % 16) as i32, (next() % 16) as i32);
                if tile != Tile::new(0, 0) {
                    map.set_terrain(tile, TerrainPassability::BlockedForAny)
                        .expect("block");
                }
            }
            let goal = Tile::new(15, 15);
            let path = finder.find_tile_path(&map, 0, Tile::new(0, 0), goal);
            assert_eq!(path.first(), Some(&Tile::new(0, 0)));
            assert_valid_path(&map, &path, 0);
        }
    }
}
