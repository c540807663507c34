// Dense 3D navigation grid.
//
// The grid is stored as a flat `Vec<CellData>` indexed by
// `x + z * size_x + y * size_x * size_z` (relative to `origin`), giving O(1)
// read/write access. Out-of-bounds reads return `None`; out-of-bounds writes
// are rejected as a no-op. Callers treat an absent cell as not navigable.
//
// Each cell stores its classification plus two derived values: the
// `walkable_surface` flag (Empty with a non-Empty cell directly below) and
// the movement-cost multiplier (cheaper when the supporting cell is a Road).
// Every write through `set_cell` recomputes the derived values for the cell
// and its vertical neighbours before returning, so readers never observe a
// stale flag. Bulk terrain loads go through `load_terrain`, which writes raw
// classifications and then recomputes every derived value in one parallel
// pass.
//
// See also: `pathfinding.rs` for A* over this grid, `nav.rs` for the
// non-geometric ladder connections layered on top of it, `collision.rs` for
// the raycast oracle over the same cells, `sim.rs` which owns the grid.
//
// **Critical constraint: single writer.** All mutation goes through
// `set_cell` / `fill_box` / `load_terrain`. The pathfinder assumes the grid
// does not change during a search, which the single-threaded tick provides.

use crate::config::GridParams;
use crate::types::{CARDINALS, CellKind, VoxelCoord};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A read-only snapshot of one grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub coord: VoxelCoord,
    pub kind: CellKind,
    /// Empty, with a non-Empty cell directly below.
    pub walkable_surface: bool,
    /// 1.0 on normal ground, lower on roads.
    pub cost_multiplier: f32,
}

#[derive(Clone, Copy, Debug)]
struct CellData {
    kind: CellKind,
    walkable: bool,
    cost: f32,
}

impl Default for CellData {
    fn default() -> Self {
        Self {
            kind: CellKind::Empty,
            walkable: false,
            cost: 1.0,
        }
    }
}

/// Dense 3D navigation grid with fixed bounds.
#[derive(Clone, Debug)]
pub struct VoxelGrid {
    /// Flat storage: index = x + z * size_x + y * size_x * size_z.
    cells: Vec<CellData>,
    origin: VoxelCoord,
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    road_cost_multiplier: f32,
}

impl VoxelGrid {
    /// Create a new grid filled with `Empty`, whose minimum corner is
    /// `origin`.
    pub fn new(origin: VoxelCoord, size_x: u32, size_y: u32, size_z: u32) -> Self {
        let total = (size_x as usize) * (size_y as usize) * (size_z as usize);
        Self {
            cells: vec![CellData::default(); total],
            origin,
            size_x,
            size_y,
            size_z,
            road_cost_multiplier: 0.5,
        }
    }

    pub fn from_params(params: &GridParams) -> Self {
        let (sx, sy, sz) = params.size;
        let mut grid = Self::new(params.origin, sx, sy, sz);
        grid.road_cost_multiplier = params.road_cost_multiplier;
        grid
    }

    pub fn origin(&self) -> VoxelCoord {
        self.origin
    }

    /// Maximum corner (inclusive).
    pub fn max_corner(&self) -> VoxelCoord {
        self.origin.offset(
            self.size_x as i32 - 1,
            self.size_y as i32 - 1,
            self.size_z as i32 - 1,
        )
    }

    pub fn road_cost_multiplier(&self) -> f32 {
        self.road_cost_multiplier
    }

    /// Check whether a coordinate is within bounds.
    /// Differences are taken in `i64`, so any `i32` coordinate is safe.
    pub fn in_bounds(&self, coord: VoxelCoord) -> bool {
        let within = |c: i32, origin: i32, size: u32| {
            let d = i64::from(c) - i64::from(origin);
            d >= 0 && d < i64::from(size)
        };
        within(coord.x, self.origin.x, self.size_x)
            && within(coord.y, self.origin.y, self.size_y)
            && within(coord.z, self.origin.z, self.size_z)
    }

    /// Convert a coordinate to a flat index. Returns `None` if out of bounds.
    fn index(&self, coord: VoxelCoord) -> Option<usize> {
        if self.in_bounds(coord) {
            let x = (coord.x - self.origin.x) as usize;
            let y = (coord.y - self.origin.y) as usize;
            let z = (coord.z - self.origin.z) as usize;
            let sx = self.size_x as usize;
            let sz = self.size_z as usize;
            Some(x + z * sx + y * sx * sz)
        } else {
            None
        }
    }

    fn layer_len(&self) -> usize {
        self.size_x as usize * self.size_z as usize
    }

    fn coord_of(&self, index: usize) -> VoxelCoord {
        let sx = self.size_x as usize;
        let layer = self.layer_len();
        let y = index / layer;
        let rem = index % layer;
        let z = rem / sx;
        let x = rem % sx;
        self.origin.offset(x as i32, y as i32, z as i32)
    }

    /// Read a cell. Returns `None` for out-of-bounds coordinates.
    pub fn get_cell(&self, coord: VoxelCoord) -> Option<Cell> {
        self.index(coord).map(|i| {
            let data = self.cells[i];
            Cell {
                coord,
                kind: data.kind,
                walkable_surface: data.walkable,
                cost_multiplier: data.cost,
            }
        })
    }

    /// Classification at `coord`, or `None` outside the grid.
    pub fn kind(&self, coord: VoxelCoord) -> Option<CellKind> {
        self.index(coord).map(|i| self.cells[i].kind)
    }

    /// `true` if the coordinate is in bounds and classified `Empty`.
    pub fn is_empty(&self, coord: VoxelCoord) -> bool {
        self.kind(coord) == Some(CellKind::Empty)
    }

    pub fn is_walkable(&self, coord: VoxelCoord) -> bool {
        self.index(coord).is_some_and(|i| self.cells[i].walkable)
    }

    /// Write a cell's classification and refresh the derived flags of the
    /// cell and its vertical neighbours. Returns `false` (and changes
    /// nothing) for out-of-bounds coordinates.
    pub fn set_cell(&mut self, coord: VoxelCoord, kind: CellKind) -> bool {
        let Some(i) = self.index(coord) else {
            tracing::trace!(%coord, ?kind, "set_cell outside grid bounds ignored");
            return false;
        };
        self.cells[i].kind = kind;
        self.refresh(coord.down());
        self.refresh(coord);
        self.refresh(coord.up());
        true
    }

    /// Set every in-bounds cell in the inclusive box `min..=max` to `kind`.
    /// Returns the number of cells written.
    pub fn fill_box(&mut self, min: VoxelCoord, max: VoxelCoord, kind: CellKind) -> usize {
        let mut written = 0;
        for y in min.y..=max.y {
            for z in min.z..=max.z {
                for x in min.x..=max.x {
                    if let Some(i) = self.index(VoxelCoord::new(x, y, z)) {
                        self.cells[i].kind = kind;
                        written += 1;
                    }
                }
            }
        }
        // Derived flags of the box and the layers directly above and below.
        for y in (min.y - 1)..=(max.y + 1) {
            for z in min.z..=max.z {
                for x in min.x..=max.x {
                    self.refresh(VoxelCoord::new(x, y, z));
                }
            }
        }
        written
    }

    /// Bulk terrain registration: write every classification, then recompute
    /// all derived flags once. Out-of-bounds entries are skipped. Returns the
    /// number of cells written.
    pub fn load_terrain<I>(&mut self, cells: I) -> usize
    where
        I: IntoIterator<Item = (VoxelCoord, CellKind)>,
    {
        let mut written = 0;
        for (coord, kind) in cells {
            if let Some(i) = self.index(coord) {
                self.cells[i].kind = kind;
                written += 1;
            }
        }
        self.recompute_all();
        written
    }

    /// Recompute `walkable_surface` and the cost multiplier for every cell.
    ///
    /// Derived values only read classifications, so they are computed in
    /// parallel against the current classifications and written back
    /// afterwards.
    pub fn recompute_all(&mut self) {
        let layer = self.layer_len();
        let road = self.road_cost_multiplier;
        let cells = &self.cells;
        let derived: Vec<(bool, f32)> = (0..cells.len())
            .into_par_iter()
            .map(|i| {
                let below = i.checked_sub(layer).map(|j| cells[j].kind);
                derive(cells[i].kind, below, road)
            })
            .collect();
        for (cell, (walkable, cost)) in self.cells.iter_mut().zip(derived) {
            cell.walkable = walkable;
            cell.cost = cost;
        }
    }

    fn refresh(&mut self, coord: VoxelCoord) {
        let Some(i) = self.index(coord) else {
            return;
        };
        let below = self.kind(coord.down());
        let (walkable, cost) = derive(self.cells[i].kind, below, self.road_cost_multiplier);
        self.cells[i].walkable = walkable;
        self.cells[i].cost = cost;
    }

    /// Cells reachable from `coord` in one step: per cardinal direction the
    /// same-level cell if walkable; otherwise, when a wall is ahead, the cell
    /// on top of it (only with headroom above the mover); otherwise, when the
    /// cell ahead is open air, the walkable cell one level down. Never more
    /// than one level of vertical change.
    pub fn neighbors_4way_with_step(&self, coord: VoxelCoord) -> SmallVec<[Cell; 4]> {
        let mut out = SmallVec::new();
        let headroom = self.is_empty(coord.up());
        for (dx, dz) in CARDINALS {
            let ahead = coord.offset(dx, 0, dz);
            let Some(ahead_cell) = self.get_cell(ahead) else {
                continue;
            };
            if ahead_cell.walkable_surface {
                out.push(ahead_cell);
            } else if ahead_cell.kind.supports_stance() {
                let up = self
                    .get_cell(ahead.up())
                    .filter(|c| headroom && c.walkable_surface);
                out.extend(up);
            } else if let Some(down) = self.get_cell(ahead.down()).filter(|c| c.walkable_surface) {
                out.push(down);
            }
        }
        out
    }

    /// The walkable cell closest to `from` among `target` itself, the cell on
    /// top of it, and the cells beside it (same level, one up, one down).
    /// Used to stand next to a target that is itself solid, such as a tree or
    /// a construction site.
    pub fn nearest_stance(&self, target: VoxelCoord, from: VoxelCoord) -> Option<VoxelCoord> {
        if self.is_walkable(target) {
            return Some(target);
        }
        let mut candidates: SmallVec<[VoxelCoord; 16]> = SmallVec::new();
        candidates.push(target.up());
        for (dx, dz) in CARDINALS {
            for dy in [0, 1, -1] {
                candidates.push(target.offset(dx, dy, dz));
            }
        }
        candidates
            .into_iter()
            .filter(|&c| self.is_walkable(c))
            .min_by_key(|&c| (c.manhattan_distance(from), c))
    }

    /// Iterate every cell in flat-index order.
    pub fn iter_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells.iter().enumerate().map(|(i, data)| Cell {
            coord: self.coord_of(i),
            kind: data.kind,
            walkable_surface: data.walkable,
            cost_multiplier: data.cost,
        })
    }
}

/// Derived `(walkable_surface, cost_multiplier)` for a cell of `kind`
/// resting on `below` (`None` outside the grid).
fn derive(kind: CellKind, below: Option<CellKind>, road_cost_multiplier: f32) -> (bool, f32) {
    match below {
        Some(support) if kind.is_empty() && support.supports_stance() => {
            let cost = if support == CellKind::Road {
                road_cost_multiplier
            } else {
                1.0
            };
            (true, cost)
        }
        _ => (false, 1.0),
    }
}
