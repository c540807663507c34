// A* pathfinding over the voxel grid.
//
// Implements A* using a `BinaryHeap` (min-heap via reversed ordering).
// Per-search scratch (g scores, predecessors, closed set) lives in
// `FxHashMap`/`FxHashSet` keyed by `VoxelCoord` and is dropped when the call
// returns; nothing is written back to the grid.
//
// Neighbours are the grid's geometric step rules (`neighbors_4way_with_step`)
// plus any ladder connections registered in `ConnectionRegistry`. Edge cost
// is the Manhattan distance between cell centres times the destination
// cell's cost multiplier; connection edges carry their own precomputed cost.
// The heuristic is Manhattan distance scaled by the cheapest multiplier any
// edge can have, so it never overestimates.
//
// Every search is bounded by `max_iterations` node expansions. Hitting the
// ceiling is reported as `PathFailure::Exhausted` and logged at warn level;
// all other failures are ordinary "no path" results.
//
// See also: `grid.rs` for the step rules, `nav.rs` for connections,
// `mover.rs` which requests paths and follows them.
//
// **Critical constraint: determinism.** Ties on `f` are broken by lower `h`
// and then by coordinate order, so the same grid always yields the same path.

use crate::config::PathfindingParams;
use crate::grid::VoxelGrid;
use crate::nav::ConnectionRegistry;
use crate::types::{VoxelCoord, WorldPos};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Why a search produced no path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathFailure {
    StartOutOfBounds,
    GoalOutOfBounds,
    GoalNotWalkable,
    /// The expansion ceiling was reached before the goal.
    Exhausted,
    /// The open set drained without reaching the goal.
    Unreachable,
}

/// The result of a successful A* search.
#[derive(Clone, Debug, PartialEq)]
pub struct PathResult {
    /// Cells from start to goal, both inclusive.
    pub cells: Vec<VoxelCoord>,
    pub total_cost: f32,
    /// Nodes expanded by the search.
    pub expansions: u32,
}

impl PathResult {
    /// Cell-centre waypoints in traversal order, excluding the start cell.
    pub fn waypoints(&self) -> Vec<WorldPos> {
        self.cells.iter().skip(1).map(|c| c.center()).collect()
    }
}

/// Entry in the A* open set (min-heap via reversed ordering).
struct OpenEntry {
    coord: VoxelCoord,
    f_score: f32,
    h_score: f32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f (then h, then coord) is "greatest".
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.h_score.total_cmp(&self.h_score))
            .then_with(|| other.coord.cmp(&self.coord))
    }
}

/// Bounded A* search. Cheap to construct; holds only tuning values.
#[derive(Clone, Debug)]
pub struct Pathfinder {
    pub max_iterations: u32,
    pub ladder_cost_multiplier: f32,
}

impl Default for Pathfinder {
    fn default() -> Self {
        Self::from_params(&PathfindingParams::default())
    }
}

impl Pathfinder {
    pub fn from_params(params: &PathfindingParams) -> Self {
        Self {
            max_iterations: params.max_iterations,
            ladder_cost_multiplier: params.ladder_cost_multiplier,
        }
    }

    /// Waypoints from `start` to `goal` (both snapped to their cells), or
    /// `None` when there is no path. Waypoints are cell centres in traversal
    /// order and exclude the start cell.
    pub fn find_path(
        &self,
        grid: &VoxelGrid,
        connections: &ConnectionRegistry,
        start: WorldPos,
        goal: WorldPos,
    ) -> Option<Vec<WorldPos>> {
        let start_cell = VoxelCoord::from_world(start);
        let goal_cell = VoxelCoord::from_world(goal);
        match self.search(grid, connections, start_cell, goal_cell) {
            Ok(result) => Some(result.waypoints()),
            Err(PathFailure::Exhausted) => {
                tracing::warn!(
                    start = %start_cell,
                    goal = %goal_cell,
                    max_iterations = self.max_iterations,
                    "path search hit expansion ceiling"
                );
                None
            }
            Err(failure) => {
                tracing::debug!(start = %start_cell, goal = %goal_cell, ?failure, "no path");
                None
            }
        }
    }

    /// Run A* between two cells and report exactly why it failed.
    pub fn search(
        &self,
        grid: &VoxelGrid,
        connections: &ConnectionRegistry,
        start: VoxelCoord,
        goal: VoxelCoord,
    ) -> Result<PathResult, PathFailure> {
        if !grid.in_bounds(start) {
            return Err(PathFailure::StartOutOfBounds);
        }
        if !grid.in_bounds(goal) {
            return Err(PathFailure::GoalOutOfBounds);
        }
        if !grid.is_walkable(goal) {
            return Err(PathFailure::GoalNotWalkable);
        }
        if start == goal {
            return Ok(PathResult {
                cells: vec![start],
                total_cost: 0.0,
                expansions: 0,
            });
        }

        let h_scale = 1.0_f32
            .min(grid.road_cost_multiplier())
            .min(self.ladder_cost_multiplier);
        let heuristic = |c: VoxelCoord| c.manhattan_distance(goal) as f32 * h_scale;

        let mut g_score: FxHashMap<VoxelCoord, f32> = FxHashMap::default();
        let mut came_from: FxHashMap<VoxelCoord, VoxelCoord> = FxHashMap::default();
        let mut closed: FxHashSet<VoxelCoord> = FxHashSet::default();
        let mut open = BinaryHeap::new();

        g_score.insert(start, 0.0);
        let h_start = heuristic(start);
        open.push(OpenEntry {
            coord: start,
            f_score: h_start,
            h_score: h_start,
        });

        let mut expansions = 0u32;
        while let Some(current) = open.pop() {
            let coord = current.coord;
            if coord == goal {
                let total_cost = g_score[&goal];
                return Ok(PathResult {
                    cells: reconstruct_path(&came_from, start, goal),
                    total_cost,
                    expansions,
                });
            }
            if !closed.insert(coord) {
                continue;
            }
            if expansions >= self.max_iterations {
                return Err(PathFailure::Exhausted);
            }
            expansions += 1;

            let current_g = g_score[&coord];
            let geometric = grid
                .neighbors_4way_with_step(coord)
                .into_iter()
                .map(|cell| {
                    let cost = coord.manhattan_distance(cell.coord) as f32 * cell.cost_multiplier;
                    (cell.coord, cost)
                });
            let ladders = connections.neighbors(coord).into_iter();

            for (neighbor, edge_cost) in geometric.chain(ladders) {
                if closed.contains(&neighbor) {
                    continue;
                }
                let tentative_g = current_g + edge_cost;
                let known = g_score.get(&neighbor).copied().unwrap_or(f32::INFINITY);
                if tentative_g < known {
                    g_score.insert(neighbor, tentative_g);
                    came_from.insert(neighbor, coord);
                    let h = heuristic(neighbor);
                    open.push(OpenEntry {
                        coord: neighbor,
                        f_score: tentative_g + h,
                        h_score: h,
                    });
                }
            }
        }

        Err(PathFailure::Unreachable)
    }
}

/// Walk predecessors back from `goal` to `start`.
fn reconstruct_path(
    came_from: &FxHashMap<VoxelCoord, VoxelCoord>,
    start: VoxelCoord,
    goal: VoxelCoord,
) -> Vec<VoxelCoord> {
    let mut cells = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(&prev) => {
                cells.push(prev);
                current = prev;
            }
            None => break,
        }
    }
    cells.reverse();
    cells
}
