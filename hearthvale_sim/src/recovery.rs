// Recovery planning for stuck agents.
//
// When `StuckMonitor` declares an agent stuck, `RecoveryPlanner::plan`
// queries the world through a `CollisionQuery` and picks one of:
//
// 1. Climb: a forward cast along the dominant horizontal axis toward the
//    target finds a wall; a downward cast from above the wall column finds
//    its top. If the ledge above the top is `(0.5, max_climb_height]` blocks
//    above the agent and both ladder ends are walkable stances, build a
//    ladder from the cell in front of the wall up to the ledge.
// 2. Descend: otherwise, a downward cast just ahead of the agent finds a
//    drop of more than one block; build a ladder spanning it.
// 3. Teleport: otherwise relocate the agent to the designated safe point
//    (the configured banner, or `teleport_up_blocks` straight up), resolved
//    onto a walkable cell. If neither candidate resolves the agent stays
//    where it is.
//
// A climb or descend whose span is already joined in the
// `ConnectionRegistry` is skipped, so an existing ladder is never rebuilt.
//
// Every cast has a fixed maximum distance, and the teleport resolution is
// bounded by the grid height, so planning always terminates. A cast that
// returns nothing only rules out its branch.
//
// See also: `collision.rs` for the raycast oracle, `structure.rs` for
// building the chosen plan, `sim.rs` which calls the planner on the stuck
// signal.

use crate::collision::{CollisionMask, CollisionQuery};
use crate::config::RecoveryParams;
use crate::grid::VoxelGrid;
use crate::nav::ConnectionRegistry;
use crate::types::{VoxelCoord, WorldPos};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum RecoveryOutcome {
    /// Ladder from `bottom` (agent level, in front of the wall) up to the
    /// ledge `top`.
    Climb { bottom: VoxelCoord, top: VoxelCoord },
    /// Ladder from the agent's stance `top` down to the landing `bottom`.
    Descend { top: VoxelCoord, bottom: VoxelCoord },
    /// Relocate to a resolved walkable cell.
    Teleport { to: WorldPos },
    /// Nothing resolved; leave the agent where it is.
    Stranded,
}

impl RecoveryOutcome {
    /// `(lower, upper)` stances of a structural plan.
    pub fn ladder_span(&self) -> Option<(VoxelCoord, VoxelCoord)> {
        match *self {
            Self::Climb { bottom, top } | Self::Descend { top, bottom } => Some((bottom, top)),
            Self::Teleport { .. } | Self::Stranded => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RecoveryPlanner {
    params: RecoveryParams,
}

impl RecoveryPlanner {
    pub fn new(params: RecoveryParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RecoveryParams {
        &self.params
    }

    /// Choose how to unstick an agent at `agent_pos` heading for `target`.
    /// A ladder that `connections` already holds is never planned again.
    pub fn plan(
        &self,
        agent_pos: WorldPos,
        target: WorldPos,
        collider: &dyn CollisionQuery,
        grid: &VoxelGrid,
        connections: &ConnectionRegistry,
    ) -> RecoveryOutcome {
        let agent = VoxelCoord::from_world(agent_pos);
        if let Some((dx, dz)) = dominant_direction(agent_pos, target) {
            let candidates = [
                self.try_climb(agent, dx, dz, collider, grid),
                self.try_descend(agent, dx, dz, collider, grid),
            ];
            for plan in candidates.into_iter().flatten() {
                let Some((lower, upper)) = plan.ladder_span() else {
                    continue;
                };
                if connections.connects(lower, upper) {
                    tracing::debug!(%lower, %upper, "ladder already exists; skipping plan");
                    continue;
                }
                tracing::debug!(?plan, "ladder plan");
                return plan;
            }
        }
        self.fallback(agent_pos, grid)
    }

    fn try_climb(
        &self,
        agent: VoxelCoord,
        dx: i32,
        dz: i32,
        collider: &dyn CollisionQuery,
        grid: &VoxelGrid,
    ) -> Option<RecoveryOutcome> {
        let forward = WorldPos::new(dx as f32, 0.0, dz as f32);
        let wall = collider
            .cast(
                agent.center(),
                forward,
                self.params.forward_cast_distance,
                CollisionMask::ALL,
            )?
            .cell;

        // Cast down from just above the tallest climbable height.
        let cast_top = WorldPos::new(
            wall.x as f32,
            agent.y as f32 + self.params.max_climb_height + 1.0,
            wall.z as f32,
        );
        let top_hit = collider.cast(
            cast_top,
            WorldPos::DOWN,
            self.params.max_climb_height + 2.0,
            CollisionMask::ALL,
        )?;
        let ledge = top_hit.cell.up();
        let height = (ledge.y - agent.y) as f32;
        if height <= 0.5 || height > self.params.max_climb_height {
            tracing::trace!(%wall, height, "wall height outside climbable range");
            return None;
        }

        // Both ends must be stances, or the connection leads nowhere.
        let bottom = VoxelCoord::new(wall.x - dx, agent.y, wall.z - dz);
        if !grid.is_walkable(ledge) || !grid.is_walkable(bottom) {
            tracing::trace!(%bottom, %ledge, "ladder ends are not both stances");
            return None;
        }
        Some(RecoveryOutcome::Climb { bottom, top: ledge })
    }

    fn try_descend(
        &self,
        agent: VoxelCoord,
        dx: i32,
        dz: i32,
        collider: &dyn CollisionQuery,
        grid: &VoxelGrid,
    ) -> Option<RecoveryOutcome> {
        let ahead = agent.offset(dx, 0, dz);
        if !grid.is_empty(ahead) {
            return None;
        }
        let hit = collider.cast(
            ahead.center(),
            WorldPos::DOWN,
            self.params.max_descend_depth,
            CollisionMask::ALL,
        )?;
        let landing = hit.cell.up();
        if agent.y - landing.y <= 1 {
            return None;
        }
        Some(RecoveryOutcome::Descend {
            top: agent,
            bottom: landing,
        })
    }

    /// Last resort: the banner, then straight up.
    fn fallback(&self, agent_pos: WorldPos, grid: &VoxelGrid) -> RecoveryOutcome {
        let up = agent_pos + WorldPos::UP * self.params.teleport_up_blocks as f32;
        let resolved = self
            .params
            .safe_point
            .into_iter()
            .chain(std::iter::once(up))
            .find_map(|c| resolve_safe_cell(grid, VoxelCoord::from_world(c)));
        match resolved {
            Some(cell) => RecoveryOutcome::Teleport { to: cell.center() },
            None => {
                tracing::warn!(%agent_pos, "no safe point resolved; agent stays put");
                RecoveryOutcome::Stranded
            }
        }
    }
}

/// Unit step along whichever horizontal axis dominates `to - from`.
fn dominant_direction(from: WorldPos, to: WorldPos) -> Option<(i32, i32)> {
    let d = to - from;
    if d.x.abs() < 0.5 && d.z.abs() < 0.5 {
        None
    } else if d.x.abs() >= d.z.abs() {
        Some((d.x.signum() as i32, 0))
    } else {
        Some((0, d.z.signum() as i32))
    }
}

/// Rise out of anything solid, then settle down onto the first walkable
/// cell. `None` if either walk leaves the grid.
pub fn resolve_safe_cell(grid: &VoxelGrid, start: VoxelCoord) -> Option<VoxelCoord> {
    let mut cell = start;
    while !grid.is_empty(cell) {
        if !grid.in_bounds(cell) {
            return None;
        }
        cell = cell.up();
    }
    while !grid.is_walkable(cell) {
        cell = cell.down();
        if !grid.is_empty(cell) {
            return None;
        }
    }
    Some(cell)
}
