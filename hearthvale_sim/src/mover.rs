// Path following for a single agent.
//
// `AgentMover` is a resumable task: it holds the current target, the
// remaining waypoints and a re-plan timer, and each `tick` advances the
// agent's position by the time budget it is given. Waypoints are consumed
// in order; a segment that crosses more than one block vertically is a
// ladder connection and is traversed at `climb_speed`, everything else at
// `walk_speed` divided by the destination cell's cost multiplier.
//
// Before stepping onto a waypoint the mover checks that its cell is still
// walkable. If the grid changed underneath the path, the path is dropped and
// re-planned on the same tick. When there is no path at all the mover holds
// position and retries every `repath_interval_secs`; it never moves the
// agent through geometry. A mover stuck this way shows zero displacement,
// which is exactly what `StuckMonitor` watches for.
//
// See also: `pathfinding.rs` for the planner, `stuck.rs` for the progress
// watchdog, `agent.rs` which issues `move_to` / `stop` / `resume`.

use crate::config::AgentParams;
use crate::grid::VoxelGrid;
use crate::nav::ConnectionRegistry;
use crate::pathfinding::Pathfinder;
use crate::types::{VoxelCoord, WorldPos};
use std::collections::VecDeque;

/// Distance below which a waypoint counts as reached.
const ARRIVE_EPSILON: f32 = 1e-4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveStatus {
    /// No target.
    Idle,
    /// Following a path.
    Moving,
    /// Standing on the target cell.
    Arrived,
    /// Holding position; no route to the target right now.
    NoPath,
}

/// Borrowed navigation state a mover needs to plan.
#[derive(Clone, Copy)]
pub struct NavContext<'a> {
    pub grid: &'a VoxelGrid,
    pub connections: &'a ConnectionRegistry,
    pub pathfinder: &'a Pathfinder,
}

#[derive(Clone, Debug)]
pub struct AgentMover {
    target: Option<WorldPos>,
    path: VecDeque<WorldPos>,
    /// Cell the current segment started from.
    segment_start: VoxelCoord,
    status: MoveStatus,
    needs_repath: bool,
    repath_timer: f32,
    no_path_secs: f32,
}

impl Default for AgentMover {
    fn default() -> Self {
        Self {
            target: None,
            path: VecDeque::new(),
            segment_start: VoxelCoord::new(0, 0, 0),
            status: MoveStatus::Idle,
            needs_repath: false,
            repath_timer: 0.0,
            no_path_secs: 0.0,
        }
    }
}

impl AgentMover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start travelling toward `target`. The path is planned on the next
    /// tick.
    pub fn move_to(&mut self, target: WorldPos) {
        self.target = Some(target);
        self.path.clear();
        self.status = MoveStatus::Moving;
        self.needs_repath = true;
        self.repath_timer = 0.0;
        self.no_path_secs = 0.0;
    }

    /// Drop the target and path. Always safe to call.
    pub fn stop(&mut self) {
        self.target = None;
        self.path.clear();
        self.status = MoveStatus::Idle;
        self.needs_repath = false;
        self.no_path_secs = 0.0;
    }

    /// Re-plan toward the current target immediately (after the grid gained
    /// a connection, or the agent was relocated).
    pub fn resume(&mut self) {
        if self.target.is_some() && self.status != MoveStatus::Arrived {
            self.path.clear();
            self.status = MoveStatus::Moving;
            self.needs_repath = true;
            self.repath_timer = 0.0;
        }
    }

    pub fn status(&self) -> MoveStatus {
        self.status
    }

    pub fn target(&self) -> Option<WorldPos> {
        self.target
    }

    /// A target is set and not yet reached.
    pub fn is_moving(&self) -> bool {
        matches!(self.status, MoveStatus::Moving | MoveStatus::NoPath)
    }

    pub fn has_arrived(&self) -> bool {
        self.status == MoveStatus::Arrived
    }

    /// Seconds spent without any path since the last successful plan.
    pub fn no_path_secs(&self) -> f32 {
        self.no_path_secs
    }

    /// Remaining waypoints.
    pub fn path(&self) -> impl Iterator<Item = &WorldPos> {
        self.path.iter()
    }

    /// Advance `position` along the path for `dt` seconds.
    pub fn tick(
        &mut self,
        position: &mut WorldPos,
        dt: f32,
        nav: NavContext<'_>,
        params: &AgentParams,
    ) -> MoveStatus {
        let Some(target) = self.target else {
            self.status = MoveStatus::Idle;
            return self.status;
        };
        if self.status == MoveStatus::Arrived {
            return self.status;
        }

        if self.needs_repath {
            if self.repath_timer > 0.0 {
                self.repath_timer -= dt;
                self.no_path_secs += dt;
                return self.status;
            }
            match nav
                .pathfinder
                .find_path(nav.grid, nav.connections, *position, target)
            {
                Some(path) => {
                    self.path = path.into();
                    self.segment_start = VoxelCoord::from_world(*position);
                    self.needs_repath = false;
                    self.no_path_secs = 0.0;
                    self.status = MoveStatus::Moving;
                }
                None => {
                    self.status = MoveStatus::NoPath;
                    self.repath_timer = params.repath_interval_secs;
                    self.no_path_secs += dt;
                    return self.status;
                }
            }
        }

        let mut time_left = dt;
        while time_left > 0.0 {
            let Some(&next) = self.path.front() else {
                break;
            };
            let next_cell = VoxelCoord::from_world(next);
            if !nav.grid.is_walkable(next_cell) {
                tracing::debug!(%next_cell, "waypoint no longer walkable, re-planning");
                self.path.clear();
                self.needs_repath = true;
                self.repath_timer = 0.0;
                return self.status;
            }

            let speed = if (next_cell.y - self.segment_start.y).abs() > 1 {
                params.climb_speed
            } else {
                let cost = nav
                    .grid
                    .get_cell(next_cell)
                    .map_or(1.0, |c| c.cost_multiplier);
                params.walk_speed / cost
            };

            let to_next = next - *position;
            let distance = to_next.length();
            let reach = speed * time_left;
            if reach + ARRIVE_EPSILON >= distance {
                *position = next;
                time_left -= distance / speed;
                self.path.pop_front();
                self.segment_start = next_cell;
            } else {
                *position = *position + to_next.normalized() * reach;
                time_left = 0.0;
            }
        }

        if self.path.is_empty() && !self.needs_repath {
            self.status = MoveStatus::Arrived;
        }
        self.status
    }
}
