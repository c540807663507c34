// Progress watchdog for moving agents.
//
// `StuckMonitor` samples an agent's position every `sample_interval_secs`
// while its mover has an unfinished move. A sample whose displacement since
// the previous one is below `min_progress` is a strike; `max_strikes`
// consecutive strikes declare the agent stuck. A good sample resets the
// count to zero.
//
// Phases: `Idle -> Monitoring { strikes } -> Stuck -> Recovering -> Idle`.
// `observe` returns `true` only on the transition into `Stuck`. While Stuck
// or Recovering the monitor ignores samples, so a single stall produces a
// single recovery.
//
// See also: `recovery.rs` for the planner the stuck signal triggers,
// `sim.rs` which drives `observe` and the phase hand-offs.

use crate::config::StuckParams;
use crate::types::WorldPos;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StuckPhase {
    /// Not moving; nothing to watch.
    Idle,
    /// Moving and being sampled.
    Monitoring { strikes: u32 },
    /// Declared stuck; waiting for a recovery plan.
    Stuck,
    /// A recovery structure is being built or the agent is being relocated.
    Recovering,
}

#[derive(Clone, Debug)]
pub struct StuckMonitor {
    phase: StuckPhase,
    last_sample: WorldPos,
    timer: f32,
}

impl Default for StuckMonitor {
    fn default() -> Self {
        Self {
            phase: StuckPhase::Idle,
            last_sample: WorldPos::ZERO,
            timer: 0.0,
        }
    }
}

impl StuckMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> StuckPhase {
        self.phase
    }

    /// Held from the stuck declaration until recovery finishes.
    pub fn is_recovering(&self) -> bool {
        matches!(self.phase, StuckPhase::Stuck | StuckPhase::Recovering)
    }

    /// Feed one tick of movement. Returns `true` exactly when the agent
    /// becomes stuck.
    pub fn observe(
        &mut self,
        position: WorldPos,
        is_moving: bool,
        dt: f32,
        params: &StuckParams,
    ) -> bool {
        match self.phase {
            StuckPhase::Stuck | StuckPhase::Recovering => false,
            StuckPhase::Idle => {
                if is_moving {
                    self.phase = StuckPhase::Monitoring { strikes: 0 };
                    self.last_sample = position;
                    self.timer = 0.0;
                }
                false
            }
            StuckPhase::Monitoring { strikes } => {
                if !is_moving {
                    self.phase = StuckPhase::Idle;
                    return false;
                }
                self.timer += dt;
                if self.timer < params.sample_interval_secs {
                    return false;
                }
                self.timer -= params.sample_interval_secs;

                let displacement = position.distance(self.last_sample);
                self.last_sample = position;
                if displacement >= params.min_progress {
                    self.phase = StuckPhase::Monitoring { strikes: 0 };
                    return false;
                }

                let strikes = strikes + 1;
                tracing::trace!(strikes, displacement, "stuck strike");
                if strikes >= params.max_strikes {
                    self.phase = StuckPhase::Stuck;
                    true
                } else {
                    self.phase = StuckPhase::Monitoring { strikes };
                    false
                }
            }
        }
    }

    /// `Stuck -> Recovering`. No effect in any other phase.
    pub fn begin_recovery(&mut self) {
        if self.phase == StuckPhase::Stuck {
            self.phase = StuckPhase::Recovering;
        }
    }

    /// Back to `Idle` from any phase; sampling restarts on the next move.
    pub fn finish_recovery(&mut self) {
        self.phase = StuckPhase::Idle;
        self.timer = 0.0;
    }
}
