// Data-driven simulation configuration.
//
// All tunable parameters live here in `SimConfig`, loaded from JSON at
// startup. Simulation code never uses magic numbers; it reads from the
// config. Parameters are grouped by the component that consumes them:
// `GridParams`, `PathfindingParams`, `StuckParams`, `RecoveryParams`,
// `AgentParams`, `NeedsParams`, and `TimeParams`.
//
// Every group implements `Default`, and every group is `#[serde(default)]`,
// so a JSON file only needs to list the values it overrides.
//
// See also: `sim.rs` which owns the `SimConfig` as part of `World`,
// `pathfinding.rs`, `stuck.rs`, `recovery.rs` and `agent.rs` for the
// consumers of each group.

use crate::types::{VoxelCoord, WorldPos};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors produced while loading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Bounds and cell costs of the navigation grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GridParams {
    /// Minimum corner of the grid.
    pub origin: VoxelCoord,
    /// Grid extent in cells along (x, y, z).
    pub size: (u32, u32, u32),
    /// Movement-cost multiplier for a stance supported by a `Road` cell.
    pub road_cost_multiplier: f32,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            origin: VoxelCoord::new(-64, -16, -64),
            size: (128, 64, 128),
            road_cost_multiplier: 0.5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfindingParams {
    /// Hard ceiling on node expansions per `find_path` call.
    pub max_iterations: u32,
    /// Cost per block of vertical travel over a ladder connection.
    pub ladder_cost_multiplier: f32,
}

impl Default for PathfindingParams {
    fn default() -> Self {
        Self {
            max_iterations: 4000,
            ladder_cost_multiplier: 1.5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StuckParams {
    /// Seconds between displacement samples.
    pub sample_interval_secs: f32,
    /// Displacement (blocks) a sample must reach to count as progress.
    pub min_progress: f32,
    /// Consecutive failed samples before the agent is declared stuck.
    pub max_strikes: u32,
}

impl Default for StuckParams {
    fn default() -> Self {
        Self {
            sample_interval_secs: 2.0,
            min_progress: 0.25,
            max_strikes: 3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryParams {
    /// Tallest wall an emergency ladder may climb, in blocks.
    pub max_climb_height: f32,
    /// Reach of the forward wall cast.
    pub forward_cast_distance: f32,
    /// Deepest drop an emergency ladder may descend.
    pub max_descend_depth: f32,
    /// Fallback relocation height when no banner is set.
    pub teleport_up_blocks: i32,
    /// Seconds per placed rung.
    pub build_unit_delay_secs: f32,
    /// Lifetime of emergency structures in seconds; negative = permanent.
    pub emergency_lifetime_secs: f32,
    /// Designated safe point (banner / home marker) for the last-resort
    /// relocation.
    pub safe_point: Option<WorldPos>,
}

impl Default for RecoveryParams {
    fn default() -> Self {
        Self {
            max_climb_height: 8.0,
            forward_cast_distance: 2.5,
            max_descend_depth: 16.0,
            teleport_up_blocks: 3,
            build_unit_delay_secs: 0.5,
            emergency_lifetime_secs: 300.0,
            safe_point: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentParams {
    /// Walking speed on cost-1.0 ground, blocks per second.
    pub walk_speed: f32,
    /// Speed along ladder connections, blocks per second.
    pub climb_speed: f32,
    /// Seconds between re-plans while a move has no path.
    pub repath_interval_secs: f32,
    /// Seconds between work ticks at a job site.
    pub work_interval_secs: f32,
    /// Work ticks a `SimpleWorkHandler` job needs before it is done.
    pub work_ticks_per_job: u32,
    /// Blocked work ticks (insufficient stock) tolerated before the job is
    /// cancelled.
    pub max_work_retries: u32,
    /// Seconds an agent may travel without any path before its job is
    /// cancelled.
    pub job_give_up_secs: f32,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            walk_speed: 2.0,
            climb_speed: 1.0,
            repath_interval_secs: 1.0,
            work_interval_secs: 1.0,
            work_ticks_per_job: 3,
            max_work_retries: 5,
            job_give_up_secs: 60.0,
        }
    }
}

/// Hunger and energy run from 0 (empty) to `max`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NeedsParams {
    pub max: f32,
    pub hunger_decay_per_sec: f32,
    pub energy_decay_per_sec: f32,
    /// At or below this, hunger preempts everything.
    pub critical_hunger: f32,
    /// At or below this, the agent is forced to sleep.
    pub critical_energy: f32,
    /// Energy needed (during daytime) to wake up.
    pub energy_rested: f32,
    pub sleep_restore_per_sec: f32,
    /// Hunger restored per unit of food eaten.
    pub food_restore: f32,
    /// Seconds between bites while in Survival.
    pub eat_interval_secs: f32,
}

impl Default for NeedsParams {
    fn default() -> Self {
        Self {
            max: 100.0,
            hunger_decay_per_sec: 0.05,
            energy_decay_per_sec: 0.03,
            critical_hunger: 15.0,
            critical_energy: 10.0,
            energy_rested: 90.0,
            sleep_restore_per_sec: 1.0,
            food_restore: 40.0,
            eat_interval_secs: 2.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeParams {
    /// Clock minutes that pass per simulated second.
    pub minutes_per_second: f32,
    /// Hour of day when the simulation starts.
    pub start_hour: u32,
    /// First hour of night (inclusive).
    pub night_start_hour: u32,
    /// First hour of day (inclusive).
    pub night_end_hour: u32,
}

impl Default for TimeParams {
    fn default() -> Self {
        Self {
            minutes_per_second: 1.0,
            start_hour: 8,
            night_start_hour: 21,
            night_end_hour: 6,
        }
    }
}

/// The complete simulation configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub grid: GridParams,
    pub pathfinding: PathfindingParams,
    pub stuck: StuckParams,
    pub recovery: RecoveryParams,
    pub agent: AgentParams,
    pub needs: NeedsParams,
    pub time: TimeParams,
}

impl SimConfig {
    /// Parse and validate a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reject values that would stall or divide by zero in the tick loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, f32); 8] = [
            ("agent.walk_speed", self.agent.walk_speed),
            ("agent.climb_speed", self.agent.climb_speed),
            ("agent.work_interval_secs", self.agent.work_interval_secs),
            (
                "stuck.sample_interval_secs",
                self.stuck.sample_interval_secs,
            ),
            (
                "recovery.build_unit_delay_secs",
                self.recovery.build_unit_delay_secs,
            ),
            ("recovery.max_climb_height", self.recovery.max_climb_height),
            ("needs.max", self.needs.max),
            ("needs.eat_interval_secs", self.needs.eat_interval_secs),
        ];
        for (field, value) in positive {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be positive, got {value}"),
                });
            }
        }
        if self.stuck.max_strikes == 0 {
            return Err(ConfigError::Invalid {
                field: "stuck.max_strikes",
                reason: "must be at least 1".into(),
            });
        }
        if self.pathfinding.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "pathfinding.max_iterations",
                reason: "must be at least 1".into(),
            });
        }
        let (sx, sy, sz) = self.grid.size;
        if sx == 0 || sy == 0 || sz == 0 {
            return Err(ConfigError::Invalid {
                field: "grid.size",
                reason: format!("every axis must be non-zero, got {sx}x{sy}x{sz}"),
            });
        }
        if self.time.night_start_hour >= 24 || self.time.night_end_hour >= 24 {
            return Err(ConfigError::Invalid {
                field: "time",
                reason: "night hours must be in 0..24".into(),
            });
        }
        Ok(())
    }
}
