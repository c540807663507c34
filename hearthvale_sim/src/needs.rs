// Agent needs: hunger and energy.
//
// Both run from 0 (starving / exhausted) to `NeedsParams::max` (fed /
// rested) and decay every tick. The state machine reads the thresholds to
// preempt whatever the agent is doing: critical hunger forces Survival,
// critical energy (or night) forces Sleep.
//
// See also: `agent.rs` for the global transitions, `config.rs` for the
// thresholds.

use crate::config::NeedsParams;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Needs {
    /// Satiety; decays toward 0.
    pub hunger: f32,
    pub energy: f32,
}

impl Needs {
    pub fn full(params: &NeedsParams) -> Self {
        Self {
            hunger: params.max,
            energy: params.max,
        }
    }

    pub fn decay(&mut self, dt: f32, params: &NeedsParams) {
        self.hunger = (self.hunger - params.hunger_decay_per_sec * dt).max(0.0);
        self.energy = (self.energy - params.energy_decay_per_sec * dt).max(0.0);
    }

    pub fn is_starving(&self, params: &NeedsParams) -> bool {
        self.hunger <= params.critical_hunger
    }

    pub fn is_exhausted(&self, params: &NeedsParams) -> bool {
        self.energy <= params.critical_energy
    }

    pub fn is_rested(&self, params: &NeedsParams) -> bool {
        self.energy >= params.energy_rested
    }

    pub fn eat(&mut self, amount: f32, params: &NeedsParams) {
        self.hunger = (self.hunger + amount).min(params.max);
    }

    pub fn rest(&mut self, dt: f32, params: &NeedsParams) {
        self.energy = (self.energy + params.sleep_restore_per_sec * dt).min(params.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_clamps_at_zero() {
        let params = NeedsParams::default();
        let mut needs = Needs::full(&params);
        needs.decay(1.0e6, &params);
        assert_eq!(needs.hunger, 0.0);
        assert_eq!(needs.energy, 0.0);
        assert!(needs.is_starving(&params));
        assert!(needs.is_exhausted(&params));
    }

    #[test]
    fn thresholds_are_inclusive() {
        let params = NeedsParams::default();
        let needs = Needs {
            hunger: params.critical_hunger,
            energy: params.energy_rested,
        };
        assert!(needs.is_starving(&params));
        assert!(needs.is_rested(&params));
    }

    #[test]
    fn eat_and_rest_cap_at_max() {
        let params = NeedsParams::default();
        let mut needs = Needs {
            hunger: 90.0,
            energy: 95.0,
        };
        needs.eat(params.food_restore, &params);
        needs.rest(100.0, &params);
        assert_eq!(needs.hunger, params.max);
        assert_eq!(needs.energy, params.max);
    }
}
