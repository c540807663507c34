// Simulated time of day.
//
// The core only needs "what hour is it" (for the night-time Sleep
// transition) and "a minute went by" (published to observers). The
// `TimeProvider` trait is that seam; `SimClock` is the default provider,
// advanced by `World::step` at `minutes_per_second`.
//
// See also: `agent.rs` for the night check, `event.rs` for `MinuteChanged`.

use crate::config::TimeParams;

pub trait TimeProvider {
    /// Hour of day, `0..24`.
    fn current_hour(&self) -> u32;

    /// Whether the current hour falls in `[night_start_hour, night_end_hour)`
    /// (wrapping past midnight).
    fn is_night(&self, params: &TimeParams) -> bool {
        let hour = self.current_hour();
        let (start, end) = (params.night_start_hour, params.night_end_hour);
        if start == end {
            false
        } else if start > end {
            hour >= start || hour < end
        } else {
            hour >= start && hour < end
        }
    }
}

#[derive(Clone, Debug)]
pub struct SimClock {
    /// Minutes since midnight of day 0.
    minutes: f64,
    minutes_per_second: f64,
}

impl SimClock {
    pub fn new(params: &TimeParams) -> Self {
        Self {
            minutes: f64::from(params.start_hour % 24) * 60.0,
            minutes_per_second: f64::from(params.minutes_per_second),
        }
    }

    /// Advance by `dt` simulated seconds. Returns how many whole minutes
    /// ticked over.
    pub fn advance(&mut self, dt: f32) -> u32 {
        let before = self.minutes.floor();
        self.minutes += f64::from(dt) * self.minutes_per_second;
        (self.minutes.floor() - before) as u32
    }

    /// Whole minutes since midnight of day 0.
    pub fn total_minutes(&self) -> u64 {
        self.minutes.floor() as u64
    }

    pub fn minute_of_hour(&self) -> u32 {
        (self.total_minutes() % 60) as u32
    }

    pub fn day(&self) -> u64 {
        self.total_minutes() / (24 * 60)
    }

    /// Jump to `hour` on the current day.
    pub fn set_hour(&mut self, hour: u32) {
        self.minutes = (self.day() * 24 * 60) as f64 + f64::from(hour % 24) * 60.0;
    }
}

impl TimeProvider for SimClock {
    fn current_hour(&self) -> u32 {
        ((self.total_minutes() / 60) % 24) as u32
    }
}
