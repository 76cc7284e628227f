/*
 * Township Pandemic/Economy Simulator (TownSim)
 * Copyright (c)  2022. TownSim Developers
 *
 * This file is part of TownSim.
 *
 * TownSim is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, version 3 of the License.
 *
 * TownSim is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with TownSim.  If not, see <https://www.gnu.org/licenses/>.
 *
 */
#![allow(dead_code)]

extern crate log;

pub mod behavior;
pub mod config;
pub mod economy;
pub mod epidemic;
mod error;
pub mod geometry;
pub mod interventions;
pub mod models;
pub mod runtime;
pub mod scheduler;
pub mod simulator;
pub mod simulator_builder;
pub mod statistics;

pub use error::Error;

use serde::{Deserialize, Serialize};

/// Which of the coupled layers a simulation runs on top of the shared
/// scheduling substrate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    /// Movement and behavior charts only
    Simple,
    /// The value-flow layer on its own
    Economic,
    /// The infection layer on its own
    Pandemic,
    /// Both layers interleaved in a single controller pass
    Dual,
}

impl Default for SimulationMode {
    fn default() -> Self {
        SimulationMode::Dual
    }
}

impl SimulationMode {
    /// Returns True if agents and locations carry the pandemic role
    pub fn has_pandemic(self) -> bool {
        matches!(self, SimulationMode::Pandemic | SimulationMode::Dual)
    }
    /// Returns True if agents and locations carry the economic role
    pub fn has_economy(self) -> bool {
        matches!(self, SimulationMode::Economic | SimulationMode::Dual)
    }
}

/// The simulation clock. `frames_per_hour` ticks roll an hour, 24 hours a
/// day, 365 days a year.
#[derive(Copy, Clone, Debug, Default, Deserialize, Serialize)]
pub struct Clock {
    pub year: u32,
    pub day: u32,
    pub hour: u32,
    pub frame: u32,
}

/// Which counters rolled over during a single `Clock::advance`
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ClockEvents {
    pub hour_rolled: bool,
    pub day_rolled: bool,
    pub year_rolled: bool,
}

impl Clock {
    /// Advances the clock by one frame, cascading the rollovers
    pub fn advance(&mut self, frames_per_hour: u32) -> ClockEvents {
        let mut events = ClockEvents::default();
        self.frame += 1;
        if self.frame >= frames_per_hour {
            self.frame = 0;
            self.hour += 1;
            events.hour_rolled = true;
            if self.hour == 24 {
                self.hour = 0;
                self.day += 1;
                events.day_rolled = true;
                if self.day == 365 {
                    self.day = 0;
                    self.year += 1;
                    events.year_rolled = true;
                }
            }
        }
        events
    }

    /// Total number of completed simulated hours
    pub fn total_hours(&self) -> u64 {
        (u64::from(self.year) * 365 + u64::from(self.day)) * 24 + u64::from(self.hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_rolls_frames_into_hours() {
        let mut clock = Clock::default();
        for _ in 0..19 {
            assert_eq!(clock.advance(20), ClockEvents::default());
        }
        let events = clock.advance(20);
        assert!(events.hour_rolled);
        assert!(!events.day_rolled);
        assert_eq!(clock.hour, 1);
        assert_eq!(clock.frame, 0);
    }

    #[test]
    fn clock_rolls_hours_into_days_and_years() {
        let mut clock = Clock {
            year: 0,
            day: 364,
            hour: 23,
            frame: 0,
        };
        let events = clock.advance(1);
        assert!(events.hour_rolled && events.day_rolled && events.year_rolled);
        assert_eq!(clock.year, 1);
        assert_eq!(clock.day, 0);
        assert_eq!(clock.hour, 0);
    }

    #[test]
    fn total_hours_accumulates() {
        let clock = Clock {
            year: 1,
            day: 2,
            hour: 3,
            frame: 0,
        };
        assert_eq!(clock.total_hours(), (365 + 2) * 24 + 3);
    }
}
