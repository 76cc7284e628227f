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

use serde::{Deserialize, Serialize};

/// Side length of the square canvas the four regions tile
pub const CANVAS_SIZE: f64 = 900.0;

/// Margin kept between a sampled coordinate and its region border
pub const REGION_INSET: f64 = 10.0;

/// Distance below which an agent stops travelling and creeps randomly
pub const MAX_CREEP: f64 = 7.0;

/// Default movement speed, in pixels per frame
pub const BASE_SPEED: f64 = 5.0;

/// Number of frames a newly assigned destination should take to reach
pub const TRAVEL_FRAMES: f64 = 30.0;

/// Age at which an agent swaps from the child to the adult behavior pool
pub const ADULT_AGE: u32 = 18;

/// Agents reaching this age are removed from the simulation
pub const MAX_AGE: u32 = 100;

/// Chance denominator of one birth attempt per tick (1 in N)
pub const BIRTH_ODDS: u32 = 100;

/// Percent chance that an hourly destination resample targets a random
/// location of the class instead of the agent's assignment
pub const RANDOM_DESTINATION_CHANCE: u32 = 5;

/// Euclidean radius within which exposed/infected agents add pressure
pub const INFECTION_RADIUS: f64 = 16.0;

/// Days an agent stays exposed before turning infected (pre jitter)
pub const EXPOSED_DAYS: i32 = 1;
/// Days an agent stays infected before recovering (pre jitter)
pub const INFECTED_DAYS: i32 = 4;
/// Days an agent stays recovered before turning susceptible (pre jitter)
pub const RECOVERED_DAYS: i32 = 9;

/// Infection draw threshold, and its raised variant applied to compliant
/// agents while a compliance level is being checked
pub const INFECTION_THRESHOLD: u32 = 1000;
pub const INFECTION_THRESHOLD_COMPLIANT: u32 = 1500;

/// Chance denominator per hour for the infection to spontaneously reappear
pub const SPONTANEOUS_INFECTION_ODDS: u32 = 600;

/// Infected proportion above which a strong lockdown closes a location
pub const STRONG_LOCKDOWN_THRESHOLD: f64 = 0.20;
/// Moderate lockdown threshold in pandemic-only mode
pub const MODERATE_LOCKDOWN_THRESHOLD_PANDEMIC: f64 = 0.35;
/// Moderate lockdown threshold in coupled mode
pub const MODERATE_LOCKDOWN_THRESHOLD_COUPLED: f64 = 0.40;
/// Weak lockdown threshold in pandemic-only mode
pub const WEAK_LOCKDOWN_THRESHOLD_PANDEMIC: f64 = 0.75;
/// Weak lockdown threshold in coupled mode
pub const WEAK_LOCKDOWN_THRESHOLD_COUPLED: f64 = 0.60;

/// Hourly overhead every business pays during the working day
pub const WORK_OVERHEAD: f64 = 15.0;
/// First and one-past-last hour of the working day
pub const WORKDAY_START: u32 = 8;
pub const WORKDAY_END: u32 = 20;
/// Proportion of an employee's wage the business loses
pub const WORK_LOSS_PROPORTION: f64 = 0.50;
/// Proportion of home expenses fed into the redistribution bucket
pub const HOME_LOSS_PROPORTION: f64 = 0.85;

/// Chance denominator per hour of founding a new business when below target
pub const NEW_BUSINESS_ODDS: u32 = 5;
/// Minimum hours between two business births
pub const NEW_BUSINESS_COOLDOWN: u32 = 24;

/// How often to emit throughput statistics to the log
pub const DEBUG_ITERATION_PRINT: u64 = 100;

/// Runtime knobs shared by every simulation mode. Loaded from the command
/// line by the `run` crate.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Size of the initial cohort. The population is capped at twice this
    pub initial_num_agents: usize,
    /// Locations generated per region at startup, and the business target
    /// the economic kernel replenishes towards
    pub num_locations_per_region: usize,
    /// Total economic value seeded into the simulation
    pub initial_value: f64,
    /// Days before the initial infection fires
    pub lag_period: u32,
    /// Number of agents exposed by the initial infection
    pub initial_infected: usize,
    /// Infected count above which the morbidity penalty applies
    pub hospital_capacity: u32,
    /// Divisor applied to survival odds while hospitals are over capacity
    pub overflow_penalty: f64,
    /// Frames per simulated hour
    pub frames_per_hour: u32,
    /// Directory holding the behavior chart descriptors
    pub behavior_dir: String,
    /// Optional path for the per-hour statistics CSV
    pub statistics_path: Option<String>,
    /// Disables the render side entirely
    pub headless: bool,
    /// Fixed RNG seed; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            initial_num_agents: 200,
            num_locations_per_region: 10,
            initial_value: 100_000.0,
            lag_period: 3,
            initial_infected: 5,
            hospital_capacity: 40,
            overflow_penalty: 2.0,
            frames_per_hour: 20,
            behavior_dir: "config/behaviors".to_string(),
            statistics_path: None,
            headless: false,
            seed: None,
        }
    }
}
