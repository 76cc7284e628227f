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

use std::sync::Arc;

use anyhow::Result;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::Rng;
use strum::IntoEnumIterator;

use crate::behavior::BehaviorCatalog;
use crate::config::{BIRTH_ODDS, DEBUG_ITERATION_PRINT, SimulationConfig, ADULT_AGE, MAX_AGE};
use crate::economy::{self, EconomyState, StatusContext};
use crate::epidemic::{self, EpidemicState};
use crate::error::Error;
use crate::interventions::{Intensity, InterventionToggles, PolicyFlags};
use crate::models::agent::AgentSet;
use crate::models::region::LocationSet;
use crate::models::LocationClass;
use crate::runtime::{GraphicsOp, RefreshHint, World};
use crate::scheduler::{self, GateContext};
use crate::simulator_builder;
use crate::statistics::{build_state_vector, CsvListener, Statistics, STATE_VECTOR_LEN};
use crate::{Clock, ClockEvents, SimulationMode};

/// The town simulation: the shared world, the clock, the behavior
/// catalog, and whichever of the two kernels the mode activates
pub struct Simulator {
    world: Arc<World>,
    config: SimulationConfig,
    mode: SimulationMode,
    catalog: BehaviorCatalog,
    clock: Clock,
    flags: PolicyFlags,
    toggles: InterventionToggles,
    epidemic: Option<EpidemicState>,
    economy: Option<EconomyState>,
    listener: Option<CsvListener>,
    rng: StdRng,
    first_frame: bool,
    pending_ops: Vec<GraphicsOp>,
}

impl Simulator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        world: Arc<World>,
        config: SimulationConfig,
        mode: SimulationMode,
        catalog: BehaviorCatalog,
        toggles: InterventionToggles,
        epidemic: Option<EpidemicState>,
        economy: Option<EconomyState>,
        listener: Option<CsvListener>,
        rng: StdRng,
    ) -> Simulator {
        Simulator {
            world,
            config,
            mode,
            catalog,
            clock: Clock::default(),
            flags: PolicyFlags::default(),
            toggles,
            epidemic,
            economy,
            listener,
            rng,
            first_frame: true,
            pending_ops: Vec::new(),
        }
    }

    pub fn world(&self) -> Arc<World> {
        Arc::clone(&self.world)
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn policy_flags(&self) -> PolicyFlags {
        self.flags
    }

    pub fn set_policy_flags(&mut self, flags: PolicyFlags) {
        self.flags = flags;
    }

    /// Applies a collaborator flag vector. A malformed vector is a hard
    /// fault
    pub fn apply_policy_vector(&mut self, vector: &[bool]) -> Result<(), Error> {
        self.flags.apply_vector(vector)
    }

    pub fn set_contact_tracing(&mut self, level: Option<Intensity>) {
        self.toggles.contact_tracing = level;
    }

    pub fn total_cases(&self) -> u32 {
        self.epidemic.as_ref().map(|state| state.total_cases).unwrap_or(0)
    }

    pub fn total_deaths(&self) -> u32 {
        self.epidemic.as_ref().map(|state| state.total_deaths).unwrap_or(0)
    }

    /// (susceptible, exposed, infected, recovered) as of the last pass
    pub fn seir(&self) -> (u32, u32, u32, u32) {
        match self.epidemic.as_ref() {
            Some(state) => (
                state.num_susceptible,
                state.num_exposed,
                state.num_infected,
                state.num_recovered,
            ),
            None => (0, 0, 0, 0),
        }
    }

    pub fn total_value(&self) -> f64 {
        self.economy.as_ref().map(|state| state.total_value()).unwrap_or(0.0)
    }

    pub fn current_population(&self) -> u32 {
        self.world
            .acquire_agents()
            .map(|agents| agents.len() as u32)
            .unwrap_or(0)
    }

    pub fn num_homeless(&self) -> u32 {
        self.world
            .acquire_agents()
            .map(|agents| count_status(&agents).0)
            .unwrap_or(0)
    }

    pub fn num_unemployed(&self) -> u32 {
        self.world
            .acquire_agents()
            .map(|agents| count_status(&agents).1)
            .unwrap_or(0)
    }

    /// The 12-slot observation the policy collaborator reads each hour
    pub fn state_vector(&self) -> [f64; STATE_VECTOR_LEN] {
        let (population, homeless, unemployed) = match self.world.acquire_agents() {
            Some(agents) => {
                let (homeless, unemployed) = count_status(&agents);
                (agents.len() as u32, homeless, unemployed)
            }
            None => (0, 0, 0),
        };
        build_state_vector(
            self.epidemic.as_ref(),
            self.economy.as_ref(),
            population,
            homeless,
            unemployed,
            self.config.hospital_capacity,
        )
    }

    /// A full per-hour snapshot for logging and the CSV listener
    pub fn statistics(&self) -> Statistics {
        let (population, homeless, unemployed) = match self.world.acquire_agents() {
            Some(agents) => {
                let (homeless, unemployed) = count_status(&agents);
                (agents.len() as u32, homeless, unemployed)
            }
            None => (0, 0, 0),
        };
        self.build_statistics(population, homeless, unemployed)
    }

    fn build_statistics(&self, population: u32, homeless: u32, unemployed: u32) -> Statistics {
        let mut statistics = Statistics {
            hour: self.clock.total_hours(),
            population,
            homeless,
            unemployed,
            total_value: self.total_value(),
            ..Statistics::default()
        };
        if let Some(state) = self.epidemic.as_ref() {
            statistics.susceptible = state.num_susceptible;
            statistics.exposed = state.num_exposed;
            statistics.infected = state.num_infected;
            statistics.recovered = state.num_recovered;
            statistics.daily_cases = state.new_daily_cases;
            statistics.daily_deaths = state.new_daily_deaths;
            statistics.total_cases = state.total_cases;
            statistics.total_deaths = state.total_deaths;
        }
        statistics
    }

    /// One frame of the simulation: advance the clock, run the hourly
    /// controller pass on rollover, then give every agent one spatial
    /// step. At most one birth attempt follows
    pub fn tick(&mut self) -> Result<()> {
        if self.first_frame {
            self.first_frame = false;
            self.controller_pass(ClockEvents::default())?;
        }
        let events = self.clock.advance(self.config.frames_per_hour);
        if events.hour_rolled {
            self.controller_pass(events)?;
        }
        self.movement_step();
        self.maybe_birth();
        self.flush_graphics();
        Ok(())
    }

    /// Runs one full simulated hour of frames
    pub fn take_step(&mut self) -> Result<()> {
        for _ in 0..self.config.frames_per_hour {
            self.tick()?;
        }
        Ok(())
    }

    fn movement_step(&mut self) {
        let world = Arc::clone(&self.world);
        let Some(mut agents) = world.acquire_agents() else {
            return;
        };
        for agent in agents.iter_mut() {
            agent.take_time_step(&mut self.rng);
        }
    }

    fn maybe_birth(&mut self) {
        if self.rng.gen_range(0..BIRTH_ODDS) != 0 {
            return;
        }
        let world = Arc::clone(&self.world);
        let Some(mut locations) = world.acquire_locations() else {
            return;
        };
        let Some(mut agents) = world.acquire_agents() else {
            return;
        };
        let Simulator {
            catalog,
            rng,
            mode,
            pending_ops,
            ..
        } = self;
        simulator_builder::generate_agents(
            &mut agents,
            &mut locations,
            catalog,
            *mode,
            1,
            true,
            rng,
            pending_ops,
        );
    }

    fn flush_graphics(&mut self) {
        if self.pending_ops.is_empty() {
            return;
        }
        let ops = std::mem::take(&mut self.pending_ops);
        self.world.push_graphics(ops);
    }

    /// The hourly bundle: rollover housekeeping, then the per-mode pass
    fn controller_pass(&mut self, events: ClockEvents) -> Result<()> {
        let world = Arc::clone(&self.world);
        let Some(mut locations) = world.acquire_locations() else {
            debug!("Controller pass abandoned: reset in progress");
            return Ok(());
        };
        let Some(mut agents) = world.acquire_agents() else {
            debug!("Controller pass abandoned: reset in progress");
            return Ok(());
        };

        if events.day_rolled {
            let Simulator { epidemic, economy, rng, .. } = &mut *self;
            if let Some(state) = epidemic.as_mut() {
                epidemic::advance_day(state, &mut agents, &mut locations, rng);
            }
            if economy.is_some() {
                // Every economic location rolls its daily fields over,
                // not just the businesses
                for class in LocationClass::iter() {
                    for location in locations.region_mut(class).locations_mut() {
                        location.start_new_day();
                    }
                }
                if let Some(shelter) = locations.shelter_mut() {
                    shelter.start_new_day();
                }
            }
        }
        if events.year_rolled {
            self.age_agents(&mut agents, &mut locations);
        }

        match self.mode {
            SimulationMode::Simple => self.simple_pass(&mut agents, &mut locations),
            SimulationMode::Economic => self.economic_pass(&mut agents, &mut locations),
            SimulationMode::Pandemic => self.pandemic_pass(&mut agents, &mut locations),
            SimulationMode::Dual => self.dual_pass(&mut agents, &mut locations),
        }
        self.pending_ops.push(GraphicsOp::Refresh(RefreshHint::Destinations));

        if self.mode != SimulationMode::Simple {
            let (homeless, unemployed) = count_status(&agents);
            let statistics = self.build_statistics(agents.len() as u32, homeless, unemployed);
            if statistics.hour % DEBUG_ITERATION_PRINT == 0 {
                info!("{}", statistics);
            }
            if let Some(listener) = self.listener.as_mut() {
                listener.record(&statistics)?;
            }
        }
        Ok(())
    }

    fn simple_pass(&mut self, agents: &mut AgentSet, locations: &mut LocationSet) {
        let Simulator { catalog, rng, clock, .. } = self;
        for index in 0..agents.len() {
            scheduler::update_single_destination(
                catalog, agents, locations, index, clock.hour, None, rng,
            );
        }
    }

    fn economic_pass(&mut self, agents: &mut AgentSet, locations: &mut LocationSet) {
        let Simulator {
            economy,
            catalog,
            rng,
            clock,
            flags,
            toggles,
            config,
            mode,
            pending_ops,
            ..
        } = self;
        let Some(state) = economy.as_mut() else {
            return;
        };
        let ctx = StatusContext {
            day: clock.day,
            hour: clock.hour,
            coupled: false,
            flags,
            contact_tracing: toggles.contact_tracing,
            num_homeless_infected: 0,
        };
        economy::business_overhead_pass(state, agents, locations, &ctx, rng, pending_ops);

        let mut redistributed = 0.0;
        for index in 0..agents.len() {
            scheduler::update_single_destination(
                catalog, agents, locations, index, clock.hour, None, rng,
            );
            let id = agents.id_at(index);
            redistributed +=
                economy::agent_update(state, agents, locations, id, &ctx, rng, pending_ops);
        }

        economy::finish_pass(
            state,
            agents,
            locations,
            redistributed,
            config.num_locations_per_region,
            *mode,
            rng,
            pending_ops,
        );
        state.finish_hour();
    }

    fn pandemic_pass(&mut self, agents: &mut AgentSet, locations: &mut LocationSet) {
        let Simulator {
            epidemic,
            catalog,
            rng,
            clock,
            flags,
            toggles,
            config,
            mode,
            pending_ops,
            ..
        } = self;
        let Some(state) = epidemic.as_mut() else {
            return;
        };
        epidemic::maybe_begin_infection(state, agents, clock.day, rng);
        epidemic::lockdown_locations(locations, flags, *mode);
        epidemic::count_stages(state, agents);

        let gates = GateContext {
            flags,
            toggles,
            num_homeless_infected: state.num_homeless_infected,
        };
        for index in (0..agents.len()).rev() {
            let id = agents.id_at(index);
            scheduler::update_single_destination(
                catalog,
                agents,
                locations,
                index,
                clock.hour,
                Some(&gates),
                rng,
            );
            let died = epidemic::agent_update(
                state,
                agents,
                locations,
                index,
                config.hospital_capacity,
                config.overflow_penalty,
                rng,
            );
            if died {
                pending_ops.push(GraphicsOp::RemoveAgent(id));
            }
        }

        let new_exposures =
            epidemic::spread_infection(state, agents, flags.compliance_checking(), rng);
        epidemic::spontaneous_reintroduction(state, rng);
        state.finish_hour(new_exposures);
    }

    /// The coupled pass interleaves both kernels over a single walk of
    /// the agent arena
    fn dual_pass(&mut self, agents: &mut AgentSet, locations: &mut LocationSet) {
        let Simulator {
            epidemic,
            economy,
            catalog,
            rng,
            clock,
            flags,
            toggles,
            config,
            mode,
            pending_ops,
            ..
        } = self;
        let (Some(epi), Some(econ)) = (epidemic.as_mut(), economy.as_mut()) else {
            return;
        };

        epidemic::maybe_begin_infection(epi, agents, clock.day, rng);
        epidemic::count_stages(epi, agents);
        epidemic::lockdown_locations(locations, flags, *mode);

        let ctx = StatusContext {
            day: clock.day,
            hour: clock.hour,
            coupled: true,
            flags,
            contact_tracing: toggles.contact_tracing,
            num_homeless_infected: epi.num_homeless_infected,
        };
        economy::business_overhead_pass(econ, agents, locations, &ctx, rng, pending_ops);

        let gates = GateContext {
            flags,
            toggles,
            num_homeless_infected: epi.num_homeless_infected,
        };
        let mut redistributed = 0.0;
        for index in (0..agents.len()).rev() {
            let id = agents.id_at(index);
            scheduler::update_single_destination(
                catalog,
                agents,
                locations,
                index,
                clock.hour,
                Some(&gates),
                rng,
            );
            let died = epidemic::agent_update(
                epi,
                agents,
                locations,
                index,
                config.hospital_capacity,
                config.overflow_penalty,
                rng,
            );
            if died {
                // Dead agents take no part in this hour's economy
                pending_ops.push(GraphicsOp::RemoveAgent(id));
                continue;
            }
            redistributed +=
                economy::agent_update(econ, agents, locations, id, &ctx, rng, pending_ops);
        }

        let new_exposures =
            epidemic::spread_infection(epi, agents, flags.compliance_checking(), rng);
        epidemic::spontaneous_reintroduction(epi, rng);
        economy::finish_pass(
            econ,
            agents,
            locations,
            redistributed,
            config.num_locations_per_region,
            *mode,
            rng,
            pending_ops,
        );
        epi.finish_hour(new_exposures);
        econ.finish_hour();
    }

    /// Serialises the whole world to `crash.json` so a dead run can be
    /// inspected
    pub fn error_dump_json(&self) -> Result<()> {
        use serde_json::json;
        use std::io::Write;

        println!("Creating Core Dump!");
        let mut file = std::fs::File::create("crash.json")?;

        let mut agents_json = std::collections::HashMap::new();
        if let Some(agents) = self.world.acquire_agents() {
            for agent in agents.iter() {
                agents_json.insert(agent.id().to_string(), serde_json::to_value(agent)?);
            }
        }
        let mut locations_json = std::collections::HashMap::new();
        if let Some(locations) = self.world.acquire_locations() {
            for class in [
                LocationClass::Home,
                LocationClass::School,
                LocationClass::Work,
                LocationClass::Leisure,
            ] {
                let region = locations.region(class);
                let mut entries = std::collections::HashMap::new();
                for location in region.locations() {
                    entries.insert(location.id().to_string(), serde_json::to_value(location)?);
                }
                locations_json.insert(region.name().to_string(), entries);
            }
        }
        file.write_all(
            json!({"agents": agents_json, "locations": locations_json})
                .to_string()
                .as_ref(),
        )?;
        Ok(())
    }

    /// Year rollover: everyone ages a year. New adults re-sample from the
    /// adult chart pool; centenarians die. Deaths are batched and a
    /// single refresh hint follows the pass
    fn age_agents(&mut self, agents: &mut AgentSet, locations: &mut LocationSet) {
        let Simulator {
            catalog,
            rng,
            pending_ops,
            ..
        } = self;
        for index in (0..agents.len()).rev() {
            let new_age = agents.at_mut(index).increment_age();
            if new_age == ADULT_AGE {
                agents.at_mut(index).behavior = catalog.sample_behavior(true, rng);
            } else if new_age >= MAX_AGE {
                let id = agents.id_at(index);
                epidemic::kill_agent(agents, locations, index);
                pending_ops.push(GraphicsOp::RemoveAgent(id));
            }
        }
        pending_ops.push(GraphicsOp::Refresh(RefreshHint::Ages));
    }
}

/// (homeless, unemployed) across the live population
pub fn count_status(agents: &AgentSet) -> (u32, u32) {
    let mut homeless = 0;
    let mut unemployed = 0;
    for agent in agents.iter() {
        if let Some(role) = agent.economy.as_ref() {
            if role.status.is_homeless() {
                homeless += 1;
            }
            if role.status.is_unemployed() {
                unemployed += 1;
            }
        }
    }
    (homeless, unemployed)
}
