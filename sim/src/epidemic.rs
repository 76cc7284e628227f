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

use std::collections::VecDeque;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use strum::IntoEnumIterator;

use crate::config::{
    EXPOSED_DAYS, INFECTED_DAYS, INFECTION_RADIUS, INFECTION_THRESHOLD,
    INFECTION_THRESHOLD_COMPLIANT, MODERATE_LOCKDOWN_THRESHOLD_COUPLED,
    MODERATE_LOCKDOWN_THRESHOLD_PANDEMIC, RECOVERED_DAYS, SPONTANEOUS_INFECTION_ODDS,
    STRONG_LOCKDOWN_THRESHOLD, WEAK_LOCKDOWN_THRESHOLD_COUPLED,
    WEAK_LOCKDOWN_THRESHOLD_PANDEMIC,
};
use crate::geometry::Coordinate;
use crate::interventions::PolicyFlags;
use crate::models::agent::{Agent, AgentSet, Health, Stage};
use crate::models::location::PandemicStatus;
use crate::models::region::LocationSet;
use crate::models::{AgentId, LocationClass};
use crate::SimulationMode;

/// Rolling counters of the epidemic layer, refreshed every controller pass
pub struct EpidemicState {
    lag_period: u32,
    initial_infected: usize,
    initial_infection_done: bool,
    pub num_susceptible: u32,
    pub num_exposed: u32,
    pub num_infected: u32,
    pub num_recovered: u32,
    /// Infected agents with no home assignment, i.e. an outbreak at the
    /// homeless shelter
    pub num_homeless_infected: u32,
    last24_exposed: VecDeque<u32>,
    last24_deaths: VecDeque<u32>,
    deaths_this_hour: u32,
    pub new_daily_cases: u32,
    pub new_daily_deaths: u32,
    pub total_cases: u32,
    pub total_deaths: u32,
}

impl EpidemicState {
    pub fn new(lag_period: u32, initial_infected: usize) -> EpidemicState {
        EpidemicState {
            lag_period,
            initial_infected,
            initial_infection_done: false,
            num_susceptible: 0,
            num_exposed: 0,
            num_infected: 0,
            num_recovered: 0,
            num_homeless_infected: 0,
            last24_exposed: VecDeque::from(vec![0; 24]),
            last24_deaths: VecDeque::from(vec![0; 24]),
            deaths_this_hour: 0,
            new_daily_cases: 0,
            new_daily_deaths: 0,
            total_cases: 0,
            total_deaths: 0,
        }
    }

    pub fn exposures_last_hour(&self) -> u32 {
        *self.last24_exposed.back().unwrap_or(&0)
    }

    pub fn exposures_last_day(&self) -> u32 {
        self.last24_exposed.iter().sum()
    }

    pub fn deaths_last_hour(&self) -> u32 {
        *self.last24_deaths.back().unwrap_or(&0)
    }

    pub fn deaths_last_day(&self) -> u32 {
        self.last24_deaths.iter().sum()
    }

    /// Slides the rolling 24-hour windows by one hour
    pub fn record_hour_window(&mut self, exposures: u32, deaths: u32) {
        self.last24_exposed.pop_front();
        self.last24_exposed.push_back(exposures);
        self.last24_deaths.pop_front();
        self.last24_deaths.push_back(deaths);
    }

    /// Closes the hour: the exposure count and death tally join their
    /// rolling day windows
    pub fn finish_hour(&mut self, new_exposures: u32) {
        let deaths = self.deaths_this_hour;
        self.record_hour_window(new_exposures, deaths);
        self.deaths_this_hour = 0;
    }
}

/// Infects the initial cohort once the lag period has elapsed, and again
/// whenever spontaneous reintroduction has rearmed the trigger
pub fn maybe_begin_infection(
    state: &mut EpidemicState,
    agents: &mut AgentSet,
    day: u32,
    rng: &mut StdRng,
) {
    if state.initial_infection_done || day < state.lag_period || agents.is_empty() {
        return;
    }
    info!("Seeding infection into {} agents", state.initial_infected);
    for _ in 0..state.initial_infected {
        let index = rng.gen_range(0..agents.len());
        if let Some(role) = agents.at_mut(index).pandemic.as_mut() {
            if role.stage == Stage::Susceptible {
                role.stage = Stage::Exposed;
                role.days_in_stage = 0;
            }
        }
    }
    state.initial_infection_done = true;
}

/// Rearms the initial infection with small probability once the disease
/// has died out while susceptible agents remain
pub fn spontaneous_reintroduction(state: &mut EpidemicState, rng: &mut StdRng) {
    if state.num_exposed == 0 && state.num_infected == 0 && state.num_susceptible > 0 {
        if rng.gen_range(0..SPONTANEOUS_INFECTION_ODDS) == 0 {
            debug!("Spontaneous reintroduction armed");
            state.initial_infection_done = false;
        }
    }
}

/// Start-of-pass snapshot: clears the proximity counters and recounts the
/// stage populations
pub fn count_stages(state: &mut EpidemicState, agents: &mut AgentSet) {
    state.num_susceptible = 0;
    state.num_exposed = 0;
    state.num_infected = 0;
    state.num_recovered = 0;
    state.num_homeless_infected = 0;
    for agent in agents.iter_mut() {
        let homeless = agent.assignments[LocationClass::Home].is_none();
        let Some(role) = agent.pandemic.as_mut() else {
            continue;
        };
        role.nearby_infected = 0;
        match role.stage {
            Stage::Susceptible => state.num_susceptible += 1,
            Stage::Exposed => state.num_exposed += 1,
            Stage::Infected => {
                state.num_infected += 1;
                if homeless {
                    state.num_homeless_infected += 1;
                }
            }
            Stage::Recovered => state.num_recovered += 1,
        }
    }
}

fn jitter(rng: &mut StdRng) -> i32 {
    rng.gen_range(0..3i32) - 1
}

/// Flips an agent to INFECTED and pushes the infected counter onto every
/// location it is assigned to
pub fn make_infected(agents: &mut AgentSet, locations: &mut LocationSet, id: AgentId) {
    let assignments = match agents.get_mut(id) {
        Some(agent) => match agent.pandemic.as_mut() {
            Some(role) => {
                role.stage = Stage::Infected;
                role.days_in_stage = 0;
                agent.assignments
            }
            None => return,
        },
        None => return,
    };
    for class in LocationClass::iter() {
        if let Some(location) = assignments[class].and_then(|lid| locations.find_mut(lid)) {
            location.add_infected_agent();
        }
    }
}

/// Flips an agent out of INFECTED, dropping the counter it contributed
pub fn make_recovered(agents: &mut AgentSet, locations: &mut LocationSet, id: AgentId) {
    let assignments = match agents.get_mut(id) {
        Some(agent) => match agent.pandemic.as_mut() {
            Some(role) => {
                role.stage = Stage::Recovered;
                role.days_in_stage = 0;
                agent.assignments
            }
            None => return,
        },
        None => return,
    };
    for class in LocationClass::iter() {
        if let Some(location) = assignments[class].and_then(|lid| locations.find_mut(lid)) {
            location.remove_infected_agent();
        }
    }
}

/// Day-granular stage machine with a one-day jitter on each transition.
/// Returns the number of new cases (EXPOSED turning INFECTED)
pub fn advance_day(
    state: &mut EpidemicState,
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    rng: &mut StdRng,
) {
    state.new_daily_cases = 0;
    state.new_daily_deaths = 0;
    for id in agents.ids() {
        let stage_and_days = agents.get(id).and_then(|agent| {
            agent
                .pandemic
                .as_ref()
                .map(|role| (role.stage, role.days_in_stage))
        });
        let Some((stage, days)) = stage_and_days else {
            continue;
        };
        match stage {
            Stage::Exposed => {
                if days + jitter(rng) > EXPOSED_DAYS {
                    make_infected(agents, locations, id);
                    state.new_daily_cases += 1;
                    state.total_cases += 1;
                }
            }
            Stage::Infected => {
                if days + jitter(rng) > INFECTED_DAYS {
                    make_recovered(agents, locations, id);
                }
            }
            Stage::Recovered => {
                if days + jitter(rng) > RECOVERED_DAYS {
                    if let Some(role) = agents.get_mut(id).and_then(|a| a.pandemic.as_mut()) {
                        role.stage = Stage::Susceptible;
                        role.days_in_stage = 0;
                    }
                }
            }
            Stage::Susceptible => {}
        }
        if let Some(role) = agents.get_mut(id).and_then(|a| a.pandemic.as_mut()) {
            role.days_in_stage += 1;
        }
    }
}

/// Survival odds denominator for one infected agent: death fires with
/// probability `1 / odds`. Strictly lower while hospitals run over
/// capacity
pub fn death_odds(age: u32, health: Health, over_capacity: bool, overflow_penalty: f64) -> u32 {
    let mut survival = if age < 50 {
        100.0
    } else {
        100.0 - 2.0 * f64::from(age - 50)
    };
    survival /= health.survival_divisor();
    if over_capacity {
        survival /= overflow_penalty.max(1.0);
    }
    ((survival * 100.0).round() as u32).max(1)
}

fn evaluate_death(
    age: u32,
    health: Health,
    over_capacity: bool,
    overflow_penalty: f64,
    rng: &mut StdRng,
) -> bool {
    rng.gen_range(0..death_odds(age, health, over_capacity, overflow_penalty)) == 0
}

/// Removes an agent from the world: every membership set it appears in,
/// the infected counters it contributed to, then its arena slot
pub fn kill_agent(agents: &mut AgentSet, locations: &mut LocationSet, index: usize) -> Agent {
    let id = agents.id_at(index);
    let (assignments, infected) = {
        let agent = agents.at(index);
        (
            agent.assignments,
            agent
                .pandemic
                .as_ref()
                .map(|role| role.stage == Stage::Infected)
                .unwrap_or(false),
        )
    };
    for class in LocationClass::iter() {
        if let Some(location) = assignments[class].and_then(|lid| locations.find_mut(lid)) {
            location.remove_agent(id);
            if infected {
                location.remove_infected_agent();
            }
        }
    }
    agents.remove_at(index)
}

/// Hourly epidemic update for the agent in slot `index`. Only INFECTED
/// agents are at risk; returns true when the agent died (and its slot was
/// recycled)
pub fn agent_update(
    state: &mut EpidemicState,
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    index: usize,
    hospital_capacity: u32,
    overflow_penalty: f64,
    rng: &mut StdRng,
) -> bool {
    let (age, health, stage) = {
        let agent = agents.at(index);
        let Some(role) = agent.pandemic.as_ref() else {
            return false;
        };
        (agent.age, role.health, role.stage)
    };
    if stage != Stage::Infected {
        return false;
    }
    let over_capacity = state.num_infected > hospital_capacity;
    if evaluate_death(age, health, over_capacity, overflow_penalty, rng) {
        kill_agent(agents, locations, index);
        state.deaths_this_hour += 1;
        state.new_daily_deaths += 1;
        state.total_deaths += 1;
        state.num_infected = state.num_infected.saturating_sub(1);
        true
    } else {
        false
    }
}

/// Pairwise proximity pass followed by the exposure draws. Exposed
/// neighbours within the radius weigh 1, infected ones 2, and a
/// susceptible agent turns EXPOSED when a uniform draw lands under the
/// square of its accumulated pressure
pub fn spread_infection(
    state: &mut EpidemicState,
    agents: &mut AgentSet,
    compliance_checking: bool,
    rng: &mut StdRng,
) -> u32 {
    let sources: Vec<(AgentId, Coordinate, u32)> = agents
        .iter()
        .filter_map(|agent| {
            let role = agent.pandemic.as_ref()?;
            match role.stage {
                Stage::Exposed => Some((agent.id(), agent.position, 1)),
                Stage::Infected => Some((agent.id(), agent.position, 2)),
                _ => None,
            }
        })
        .collect();

    agents.as_mut_slice().par_iter_mut().for_each(|agent| {
        let id = agent.id();
        let position = agent.position;
        let Some(role) = agent.pandemic.as_mut() else {
            return;
        };
        let mut pressure = 0;
        for (source, source_position, weight) in &sources {
            if *source == id {
                continue;
            }
            if position.distance_to(*source_position) < INFECTION_RADIUS {
                pressure += weight;
            }
        }
        role.nearby_infected = pressure;
    });

    let mut new_exposures = 0;
    for agent in agents.iter_mut() {
        let Some(role) = agent.pandemic.as_mut() else {
            continue;
        };
        if role.stage != Stage::Susceptible {
            continue;
        }
        let likelihood = u64::from(role.nearby_infected) * u64::from(role.nearby_infected);
        let threshold = if compliance_checking && role.compliant {
            INFECTION_THRESHOLD_COMPLIANT
        } else {
            INFECTION_THRESHOLD
        };
        if u64::from(rng.gen_range(0..threshold)) < likelihood {
            role.stage = Stage::Exposed;
            role.days_in_stage = 0;
            new_exposures += 1;
        }
    }

    state.num_exposed += new_exposures;
    state.num_susceptible = state.num_susceptible.saturating_sub(new_exposures);
    new_exposures
}

/// Reclassifies every location's outbreak status from its infected
/// proportion and the active lockdown flags. HOME locations only toggle
/// between EXPOSURE and NORMAL
pub fn lockdown_locations(locations: &mut LocationSet, flags: &PolicyFlags, mode: SimulationMode) {
    let (moderate_threshold, weak_threshold) = if mode == SimulationMode::Dual {
        (
            MODERATE_LOCKDOWN_THRESHOLD_COUPLED,
            WEAK_LOCKDOWN_THRESHOLD_COUPLED,
        )
    } else {
        (
            MODERATE_LOCKDOWN_THRESHOLD_PANDEMIC,
            WEAK_LOCKDOWN_THRESHOLD_PANDEMIC,
        )
    };

    // Work is classified before Leisure so a leisure venue can follow its
    // locked-down work sibling within the same pass
    for class in [
        LocationClass::Home,
        LocationClass::School,
        LocationClass::Work,
        LocationClass::Leisure,
    ] {
        let ids: Vec<_> = locations
            .region(class)
            .locations()
            .iter()
            .map(|location| location.id())
            .collect();
        for id in ids {
            let (num_infected, num_agents, sibling) = match locations.find(id) {
                Some(location) => (
                    location.num_infected(),
                    location.num_agents(),
                    location.sibling(),
                ),
                None => continue,
            };
            let proportion = if num_agents > 0 {
                f64::from(num_infected) / num_agents as f64
            } else {
                0.0
            };

            let status = if class == LocationClass::Home {
                if num_infected > 0 {
                    PandemicStatus::Exposure
                } else {
                    PandemicStatus::Normal
                }
            } else if flags.total_lockdown
                || (flags.strong_lockdown && proportion > STRONG_LOCKDOWN_THRESHOLD)
                || (flags.moderate_lockdown && proportion > moderate_threshold)
                || (flags.weak_lockdown && proportion > weak_threshold)
                || proportion >= 1.0 && num_agents > 0
            {
                PandemicStatus::Lockdown
            } else if class == LocationClass::Leisure
                && sibling
                    .and_then(|sid| locations.find(sid))
                    .map(|work| work.pandemic_status() == PandemicStatus::Lockdown)
                    .unwrap_or(false)
            {
                PandemicStatus::Lockdown
            } else if num_infected > 0 {
                PandemicStatus::Exposure
            } else {
                PandemicStatus::Normal
            };

            if let Some(location) = locations.find_mut(id) {
                location.set_pandemic_status(status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::models::set_assignment;

    fn world() -> (AgentSet, LocationSet, StdRng) {
        (AgentSet::new(64), LocationSet::new(), StdRng::seed_from_u64(21))
    }

    fn spawn(agents: &mut AgentSet, rng: &mut StdRng, age: u32) -> AgentId {
        agents
            .insert_with(|id| {
                Agent::new(
                    id,
                    age,
                    0,
                    Coordinate::new(100.0, 100.0),
                    LocationClass::Home,
                    SimulationMode::Dual,
                    rng,
                )
            })
            .unwrap()
    }

    #[test]
    fn full_stage_traversal_returns_to_susceptible() {
        let (mut agents, mut locations, mut rng) = world();
        let id = spawn(&mut agents, &mut rng, 30);
        let work = locations.create_location(LocationClass::Work, SimulationMode::Dual, &mut rng);
        set_assignment(&mut agents, &mut locations, id, LocationClass::Work, Some(work));
        let mut state = EpidemicState::new(0, 0);

        if let Some(role) = agents.get_mut(id).unwrap().pandemic.as_mut() {
            role.stage = Stage::Exposed;
            role.days_in_stage = 3;
        }
        advance_day(&mut state, &mut agents, &mut locations, &mut rng);
        assert_eq!(
            agents.get(id).unwrap().pandemic.as_ref().unwrap().stage,
            Stage::Infected
        );
        assert_eq!(state.new_daily_cases, 1);
        assert_eq!(locations.find(work).unwrap().num_infected(), 1);

        if let Some(role) = agents.get_mut(id).unwrap().pandemic.as_mut() {
            role.days_in_stage = 6;
        }
        advance_day(&mut state, &mut agents, &mut locations, &mut rng);
        assert_eq!(
            agents.get(id).unwrap().pandemic.as_ref().unwrap().stage,
            Stage::Recovered
        );
        assert_eq!(locations.find(work).unwrap().num_infected(), 0);

        if let Some(role) = agents.get_mut(id).unwrap().pandemic.as_mut() {
            role.days_in_stage = 11;
        }
        advance_day(&mut state, &mut agents, &mut locations, &mut rng);
        let role = agents.get(id).unwrap().pandemic.as_ref().unwrap();
        assert_eq!(role.stage, Stage::Susceptible);
        // advance_day increments after the transition, so the fresh stage
        // has seen exactly one day
        assert_eq!(role.days_in_stage, 1);
    }

    #[test]
    fn death_odds_shrink_with_age_health_and_overflow() {
        let baseline = death_odds(30, Health::Healthy, false, 2.0);
        assert_eq!(baseline, 10_000);
        assert!(death_odds(70, Health::Healthy, false, 2.0) < baseline);
        assert!(death_odds(30, Health::VeryPoor, false, 2.0) < baseline);
        // The hospital-overflow penalty strictly raises death probability
        assert!(death_odds(30, Health::Healthy, true, 2.0) < baseline);
        assert!(
            death_odds(70, Health::VeryPoor, true, 2.0)
                < death_odds(70, Health::VeryPoor, false, 2.0)
        );
    }

    #[test]
    fn proximity_pressure_weighs_infected_twice() {
        let (mut agents, _, mut rng) = world();
        let target = spawn(&mut agents, &mut rng, 30);
        let exposed = spawn(&mut agents, &mut rng, 30);
        let infected = spawn(&mut agents, &mut rng, 30);
        let far = spawn(&mut agents, &mut rng, 30);
        if let Some(role) = agents.get_mut(exposed).unwrap().pandemic.as_mut() {
            role.stage = Stage::Exposed;
        }
        if let Some(role) = agents.get_mut(infected).unwrap().pandemic.as_mut() {
            role.stage = Stage::Infected;
        }
        if let Some(role) = agents.get_mut(far).unwrap().pandemic.as_mut() {
            role.stage = Stage::Infected;
        }
        agents.get_mut(far).unwrap().position = Coordinate::new(500.0, 500.0);

        let mut state = EpidemicState::new(0, 0);
        count_stages(&mut state, &mut agents);
        spread_infection(&mut state, &mut agents, false, &mut rng);
        assert_eq!(
            agents
                .get(target)
                .unwrap()
                .pandemic
                .as_ref()
                .unwrap()
                .nearby_infected,
            3
        );
    }

    #[test]
    fn lockdown_classification_follows_the_threshold_table() {
        let (mut agents, mut locations, mut rng) = world();
        let work = locations.create_location(LocationClass::Work, SimulationMode::Dual, &mut rng);
        let leisure =
            locations.create_location(LocationClass::Leisure, SimulationMode::Dual, &mut rng);
        locations.find_mut(work).unwrap().set_sibling(Some(leisure));
        locations.find_mut(leisure).unwrap().set_sibling(Some(work));

        // Four members, one infected: 25% infected proportion
        for i in 0..4 {
            let id = spawn(&mut agents, &mut rng, 30);
            set_assignment(&mut agents, &mut locations, id, LocationClass::Work, Some(work));
            if i == 0 {
                make_infected(&mut agents, &mut locations, id);
            }
        }

        let mut flags = PolicyFlags::default();
        lockdown_locations(&mut locations, &flags, SimulationMode::Dual);
        assert_eq!(
            locations.find(work).unwrap().pandemic_status(),
            PandemicStatus::Exposure
        );

        flags.moderate_lockdown = true;
        lockdown_locations(&mut locations, &flags, SimulationMode::Dual);
        // 25% is below the coupled moderate threshold of 40%
        assert_eq!(
            locations.find(work).unwrap().pandemic_status(),
            PandemicStatus::Exposure
        );

        flags.strong_lockdown = true;
        lockdown_locations(&mut locations, &flags, SimulationMode::Dual);
        assert_eq!(
            locations.find(work).unwrap().pandemic_status(),
            PandemicStatus::Lockdown
        );
        // The leisure sibling follows its locked-down business
        assert_eq!(
            locations.find(leisure).unwrap().pandemic_status(),
            PandemicStatus::Lockdown
        );
    }

    #[test]
    fn home_locations_never_lock_down() {
        let (mut agents, mut locations, mut rng) = world();
        let home = locations.create_location(LocationClass::Home, SimulationMode::Dual, &mut rng);
        let id = spawn(&mut agents, &mut rng, 30);
        set_assignment(&mut agents, &mut locations, id, LocationClass::Home, Some(home));
        make_infected(&mut agents, &mut locations, id);

        let mut flags = PolicyFlags::default();
        flags.total_lockdown = true;
        lockdown_locations(&mut locations, &flags, SimulationMode::Dual);
        assert_eq!(
            locations.find(home).unwrap().pandemic_status(),
            PandemicStatus::Exposure
        );
    }

    #[test]
    fn killing_an_infected_agent_repairs_location_counters() {
        let (mut agents, mut locations, mut rng) = world();
        let home = locations.create_location(LocationClass::Home, SimulationMode::Dual, &mut rng);
        let id = spawn(&mut agents, &mut rng, 45);
        set_assignment(&mut agents, &mut locations, id, LocationClass::Home, Some(home));
        make_infected(&mut agents, &mut locations, id);
        assert_eq!(locations.find(home).unwrap().num_infected(), 1);

        kill_agent(&mut agents, &mut locations, 0);
        assert_eq!(agents.len(), 0);
        assert_eq!(locations.find(home).unwrap().num_infected(), 0);
        assert_eq!(locations.find(home).unwrap().num_agents(), 0);
    }
}
