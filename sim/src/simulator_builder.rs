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
use std::time::Instant;

use anyhow::{Context, Result};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strum::IntoEnumIterator;

use crate::behavior::BehaviorCatalog;
use crate::config::{SimulationConfig, ADULT_AGE};
use crate::economy::EconomyState;
use crate::epidemic::EpidemicState;
use crate::interventions::InterventionToggles;
use crate::models::agent::{Agent, AgentSet};
use crate::models::region::LocationSet;
use crate::models::{set_assignment, LocationClass, LocationId};
use crate::runtime::{GraphicsOp, World};
use crate::simulator::Simulator;
use crate::statistics::CsvListener;
use crate::SimulationMode;

/// Assembles a ready-to-tick [`Simulator`] from the configuration: the
/// four regions with their locations, the initial agent cohort, the
/// behavior catalog, and whichever kernel states the mode needs
pub struct SimulatorBuilder {
    config: SimulationConfig,
    mode: SimulationMode,
    toggles: InterventionToggles,
}

impl SimulatorBuilder {
    pub fn new(config: SimulationConfig, mode: SimulationMode) -> SimulatorBuilder {
        SimulatorBuilder {
            config,
            mode,
            toggles: InterventionToggles::default(),
        }
    }

    pub fn with_toggles(mut self, toggles: InterventionToggles) -> SimulatorBuilder {
        self.toggles = toggles;
        self
    }

    pub fn build(self) -> Result<Simulator> {
        let start = Instant::now();
        let SimulatorBuilder {
            config,
            mode,
            toggles,
        } = self;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let catalog = BehaviorCatalog::load(&config.behavior_dir)
            .context("Loading the behavior catalog")?;

        let mut locations = LocationSet::new();
        for class in LocationClass::iter() {
            for _ in 0..config.num_locations_per_region {
                locations.create_location(class, mode, &mut rng);
            }
        }
        if mode != SimulationMode::Simple {
            locations.create_shelter(&mut rng);
        }
        if mode.has_economy() {
            seed_businesses(&mut locations, config.initial_value);
        }

        let mut agents = AgentSet::new(2 * config.initial_num_agents);
        let mut ops = Vec::new();
        generate_agents(
            &mut agents,
            &mut locations,
            &catalog,
            mode,
            config.initial_num_agents,
            false,
            &mut rng,
            &mut ops,
        );
        if mode.has_economy() {
            distribute_initial_value(&mut agents, config.initial_value);
        }
        info!(
            "Built {} agents across {} locations per region in {:?}",
            agents.len(),
            config.num_locations_per_region,
            start.elapsed()
        );

        let epidemic = mode
            .has_pandemic()
            .then(|| EpidemicState::new(config.lag_period, config.initial_infected));
        let economy = mode.has_economy().then(|| EconomyState::new(config.initial_value));
        let listener = match config.statistics_path.as_deref() {
            Some(path) => Some(CsvListener::new(path).context("Opening the statistics CSV")?),
            None => None,
        };

        let world = Arc::new(World::new(agents, locations));
        world.push_graphics(ops);
        Ok(Simulator::from_parts(
            world, config, mode, catalog, toggles, epidemic, economy, listener, rng,
        ))
    }
}

/// Pairs work and leisure locations into economic siblings and spreads
/// half the initial value equally over the businesses
fn seed_businesses(locations: &mut LocationSet, initial_value: f64) {
    let work_ids: Vec<LocationId> = locations
        .region(LocationClass::Work)
        .locations()
        .iter()
        .map(|location| location.id())
        .collect();
    let leisure_ids: Vec<LocationId> = locations
        .region(LocationClass::Leisure)
        .locations()
        .iter()
        .map(|location| location.id())
        .collect();

    for (&work, &leisure) in work_ids.iter().zip(leisure_ids.iter()) {
        if let Some(location) = locations.find_mut(work) {
            location.set_sibling(Some(leisure));
        }
        if let Some(location) = locations.find_mut(leisure) {
            location.set_sibling(Some(work));
        }
    }

    if work_ids.is_empty() {
        return;
    }
    let share = initial_value / 2.0 / work_ids.len() as f64;
    for work in work_ids {
        if let Some(location) = locations.find_mut(work) {
            location.increment_value(share);
        }
    }
}

/// Population age brackets and the share of total agent wealth each one
/// holds; under-18s own nothing
const AGE_BRACKET_UPPER: [u32; 7] = [18, 35, 45, 55, 65, 75, u32::MAX];
const WEALTH_PROPORTIONS: [f64; 7] = [0.0, 0.0137, 0.0906, 0.1673, 0.2109, 0.2644, 0.2529];

fn age_bracket(age: u32) -> usize {
    AGE_BRACKET_UPPER
        .iter()
        .position(|&upper| age < upper)
        .unwrap_or(AGE_BRACKET_UPPER.len() - 1)
}

/// Splits half the initial value over the agents, bracket by bracket in
/// rough proportion to real-world wealth by age
fn distribute_initial_value(agents: &mut AgentSet, initial_value: f64) {
    let agent_share = initial_value / 2.0;
    let mut counts = [0u32; 7];
    for agent in agents.iter() {
        counts[age_bracket(agent.age)] += 1;
    }
    for agent in agents.iter_mut() {
        let bracket = age_bracket(agent.age);
        if counts[bracket] == 0 {
            continue;
        }
        if let Some(role) = agent.economy.as_mut() {
            role.value = agent_share * WEALTH_PROPORTIONS[bracket] / f64::from(counts[bracket]);
        }
    }
}

/// Initial-cohort age distribution: bracket weights over
/// [0,18) [18,24) [24,44) [44,64) [64,100), uniform within the bracket
fn sample_age(rng: &mut StdRng) -> u32 {
    const AGES: [u32; 6] = [0, 18, 24, 44, 64, 100];
    const CUMULATIVE: [u32; 5] = [25, 35, 65, 87, 100];

    let draw = rng.gen_range(0..100u32);
    let index = CUMULATIVE.partition_point(|&sum| sum <= draw).min(4);
    let range = AGES[index + 1] - AGES[index];
    AGES[index] + rng.gen_range(0..range)
}

/// Creates `num` agents: sampled (or newborn) age, a weighted behavior
/// chart from the matching pool, one random assignment per location
/// class, and a starting position at the chart's hour-zero destination
#[allow(clippy::too_many_arguments)]
pub(crate) fn generate_agents(
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    catalog: &BehaviorCatalog,
    mode: SimulationMode,
    num: usize,
    birth: bool,
    rng: &mut StdRng,
    ops: &mut Vec<GraphicsOp>,
) {
    for _ in 0..num {
        let age = if birth { 0 } else { sample_age(rng) };
        let adult = age >= ADULT_AGE;
        let behavior = catalog.sample_behavior(adult, rng);
        let starting_label = catalog.starting_destination(behavior, adult, rng);

        let mut assignments = [(LocationClass::Home, None); 4];
        for (slot, class) in assignments.iter_mut().zip(LocationClass::iter()) {
            *slot = (class, locations.random_location(class, rng));
        }
        let starting_target = assignments
            .iter()
            .find(|(class, _)| *class == starting_label)
            .and_then(|(_, id)| *id);
        let position = starting_target
            .and_then(|id| locations.find(id))
            .map(|location| location.position())
            .unwrap_or_else(|| locations.region(starting_label).random_coordinate(rng));

        let Some(id) = agents.insert_with(|id| {
            Agent::new(id, age, behavior, position, starting_label, mode, rng)
        }) else {
            debug!("Population cap reached; refusing further agents");
            return;
        };
        for (class, assignment) in assignments {
            set_assignment(agents, locations, id, class, assignment);
        }
        if let Some(agent) = agents.get_mut(id) {
            agent.hourly_target = starting_target;
        }
        ops.push(GraphicsOp::AddAgent(id));
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn behavior_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("adult_worker.json"),
            r#"{"Probability": 0.6, "0": "Home", "8": "Work", "18": {"Home": 0.7, "Leisure": 0.3}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("adult_social.json"),
            r#"{"Probability": 0.4, "0": "Home", "10": "Leisure", "20": "Home"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("child_student.json"),
            r#"{"Probability": 1.0, "0": "Home", "8": "School", "15": "Home"}"#,
        )
        .unwrap();
        dir
    }

    fn config(dir: &TempDir) -> SimulationConfig {
        SimulationConfig {
            initial_num_agents: 50,
            num_locations_per_region: 5,
            initial_value: 10_000.0,
            seed: Some(1234),
            behavior_dir: dir.path().to_str().unwrap().to_string(),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn build_wires_a_complete_dual_world() {
        let dir = behavior_dir();
        let simulator = SimulatorBuilder::new(config(&dir), SimulationMode::Dual)
            .build()
            .unwrap();
        let world = simulator.world();

        let locations = world.acquire_locations().unwrap();
        for class in LocationClass::iter() {
            assert_eq!(locations.region(class).num_locations(), 5);
        }
        assert!(locations.shelter().is_some());
        // Every business has exactly one venue sibling, and vice versa
        for work in locations.region(LocationClass::Work).locations() {
            let venue = work.sibling().and_then(|id| locations.find(id)).unwrap();
            assert_eq!(venue.sibling(), Some(work.id()));
            assert_eq!(venue.class(), LocationClass::Leisure);
        }
        drop(locations);

        let agents = world.acquire_agents().unwrap();
        assert_eq!(agents.len(), 50);
        for agent in agents.iter() {
            assert!(agent.pandemic.is_some());
            assert!(agent.economy.is_some());
            // Behavior pool matches the age side of the line
            if agent.is_adult() {
                assert!(agent.behavior < 2);
            } else {
                assert_eq!(agent.behavior, 0);
            }
        }
    }

    #[test]
    fn initial_value_splits_between_agents_and_businesses() {
        let dir = behavior_dir();
        let simulator = SimulatorBuilder::new(config(&dir), SimulationMode::Economic)
            .build()
            .unwrap();
        let world = simulator.world();

        let locations = world.acquire_locations().unwrap();
        let business_total: f64 = locations
            .region(LocationClass::Work)
            .locations()
            .iter()
            .map(|location| location.value())
            .sum();
        assert!((business_total - 5_000.0).abs() < 1e-6);
        drop(locations);

        let agents = world.acquire_agents().unwrap();
        let agent_total: f64 = agents
            .iter()
            .filter_map(|agent| agent.economy.as_ref())
            .map(|role| role.value)
            .sum();
        // Children hold nothing and empty brackets forfeit their share,
        // so the agent side lands at or below its half
        assert!(agent_total <= 5_000.0 + 1e-6);
        assert!(agent_total > 1_000.0);
        for agent in agents.iter() {
            if !agent.is_adult() {
                assert_eq!(agent.economy.as_ref().unwrap().value, 0.0);
            }
        }
    }

    #[test]
    fn sampled_ages_stay_in_range_with_children_present() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut children = 0;
        for _ in 0..1_000 {
            let age = sample_age(&mut rng);
            assert!(age < 100);
            if age < ADULT_AGE {
                children += 1;
            }
        }
        // The first bracket carries a quarter of the weight
        assert!((150..=350).contains(&children), "children: {}", children);
    }

    #[test]
    fn newborns_start_at_age_zero_with_child_charts() {
        let dir = behavior_dir();
        let catalog = BehaviorCatalog::load(dir.path().to_str().unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut agents = AgentSet::new(8);
        let mut locations = LocationSet::new();
        locations.create_location(LocationClass::Home, SimulationMode::Simple, &mut rng);
        let mut ops = Vec::new();

        generate_agents(
            &mut agents,
            &mut locations,
            &catalog,
            SimulationMode::Simple,
            1,
            true,
            &mut rng,
            &mut ops,
        );
        assert_eq!(agents.len(), 1);
        let newborn = agents.at(0);
        assert_eq!(newborn.age, 0);
        assert!(newborn.assignments[LocationClass::Home].is_some());
        assert_eq!(ops.len(), 1);
    }
}
