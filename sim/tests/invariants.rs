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

//! Structural invariants of the coupled simulation, re-checked at every
//! hour boundary of a multi-day run.

use std::collections::HashMap;

use strum::IntoEnumIterator;

use sim::config::SimulationConfig;
use sim::models::agent::Stage;
use sim::models::LocationClass;
use sim::simulator::Simulator;
use sim::simulator_builder::SimulatorBuilder;
use sim::SimulationMode;

fn behavior_dir() -> String {
    format!("{}/../config/behaviors", env!("CARGO_MANIFEST_DIR"))
}

fn dual_simulator(seed: u64) -> Simulator {
    let config = SimulationConfig {
        initial_num_agents: 150,
        num_locations_per_region: 8,
        initial_value: 50_000.0,
        lag_period: 1,
        initial_infected: 8,
        frames_per_hour: 4,
        seed: Some(seed),
        behavior_dir: behavior_dir(),
        ..SimulationConfig::default()
    };
    SimulatorBuilder::new(config, SimulationMode::Dual)
        .build()
        .expect("building the dual simulator")
}

/// Runs every structural check against the current world state
fn check_invariants(simulator: &Simulator, context: &str) {
    let world = simulator.world();
    let locations = world.acquire_locations().expect("locations lock");
    let agents = world.acquire_agents().expect("agents lock");

    // Stage totals partition the population
    let mut stage_total = 0;
    for agent in agents.iter() {
        if agent.pandemic.is_some() {
            stage_total += 1;
        }
    }
    assert_eq!(stage_total, agents.len(), "{}: agents without a stage", context);

    // Per-location infected counters agree with a full recount, and
    // membership matches assignments in both directions
    let mut infected_by_location: HashMap<_, u32> = HashMap::new();
    for agent in agents.iter() {
        let infected = agent
            .pandemic
            .as_ref()
            .map(|role| role.stage == Stage::Infected)
            .unwrap_or(false);
        for class in LocationClass::iter() {
            if let Some(id) = agent.assignments[class] {
                let location = locations
                    .find(id)
                    .unwrap_or_else(|| panic!("{}: dangling assignment {}", context, id));
                assert!(
                    location.contains(agent.id()),
                    "{}: {} not a member of its {:?} assignment",
                    context,
                    agent.id(),
                    class
                );
                if infected {
                    *infected_by_location.entry(id).or_insert(0) += 1;
                }
            }
        }
    }
    for class in LocationClass::iter() {
        for location in locations.region(class).locations() {
            let expected = infected_by_location.get(&location.id()).copied().unwrap_or(0);
            assert_eq!(
                location.num_infected(),
                expected,
                "{}: infected counter drift at {}",
                context,
                location.id()
            );
            for &member in location.agents() {
                let agent = agents
                    .get(member)
                    .unwrap_or_else(|| panic!("{}: stale member {}", context, member));
                assert_eq!(
                    agent.assignments[class],
                    Some(location.id()),
                    "{}: membership without assignment at {}",
                    context,
                    location.id()
                );
            }
        }
    }

    // Work and leisure form a sibling bijection
    let mut seen_leisure: HashMap<_, _> = HashMap::new();
    for work in locations.region(LocationClass::Work).locations() {
        let venue_id = work
            .sibling()
            .unwrap_or_else(|| panic!("{}: business {} without venue", context, work.id()));
        let venue = locations
            .find(venue_id)
            .unwrap_or_else(|| panic!("{}: dangling sibling {}", context, venue_id));
        assert_eq!(venue.class(), LocationClass::Leisure);
        assert_eq!(venue.sibling(), Some(work.id()), "{}: sibling asymmetry", context);
        let previous = seen_leisure.insert(venue_id, work.id());
        assert!(previous.is_none(), "{}: venue shared by two businesses", context);
    }
    for venue in locations.region(LocationClass::Leisure).locations() {
        assert!(
            seen_leisure.contains_key(&venue.id()),
            "{}: venue {} without business",
            context,
            venue.id()
        );
    }

    // Economic status mirrors the null assignments, and children keep
    // out of the homeless/unemployed books entirely
    for agent in agents.iter() {
        let role = agent.economy.as_ref().expect("economic role");
        let homeless = agent.assignments[LocationClass::Home].is_none();
        assert_eq!(
            role.status.is_homeless(),
            homeless,
            "{}: homeless status does not match the home slot",
            context
        );
        if agent.is_adult() {
            assert_eq!(
                role.status.is_unemployed(),
                agent.assignments[LocationClass::Work].is_none(),
                "{}: unemployed status does not match the work slot",
                context
            );
        } else {
            assert!(!role.status.is_homeless() && !role.status.is_unemployed());
        }
        assert!(role.value >= 0.0, "{}: negative agent value", context);
    }

    for class in LocationClass::iter() {
        for location in locations.region(class).locations() {
            assert!(location.value() >= 0.0, "{}: negative location value", context);
            assert!(location.cost() > 0.0, "{}: non-positive cost", context);
        }
    }
}

#[test]
fn invariants_hold_at_every_hour_boundary() {
    let mut simulator = dual_simulator(2024);
    check_invariants(&simulator, "initial");
    for hour in 0..72 {
        simulator.take_step().expect("hourly step");
        check_invariants(&simulator, &format!("hour {}", hour));
    }
}

#[test]
fn behavior_pools_track_adulthood() {
    let mut simulator = dual_simulator(99);
    for _ in 0..24 {
        simulator.take_step().expect("hourly step");
    }
    let world = simulator.world();
    let agents = world.acquire_agents().expect("agents lock");
    // Three charts per pool ship with the repository
    for agent in agents.iter() {
        assert!(agent.behavior < 3, "behavior id out of pool range");
    }
}

#[test]
fn internal_value_accounting_matches_the_world() {
    let config = SimulationConfig {
        initial_num_agents: 120,
        num_locations_per_region: 6,
        initial_value: 30_000.0,
        frames_per_hour: 4,
        seed: Some(555),
        behavior_dir: behavior_dir(),
        ..SimulationConfig::default()
    };
    let mut simulator = SimulatorBuilder::new(config, SimulationMode::Economic)
        .build()
        .expect("building the economic simulator");

    for hour in 0..48 {
        simulator.take_step().expect("hourly step");
        let world = simulator.world();
        let locations = world.acquire_locations().expect("locations lock");
        let agents = world.acquire_agents().expect("agents lock");
        let actual_agents: f64 = agents
            .iter()
            .filter_map(|agent| agent.economy.as_ref())
            .map(|role| role.value)
            .sum();
        let actual_business: f64 = locations
            .region(LocationClass::Work)
            .locations()
            .iter()
            .map(|location| location.value())
            .sum();
        drop(agents);
        drop(locations);
        // The pass totals may miss at most one fresh business seed
        // (value 500..700) founded after the totals were taken
        let tracked = simulator.total_value();
        let actual = actual_agents + actual_business;
        assert!(
            (tracked - actual).abs() <= 700.0,
            "hour {}: tracked {} vs actual {}",
            hour,
            tracked,
            actual
        );
    }
}
