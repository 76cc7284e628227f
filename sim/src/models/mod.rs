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

use std::fmt::{Display, Formatter};

use enum_map::Enum;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString};

pub mod agent;
pub mod location;
pub mod region;

use agent::{AgentSet, Stage};
use region::LocationSet;

/// Stable identity of an agent. Never reused, survives swap-erase
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
pub struct AgentId(pub u32);

/// Stable identity of a location. Never reused, survives swap-erase
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
pub struct LocationId(pub u32);

impl Display for AgentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

impl Display for LocationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "location#{}", self.0)
    }
}

/// The four classes of location an agent keeps an assignment slot for.
/// Regions, behavior charts and destination labels all use this enum
#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    Eq,
    PartialEq,
    Enum,
    EnumIter,
    EnumString,
    StrumDisplay,
    Deserialize,
    Serialize,
)]
pub enum LocationClass {
    Home,
    School,
    Work,
    Leisure,
}

/// Rewires one assignment slot of an agent, keeping location membership
/// sets and per-location infected counters consistent with it.
///
/// This is the only place assignments are allowed to change.
pub fn set_assignment(
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    agent_id: AgentId,
    class: LocationClass,
    new: Option<LocationId>,
) {
    let (old, infected) = match agents.get(agent_id) {
        Some(agent) => (
            agent.assignments[class],
            agent
                .pandemic
                .as_ref()
                .map(|role| role.stage == Stage::Infected)
                .unwrap_or(false),
        ),
        None => return,
    };
    if old == new {
        return;
    }

    if let Some(old_id) = old {
        if let Some(location) = locations.find_mut(old_id) {
            location.remove_agent(agent_id);
            if infected {
                location.remove_infected_agent();
            }
        }
    }
    if let Some(new_id) = new {
        if let Some(location) = locations.find_mut(new_id) {
            location.add_agent(agent_id);
            if infected {
                location.add_infected_agent();
            }
        }
    }
    if let Some(agent) = agents.get_mut(agent_id) {
        agent.assignments[class] = new;
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::agent::Agent;
    use super::*;
    use crate::geometry::Coordinate;
    use crate::SimulationMode;

    fn small_world() -> (AgentSet, LocationSet, StdRng) {
        let mut rng = StdRng::seed_from_u64(7);
        let mut locations = LocationSet::new();
        for class in [
            LocationClass::Home,
            LocationClass::School,
            LocationClass::Work,
            LocationClass::Leisure,
        ] {
            locations.create_location(class, SimulationMode::Dual, &mut rng);
        }
        (AgentSet::new(16), locations, rng)
    }

    #[test]
    fn set_assignment_moves_membership() {
        let (mut agents, mut locations, mut rng) = small_world();
        let home_a = locations.create_location(LocationClass::Home, SimulationMode::Dual, &mut rng);
        let home_b = locations.create_location(LocationClass::Home, SimulationMode::Dual, &mut rng);
        let id = agents
            .insert_with(|id| {
                Agent::new(
                    id,
                    30,
                    0,
                    Coordinate::new(0.0, 0.0),
                    LocationClass::Home,
                    SimulationMode::Dual,
                    &mut rng,
                )
            })
            .unwrap();

        set_assignment(&mut agents, &mut locations, id, LocationClass::Home, Some(home_a));
        assert!(locations.find(home_a).unwrap().contains(id));

        set_assignment(&mut agents, &mut locations, id, LocationClass::Home, Some(home_b));
        assert!(!locations.find(home_a).unwrap().contains(id));
        assert!(locations.find(home_b).unwrap().contains(id));
        assert_eq!(agents.get(id).unwrap().assignments[LocationClass::Home], Some(home_b));
    }

    #[test]
    fn set_assignment_carries_infected_count() {
        let (mut agents, mut locations, mut rng) = small_world();
        let work_a = locations.create_location(LocationClass::Work, SimulationMode::Dual, &mut rng);
        let work_b = locations.create_location(LocationClass::Work, SimulationMode::Dual, &mut rng);
        let id = agents
            .insert_with(|id| {
                Agent::new(
                    id,
                    30,
                    0,
                    Coordinate::new(0.0, 0.0),
                    LocationClass::Home,
                    SimulationMode::Dual,
                    &mut rng,
                )
            })
            .unwrap();
        set_assignment(&mut agents, &mut locations, id, LocationClass::Work, Some(work_a));

        // Mark the agent infected through its role, mirroring the counter
        if let Some(role) = agents.get_mut(id).unwrap().pandemic.as_mut() {
            role.stage = Stage::Infected;
        }
        locations.find_mut(work_a).unwrap().add_infected_agent();
        assert_eq!(locations.find(work_a).unwrap().num_infected(), 1);

        set_assignment(&mut agents, &mut locations, id, LocationClass::Work, Some(work_b));
        assert_eq!(locations.find(work_a).unwrap().num_infected(), 0);
        assert_eq!(locations.find(work_b).unwrap().num_infected(), 1);
    }
}
