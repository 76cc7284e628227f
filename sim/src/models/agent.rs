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

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use enum_map::EnumMap;
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

use crate::config::{ADULT_AGE, BASE_SPEED, MAX_CREEP, TRAVEL_FRAMES};
use crate::geometry::Coordinate;
use crate::models::{AgentId, LocationClass, LocationId};
use crate::SimulationMode;

/// Epidemic stage of a single agent
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Stage {
    Susceptible,
    Exposed,
    Infected,
    Recovered,
}

/// Baseline health, sampled at birth, 50/25/15/10
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Health {
    Healthy,
    Moderate,
    Poor,
    VeryPoor,
}

impl Health {
    pub fn sample(rng: &mut StdRng) -> Health {
        match rng.gen_range(0..100u32) {
            0..=49 => Health::Healthy,
            50..=74 => Health::Moderate,
            75..=89 => Health::Poor,
            _ => Health::VeryPoor,
        }
    }

    /// Divisor applied to the agent's survival odds
    pub fn survival_divisor(self) -> f64 {
        match self {
            Health::Healthy => 1.0,
            Health::Moderate => 2.0,
            Health::Poor => 3.0,
            Health::VeryPoor => 4.0,
        }
    }
}

/// Pandemic-facing state of an agent
#[derive(Clone, Debug, Serialize)]
pub struct PandemicRole {
    pub stage: Stage,
    pub health: Health,
    pub days_in_stage: i32,
    pub nearby_infected: u32,
    pub compliant: bool,
}

impl PandemicRole {
    fn new(rng: &mut StdRng) -> PandemicRole {
        PandemicRole {
            stage: Stage::Susceptible,
            health: Health::sample(rng),
            days_in_stage: 0,
            nearby_infected: 0,
            compliant: true,
        }
    }
}

/// Housing/employment standing of a single agent
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum EconStatus {
    Normal,
    Unemployed,
    Homeless,
    Both,
}

impl EconStatus {
    pub fn is_homeless(self) -> bool {
        matches!(self, EconStatus::Homeless | EconStatus::Both)
    }

    pub fn is_unemployed(self) -> bool {
        matches!(self, EconStatus::Unemployed | EconStatus::Both)
    }
}

/// Economic-facing state of an agent
#[derive(Clone, Debug, Serialize)]
pub struct EconomicRole {
    pub value: f64,
    pub status: EconStatus,
    pub hours_of_employment: u32,
    pub hours_of_unemployment: u32,
}

impl EconomicRole {
    fn new() -> EconomicRole {
        EconomicRole {
            value: 0.0,
            status: EconStatus::Normal,
            hours_of_employment: 0,
            hours_of_unemployment: 0,
        }
    }

    pub fn increment_value(&mut self, amount: f64) -> f64 {
        self.value += amount;
        self.value
    }

    pub fn decrement_value(&mut self, amount: f64) -> f64 {
        self.value = (self.value - amount).max(0.0);
        self.value
    }

    /// After three full days of work the unemployment counters reset and
    /// the agent becomes eligible for support again
    pub fn record_employment_hour(&mut self) {
        self.hours_of_employment += 1;
        if self.hours_of_employment > 3 * 24 {
            self.hours_of_unemployment = 0;
            self.hours_of_employment = 0;
        }
    }

    pub fn record_unemployment_hour(&mut self) {
        self.hours_of_unemployment += 1;
    }

    pub fn can_receive_unemployment(&self) -> bool {
        self.hours_of_unemployment < 7 * 24
    }
}

/// A single inhabitant of the town
#[derive(Clone, Debug, Serialize)]
pub struct Agent {
    id: AgentId,
    pub age: u32,
    /// Index into the adult or child pool of the behavior catalog,
    /// depending on the agent's age
    pub behavior: usize,
    pub position: Coordinate,
    destination: Coordinate,
    speed: f64,
    /// Class label the scheduler chose for this hour. The economic layer
    /// keys its value flows on this, not on physical position
    pub destination_label: LocationClass,
    /// Location the scheduler chose for this hour, when one exists
    pub hourly_target: Option<LocationId>,
    pub assignments: EnumMap<LocationClass, Option<LocationId>>,
    pub pandemic: Option<PandemicRole>,
    pub economy: Option<EconomicRole>,
}

impl Agent {
    pub fn new(
        id: AgentId,
        age: u32,
        behavior: usize,
        position: Coordinate,
        starting_label: LocationClass,
        mode: SimulationMode,
        rng: &mut StdRng,
    ) -> Agent {
        Agent {
            id,
            age,
            behavior,
            position,
            destination: position,
            speed: BASE_SPEED,
            destination_label: starting_label,
            hourly_target: None,
            assignments: EnumMap::default(),
            pandemic: mode.has_pandemic().then(|| PandemicRole::new(rng)),
            economy: mode.has_economy().then(EconomicRole::new),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn is_adult(&self) -> bool {
        self.age >= ADULT_AGE
    }

    pub fn destination(&self) -> Coordinate {
        self.destination
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Targets a location for the hour. Speed scales so the trip finishes
    /// within `TRAVEL_FRAMES` frames
    pub fn set_destination(
        &mut self,
        target: Option<LocationId>,
        position: Coordinate,
        label: LocationClass,
    ) {
        self.hourly_target = target;
        self.destination_label = label;
        self.set_travel_point(position);
    }

    /// Moves the physical travel point without touching the hourly target
    /// or its label. Working-from-home redirection uses this
    pub fn set_travel_point(&mut self, position: Coordinate) {
        self.destination = position;
        let dist = self.position.distance_to(self.destination);
        self.speed = (dist / TRAVEL_FRAMES).max(BASE_SPEED);
    }

    /// One spatial step: creep randomly once near the destination,
    /// otherwise head straight for it
    pub fn take_time_step(&mut self, rng: &mut StdRng) {
        if self.position.distance_to(self.destination) < MAX_CREEP {
            self.speed = BASE_SPEED;
            self.position.x += f64::from(rng.gen_range(0..3i32) - 1);
            self.position.y += f64::from(rng.gen_range(0..3i32) - 1);
        } else {
            let heading = self.position.heading_to(self.destination);
            self.position.x += heading.x * self.speed;
            self.position.y += heading.y * self.speed;
        }
    }

    /// Increments the agent's age by one year, returning the new age
    pub fn increment_age(&mut self) -> u32 {
        self.age += 1;
        self.age
    }
}

impl Display for Agent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} age {} at {} heading for {:?}",
            self.id, self.age, self.position, self.destination_label
        )
    }
}

/// The arena every live agent resides in. Ids are stable; slots are
/// recycled by swap-erase, so controller loops walk indices in reverse
pub struct AgentSet {
    agents: Vec<Agent>,
    index: HashMap<AgentId, usize>,
    next_id: u32,
    max_population: usize,
}

impl AgentSet {
    pub fn new(max_population: usize) -> AgentSet {
        AgentSet {
            agents: Vec::with_capacity(max_population),
            index: HashMap::with_capacity(max_population),
            next_id: 0,
            max_population,
        }
    }

    /// Allocates an id and inserts the built agent, refusing once the
    /// population cap is reached
    pub fn insert_with(&mut self, build: impl FnOnce(AgentId) -> Agent) -> Option<AgentId> {
        if self.agents.len() >= self.max_population {
            return None;
        }
        let id = AgentId(self.next_id);
        self.next_id += 1;
        self.index.insert(id, self.agents.len());
        self.agents.push(build(id));
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.index.get(&id).map(|&i| &self.agents[i])
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        match self.index.get(&id) {
            Some(&i) => Some(&mut self.agents[i]),
            None => None,
        }
    }

    pub fn at(&self, index: usize) -> &Agent {
        &self.agents[index]
    }

    pub fn at_mut(&mut self, index: usize) -> &mut Agent {
        &mut self.agents[index]
    }

    pub fn id_at(&self, index: usize) -> AgentId {
        self.agents[index].id()
    }

    /// Swap-erases the slot at `index`. The displaced tail agent keeps its
    /// id; only its slot moves
    pub fn remove_at(&mut self, index: usize) -> Agent {
        let victim = self.agents.swap_remove(index);
        self.index.remove(&victim.id());
        if index < self.agents.len() {
            self.index.insert(self.agents[index].id(), index);
        }
        victim
    }

    pub fn remove(&mut self, id: AgentId) -> Option<Agent> {
        let index = *self.index.get(&id)?;
        Some(self.remove_at(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    /// Raw slice access for the parallel proximity sweep
    pub fn as_mut_slice(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.agents.iter_mut()
    }

    /// Snapshot of every live id, in slot order
    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(Agent::id).collect()
    }
}
