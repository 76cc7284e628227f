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

use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

use crate::geometry::Coordinate;
use crate::models::{AgentId, LocationClass, LocationId};
use crate::SimulationMode;

/// Outbreak status of a single location
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum PandemicStatus {
    Normal,
    Exposure,
    Lockdown,
}

/// Pandemic-facing state of a location
#[derive(Clone, Debug, Serialize)]
pub struct PandemicSite {
    pub status: PandemicStatus,
    num_infected: u32,
}

impl PandemicSite {
    fn new() -> PandemicSite {
        PandemicSite {
            status: PandemicStatus::Normal,
            num_infected: 0,
        }
    }
}

/// Economic-facing state of a location
#[derive(Clone, Debug, Serialize)]
pub struct Commerce {
    value: f64,
    cost: f64,
    daily_value_change: f64,
    yesterday_value_change: f64,
    days_open: u32,
    daily_hire: bool,
    pub sibling: Option<LocationId>,
}

impl Commerce {
    /// Costs are sampled per location class: homes and schools are flat,
    /// businesses and leisure venues vary
    fn new(class: LocationClass, rng: &mut StdRng) -> Commerce {
        let cost = match class {
            LocationClass::Home => 1.0,
            LocationClass::School => 1.0,
            LocationClass::Work => f64::from(rng.gen_range(5..=6u32)),
            LocationClass::Leisure => f64::from(rng.gen_range(3..=7u32)),
        };
        Commerce {
            value: 0.0,
            cost,
            daily_value_change: 0.0,
            yesterday_value_change: 0.0,
            days_open: 0,
            daily_hire: false,
            sibling: None,
        }
    }
}

/// A point in a region holding the set of agents assigned to it, plus the
/// per-layer role state the active simulation mode requires
#[derive(Clone, Debug, Serialize)]
pub struct Location {
    id: LocationId,
    position: Coordinate,
    class: LocationClass,
    agents: HashSet<AgentId>,
    pub pandemic: Option<PandemicSite>,
    pub commerce: Option<Commerce>,
}

impl Location {
    pub fn new(
        id: LocationId,
        position: Coordinate,
        class: LocationClass,
        mode: SimulationMode,
        rng: &mut StdRng,
    ) -> Location {
        Location {
            id,
            position,
            class,
            agents: HashSet::new(),
            pandemic: mode.has_pandemic().then(PandemicSite::new),
            commerce: mode.has_economy().then(|| Commerce::new(class, rng)),
        }
    }

    pub fn id(&self) -> LocationId {
        self.id
    }

    pub fn position(&self) -> Coordinate {
        self.position
    }

    pub fn class(&self) -> LocationClass {
        self.class
    }

    pub fn add_agent(&mut self, agent: AgentId) {
        self.agents.insert(agent);
    }

    pub fn remove_agent(&mut self, agent: AgentId) {
        self.agents.remove(&agent);
    }

    pub fn contains(&self, agent: AgentId) -> bool {
        self.agents.contains(&agent)
    }

    pub fn agents(&self) -> &HashSet<AgentId> {
        &self.agents
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    /// Registers one more infected agent among this location's members.
    /// Locked-down locations stay locked down
    pub fn add_infected_agent(&mut self) {
        if let Some(site) = self.pandemic.as_mut() {
            site.num_infected += 1;
            if site.status != PandemicStatus::Lockdown {
                site.status = PandemicStatus::Exposure;
            }
        }
    }

    /// Removes one infected agent from this location's members
    pub fn remove_infected_agent(&mut self) {
        if let Some(site) = self.pandemic.as_mut() {
            site.num_infected = site.num_infected.saturating_sub(1);
            if site.num_infected == 0 {
                site.status = PandemicStatus::Normal;
            }
        }
    }

    pub fn num_infected(&self) -> u32 {
        self.pandemic.as_ref().map(|site| site.num_infected).unwrap_or(0)
    }

    pub fn pandemic_status(&self) -> PandemicStatus {
        self.pandemic
            .as_ref()
            .map(|site| site.status)
            .unwrap_or(PandemicStatus::Normal)
    }

    pub fn set_pandemic_status(&mut self, status: PandemicStatus) {
        if let Some(site) = self.pandemic.as_mut() {
            site.status = status;
        }
    }

    pub fn value(&self) -> f64 {
        self.commerce.as_ref().map(|shop| shop.value).unwrap_or(0.0)
    }

    pub fn cost(&self) -> f64 {
        self.commerce.as_ref().map(|shop| shop.cost).unwrap_or(0.0)
    }

    pub fn sibling(&self) -> Option<LocationId> {
        self.commerce.as_ref().and_then(|shop| shop.sibling)
    }

    pub fn set_sibling(&mut self, other: Option<LocationId>) {
        if let Some(shop) = self.commerce.as_mut() {
            shop.sibling = other;
        }
    }

    pub fn days_open(&self) -> u32 {
        self.commerce.as_ref().map(|shop| shop.days_open).unwrap_or(0)
    }

    pub fn yesterday_value_change(&self) -> f64 {
        self.commerce
            .as_ref()
            .map(|shop| shop.yesterday_value_change)
            .unwrap_or(0.0)
    }

    /// Adds (or, negative, removes) value, clamping at zero. Returns the
    /// new value. The clamped delta feeds the daily change tracker
    pub fn increment_value(&mut self, amount: f64) -> f64 {
        match self.commerce.as_mut() {
            Some(shop) => {
                let new_value = (shop.value + amount).max(0.0);
                shop.daily_value_change += new_value - shop.value;
                shop.value = new_value;
                shop.value
            }
            None => 0.0,
        }
    }

    /// A business may hire one agent per day, and only after a day whose
    /// takings cleared twice its cost
    pub fn make_hire(&mut self) -> bool {
        match self.commerce.as_mut() {
            Some(shop) => {
                if shop.yesterday_value_change > 2.0 * shop.cost && !shop.daily_hire {
                    shop.daily_hire = true;
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Rolls the daily tracking fields over at midnight
    pub fn start_new_day(&mut self) {
        if let Some(shop) = self.commerce.as_mut() {
            shop.yesterday_value_change = shop.daily_value_change;
            shop.daily_value_change = 0.0;
            shop.daily_hire = false;
            shop.days_open += 1;
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} {} at {}, with {} members",
            self.class,
            self.id,
            self.position,
            self.agents.len()
        )
    }
}
