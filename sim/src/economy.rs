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

use crate::config::{
    HOME_LOSS_PROPORTION, NEW_BUSINESS_COOLDOWN, NEW_BUSINESS_ODDS, WORKDAY_END, WORKDAY_START,
    WORK_LOSS_PROPORTION, WORK_OVERHEAD,
};
use crate::interventions::{Intensity, PolicyFlags};
use crate::models::agent::{AgentSet, EconStatus, Stage};
use crate::models::location::PandemicStatus;
use crate::models::region::LocationSet;
use crate::models::{set_assignment, AgentId, LocationClass, LocationId};
use crate::runtime::GraphicsOp;
use crate::SimulationMode;

/// Rolling totals of the economic layer, refreshed every controller pass
pub struct EconomyState {
    pub agent_value: f64,
    pub business_value: f64,
    previous_value: f64,
    initial_value: f64,
    change_in_value: VecDeque<f64>,
    hours_since_business: u32,
}

impl EconomyState {
    pub fn new(initial_value: f64) -> EconomyState {
        EconomyState {
            agent_value: 0.0,
            business_value: 0.0,
            previous_value: 0.0,
            initial_value,
            change_in_value: VecDeque::from(vec![0.0; 24]),
            hours_since_business: 0,
        }
    }

    pub fn total_value(&self) -> f64 {
        self.agent_value + self.business_value
    }

    pub fn pct_change_last_hour(&self) -> f64 {
        *self.change_in_value.back().unwrap_or(&0.0)
    }

    /// Closes the hour: records the percent change of total value against
    /// the previous pass
    pub fn finish_hour(&mut self) {
        let current = self.total_value();
        let pct_change = if self.previous_value > 0.0 {
            100.0 * (current / self.previous_value - 1.0)
        } else {
            0.0
        };
        self.change_in_value.pop_front();
        self.change_in_value.push_back(pct_change);
    }
}

/// Everything the guarded status transitions need to know about the rest
/// of the simulation
pub struct StatusContext<'a> {
    pub day: u32,
    pub hour: u32,
    pub coupled: bool,
    pub flags: &'a PolicyFlags,
    pub contact_tracing: Option<Intensity>,
    pub num_homeless_infected: u32,
}

impl StatusContext<'_> {
    fn assistance(&self) -> Option<Intensity> {
        if self.coupled {
            self.flags.assistance_level()
        } else {
            None
        }
    }
}

fn stipend(level: Intensity) -> f64 {
    match level {
        Intensity::Strong => 3.0,
        Intensity::Moderate => 2.0,
        Intensity::Weak => 1.0,
    }
}

fn assistance_boost(level: Intensity) -> f64 {
    match level {
        Intensity::Strong => 0.4,
        Intensity::Moderate => 0.25,
        Intensity::Weak => 0.15,
    }
}

fn extra_overhead(level: Intensity) -> f64 {
    match level {
        Intensity::Strong => 0.2,
        Intensity::Moderate => 0.125,
        Intensity::Weak => 0.075,
    }
}

fn agent_stage(agents: &AgentSet, id: AgentId) -> Option<Stage> {
    agents
        .get(id)
        .and_then(|agent| agent.pandemic.as_ref())
        .map(|role| role.stage)
}

/// The only path into HOMELESS. Vetoed on day zero and, in coupled mode,
/// while the pandemic layer forbids moving the agent
pub fn make_homeless(
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    id: AgentId,
    ctx: &StatusContext,
) {
    if ctx.day == 0 || !agents.get(id).map(|a| a.is_adult()).unwrap_or(false) {
        return;
    }
    if ctx.coupled && status_transition_vetoed(agents, id, ctx) {
        return;
    }
    let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) else {
        return;
    };
    role.status = match role.status {
        EconStatus::Unemployed | EconStatus::Both => EconStatus::Both,
        _ => EconStatus::Homeless,
    };
    set_assignment(agents, locations, id, LocationClass::Home, None);
}

/// The only path into UNEMPLOYED. Fires exclusively when the agent's
/// business folds, so the work slot is always cleared; only adults carry
/// the unemployed status
pub fn make_unemployed(
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    id: AgentId,
    ctx: &StatusContext,
) {
    if ctx.day == 0 {
        return;
    }
    let adult = agents.get(id).map(|a| a.is_adult()).unwrap_or(false);
    if adult {
        let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) else {
            return;
        };
        role.status = match role.status {
            EconStatus::Homeless | EconStatus::Both => EconStatus::Both,
            _ => EconStatus::Unemployed,
        };
    }
    set_assignment(agents, locations, id, LocationClass::Work, None);
}

/// Quarantined infected agents, traced exposed agents, and anyone at all
/// while the shelter has an outbreak cannot be pushed into
/// homelessness/unemployment
fn status_transition_vetoed(agents: &AgentSet, id: AgentId, ctx: &StatusContext) -> bool {
    if ctx.num_homeless_infected > 0 {
        return true;
    }
    match agent_stage(agents, id) {
        Some(Stage::Infected) if ctx.flags.quarantine_when_infected => true,
        Some(Stage::Exposed) if ctx.contact_tracing.is_some() => true,
        _ => false,
    }
}

/// Hourly overhead sweep over every business, oldest first in reverse
/// slot order. Pays assistance in coupled mode and bankrupts anything
/// that hits zero
pub fn business_overhead_pass(
    state: &mut EconomyState,
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    ctx: &StatusContext,
    rng: &mut StdRng,
    ops: &mut Vec<GraphicsOp>,
) {
    state.previous_value = state.business_value + state.agent_value;
    if state.previous_value == 0.0 {
        state.previous_value = state.initial_value;
    }
    state.business_value = 0.0;
    state.agent_value = 0.0;

    let workday = ctx.hour >= WORKDAY_START && ctx.hour < WORKDAY_END;
    let assistance = ctx.assistance();

    let ids: Vec<LocationId> = locations
        .region(LocationClass::Work)
        .locations()
        .iter()
        .map(|location| location.id())
        .rev()
        .collect();
    for id in ids {
        let Some(location) = locations.find(id) else {
            continue;
        };
        let locked_down = location.pandemic_status() == PandemicStatus::Lockdown;
        let members: Vec<AgentId> = location.agents().iter().copied().collect();

        if workday {
            if let Some(shop) = locations.find_mut(id) {
                shop.increment_value(-WORK_OVERHEAD);
            }
            if let Some(level) = assistance {
                if locked_down {
                    // Locked-down businesses and their staff are propped up
                    let cost = locations.find(id).map(|l| l.cost()).unwrap_or(0.0);
                    if let Some(shop) = locations.find_mut(id) {
                        shop.increment_value(assistance_boost(level) * WORK_OVERHEAD);
                    }
                    for worker in members {
                        if let Some(role) =
                            agents.get_mut(worker).and_then(|a| a.economy.as_mut())
                        {
                            role.increment_value(assistance_boost(level) * cost);
                        }
                    }
                } else if let Some(shop) = locations.find_mut(id) {
                    shop.increment_value(-extra_overhead(level) * WORK_OVERHEAD);
                }
            }
        }

        let value = locations.find(id).map(|l| l.value()).unwrap_or(0.0);
        state.business_value += value;
        if value == 0.0 {
            bankrupt_business(agents, locations, id, ctx, rng, ops);
        }
    }
}

/// Closes a business: staff become unemployed, the WORK/LEISURE sibling
/// pair is destroyed atomically, and the leisure venue's customers are
/// scattered over the surviving venues
pub fn bankrupt_business(
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    work_id: LocationId,
    ctx: &StatusContext,
    rng: &mut StdRng,
    ops: &mut Vec<GraphicsOp>,
) -> bool {
    let (days_open, sibling, employees) = match locations.find(work_id) {
        Some(location) => (
            location.days_open(),
            location.sibling(),
            location.agents().iter().copied().collect::<Vec<_>>(),
        ),
        None => return false,
    };
    if ctx.day == 0 || days_open < 2 {
        return false;
    }
    debug!("Bankrupting {} after {} days open", work_id, days_open);

    for employee in employees {
        make_unemployed(agents, locations, employee, ctx);
    }

    let customers: Vec<AgentId> = sibling
        .and_then(|id| locations.find(id))
        .map(|venue| venue.agents().iter().copied().collect())
        .unwrap_or_default();

    if let Some(leisure_id) = sibling {
        locations
            .region_mut(LocationClass::Leisure)
            .remove_location(leisure_id);
        ops.push(GraphicsOp::RemoveLocation(leisure_id));
    }
    locations
        .region_mut(LocationClass::Work)
        .remove_location(work_id);
    ops.push(GraphicsOp::RemoveLocation(work_id));

    for customer in customers {
        let replacement = locations.random_location(LocationClass::Leisure, rng);
        set_assignment(agents, locations, customer, LocationClass::Leisure, replacement);
    }
    true
}

/// The location a labeled flow charges: the scheduler's hourly target if
/// one exists, otherwise the agent's own assignment of that class
fn labeled_location(agents: &AgentSet, id: AgentId, class: LocationClass) -> Option<LocationId> {
    let agent = agents.get(id)?;
    agent.hourly_target.or(agent.assignments[class])
}

fn home_update(
    state: &mut EconomyState,
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    id: AgentId,
    ctx: &StatusContext,
    rng: &mut StdRng,
) -> f64 {
    let (status, value, adult, stage) = match agents.get(id) {
        Some(agent) => match agent.economy.as_ref() {
            Some(role) => (
                role.status,
                role.value,
                agent.is_adult(),
                agent.pandemic.as_ref().map(|p| p.stage),
            ),
            None => return 0.0,
        },
        None => return 0.0,
    };
    let assistance = ctx.assistance();

    if status.is_homeless() {
        // Infectious homeless agents stay out of the housing market while
        // any lockdown tier is active
        let blocked = ctx.coupled
            && ctx.flags.lockdown_level().is_some()
            && matches!(stage, Some(Stage::Exposed) | Some(Stage::Infected));
        if !blocked && rng.gen_range(0..100u32) < 10 {
            if let Some(home_id) = locations.random_location(LocationClass::Home, rng) {
                let cost = locations.find(home_id).map(|l| l.cost()).unwrap_or(0.0);
                if value > 2.0 * cost {
                    set_assignment(agents, locations, id, LocationClass::Home, Some(home_id));
                    if let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) {
                        role.status = match role.status {
                            EconStatus::Both => EconStatus::Unemployed,
                            _ => EconStatus::Normal,
                        };
                    }
                }
            }
        }
        if let Some(level) = assistance {
            if let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) {
                role.increment_value(stipend(level));
            }
        }
        return 0.0;
    }

    let cost = labeled_location(agents, id, LocationClass::Home)
        .and_then(|lid| locations.find(lid))
        .map(|home| home.cost());
    let Some(cost) = cost else {
        return 0.0;
    };

    if adult && value >= cost {
        if let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) {
            role.decrement_value(cost);
            if let Some(level) = assistance {
                // Assistance is financed by an extra rent proportion on
                // housed adults
                role.decrement_value(extra_overhead(level) * cost);
            }
        }
        return cost * HOME_LOSS_PROPORTION;
    } else if adult {
        make_homeless(agents, locations, id, ctx);
    }
    0.0
}

fn school_update(agents: &mut AgentSet, locations: &LocationSet, id: AgentId) {
    let cost = labeled_location(agents, id, LocationClass::School)
        .and_then(|lid| locations.find(lid))
        .map(|school| school.cost());
    let Some(cost) = cost else {
        return;
    };
    if let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) {
        role.increment_value(cost);
    }
}

fn work_update(
    state: &mut EconomyState,
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    id: AgentId,
    ctx: &StatusContext,
    rng: &mut StdRng,
    ops: &mut Vec<GraphicsOp>,
) {
    let status = match agents.get(id).and_then(|a| a.economy.as_ref()) {
        Some(role) => role.status,
        None => return,
    };

    if status.is_unemployed() {
        if rng.gen_range(0..100u32) < 20 {
            let windfall = f64::from(rng.gen_range(1..=5u32));
            if let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) {
                role.increment_value(windfall);
            }
        }
        if let Some(level) = ctx.assistance() {
            if let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) {
                if role.can_receive_unemployment() {
                    role.increment_value(stipend(level));
                }
            }
        }
        if let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) {
            role.record_unemployment_hour();
        }

        // A shot at a new job at a random business that hired well enough
        // yesterday
        if let Some(job_id) = locations.random_location(LocationClass::Work, rng) {
            let can_hire = locations
                .find_mut(job_id)
                .map(|shop| shop.make_hire())
                .unwrap_or(false);
            if can_hire && rng.gen_range(0..2u32) == 0 {
                set_assignment(agents, locations, id, LocationClass::Work, Some(job_id));
                if let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) {
                    role.status = match role.status {
                        EconStatus::Both => EconStatus::Homeless,
                        _ => EconStatus::Normal,
                    };
                }
            }
        }
        return;
    }

    let Some(work_id) = labeled_location(agents, id, LocationClass::Work) else {
        return;
    };
    let (work_value, work_cost) = match locations.find(work_id) {
        Some(shop) => (shop.value(), shop.cost()),
        None => return,
    };
    if work_value > work_cost {
        if let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) {
            role.increment_value(work_cost);
            role.record_employment_hour();
        }
        if let Some(shop) = locations.find_mut(work_id) {
            shop.increment_value(-WORK_LOSS_PROPORTION * work_cost);
        }
        state.business_value = (state.business_value - WORK_LOSS_PROPORTION * work_cost).max(0.0);
    } else {
        // A business that cannot pay its workers folds
        bankrupt_business(agents, locations, work_id, ctx, rng, ops);
    }
}

fn leisure_update(
    state: &mut EconomyState,
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    id: AgentId,
    rng: &mut StdRng,
) {
    // The venue may have vanished through a bankruptcy earlier in this
    // same pass; that is not an error
    let venue = labeled_location(agents, id, LocationClass::Leisure)
        .and_then(|lid| locations.find(lid))
        .map(|venue| (venue.cost(), venue.sibling()));
    let Some((cost, sibling)) = venue else {
        return;
    };
    let (status, value) = match agents.get(id).and_then(|a| a.economy.as_ref()) {
        Some(role) => (role.status, role.value),
        None => return,
    };

    if status.is_homeless() {
        if rng.gen_range(0..2u32) == 0 {
            if let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) {
                role.decrement_value(1.0);
            }
            if let Some(shop) = sibling.and_then(|sid| locations.find_mut(sid)) {
                shop.increment_value(cost);
                state.business_value += cost;
            }
        }
        return;
    }

    if value > cost {
        if let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) {
            role.decrement_value(cost);
        }
        if let Some(shop) = sibling.and_then(|sid| locations.find_mut(sid)) {
            shop.increment_value(cost);
            state.business_value += cost;
        }
    }
}

/// Hourly economic update for one agent, dispatched on the destination
/// label the scheduler chose. Returns this agent's contribution to the
/// redistribution bucket
pub fn agent_update(
    state: &mut EconomyState,
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    id: AgentId,
    ctx: &StatusContext,
    rng: &mut StdRng,
    ops: &mut Vec<GraphicsOp>,
) -> f64 {
    let label = match agents.get(id) {
        Some(agent) if agent.economy.is_some() => agent.destination_label,
        _ => return 0.0,
    };
    let redistributed = match label {
        LocationClass::Home => home_update(state, agents, locations, id, ctx, rng),
        LocationClass::School => {
            school_update(agents, locations, id);
            0.0
        }
        LocationClass::Work => {
            work_update(state, agents, locations, id, ctx, rng, ops);
            0.0
        }
        LocationClass::Leisure => {
            leisure_update(state, agents, locations, id, rng);
            0.0
        }
    };
    if let Some(role) = agents.get(id).and_then(|a| a.economy.as_ref()) {
        state.agent_value += role.value;
    }
    redistributed
}

/// Founds a WORK/LEISURE sibling pair, staffs it, and seeds its customer
/// base
pub fn generate_new_business(
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    mode: SimulationMode,
    rng: &mut StdRng,
    ops: &mut Vec<GraphicsOp>,
) -> (LocationId, LocationId) {
    let work_id = locations.create_location(LocationClass::Work, mode, rng);
    let leisure_id = locations.create_location(LocationClass::Leisure, mode, rng);
    if let Some(work) = locations.find_mut(work_id) {
        work.set_sibling(Some(leisure_id));
        work.increment_value(f64::from(rng.gen_range(500..700u32)));
    }
    if let Some(leisure) = locations.find_mut(leisure_id) {
        leisure.set_sibling(Some(work_id));
    }
    ops.push(GraphicsOp::AddLocation(work_id));
    ops.push(GraphicsOp::AddLocation(leisure_id));
    info!("Founded new business {} with venue {}", work_id, leisure_id);

    // Staff it: up to five unemployed agents, or poach a few employed
    // ones when no one is looking for work
    let unemployed: Vec<AgentId> = agents
        .iter()
        .filter(|agent| {
            agent
                .economy
                .as_ref()
                .map(|role| role.status.is_unemployed())
                .unwrap_or(false)
        })
        .map(|agent| agent.id())
        .collect();
    if !unemployed.is_empty() {
        for id in unemployed.into_iter().take(5) {
            set_assignment(agents, locations, id, LocationClass::Work, Some(work_id));
            if let Some(role) = agents.get_mut(id).and_then(|a| a.economy.as_mut()) {
                role.status = match role.status {
                    EconStatus::Both => EconStatus::Homeless,
                    _ => EconStatus::Normal,
                };
            }
        }
    } else if !agents.is_empty() {
        for _ in 0..3.min(agents.len()) {
            let poached = agents.id_at(rng.gen_range(0..agents.len()));
            set_assignment(agents, locations, poached, LocationClass::Work, Some(work_id));
        }
    }

    // Anyone without a venue adopts the new one; then top up to a random
    // membership of 3..=12
    let mut count = 0i64;
    for id in agents.ids() {
        let missing = agents
            .get(id)
            .map(|agent| agent.assignments[LocationClass::Leisure].is_none())
            .unwrap_or(false);
        if missing {
            set_assignment(agents, locations, id, LocationClass::Leisure, Some(leisure_id));
            count += 1;
        }
    }
    let desired = i64::from(rng.gen_range(3..=12u32));
    let extra = (desired - count).max(0).min(agents.len() as i64);
    for _ in 0..extra {
        let customer = agents.id_at(rng.gen_range(0..agents.len()));
        set_assignment(agents, locations, customer, LocationClass::Leisure, Some(leisure_id));
    }

    (work_id, leisure_id)
}

/// End-of-pass bookkeeping: a chance at a new business once the count has
/// dipped below target, then the redistribution bucket is split over the
/// receiving businesses
pub fn finish_pass(
    state: &mut EconomyState,
    agents: &mut AgentSet,
    locations: &mut LocationSet,
    redistributed: f64,
    business_target: usize,
    mode: SimulationMode,
    rng: &mut StdRng,
    ops: &mut Vec<GraphicsOp>,
) {
    state.hours_since_business += 1;
    if locations.region(LocationClass::Work).num_locations() < business_target
        && rng.gen_range(0..NEW_BUSINESS_ODDS) == 0
        && state.hours_since_business > NEW_BUSINESS_COOLDOWN
    {
        generate_new_business(agents, locations, mode, rng, ops);
        state.hours_since_business = 0;
    }

    let coupled = mode == SimulationMode::Dual;
    let recipients: Vec<LocationId> = locations
        .region(LocationClass::Work)
        .locations()
        .iter()
        .filter(|location| !coupled || location.pandemic_status() != PandemicStatus::Lockdown)
        .map(|location| location.id())
        .collect();
    if recipients.is_empty() || redistributed <= 0.0 {
        return;
    }
    state.business_value += redistributed;
    let share = redistributed / recipients.len() as f64;
    for id in recipients {
        if let Some(shop) = locations.find_mut(id) {
            shop.increment_value(share);
        }
    }
}
