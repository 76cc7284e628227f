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

use rand::rngs::StdRng;
use rand::Rng;
use strum::IntoEnumIterator;

use crate::behavior::BehaviorCatalog;
use crate::config::RANDOM_DESTINATION_CHANCE;
use crate::interventions::{Intensity, InterventionToggles, PolicyFlags};
use crate::models::agent::{AgentSet, Stage};
use crate::models::location::PandemicStatus;
use crate::models::region::LocationSet;
use crate::models::LocationClass;

/// Read-only context the pandemic policy gates consult while steering an
/// agent's hourly destination
pub struct GateContext<'a> {
    pub flags: &'a PolicyFlags,
    pub toggles: &'a InterventionToggles,
    /// Outbreak size at the homeless shelter, for contact tracing of
    /// agents with no home
    pub num_homeless_infected: u32,
}

/// One compliance draw: the graded chance that an agent ignores the
/// self-enforced measures this hour
pub fn will_comply(flags: &PolicyFlags, rng: &mut StdRng) -> bool {
    match flags.compliance_level() {
        Some(Intensity::Strong) => rng.gen_range(0..2u32) != 0,
        Some(Intensity::Moderate) => rng.gen_range(0..4u32) != 0,
        Some(Intensity::Weak) => rng.gen_range(0..8u32) != 0,
        None => true,
    }
}

/// Sends the agent to its home assignment, or the homeless shelter when
/// it has none. The hour's label becomes Home
pub fn send_home(agents: &mut AgentSet, locations: &LocationSet, index: usize, rng: &mut StdRng) {
    let home = agents.at(index).assignments[LocationClass::Home];
    let resolved = home
        .and_then(|id| locations.find(id))
        .or_else(|| locations.shelter());
    match resolved {
        Some(location) => {
            let (id, position) = (location.id(), location.position());
            agents
                .at_mut(index)
                .set_destination(Some(id), position, LocationClass::Home);
        }
        None => {
            let position = locations.region(LocationClass::Home).random_coordinate(rng);
            agents
                .at_mut(index)
                .set_destination(None, position, LocationClass::Home);
        }
    }
}

/// The plain destination update: mostly the agent's assignment of the
/// chosen class, with a small chance of a random location of that class.
/// A missing assignment falls back to a one-shot anonymous point inside
/// the class region
pub fn base_destination_update(
    agents: &mut AgentSet,
    locations: &LocationSet,
    index: usize,
    class: LocationClass,
    random_allowed: bool,
    rng: &mut StdRng,
) {
    let target = if random_allowed && rng.gen_range(0..100u32) < RANDOM_DESTINATION_CHANCE {
        locations.random_location(class, rng)
    } else {
        agents.at(index).assignments[class]
    };
    match target.and_then(|id| locations.find(id)) {
        Some(location) => {
            let (id, position) = (location.id(), location.position());
            agents.at_mut(index).set_destination(Some(id), position, class);
        }
        None => {
            let position = locations.region(class).random_coordinate(rng);
            agents.at_mut(index).set_destination(None, position, class);
        }
    }
}

/// Turns a locked-down choice around: school and work close outright,
/// leisure gets one more try at a random venue before the agent gives up
/// and goes home
fn enforce_lockdown(
    agents: &mut AgentSet,
    locations: &LocationSet,
    index: usize,
    rng: &mut StdRng,
) {
    let target = agents.at(index).hourly_target;
    let Some(location) = target.and_then(|id| locations.find(id)) else {
        return;
    };
    if location.pandemic_status() != PandemicStatus::Lockdown {
        return;
    }
    match location.class() {
        LocationClass::School | LocationClass::Work => send_home(agents, locations, index, rng),
        LocationClass::Leisure => {
            let retry = locations
                .random_location(LocationClass::Leisure, rng)
                .and_then(|id| locations.find(id));
            match retry {
                Some(alternative)
                    if alternative.pandemic_status() != PandemicStatus::Lockdown =>
                {
                    let (id, position) = (alternative.id(), alternative.position());
                    agents
                        .at_mut(index)
                        .set_destination(Some(id), position, LocationClass::Leisure);
                }
                _ => send_home(agents, locations, index, rng),
            }
        }
        LocationClass::Home => {}
    }
}

/// Work/school/leisure from home: the agent physically stays home but the
/// hour keeps its destination label, so the economic layer still sees the
/// labeled flow
fn apply_ecommerce(
    agents: &mut AgentSet,
    locations: &LocationSet,
    index: usize,
    level: Option<Intensity>,
    rng: &mut StdRng,
) -> bool {
    let Some(level) = level else {
        return false;
    };
    let (label, home) = {
        let agent = agents.at(index);
        (agent.destination_label, agent.assignments[LocationClass::Home])
    };
    if label == LocationClass::Home {
        return false;
    }
    let Some(home_position) = home.and_then(|id| locations.find(id)).map(|l| l.position()) else {
        return false;
    };
    let chance = match level {
        Intensity::Strong => 75,
        Intensity::Moderate => 50,
        Intensity::Weak => 25,
    };
    if rng.gen_range(0..100u32) < chance {
        agents.at_mut(index).set_travel_point(home_position);
        true
    } else {
        false
    }
}

fn enforce_quarantine(
    agents: &mut AgentSet,
    locations: &LocationSet,
    index: usize,
    flags: &PolicyFlags,
    rng: &mut StdRng,
) {
    if !flags.quarantine_when_infected {
        return;
    }
    let infected = agents.at(index).pandemic.as_ref().map(|role| role.stage) == Some(Stage::Infected);
    if infected {
        send_home(agents, locations, index, rng);
    }
}

/// Agents whose assignments carry any infection are steered home with a
/// tier-graded probability. Homeless agents trace against the shelter
/// outbreak instead of a home location
fn enforce_contact_tracing(
    agents: &mut AgentSet,
    locations: &LocationSet,
    index: usize,
    level: Option<Intensity>,
    num_homeless_infected: u32,
    rng: &mut StdRng,
) {
    let Some(level) = level else {
        return;
    };
    let exposed = {
        let agent = agents.at(index);
        let mut exposed =
            agent.assignments[LocationClass::Home].is_none() && num_homeless_infected > 0;
        for class in LocationClass::iter() {
            if let Some(location) = agent.assignments[class].and_then(|id| locations.find(id)) {
                if location.num_infected() > 0 {
                    exposed = true;
                }
            }
        }
        exposed
    };
    if !exposed {
        return;
    }
    let go_home = match level {
        Intensity::Strong => true,
        Intensity::Moderate => rng.gen_range(0..4u32) != 3,
        Intensity::Weak => rng.gen_range(0..2u32) == 0,
    };
    if go_home {
        send_home(agents, locations, index, rng);
    }
}

/// Government guidelines thin out leisure trips only
fn enforce_guidelines(
    agents: &mut AgentSet,
    locations: &LocationSet,
    index: usize,
    level: Option<Intensity>,
    rng: &mut StdRng,
) {
    let Some(level) = level else {
        return;
    };
    if agents.at(index).destination_label != LocationClass::Leisure {
        return;
    }
    let go_home = match level {
        Intensity::Strong => rng.gen_range(0..2u32) != 0,
        Intensity::Moderate => rng.gen_range(0..10u32) < 6,
        Intensity::Weak => rng.gen_range(0..4u32) == 0,
    };
    if go_home {
        send_home(agents, locations, index, rng);
    }
}

/// Hourly destination update for one agent: sample the behavior chart,
/// run the plain update, then (when the pandemic layer is active) pass
/// the choice through the policy gates in order
pub fn update_single_destination(
    catalog: &BehaviorCatalog,
    agents: &mut AgentSet,
    locations: &LocationSet,
    index: usize,
    hour: u32,
    gates: Option<&GateContext>,
    rng: &mut StdRng,
) {
    let (behavior, adult) = {
        let agent = agents.at(index);
        (agent.behavior, agent.is_adult())
    };

    // A total lockdown overrides the chart entirely
    if let Some(gates) = gates {
        if gates.flags.total_lockdown {
            send_home(agents, locations, index, rng);
            return;
        }
    }

    let class = match catalog.assignment_at(behavior, adult, hour) {
        Some(assignment) => assignment.sample(rng),
        None => return,
    };

    let Some(gates) = gates else {
        base_destination_update(agents, locations, index, class, true, rng);
        return;
    };

    let compliant = will_comply(gates.flags, rng);
    let random_allowed = !(compliant
        && matches!(
            gates.flags.guidelines_level(),
            Some(Intensity::Moderate) | Some(Intensity::Strong)
        ));
    base_destination_update(agents, locations, index, class, random_allowed, rng);

    if let Some(role) = agents.at_mut(index).pandemic.as_mut() {
        role.compliant = compliant;
    }
    if !compliant {
        return;
    }

    enforce_lockdown(agents, locations, index, rng);
    let working_from_home =
        apply_ecommerce(agents, locations, index, gates.flags.ecommerce_level(), rng);
    if !working_from_home {
        enforce_quarantine(agents, locations, index, gates.flags, rng);
        enforce_contact_tracing(
            agents,
            locations,
            index,
            gates.toggles.contact_tracing,
            gates.num_homeless_infected,
            rng,
        );
        enforce_guidelines(agents, locations, index, gates.flags.guidelines_level(), rng);
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use tempfile::TempDir;

    use super::*;
    use crate::geometry::Coordinate;
    use crate::models::agent::Agent;
    use crate::models::set_assignment;
    use crate::models::AgentId;
    use crate::SimulationMode;

    fn catalog() -> (BehaviorCatalog, TempDir) {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("adult_worker.json"),
            r#"{"Probability": 1.0, "0": "Home", "9": "Work", "18": "Leisure"}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("child_student.json"),
            r#"{"Probability": 1.0, "0": "Home", "8": "School"}"#,
        )
        .unwrap();
        let catalog = BehaviorCatalog::load(dir.path().to_str().unwrap()).unwrap();
        (catalog, dir)
    }

    fn world() -> (AgentSet, LocationSet, StdRng) {
        let mut rng = StdRng::seed_from_u64(31);
        let mut locations = LocationSet::new();
        for class in LocationClass::iter() {
            locations.create_location(class, SimulationMode::Dual, &mut rng);
        }
        locations.create_shelter(&mut rng);
        (AgentSet::new(32), locations, rng)
    }

    fn spawn_assigned(
        agents: &mut AgentSet,
        locations: &mut LocationSet,
        rng: &mut StdRng,
    ) -> AgentId {
        let id = agents
            .insert_with(|id| {
                Agent::new(
                    id,
                    30,
                    0,
                    Coordinate::new(20.0, 20.0),
                    LocationClass::Home,
                    SimulationMode::Dual,
                    rng,
                )
            })
            .unwrap();
        for class in LocationClass::iter() {
            let target = locations.region(class).locations()[0].id();
            set_assignment(agents, locations, id, class, Some(target));
        }
        id
    }

    #[test]
    fn total_lockdown_sends_everyone_home() {
        let (catalog, _dir) = catalog();
        let (mut agents, mut locations, mut rng) = world();
        let id = spawn_assigned(&mut agents, &mut locations, &mut rng);
        let mut flags = PolicyFlags::default();
        flags.total_lockdown = true;
        let toggles = InterventionToggles::default();
        let gates = GateContext {
            flags: &flags,
            toggles: &toggles,
            num_homeless_infected: 0,
        };

        update_single_destination(&catalog, &mut agents, &locations, 0, 9, Some(&gates), &mut rng);
        let agent = agents.get(id).unwrap();
        assert_eq!(agent.destination_label, LocationClass::Home);
        assert_eq!(agent.hourly_target, agent.assignments[LocationClass::Home]);
    }

    #[test]
    fn quarantine_redirects_infected_agents_home() {
        let (catalog, _dir) = catalog();
        let (mut agents, mut locations, mut rng) = world();
        let id = spawn_assigned(&mut agents, &mut locations, &mut rng);
        if let Some(role) = agents.get_mut(id).unwrap().pandemic.as_mut() {
            role.stage = Stage::Infected;
        }
        let mut flags = PolicyFlags::default();
        flags.quarantine_when_infected = true;
        let toggles = InterventionToggles::default();
        let gates = GateContext {
            flags: &flags,
            toggles: &toggles,
            num_homeless_infected: 0,
        };

        update_single_destination(&catalog, &mut agents, &locations, 0, 9, Some(&gates), &mut rng);
        let agent = agents.get(id).unwrap();
        assert_eq!(agent.destination_label, LocationClass::Home);
    }

    #[test]
    fn ecommerce_preserves_the_destination_label() {
        let (catalog, _dir) = catalog();
        let (mut agents, mut locations, mut rng) = world();
        let id = spawn_assigned(&mut agents, &mut locations, &mut rng);
        let mut flags = PolicyFlags::default();
        flags.strong_ecommerce = true;
        let toggles = InterventionToggles::default();
        let gates = GateContext {
            flags: &flags,
            toggles: &toggles,
            num_homeless_infected: 0,
        };

        let home_position = {
            let home = agents.get(id).unwrap().assignments[LocationClass::Home].unwrap();
            locations.find(home).unwrap().position()
        };
        let work = agents.get(id).unwrap().assignments[LocationClass::Work];

        let mut redirected = false;
        for _ in 0..100 {
            update_single_destination(
                &catalog,
                &mut agents,
                &locations,
                0,
                9,
                Some(&gates),
                &mut rng,
            );
            let agent = agents.get(id).unwrap();
            if agent.destination() == home_position
                && agent.destination_label == LocationClass::Work
            {
                // Physically home, economically still at work
                assert_eq!(agent.hourly_target, work);
                redirected = true;
                break;
            }
        }
        assert!(redirected, "strong e-commerce never redirected in 100 draws");
    }

    #[test]
    fn lockdown_of_chosen_work_sends_home() {
        let (catalog, _dir) = catalog();
        let (mut agents, mut locations, mut rng) = world();
        let id = spawn_assigned(&mut agents, &mut locations, &mut rng);
        let work = agents.get(id).unwrap().assignments[LocationClass::Work].unwrap();
        locations
            .find_mut(work)
            .unwrap()
            .set_pandemic_status(PandemicStatus::Lockdown);
        let flags = PolicyFlags::default();
        let toggles = InterventionToggles::default();
        let gates = GateContext {
            flags: &flags,
            toggles: &toggles,
            num_homeless_infected: 0,
        };

        update_single_destination(&catalog, &mut agents, &locations, 0, 9, Some(&gates), &mut rng);
        assert_eq!(
            agents.get(id).unwrap().destination_label,
            LocationClass::Home
        );
    }

    #[test]
    fn missing_assignment_falls_back_to_an_anonymous_point() {
        let (catalog, _dir) = catalog();
        let (mut agents, mut locations, mut rng) = world();
        let id = spawn_assigned(&mut agents, &mut locations, &mut rng);
        let work = agents.get(id).unwrap().assignments[LocationClass::Work].unwrap();
        set_assignment(&mut agents, &mut locations, id, LocationClass::Work, None);
        // Empty the work region so the random-location fallback is gone too
        locations
            .region_mut(LocationClass::Work)
            .remove_location(work);

        update_single_destination(&catalog, &mut agents, &locations, 0, 9, None, &mut rng);
        let agent = agents.get(id).unwrap();
        assert_eq!(agent.destination_label, LocationClass::Work);
        assert!(agent.hourly_target.is_none());
        assert!(locations
            .region(LocationClass::Work)
            .contains(agent.destination()));
    }
}
