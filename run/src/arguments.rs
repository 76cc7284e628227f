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

extern crate serde;

use clap::{App, Arg};
use log::warn;
use serde::{Deserialize, Serialize};

use policy::training::RewardPolicy;
use sim::config::SimulationConfig;
use sim::interventions::Intensity;
use sim::runtime::Speed;
use sim::SimulationMode;

fn get_cmd_arguments() -> clap::ArgMatches<'static> {
    App::new("Township Pandemic/Economy Simulator")
        .version("1.0")
        .about("Simulates a synthetic town with coupled epidemic and economic layers")
        .usage("run --mode=<mode>\
            \n    There are several modes available to choose from:\
            \n        simulate    ->      Runs a single simulation of the configured kind\
            \n        train       ->      Trains the intervention policy over many episodes\
            \n        evaluate    ->      Evaluates a trained policy checkpoint")
        .arg(
            Arg::with_name("mode")
                .long("mode")
                .help("Specifies the mode of the simulator")
                .takes_value(true)
                .require_equals(true)
                .required(true))
        .arg(
            Arg::with_name("simulation")
                .long("simulation")
                .help("Which layers to run: simple, economic, pandemic or dual")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("agents")
                .long("agents")
                .help("Size of the initial agent cohort")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("locations")
                .long("locations")
                .help("Locations generated per region, and the business target")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("initial-value")
                .long("initial-value")
                .help("Total economic value seeded into the simulation")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("lag-period")
                .long("lag-period")
                .help("Days before the initial infection fires")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("initial-infected")
                .long("initial-infected")
                .help("Agents exposed by the initial infection")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("hospital-capacity")
                .long("hospital-capacity")
                .help("Infected count above which mortality worsens")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("frames-per-hour")
                .long("frames-per-hour")
                .help("Movement frames per simulated hour")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("behaviors")
                .long("behaviors")
                .help("Directory holding the behavior chart descriptors")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("statistics")
                .long("statistics")
                .help("Path for the per-hour statistics CSV")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .help("Fixed RNG seed for reproducible runs")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("headless")
                .long("headless")
                .help("Runs without the render side"))
        .arg(
            Arg::with_name("speed")
                .long("speed")
                .help("Pacing of the simulation thread: slow, normal, fast or unlimited")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("reward")
                .long("reward")
                .help("Reward shape for training: pandemic, economic or dual")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("episode-length")
                .long("episode-length")
                .help("Length of one episode, in simulated days")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("episodes")
                .long("episodes")
                .help("Number of episodes to train or evaluate over")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("checkpoint")
                .long("checkpoint")
                .help("Policy checkpoint to load")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("contact-tracing")
                .long("contact-tracing")
                .help("Manual contact tracing tier: weak, moderate or strong")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("compliance-label")
                .long("compliance-label")
                .help("Labels the checkpoint subdirectory for this training regime")
                .require_equals(true)
                .takes_value(true))
        .arg(
            Arg::with_name("number-of-threads")
                .long("number-of-threads")
                .help("Specifies the number of separate threads to use for processing")
                .require_equals(true)
                .takes_value(true))
        .get_matches()
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Simulate,
    Train,
    Evaluate,
}

pub struct Arguments {
    pub mode: RunMode,
    pub simulation: SimulationMode,
    pub config: SimulationConfig,
    pub speed: Speed,
    pub reward: RewardPolicy,
    pub episode_length: u32,
    pub num_episodes: usize,
    pub checkpoint: Option<String>,
    pub contact_tracing: Option<Intensity>,
    pub compliance_label: String,
    pub number_of_threads: Option<usize>,
}

fn parse_number<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str, slot: &mut T)
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = matches.value_of(name) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(e) => {
                warn!(
                    "Failed to parse {} with value: '{}' and error {}. Using the default value.",
                    name, raw, e
                )
            }
        }
    }
}

impl Arguments {
    pub fn load_from_arguments() -> Arguments {
        let mut arguments = Arguments::default();
        let matches = get_cmd_arguments();

        arguments.mode = serde_plain::from_str(
            matches
                .value_of("mode")
                .expect("Mode for the simulator must be provided!"),
        )
        .expect("Unknown mode received! Use --help for a list of valid modes");

        if let Some(raw) = matches.value_of("simulation") {
            match serde_plain::from_str(raw) {
                Ok(simulation) => arguments.simulation = simulation,
                Err(_) => warn!("Unknown simulation kind '{}'. Using dual.", raw),
            }
        }
        if let Some(raw) = matches.value_of("speed") {
            arguments.speed = match raw {
                "slow" => Speed::Slow,
                "normal" => Speed::Normal,
                "fast" => Speed::Fast,
                "unlimited" => Speed::Unlimited,
                other => {
                    warn!("Unknown speed '{}'. Using unlimited.", other);
                    Speed::Unlimited
                }
            };
        }
        if let Some(raw) = matches.value_of("reward") {
            match serde_plain::from_str(raw) {
                Ok(reward) => arguments.reward = reward,
                Err(_) => warn!("Unknown reward policy '{}'. Using dual.", raw),
            }
        }
        if let Some(raw) = matches.value_of("contact-tracing") {
            match serde_plain::from_str(raw) {
                Ok(level) => arguments.contact_tracing = Some(level),
                Err(_) => warn!("Unknown contact tracing tier '{}'. Leaving it off.", raw),
            }
        }
        if let Some(directory) = matches.value_of("behaviors") {
            arguments.config.behavior_dir = directory.to_string();
        }
        if let Some(path) = matches.value_of("statistics") {
            arguments.config.statistics_path = Some(path.to_string());
        }
        if let Some(path) = matches.value_of("checkpoint") {
            arguments.checkpoint = Some(path.to_string());
        }
        if let Some(label) = matches.value_of("compliance-label") {
            arguments.compliance_label = label.to_string();
        }
        if matches.is_present("headless") {
            arguments.config.headless = true;
        }

        parse_number(&matches, "agents", &mut arguments.config.initial_num_agents);
        parse_number(
            &matches,
            "locations",
            &mut arguments.config.num_locations_per_region,
        );
        parse_number(&matches, "initial-value", &mut arguments.config.initial_value);
        parse_number(&matches, "lag-period", &mut arguments.config.lag_period);
        parse_number(
            &matches,
            "initial-infected",
            &mut arguments.config.initial_infected,
        );
        parse_number(
            &matches,
            "hospital-capacity",
            &mut arguments.config.hospital_capacity,
        );
        parse_number(
            &matches,
            "frames-per-hour",
            &mut arguments.config.frames_per_hour,
        );
        parse_number(&matches, "episode-length", &mut arguments.episode_length);
        parse_number(&matches, "episodes", &mut arguments.num_episodes);

        if let Some(raw) = matches.value_of("seed") {
            match raw.parse() {
                Ok(seed) => arguments.config.seed = Some(seed),
                Err(e) => warn!("Failed to parse seed '{}': {}. Seeding from entropy.", raw, e),
            }
        }
        if let Some(raw) = matches.value_of("number-of-threads") {
            match raw.parse() {
                Ok(threads) => arguments.number_of_threads = Some(threads),
                Err(e) => warn!(
                    "Failed to parse number of threads with value: '{}' and error {}. Using default value.",
                    raw, e
                ),
            }
        }
        arguments
    }
}

impl Default for Arguments {
    fn default() -> Self {
        Arguments {
            mode: RunMode::Simulate,
            simulation: SimulationMode::Dual,
            config: SimulationConfig::default(),
            speed: Speed::Unlimited,
            reward: RewardPolicy::Dual,
            episode_length: 30,
            num_episodes: 100,
            checkpoint: None,
            contact_tracing: None,
            compliance_label: "default".to_string(),
            number_of_threads: None,
        }
    }
}
