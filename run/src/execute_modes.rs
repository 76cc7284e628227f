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

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{error, info, warn};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;

use policy::training::{calculate_reward, Episode, Trainer};
use policy::{apply_policies, PolicyNetwork};
use sim::runtime::{SimulationController, Speed};
use sim::simulator::Simulator;
use sim::simulator_builder::SimulatorBuilder;
use sim::SimulationMode;

use crate::arguments::Arguments;

fn build_simulator(arguments: &Arguments, mode: SimulationMode) -> Result<Simulator> {
    let mut builder = SimulatorBuilder::new(arguments.config.clone(), mode);
    builder = builder.with_toggles(sim::interventions::InterventionToggles {
        contact_tracing: arguments.contact_tracing,
    });
    builder.build()
}

/// Runs a single simulation of the configured kind for the configured
/// number of days
pub fn simulate(arguments: Arguments) -> Result<()> {
    info!(
        "Using mode simulate for a {:?} simulation of {} days",
        arguments.simulation, arguments.episode_length
    );
    let total_time = Instant::now();

    if arguments.config.headless || arguments.speed == Speed::Unlimited {
        let mut simulator = build_simulator(&arguments, arguments.simulation)?;
        if let Err(e) = run_headless(&mut simulator, arguments.episode_length) {
            error!("{}", e);
            simulator
                .error_dump_json()
                .expect("Failed to create core dump!");
        } else {
            info!("Final state: {}", simulator.statistics());
        }
    } else {
        let frames =
            u64::from(arguments.episode_length) * 24 * u64::from(arguments.config.frames_per_hour);
        let interval = arguments
            .speed
            .frame_interval()
            .expect("paced speeds carry an interval");
        let simulator = build_simulator(&arguments, arguments.simulation)?;
        let controller = SimulationController::start(simulator, arguments.speed, false);
        std::thread::sleep(interval * frames as u32);
        controller.pause();
        if let Some(simulator) = controller.join() {
            info!("Final state: {}", simulator.statistics());
        }
    }

    info!("Finished in {:?}", total_time.elapsed());
    Ok(())
}

fn run_headless(simulator: &mut Simulator, days: u32) -> Result<()> {
    for day in 0..days {
        for _ in 0..24 {
            simulator.take_step()?;
        }
        info!("Day {} complete: {}", day + 1, simulator.statistics());
    }
    Ok(())
}

/// Runs one recorded episode of the coupled simulation under the given
/// network, sampling and applying the flag vector every hour
fn run_episode(
    simulator: &mut Simulator,
    network: &PolicyNetwork,
    arguments: &Arguments,
    rng: &mut StdRng,
) -> Result<Episode> {
    let mut episode = Episode::default();
    for _ in 0..u64::from(arguments.episode_length) * 24 {
        let state = simulator.state_vector();
        let probabilities = network.forward(&Array1::from(state.to_vec()));
        let flags = apply_policies(&probabilities, rng);
        simulator
            .apply_policy_vector(&flags)
            .context("Applying the sampled policy vector")?;
        simulator.take_step()?;
        let reward = calculate_reward(&simulator.state_vector(), arguments.reward);
        episode.push(state, flags, reward);
    }
    Ok(episode)
}

/// Trains the policy with REINFORCE-style updates over many episodes of
/// the coupled simulation
pub fn train(arguments: Arguments) -> Result<()> {
    info!(
        "Training a {} policy for {} episodes of {} days",
        arguments.reward, arguments.num_episodes, arguments.episode_length
    );
    let mut rng = match arguments.config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let network = match arguments.checkpoint.as_deref() {
        Some(path) => PolicyNetwork::load(Path::new(path))
            .context("Loading the starting checkpoint")?,
        None => PolicyNetwork::new(&mut rng),
    };
    let root = std::env::current_dir().context("Resolving the checkpoint root")?;
    let mut trainer = Trainer::new(network, arguments.reward, &root, &arguments.compliance_label);

    for index in 0..arguments.num_episodes {
        // Every episode starts from a fresh town
        let mut simulator = build_simulator(&arguments, SimulationMode::Dual)?;
        let episode = run_episode(&mut simulator, &trainer.network, &arguments, &mut rng)?;
        let loss = trainer.process_episode(&episode, index)?;
        info!(
            "Episode {}/{}: loss {:.6}, cases {}, deaths {}, value {:.0}",
            index + 1,
            arguments.num_episodes,
            loss,
            simulator.total_cases(),
            simulator.total_deaths(),
            simulator.total_value()
        );
    }

    info!("Training finished");
    Ok(())
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}

/// Replays a trained checkpoint over fresh episodes and reports the
/// outcome statistics
pub fn evaluate(arguments: Arguments) -> Result<()> {
    let Some(checkpoint) = arguments.checkpoint.as_deref() else {
        warn!("Evaluate mode needs --checkpoint to name a trained network");
        return Ok(());
    };
    let network = PolicyNetwork::load(Path::new(checkpoint)).context("Loading the checkpoint")?;
    let mut rng = match arguments.config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut cases = Vec::new();
    let mut deaths = Vec::new();
    let mut values = Vec::new();
    let mut homelessness = Vec::new();
    let mut unemployment = Vec::new();

    for index in 0..arguments.num_episodes {
        let mut simulator = build_simulator(&arguments, SimulationMode::Dual)?;
        let mut homeless_rates = Vec::new();
        let mut unemployed_rates = Vec::new();
        for _ in 0..u64::from(arguments.episode_length) * 24 {
            let state = simulator.state_vector();
            let probabilities = network.forward(&Array1::from(state.to_vec()));
            let flags = apply_policies(&probabilities, &mut rng);
            simulator.apply_policy_vector(&flags)?;
            simulator.take_step()?;
            let population = f64::from(simulator.current_population().max(1));
            homeless_rates.push(f64::from(simulator.num_homeless()) / population);
            unemployed_rates.push(f64::from(simulator.num_unemployed()) / population);
        }
        cases.push(f64::from(simulator.total_cases()));
        deaths.push(f64::from(simulator.total_deaths()));
        values.push(simulator.total_value());
        homelessness.push(mean_and_std(&homeless_rates).0);
        unemployment.push(mean_and_std(&unemployed_rates).0);
        info!("Evaluation episode {}/{} complete", index + 1, arguments.num_episodes);
    }

    for (name, series) in [
        ("Cases", &cases),
        ("Deaths", &deaths),
        ("Economic Value", &values),
        ("Homelessness", &homelessness),
        ("Unemployment", &unemployment),
    ] {
        let (mean, std) = mean_and_std(series);
        info!("{}: Average of {:.3} with std dev of {:.3}", name, mean, std);
    }
    Ok(())
}
