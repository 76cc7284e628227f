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

use std::f64::consts::TAU;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Width of the observation vector the simulator emits
pub const STATE_SIZE: usize = 12;
/// Number of intervention flags the policy controls
pub const NUM_POLICIES: usize = 17;

/// Fraction of weights zeroed out at initialisation
const INIT_SPARSITY: f64 = 0.5;
/// Standard deviation of the surviving initial weights
const INIT_STD: f64 = 0.01;

fn sample_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// The learnable policy: one linear layer from the 12-slot state to the
/// 17 flag activations, read directly as Bernoulli probabilities
#[derive(Clone, Debug)]
pub struct PolicyNetwork {
    pub(crate) weight: Array2<f64>,
    pub(crate) bias: Array1<f64>,
}

#[derive(Deserialize, Serialize)]
struct SavedNetwork {
    weight: Vec<f64>,
    bias: Vec<f64>,
}

impl PolicyNetwork {
    /// Sparse-ish initialisation: half the weights are zero, the rest are
    /// small normal draws; the bias is standard normal
    pub fn new(rng: &mut StdRng) -> PolicyNetwork {
        let weight = Array2::from_shape_fn((NUM_POLICIES, STATE_SIZE), |_| {
            if rng.gen_bool(INIT_SPARSITY) {
                0.0
            } else {
                INIT_STD * sample_normal(rng)
            }
        });
        let bias = Array1::from_shape_fn(NUM_POLICIES, |_| sample_normal(rng));
        PolicyNetwork { weight, bias }
    }

    /// One forward pass: flag activations for a single observation
    pub fn forward(&self, state: &Array1<f64>) -> Array1<f64> {
        self.weight.dot(state) + &self.bias
    }

    /// Forward pass over a whole episode, one row per hour
    pub fn forward_batch(&self, states: &Array2<f64>) -> Array2<f64> {
        states.dot(&self.weight.t()) + &self.bias
    }

    /// Serialises the parameters to a checkpoint file, creating parent
    /// directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Creating checkpoint directory")?;
        }
        let saved = SavedNetwork {
            weight: self.weight.iter().copied().collect(),
            bias: self.bias.iter().copied().collect(),
        };
        let encoded = bincode::serialize(&saved).context("Encoding network checkpoint")?;
        fs::write(path, encoded).context("Writing network checkpoint")?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<PolicyNetwork> {
        let raw = fs::read(path).context("Reading network checkpoint")?;
        let saved: SavedNetwork =
            bincode::deserialize(&raw).context("Decoding network checkpoint")?;
        if saved.weight.len() != NUM_POLICIES * STATE_SIZE || saved.bias.len() != NUM_POLICIES {
            bail!("Checkpoint has the wrong shape for a {}x{} policy", NUM_POLICIES, STATE_SIZE);
        }
        let weight = Array2::from_shape_vec((NUM_POLICIES, STATE_SIZE), saved.weight)
            .context("Reshaping checkpoint weights")?;
        let bias = Array1::from_vec(saved.bias);
        Ok(PolicyNetwork { weight, bias })
    }
}

/// Samples the flag vector: each activation, read as a probability, is
/// compared against a uniform draw in thousandths
pub fn apply_policies(probabilities: &Array1<f64>, rng: &mut StdRng) -> [bool; NUM_POLICIES] {
    let mut flags = [false; NUM_POLICIES];
    for (flag, &probability) in flags.iter_mut().zip(probabilities.iter()) {
        let scaled = 1000.0 * probability;
        *flag = f64::from(rng.gen_range(0..1000u32)) < scaled;
    }
    flags
}
