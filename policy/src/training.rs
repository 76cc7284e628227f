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
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, info};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::network::{PolicyNetwork, NUM_POLICIES, STATE_SIZE};

/// How many future hours one step's reward looks ahead over
pub const DISCOUNT_HORIZON: usize = 24;
/// Per-hour reward discount
pub const DEFAULT_GAMMA: f64 = 0.9;
/// Adam learning rate
pub const LEARNING_RATE: f64 = 1e-2;
/// A checkpoint is written every this many episodes
pub const CHECKPOINT_EVERY: usize = 10;

/// Which reward shape the controller trains against
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardPolicy {
    Pandemic,
    Economic,
    Dual,
}

impl Display for RewardPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RewardPolicy::Pandemic => write!(f, "pandemic"),
            RewardPolicy::Economic => write!(f, "economic"),
            RewardPolicy::Dual => write!(f, "dual"),
        }
    }
}

/// Scalar reward for the hour, computed from the observation the action
/// produced
pub fn calculate_reward(state: &[f64; STATE_SIZE], policy: RewardPolicy) -> f64 {
    let cases_last_day = state[1];
    let deaths_last_day = state[3];
    let mut pandemic_reward = 2.0;
    if cases_last_day > 0.0 && deaths_last_day > 0.0 {
        pandemic_reward = 1.0 / cases_last_day + 1.0 / (deaths_last_day * deaths_last_day);
    } else if cases_last_day > 0.0 {
        pandemic_reward = 1.0 / cases_last_day + 1.0;
    } else if deaths_last_day > 0.0 {
        pandemic_reward = 1.0 + 1.0 / (deaths_last_day * deaths_last_day);
    }

    let homelessness = state[9] / 100.0;
    let unemployment = state[10] / 100.0;
    let mut economic_reward = 100.0 * state[11];
    if economic_reward < 0.0 {
        economic_reward *= (1.0 + unemployment) * (1.0 + homelessness);
    } else {
        economic_reward *= (1.0 - unemployment) * (1.0 - homelessness);
    }

    match policy {
        RewardPolicy::Pandemic => pandemic_reward,
        RewardPolicy::Economic => economic_reward,
        RewardPolicy::Dual => pandemic_reward + economic_reward,
    }
}

/// In-place discounting: each step becomes the gamma-discounted sum of
/// the rewards over the following day
pub fn discount_rewards(rewards: &mut [f64], gamma: f64) {
    for i in 0..rewards.len() {
        let mut discounted = 0.0;
        for j in 0..DISCOUNT_HORIZON {
            if i + j >= rewards.len() {
                break;
            }
            discounted += rewards[i + j] * gamma.powi(j as i32);
        }
        rewards[i] = discounted;
    }
}

/// One recorded episode: the observation, the sampled flag vector, and
/// the reward, hour by hour
#[derive(Default)]
pub struct Episode {
    states: Vec<[f64; STATE_SIZE]>,
    actions: Vec<[bool; NUM_POLICIES]>,
    rewards: Vec<f64>,
}

impl Episode {
    pub fn push(&mut self, state: [f64; STATE_SIZE], action: [bool; NUM_POLICIES], reward: f64) {
        self.states.push(state);
        self.actions.push(action);
        self.rewards.push(reward);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    fn states_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.states.len(), STATE_SIZE), |(i, j)| self.states[i][j])
    }

    fn actions_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.actions.len(), NUM_POLICIES), |(i, j)| {
            f64::from(self.actions[i][j])
        })
    }
}

/// Parameter gradients matching the network's shape
pub struct Gradients {
    pub weight: Array2<f64>,
    pub bias: Array1<f64>,
}

/// REINFORCE-style surrogate loss: minus the mean over the episode of the
/// discounted reward times the mean activation of the flags actually
/// taken. Returns the loss and its exact gradient
pub fn calculate_loss(
    network: &PolicyNetwork,
    episode: &Episode,
    gamma: f64,
) -> (f64, Gradients) {
    let steps = episode.len().max(1) as f64;
    let states = episode.states_matrix();
    let actions = episode.actions_matrix();
    let mut rewards = episode.rewards.clone();
    discount_rewards(&mut rewards, gamma);

    let activations = network.forward_batch(&states);

    let mut loss = 0.0;
    let mut dloss_dact = Array2::<f64>::zeros(activations.raw_dim());
    for t in 0..episode.len() {
        let taken: f64 = actions.row(t).sum();
        let divisor = taken.max(1.0);
        let mean_taken: f64 = actions
            .row(t)
            .iter()
            .zip(activations.row(t).iter())
            .map(|(a, p)| a * p)
            .sum::<f64>()
            / divisor;
        loss -= rewards[t] * mean_taken / steps;
        for j in 0..NUM_POLICIES {
            dloss_dact[[t, j]] = -rewards[t] * actions[[t, j]] / divisor / steps;
        }
    }

    let weight = dloss_dact.t().dot(&states);
    let bias = dloss_dact.sum_axis(ndarray::Axis(0));
    (loss, Gradients { weight, bias })
}

/// Plain Adam over the two parameter tensors
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    m_weight: Array2<f64>,
    v_weight: Array2<f64>,
    m_bias: Array1<f64>,
    v_bias: Array1<f64>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Adam {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            m_weight: Array2::zeros((NUM_POLICIES, STATE_SIZE)),
            v_weight: Array2::zeros((NUM_POLICIES, STATE_SIZE)),
            m_bias: Array1::zeros(NUM_POLICIES),
            v_bias: Array1::zeros(NUM_POLICIES),
        }
    }

    pub fn step(&mut self, network: &mut PolicyNetwork, gradients: &Gradients) {
        self.step += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.step);
        let bias_correction2 = 1.0 - self.beta2.powi(self.step);

        self.m_weight = &self.m_weight * self.beta1 + &gradients.weight * (1.0 - self.beta1);
        self.v_weight =
            &self.v_weight * self.beta2 + &gradients.weight.mapv(|g| g * g) * (1.0 - self.beta2);
        let m_hat = &self.m_weight / bias_correction1;
        let v_hat = &self.v_weight / bias_correction2;
        network.weight =
            &network.weight - &(m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon) * self.learning_rate);

        self.m_bias = &self.m_bias * self.beta1 + &gradients.bias * (1.0 - self.beta1);
        self.v_bias =
            &self.v_bias * self.beta2 + &gradients.bias.mapv(|g| g * g) * (1.0 - self.beta2);
        let m_hat = &self.m_bias / bias_correction1;
        let v_hat = &self.v_bias / bias_correction2;
        network.bias =
            &network.bias - &(m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon) * self.learning_rate);
    }
}

/// Drives the policy-gradient updates across episodes and owns the
/// checkpointing scheme: a numbered checkpoint every few episodes plus a
/// rolling best under `temp/temp.net`
pub struct Trainer {
    pub network: PolicyNetwork,
    optimal: PolicyNetwork,
    optimizer: Adam,
    policy: RewardPolicy,
    gamma: f64,
    best_loss: f64,
    root: PathBuf,
    /// Subdirectory naming the compliance regime the run was trained under
    subkind: String,
    losses: Vec<f64>,
}

impl Trainer {
    pub fn new(network: PolicyNetwork, policy: RewardPolicy, root: &Path, subkind: &str) -> Trainer {
        let optimal = network.clone();
        Trainer {
            network,
            optimal,
            optimizer: Adam::new(LEARNING_RATE),
            policy,
            gamma: DEFAULT_GAMMA,
            best_loss: f64::MAX,
            root: root.to_path_buf(),
            subkind: subkind.to_string(),
            losses: Vec::new(),
        }
    }

    pub fn policy(&self) -> RewardPolicy {
        self.policy
    }

    pub fn losses(&self) -> &[f64] {
        &self.losses
    }

    pub fn best_network(&self) -> &PolicyNetwork {
        &self.optimal
    }

    fn checkpoint_path(&self, episode: usize) -> PathBuf {
        self.root
            .join("networks")
            .join(self.policy.to_string())
            .join(&self.subkind)
            .join(format!("{}.net", episode))
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join("temp").join("temp.net")
    }

    /// One gradient step from a finished episode. Persists the rolling
    /// best and the periodic numbered checkpoint
    pub fn process_episode(&mut self, episode: &Episode, index: usize) -> Result<f64> {
        let (loss, gradients) = calculate_loss(&self.network, episode, self.gamma);
        debug!("Episode {} loss {:.6}", index, loss);

        if loss < self.best_loss {
            self.best_loss = loss;
            self.network.save(&self.temp_path())?;
            self.optimal = PolicyNetwork::load(&self.temp_path())?;
            info!("Episode {} is the new best with loss {:.6}", index, loss);
        }

        self.optimizer.step(&mut self.network, &gradients);
        self.losses.push(loss);

        if index % CHECKPOINT_EVERY == 0 {
            self.network.save(&self.checkpoint_path(index))?;
        }
        Ok(loss)
    }
}
