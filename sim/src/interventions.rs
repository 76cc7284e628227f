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

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Number of booleans in the policy flag set, and therefore the width of
/// the vector the policy collaborator writes back
pub const NUM_POLICY_FLAGS: usize = 17;

/// Strength tier shared by the graded interventions
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Weak,
    Moderate,
    Strong,
}

/// The policy flag set: seventeen booleans the policy collaborator may
/// rewrite every hour. Indices follow the collaborator's output layout:
///
/// 0 quarantine-when-infected, 1 total lockdown, 2-4 weak/moderate/strong
/// compliance, 5-7 lockdown, 8-10 assistance, 11-13 guidelines,
/// 14-16 e-commerce.
///
/// Several tiers of one family may be on at once; readers take the
/// strongest.
#[derive(Copy, Clone, Debug, Default, Deserialize, Serialize)]
pub struct PolicyFlags {
    pub quarantine_when_infected: bool,
    pub total_lockdown: bool,
    pub weak_compliance: bool,
    pub moderate_compliance: bool,
    pub strong_compliance: bool,
    pub weak_lockdown: bool,
    pub moderate_lockdown: bool,
    pub strong_lockdown: bool,
    pub weak_assistance: bool,
    pub moderate_assistance: bool,
    pub strong_assistance: bool,
    pub weak_guidelines: bool,
    pub moderate_guidelines: bool,
    pub strong_guidelines: bool,
    pub weak_ecommerce: bool,
    pub moderate_ecommerce: bool,
    pub strong_ecommerce: bool,
}

fn strongest(weak: bool, moderate: bool, strong: bool) -> Option<Intensity> {
    if strong {
        Some(Intensity::Strong)
    } else if moderate {
        Some(Intensity::Moderate)
    } else if weak {
        Some(Intensity::Weak)
    } else {
        None
    }
}

impl PolicyFlags {
    /// Overwrites every flag from a collaborator vector. A vector of the
    /// wrong width is a hard fault
    pub fn apply_vector(&mut self, flags: &[bool]) -> Result<(), Error> {
        if flags.len() != NUM_POLICY_FLAGS {
            return Err(Error::Policy {
                message: format!(
                    "Expected a flag vector of width {}, received {}",
                    NUM_POLICY_FLAGS,
                    flags.len()
                ),
            });
        }
        for (index, &value) in flags.iter().enumerate() {
            self.set(index, value);
        }
        Ok(())
    }

    pub fn set(&mut self, index: usize, value: bool) {
        match index {
            0 => self.quarantine_when_infected = value,
            1 => self.total_lockdown = value,
            2 => self.weak_compliance = value,
            3 => self.moderate_compliance = value,
            4 => self.strong_compliance = value,
            5 => self.weak_lockdown = value,
            6 => self.moderate_lockdown = value,
            7 => self.strong_lockdown = value,
            8 => self.weak_assistance = value,
            9 => self.moderate_assistance = value,
            10 => self.strong_assistance = value,
            11 => self.weak_guidelines = value,
            12 => self.moderate_guidelines = value,
            13 => self.strong_guidelines = value,
            14 => self.weak_ecommerce = value,
            15 => self.moderate_ecommerce = value,
            16 => self.strong_ecommerce = value,
            _ => {}
        }
    }

    pub fn as_vector(&self) -> [bool; NUM_POLICY_FLAGS] {
        [
            self.quarantine_when_infected,
            self.total_lockdown,
            self.weak_compliance,
            self.moderate_compliance,
            self.strong_compliance,
            self.weak_lockdown,
            self.moderate_lockdown,
            self.strong_lockdown,
            self.weak_assistance,
            self.moderate_assistance,
            self.strong_assistance,
            self.weak_guidelines,
            self.moderate_guidelines,
            self.strong_guidelines,
            self.weak_ecommerce,
            self.moderate_ecommerce,
            self.strong_ecommerce,
        ]
    }

    /// The whole set packed into the low seventeen bits
    pub fn as_mask(&self) -> u32 {
        self.as_vector()
            .iter()
            .enumerate()
            .fold(0, |mask, (index, &flag)| mask | (u32::from(flag) << index))
    }

    pub fn from_mask(mask: u32) -> PolicyFlags {
        let mut flags = PolicyFlags::default();
        for index in 0..NUM_POLICY_FLAGS {
            flags.set(index, mask & (1 << index) != 0);
        }
        flags
    }

    pub fn compliance_level(&self) -> Option<Intensity> {
        strongest(
            self.weak_compliance,
            self.moderate_compliance,
            self.strong_compliance,
        )
    }

    pub fn lockdown_level(&self) -> Option<Intensity> {
        strongest(self.weak_lockdown, self.moderate_lockdown, self.strong_lockdown)
    }

    pub fn assistance_level(&self) -> Option<Intensity> {
        strongest(
            self.weak_assistance,
            self.moderate_assistance,
            self.strong_assistance,
        )
    }

    pub fn guidelines_level(&self) -> Option<Intensity> {
        strongest(
            self.weak_guidelines,
            self.moderate_guidelines,
            self.strong_guidelines,
        )
    }

    pub fn ecommerce_level(&self) -> Option<Intensity> {
        strongest(self.weak_ecommerce, self.moderate_ecommerce, self.strong_ecommerce)
    }

    /// True when agents draw compliance at all, which also raises the
    /// infection threshold for agents that do comply
    pub fn compliance_checking(&self) -> bool {
        self.compliance_level().is_some()
    }
}

/// Manual toggles outside the learnable flag set
#[derive(Copy, Clone, Debug, Default, Deserialize, Serialize)]
pub struct InterventionToggles {
    /// Contact tracing tier, set by the operator rather than the policy
    pub contact_tracing: Option<Intensity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_roundtrips_through_indices() {
        let mut flags = PolicyFlags::default();
        let mut vector = [false; NUM_POLICY_FLAGS];
        vector[0] = true;
        vector[7] = true;
        vector[16] = true;
        flags.apply_vector(&vector).unwrap();
        assert!(flags.quarantine_when_infected);
        assert!(flags.strong_lockdown);
        assert!(flags.strong_ecommerce);
        assert_eq!(flags.as_vector(), vector);
    }

    #[test]
    fn wrong_width_vector_is_a_hard_fault() {
        let mut flags = PolicyFlags::default();
        assert!(matches!(
            flags.apply_vector(&[true; 5]),
            Err(Error::Policy { .. })
        ));
    }

    #[test]
    fn strongest_tier_wins() {
        let mut flags = PolicyFlags::default();
        flags.weak_lockdown = true;
        flags.strong_lockdown = true;
        assert_eq!(flags.lockdown_level(), Some(Intensity::Strong));
        flags.strong_lockdown = false;
        assert_eq!(flags.lockdown_level(), Some(Intensity::Weak));
        assert_eq!(flags.guidelines_level(), None);
    }

    #[test]
    fn mask_roundtrip() {
        let mut flags = PolicyFlags::default();
        flags.total_lockdown = true;
        flags.moderate_assistance = true;
        let mask = flags.as_mask();
        assert_eq!(PolicyFlags::from_mask(mask).as_mask(), mask);
        assert_eq!(mask & 0b10, 0b10);
    }
}
