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
use std::fs::File;

use anyhow::{Context, Result};

use crate::economy::EconomyState;
use crate::epidemic::EpidemicState;

/// Width of the observation the policy collaborator receives
pub const STATE_VECTOR_LEN: usize = 12;

/// A per-hour snapshot of the whole simulation, for logging and the CSV
/// listener
#[derive(Clone, Debug, Default)]
pub struct Statistics {
    pub hour: u64,
    pub population: u32,
    pub susceptible: u32,
    pub exposed: u32,
    pub infected: u32,
    pub recovered: u32,
    pub daily_cases: u32,
    pub daily_deaths: u32,
    pub total_cases: u32,
    pub total_deaths: u32,
    pub homeless: u32,
    pub unemployed: u32,
    pub total_value: f64,
}

impl Display for Statistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Hour: {}, Population: {}, Susceptible: {}, Exposed: {}, Infected: {}, Recovered: {}, Homeless: {}, Unemployed: {}, Value: {:.0}",
            self.hour,
            self.population,
            self.susceptible,
            self.exposed,
            self.infected,
            self.recovered,
            self.homeless,
            self.unemployed,
            self.total_value
        )
    }
}

/// Builds the 12-slot observation vector, in collaborator order: exposure
/// and death windows, stage fractions (percent), hospital overflow,
/// homelessness and unemployment rates, and the hourly value change
pub fn build_state_vector(
    epidemic: Option<&EpidemicState>,
    economy: Option<&EconomyState>,
    population: u32,
    num_homeless: u32,
    num_unemployed: u32,
    hospital_capacity: u32,
) -> [f64; STATE_VECTOR_LEN] {
    let mut state = [0.0; STATE_VECTOR_LEN];
    let denominator = f64::from(population.max(1));
    if let Some(epidemic) = epidemic {
        state[0] = f64::from(epidemic.exposures_last_hour());
        state[1] = f64::from(epidemic.exposures_last_day());
        state[2] = f64::from(epidemic.deaths_last_hour());
        state[3] = f64::from(epidemic.deaths_last_day());
        state[4] = f64::from(epidemic.num_infected) / denominator * 100.0;
        state[5] = f64::from(epidemic.num_exposed) / denominator * 100.0;
        state[6] = f64::from(epidemic.num_recovered) / denominator * 100.0;
        state[7] = f64::from(epidemic.num_susceptible) / denominator * 100.0;
        state[8] = f64::from(u8::from(epidemic.num_infected > hospital_capacity));
    }
    state[9] = f64::from(num_homeless) / denominator * 100.0;
    state[10] = f64::from(num_unemployed) / denominator * 100.0;
    if let Some(economy) = economy {
        state[11] = economy.pct_change_last_hour();
    }
    state
}

/// Appends one row per simulated hour to a CSV file
pub struct CsvListener {
    writer: csv::Writer<File>,
}

impl CsvListener {
    pub fn new(path: &str) -> Result<CsvListener> {
        let file = File::create(path).context("Creating statistics CSV")?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record([
                "hour",
                "population",
                "susceptible",
                "exposed",
                "infected",
                "recovered",
                "daily_cases",
                "daily_deaths",
                "homeless",
                "unemployed",
                "total_value",
            ])
            .context("Writing statistics header")?;
        Ok(CsvListener { writer })
    }

    pub fn record(&mut self, statistics: &Statistics) -> Result<()> {
        self.writer
            .write_record([
                statistics.hour.to_string(),
                statistics.population.to_string(),
                statistics.susceptible.to_string(),
                statistics.exposed.to_string(),
                statistics.infected.to_string(),
                statistics.recovered.to_string(),
                statistics.daily_cases.to_string(),
                statistics.daily_deaths.to_string(),
                statistics.homeless.to_string(),
                statistics.unemployed.to_string(),
                format!("{:.2}", statistics.total_value),
            ])
            .context("Writing statistics row")?;
        self.writer.flush().context("Flushing statistics CSV")?;
        Ok(())
    }
}
