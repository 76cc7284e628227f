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

use std::fs;
use std::path::Path;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::Value;

use crate::error::Error;
use crate::models::LocationClass;

/// What a behavior chart schedules for one hour
#[derive(Clone, Debug, PartialEq)]
pub enum Assignment {
    /// Head for this class of location
    Single(LocationClass),
    /// Sample a class from a weighted distribution
    Weighted(Vec<(LocationClass, f64)>),
}

impl Assignment {
    /// Resolves the assignment to a destination class. Weighted entries
    /// build a percent-scaled cumulative table and sample it uniformly
    pub fn sample(&self, rng: &mut StdRng) -> LocationClass {
        match self {
            Assignment::Single(class) => *class,
            Assignment::Weighted(entries) => {
                let mut cumulative = Vec::with_capacity(entries.len());
                let mut total = 0u32;
                for (_, weight) in entries {
                    total += (100.0 * weight).round() as u32;
                    cumulative.push(total);
                }
                if total == 0 {
                    return entries[0].0;
                }
                let draw = rng.gen_range(0..total);
                let index = cumulative.partition_point(|&sum| sum <= draw);
                entries[index.min(entries.len() - 1)].0
            }
        }
    }
}

/// One immutable behavior chart: a selection weight plus a sparse
/// hour-to-assignment map. A missing hour means "no change"
#[derive(Clone, Debug)]
pub struct BehaviorChart {
    name: String,
    weight: f64,
    hours: [Option<Assignment>; 24],
}

impl BehaviorChart {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn assignment_at(&self, hour: u32) -> Option<&Assignment> {
        self.hours.get(hour as usize).and_then(Option::as_ref)
    }
}

/// The adult and child chart pools, loaded once at startup and immutable
/// afterwards. Each pool keeps a percent-scaled cumulative weight table
/// enabling logarithmic weighted selection
pub struct BehaviorCatalog {
    adult: Vec<BehaviorChart>,
    child: Vec<BehaviorChart>,
    adult_cumulative: Vec<u32>,
    child_cumulative: Vec<u32>,
}

impl BehaviorCatalog {
    /// Reads every chart descriptor in `directory`. Files prefixed
    /// `adult_` land in the adult pool, `child_` in the child pool;
    /// anything else is ignored. Any malformed chart refuses startup
    pub fn load(directory: &str) -> Result<BehaviorCatalog, Error> {
        let entries = fs::read_dir(directory).map_err(|e| Error::IoError {
            source: Box::new(e),
            context: format!("Reading behavior chart directory {}", directory),
        })?;

        let mut filenames: Vec<_> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        filenames.sort();

        let mut adult = Vec::new();
        let mut child = Vec::new();
        for path in filenames {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string();
            if name.starts_with("adult_") {
                adult.push(BehaviorCatalog::parse_chart(&path, &name)?);
            } else if name.starts_with("child_") {
                child.push(BehaviorCatalog::parse_chart(&path, &name)?);
            } else {
                debug!("Skipping non-chart file {}", name);
            }
        }

        if adult.is_empty() || child.is_empty() {
            return Err(Error::new_catalog_error(
                directory,
                "Directory must hold at least one adult_ and one child_ chart".to_string(),
            ));
        }

        info!(
            "Loaded behavior catalog: {} adult charts, {} child charts",
            adult.len(),
            child.len()
        );
        let adult_cumulative = BehaviorCatalog::cumulative_weights(&adult);
        let child_cumulative = BehaviorCatalog::cumulative_weights(&child);
        Ok(BehaviorCatalog {
            adult,
            child,
            adult_cumulative,
            child_cumulative,
        })
    }

    fn cumulative_weights(charts: &[BehaviorChart]) -> Vec<u32> {
        let mut total = 0u32;
        charts
            .iter()
            .map(|chart| {
                total += (100.0 * chart.weight()).round() as u32;
                total
            })
            .collect()
    }

    fn parse_chart(path: &Path, name: &str) -> Result<BehaviorChart, Error> {
        let raw = fs::read_to_string(path).map_err(|e| Error::IoError {
            source: Box::new(e),
            context: format!("Reading behavior chart {}", name),
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            Error::new_catalog_error(name, format!("Descriptor is not valid JSON: {}", e))
        })?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::new_catalog_error(name, "Descriptor is not an object".to_string()))?;

        let weight = object
            .get("Probability")
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                Error::new_catalog_error(name, "Missing numeric 'Probability' entry".to_string())
            })?;

        const EMPTY: Option<Assignment> = None;
        let mut hours = [EMPTY; 24];
        for (key, entry) in object {
            if key == "Probability" {
                continue;
            }
            let hour: usize = key.parse().map_err(|_| {
                Error::new_catalog_error(name, format!("Unknown chart key '{}'", key))
            })?;
            if hour >= 24 {
                return Err(Error::new_catalog_error(
                    name,
                    format!("Hour {} is out of range", hour),
                ));
            }
            hours[hour] = BehaviorCatalog::parse_assignment(name, entry)?;
        }

        match hours[0] {
            Some(_) => Ok(BehaviorChart {
                name: name.to_string(),
                weight,
                hours,
            }),
            None => Err(Error::new_catalog_error(
                name,
                "Chart must specify a destination for hour 0".to_string(),
            )),
        }
    }

    /// Parses one hour entry: a destination label, "No Change", or a map
    /// of labels to relative weights
    fn parse_assignment(name: &str, entry: &Value) -> Result<Option<Assignment>, Error> {
        match entry {
            Value::String(label) if label == "No Change" => Ok(None),
            Value::String(label) => Ok(Some(Assignment::Single(BehaviorCatalog::parse_label(
                name, label,
            )?))),
            Value::Object(distribution) => {
                let mut entries = Vec::with_capacity(distribution.len());
                for (label, weight) in distribution {
                    let class = BehaviorCatalog::parse_label(name, label)?;
                    let weight = weight.as_f64().ok_or_else(|| {
                        Error::new_catalog_error(
                            name,
                            format!("Weight for '{}' is not a number", label),
                        )
                    })?;
                    entries.push((class, weight));
                }
                if entries.is_empty() {
                    return Err(Error::new_catalog_error(
                        name,
                        "Weighted entry has no destinations".to_string(),
                    ));
                }
                Ok(Some(Assignment::Weighted(entries)))
            }
            _ => Err(Error::new_catalog_error(
                name,
                "Hour entry must be a label or a weight map".to_string(),
            )),
        }
    }

    fn parse_label(name: &str, label: &str) -> Result<LocationClass, Error> {
        match label {
            "Home" => Ok(LocationClass::Home),
            "School" => Ok(LocationClass::School),
            "Work" => Ok(LocationClass::Work),
            "Leisure" => Ok(LocationClass::Leisure),
            other => Err(Error::new_catalog_error(
                name,
                format!("Unknown destination label '{}'", other),
            )),
        }
    }

    fn pool(&self, adult: bool) -> (&[BehaviorChart], &[u32]) {
        if adult {
            (&self.adult, &self.adult_cumulative)
        } else {
            (&self.child, &self.child_cumulative)
        }
    }

    pub fn num_adult_behaviors(&self) -> usize {
        self.adult.len()
    }

    pub fn num_child_behaviors(&self) -> usize {
        self.child.len()
    }

    pub fn chart(&self, behavior: usize, adult: bool) -> &BehaviorChart {
        let (charts, _) = self.pool(adult);
        &charts[behavior.min(charts.len() - 1)]
    }

    /// Weighted selection of a chart index from the requested pool
    pub fn sample_behavior(&self, adult: bool, rng: &mut StdRng) -> usize {
        let (charts, cumulative) = self.pool(adult);
        let total = *cumulative.last().unwrap_or(&0);
        if total == 0 {
            return 0;
        }
        let draw = rng.gen_range(0..total);
        cumulative
            .partition_point(|&sum| sum <= draw)
            .min(charts.len() - 1)
    }

    /// The chart's assignment for this hour; None means no change
    pub fn assignment_at(&self, behavior: usize, adult: bool, hour: u32) -> Option<&Assignment> {
        self.chart(behavior, adult).assignment_at(hour)
    }

    /// Where an agent with this chart begins its life: the hour-0
    /// assignment, which chart validation guarantees exists
    pub fn starting_destination(
        &self,
        behavior: usize,
        adult: bool,
        rng: &mut StdRng,
    ) -> LocationClass {
        match self.assignment_at(behavior, adult, 0) {
            Some(assignment) => assignment.sample(rng),
            None => LocationClass::Home,
        }
    }
}
