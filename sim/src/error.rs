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

use std::fmt::{Debug, Display, Formatter};

pub enum Error {
    Default {
        message: String,
    },
    Simulation {
        message: String,
    },
    /// A behavior chart descriptor failed validation. Fatal at startup
    CatalogInvalid {
        chart: String,
        message: String,
    },
    /// The policy collaborator returned a malformed vector
    Policy {
        message: String,
    },
    IoError {
        source: Box<dyn std::error::Error + Send + Sync>,
        context: String,
    },
    OptionRetrievalFailure {
        message: String,
        key: String,
    },
}

impl Error {
    pub fn new_simulation_error(message: String) -> Error {
        Error::Simulation { message }
    }

    pub fn new_catalog_error(chart: &str, message: String) -> Error {
        Error::CatalogInvalid {
            chart: chart.to_string(),
            message,
        }
    }

    pub fn from_option<T: Display, U>(
        value: Option<U>,
        key: T,
        message: String,
    ) -> Result<U, Error> {
        if let Some(value) = value {
            Ok(value)
        } else {
            Err(Error::OptionRetrievalFailure {
                message,
                key: key.to_string(),
            })
        }
    }
}

impl Default for Error {
    fn default() -> Self {
        Error::Default {
            message: String::from("An error occurred!"),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Default { message } => {
                write!(f, "Error: {}", message)
            }
            Error::Simulation { message } => {
                write!(f, "Simulation Error Occurred: {}", message)
            }
            Error::CatalogInvalid { chart, message } => {
                write!(f, "Behavior chart '{}' is invalid: {}", chart, message)
            }
            Error::Policy { message } => {
                write!(f, "Policy collaborator fault: {}", message)
            }
            Error::IoError { source, context } => {
                write!(f, "Error: {}\n{}", context, source)
            }
            Error::OptionRetrievalFailure { message, key } => {
                write!(
                    f,
                    "Failed to retrieve value with key ({}), context: {}",
                    key, message
                )
            }
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}
