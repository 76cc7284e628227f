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

use serde::{Deserialize, Serialize};

/// A point on the simulation canvas
#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Coordinate {
        Coordinate { x, y }
    }

    /// Euclidean distance to another coordinate
    pub fn distance_to(&self, other: Coordinate) -> f64 {
        let x_diff = self.x - other.x;
        let y_diff = self.y - other.y;
        (x_diff * x_diff + y_diff * y_diff).sqrt()
    }

    /// Unit vector pointing from this coordinate to another, or the zero
    /// vector when the two coincide
    pub fn heading_to(&self, other: Coordinate) -> Coordinate {
        let x_diff = other.x - self.x;
        let y_diff = other.y - self.y;
        if x_diff == 0.0 && y_diff == 0.0 {
            return Coordinate::new(0.0, 0.0);
        }
        let magnitude = (x_diff * x_diff + y_diff * y_diff).sqrt();
        Coordinate::new(x_diff / magnitude, y_diff / magnitude)
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}
