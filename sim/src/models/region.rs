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

use enum_map::{enum_map, EnumMap};
use rand::rngs::StdRng;
use rand::Rng;
use strum::IntoEnumIterator;

use crate::config::{CANVAS_SIZE, REGION_INSET};
use crate::geometry::Coordinate;
use crate::models::location::Location;
use crate::models::{LocationClass, LocationId};
use crate::SimulationMode;

/// A square tile of the canvas owning every location of one class
pub struct Region {
    name: String,
    class: LocationClass,
    origin: Coordinate,
    side: f64,
    color: (u8, u8, u8),
    locations: Vec<Location>,
}

impl Region {
    pub fn new(class: LocationClass, origin: Coordinate, side: f64) -> Region {
        let (name, color) = match class {
            LocationClass::Home => ("Home", (3, 11, 252)),
            LocationClass::Work => ("Work", (255, 0, 255)),
            LocationClass::School => ("School", (240, 41, 41)),
            LocationClass::Leisure => ("Leisure", (0, 227, 19)),
        };
        Region {
            name: name.to_string(),
            class,
            origin,
            side,
            color,
            locations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> LocationClass {
        self.class
    }

    pub fn color(&self) -> (u8, u8, u8) {
        self.color
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn locations_mut(&mut self) -> &mut [Location] {
        &mut self.locations
    }

    pub fn num_locations(&self) -> usize {
        self.locations.len()
    }

    pub fn contains(&self, point: Coordinate) -> bool {
        point.x >= self.origin.x
            && point.x < self.origin.x + self.side
            && point.y >= self.origin.y
            && point.y < self.origin.y + self.side
    }

    /// Rejection-samples a coordinate in the region's inset interior
    pub fn random_coordinate(&self, rng: &mut StdRng) -> Coordinate {
        loop {
            let x = self.origin.x + rng.gen_range(REGION_INSET..self.side - REGION_INSET);
            let y = self.origin.y + rng.gen_range(REGION_INSET..self.side - REGION_INSET);
            let candidate = Coordinate::new(x, y);
            if self.contains(candidate) {
                return candidate;
            }
        }
    }

    /// A uniformly chosen owned location, or None when the region is empty
    pub fn random_location(&self, rng: &mut StdRng) -> Option<LocationId> {
        if self.locations.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.locations.len());
        Some(self.locations[index].id())
    }

    pub fn find(&self, id: LocationId) -> Option<&Location> {
        self.locations.iter().find(|location| location.id() == id)
    }

    pub fn find_mut(&mut self, id: LocationId) -> Option<&mut Location> {
        self.locations.iter_mut().find(|location| location.id() == id)
    }

    pub fn push_location(&mut self, location: Location) {
        self.locations.push(location);
    }

    /// O(n) removal: find by id, swap with the back, drop. Ids stay
    /// stable, ordering does not
    pub fn remove_location(&mut self, id: LocationId) -> Option<Location> {
        let index = self.locations.iter().position(|location| location.id() == id)?;
        Some(self.locations.swap_remove(index))
    }
}

/// All locations of the simulation: the four regions plus the single
/// out-of-region homeless shelter
pub struct LocationSet {
    regions: EnumMap<LocationClass, Region>,
    shelter: Option<Location>,
    next_id: u32,
}

impl LocationSet {
    /// Tiles the canvas with the four 450-side region squares
    pub fn new() -> LocationSet {
        let half = CANVAS_SIZE / 2.0;
        let regions = enum_map! {
            LocationClass::Home => Region::new(LocationClass::Home, Coordinate::new(0.0, 0.0), half),
            LocationClass::Work => Region::new(LocationClass::Work, Coordinate::new(half, 0.0), half),
            LocationClass::School => Region::new(LocationClass::School, Coordinate::new(0.0, half), half),
            LocationClass::Leisure => Region::new(LocationClass::Leisure, Coordinate::new(half, half), half),
        };
        LocationSet {
            regions,
            shelter: None,
            next_id: 0,
        }
    }

    pub fn region(&self, class: LocationClass) -> &Region {
        &self.regions[class]
    }

    pub fn region_mut(&mut self, class: LocationClass) -> &mut Region {
        &mut self.regions[class]
    }

    fn allocate_id(&mut self) -> LocationId {
        let id = LocationId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Creates a location at a random coordinate of its class region
    pub fn create_location(
        &mut self,
        class: LocationClass,
        mode: SimulationMode,
        rng: &mut StdRng,
    ) -> LocationId {
        let id = self.allocate_id();
        let position = self.regions[class].random_coordinate(rng);
        let location = Location::new(id, position, class, mode, rng);
        self.regions[class].push_location(location);
        id
    }

    /// Creates the homeless shelter at a random spot of the home region.
    /// The shelter belongs to no region and carries no roles
    pub fn create_shelter(&mut self, rng: &mut StdRng) -> LocationId {
        let id = self.allocate_id();
        let position = self.regions[LocationClass::Home].random_coordinate(rng);
        self.shelter = Some(Location::new(
            id,
            position,
            LocationClass::Home,
            SimulationMode::Simple,
            rng,
        ));
        id
    }

    pub fn shelter(&self) -> Option<&Location> {
        self.shelter.as_ref()
    }

    pub fn shelter_mut(&mut self) -> Option<&mut Location> {
        self.shelter.as_mut()
    }

    pub fn random_location(&self, class: LocationClass, rng: &mut StdRng) -> Option<LocationId> {
        self.regions[class].random_location(rng)
    }

    pub fn find(&self, id: LocationId) -> Option<&Location> {
        if let Some(shelter) = self.shelter.as_ref() {
            if shelter.id() == id {
                return Some(shelter);
            }
        }
        LocationClass::iter().find_map(|class| self.regions[class].find(id))
    }

    pub fn find_mut(&mut self, id: LocationId) -> Option<&mut Location> {
        if let Some(shelter) = self.shelter.as_mut() {
            if shelter.id() == id {
                return Some(shelter);
            }
        }
        for class in LocationClass::iter() {
            if self.regions[class].find(id).is_some() {
                return self.regions[class].find_mut(id);
            }
        }
        None
    }

    /// Ids of every region-owned location, region by region in class order
    pub fn all_ids(&self) -> Vec<LocationId> {
        LocationClass::iter()
            .flat_map(|class| self.regions[class].locations().iter().map(Location::id))
            .collect()
    }
}

impl Default for LocationSet {
    fn default() -> Self {
        LocationSet::new()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn random_coordinates_respect_the_inset() {
        let mut rng = StdRng::seed_from_u64(5);
        let region = Region::new(LocationClass::Work, Coordinate::new(450.0, 0.0), 450.0);
        for _ in 0..200 {
            let point = region.random_coordinate(&mut rng);
            assert!(point.x >= 460.0 && point.x < 890.0);
            assert!(point.y >= 10.0 && point.y < 440.0);
        }
    }

    #[test]
    fn remove_location_swaps_with_back() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut set = LocationSet::new();
        let a = set.create_location(LocationClass::Work, SimulationMode::Simple, &mut rng);
        let b = set.create_location(LocationClass::Work, SimulationMode::Simple, &mut rng);
        let c = set.create_location(LocationClass::Work, SimulationMode::Simple, &mut rng);

        let removed = set.region_mut(LocationClass::Work).remove_location(a);
        assert_eq!(removed.map(|location| location.id()), Some(a));
        // The back location took the vacated slot; both survivors remain
        let region = set.region(LocationClass::Work);
        assert_eq!(region.num_locations(), 2);
        assert_eq!(region.locations()[0].id(), c);
        assert!(region.find(b).is_some());
        assert!(set.find(a).is_none());
    }

    #[test]
    fn empty_region_has_no_random_location() {
        let mut rng = StdRng::seed_from_u64(5);
        let set = LocationSet::new();
        assert!(set.random_location(LocationClass::Leisure, &mut rng).is_none());
    }

    #[test]
    fn shelter_is_reachable_by_id_but_outside_regions() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut set = LocationSet::new();
        let shelter = set.create_shelter(&mut rng);
        assert!(set.find(shelter).is_some());
        assert!(!set.all_ids().contains(&shelter));
    }
}
