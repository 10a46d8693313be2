//! Locations and their live occupancy counters.

use serde::Serialize;
use std::fmt;

use crate::ids::LocationId;

/// Result of applying one entry or exit to a location's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyChange {
    /// Counter moved by one in the expected direction
    Applied { occupancy: u32 },
    /// Entry recorded while the location was already at capacity
    OverCapacity { occupancy: u32, capacity: u32 },
    /// Exit at an empty location; counter left at zero
    Clamped,
}

impl OccupancyChange {
    /// Returns the signed change actually applied to the counter.
    pub fn delta(&self, is_entry: bool) -> i32 {
        match self {
            Self::Clamped => 0,
            _ if is_entry => 1,
            _ => -1,
        }
    }
}

/// A location with a fixed capacity and a derived occupancy count.
///
/// Occupancy never goes below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    id: LocationId,
    name: String,
    capacity: u32,
    occupancy: u32,
}

impl Location {
    pub fn new(id: LocationId, name: impl Into<String>, capacity: u32) -> Self {
        Self {
            id,
            name: name.into(),
            capacity,
            occupancy: 0,
        }
    }

    pub fn id(&self) -> &LocationId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn occupancy(&self) -> u32 {
        self.occupancy
    }

    pub fn is_full(&self) -> bool {
        self.occupancy >= self.capacity
    }

    /// Counts one subject in.
    pub fn record_entry(&mut self) -> OccupancyChange {
        let was_full = self.is_full();
        self.occupancy = self.occupancy.saturating_add(1);
        if was_full {
            OccupancyChange::OverCapacity {
                occupancy: self.occupancy,
                capacity: self.capacity,
            }
        } else {
            OccupancyChange::Applied {
                occupancy: self.occupancy,
            }
        }
    }

    /// Counts one subject out, refusing to go below zero.
    pub fn record_exit(&mut self) -> OccupancyChange {
        match self.occupancy.checked_sub(1) {
            Some(n) => {
                self.occupancy = n;
                OccupancyChange::Applied { occupancy: n }
            }
            None => OccupancyChange::Clamped,
        }
    }

    /// Zeroes the counter (used when the store is rebuilt).
    pub fn reset(&mut self) {
        self.occupancy = 0;
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}/{}",
            self.name, self.id, self.occupancy, self.capacity
        )
    }
}
