//! Entry/exit derivation and occupancy accounting.
//!
//! Called only from inside the store's locked append, so the subject state
//! it reads and the counter it moves are always consistent with each other.

use rollcall_core::{Location, OccupancyChange, SubjectId};
use tracing::warn;

/// Derives the direction of a new scan from the subject's last direction.
///
/// A subject with no history enters; otherwise the direction flips.
pub fn next_direction(last: Option<bool>) -> bool {
    match last {
        None => true,
        Some(was_entry) => !was_entry,
    }
}

/// Moves a location's occupancy counter for one event.
///
/// The event is recorded regardless of the outcome; this only reports what
/// happened to the counter.
pub fn apply_occupancy(
    location: &mut Location,
    subject: &SubjectId,
    is_entry: bool,
) -> OccupancyChange {
    let change = if is_entry {
        location.record_entry()
    } else {
        location.record_exit()
    };

    match change {
        OccupancyChange::Clamped => {
            warn!(
                location = %location.id(),
                subject = %subject,
                "Exit at empty location, occupancy left at zero"
            );
        }
        OccupancyChange::OverCapacity {
            occupancy,
            capacity,
        } => {
            warn!(
                location = %location.id(),
                subject = %subject,
                occupancy,
                capacity,
                "Location over capacity"
            );
        }
        OccupancyChange::Applied { .. } => {}
    }

    change
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::LocationId;

    #[test]
    fn test_first_scan_is_entry() {
        assert!(next_direction(None));
    }

    #[test]
    fn test_direction_alternates() {
        assert!(!next_direction(Some(true)));
        assert!(next_direction(Some(false)));
    }

    #[test]
    fn test_apply_occupancy() {
        let subject = SubjectId::new("MHS001").unwrap();
        let mut lab = Location::new(LocationId::from("LAB-1"), "Lab", 2);

        assert_eq!(
            apply_occupancy(&mut lab, &subject, true),
            OccupancyChange::Applied { occupancy: 1 }
        );
        assert_eq!(
            apply_occupancy(&mut lab, &subject, false),
            OccupancyChange::Applied { occupancy: 0 }
        );
        assert_eq!(
            apply_occupancy(&mut lab, &subject, false),
            OccupancyChange::Clamped
        );
        assert_eq!(lab.occupancy(), 0);
    }
}
