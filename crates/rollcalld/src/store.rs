//! In-memory attendance store.
//!
//! Holds the ordered event log together with the indices derived from it:
//!
//! - last direction per subject (drives entry/exit alternation)
//! - live occupancy per location
//!
//! Everything sits behind one `parking_lot::Mutex`. An append reads the
//! subject's state, sequences the scan, moves the occupancy counter and
//! pushes the event without releasing the lock, so concurrent appends for
//! the same subject always alternate. The lock is never held across I/O.
//!
//! # Panic-Free Guarantees
//!
//! No `.unwrap()`/`.expect()` outside tests; unknown readers are reported
//! as [`StoreError::UnknownReader`] and leave the store untouched.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use rollcall_core::{
    AttendanceEvent, Location, LocationId, LogRecord, OccupancyChange, ReaderId, RecordId, Scan,
    ScanSource, SubjectId,
};
use thiserror::Error;
use tracing::debug;

use crate::sequencer;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unknown reader: {0}")]
    UnknownReader(ReaderId),
}

/// Point-in-time counters for status output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub events: usize,
    pub subjects: usize,
    /// Subjects whose last event was an entry
    pub present: usize,
    pub clamped_exits: u64,
    pub over_capacity_entries: u64,
}

#[derive(Debug)]
struct StoreInner {
    events: Vec<AttendanceEvent>,
    last_state: HashMap<SubjectId, bool>,
    locations: BTreeMap<LocationId, Location>,
    next_id: RecordId,
    clamped_exits: u64,
    over_capacity_entries: u64,
}

impl StoreInner {
    fn append(&mut self, scan: Scan, location: Option<LocationId>) -> AttendanceEvent {
        let is_entry = sequencer::next_direction(self.last_state.get(&scan.subject).copied());

        if let Some(loc) = location.as_ref().and_then(|id| self.locations.get_mut(id)) {
            match sequencer::apply_occupancy(loc, &scan.subject, is_entry) {
                OccupancyChange::Clamped => self.clamped_exits += 1,
                OccupancyChange::OverCapacity { .. } => self.over_capacity_entries += 1,
                OccupancyChange::Applied { .. } => {}
            }
        }

        let record_id = self.next_id;
        self.next_id = record_id.next();
        self.last_state.insert(scan.subject.clone(), is_entry);

        let event = AttendanceEvent::new(record_id, scan, location, is_entry);
        self.events.push(event.clone());
        event
    }
}

/// Thread-safe attendance store.
#[derive(Debug)]
pub struct AttendanceStore {
    inner: Mutex<StoreInner>,
    readers: HashMap<ReaderId, LocationId>,
}

impl AttendanceStore {
    /// Creates an empty store with the given locations and reader mapping.
    ///
    /// Readers mapped to a location missing from `locations` still resolve,
    /// but no counter moves for them.
    pub fn new(locations: Vec<Location>, readers: HashMap<ReaderId, LocationId>) -> Self {
        let locations = locations
            .into_iter()
            .map(|loc| (loc.id().clone(), loc))
            .collect();
        Self {
            inner: Mutex::new(StoreInner {
                events: Vec::new(),
                last_state: HashMap::new(),
                locations,
                next_id: RecordId::new(1),
                clamped_exits: 0,
                over_capacity_entries: 0,
            }),
            readers,
        }
    }

    /// Creates a store with no locations or readers.
    pub fn unmapped() -> Self {
        Self::new(Vec::new(), HashMap::new())
    }

    /// Sequences and records one scan.
    ///
    /// The reader, if any, is resolved to its location before the lock is
    /// taken; an unknown reader rejects the scan.
    pub fn append(&self, scan: Scan) -> Result<AttendanceEvent, StoreError> {
        let location = match &scan.reader {
            Some(reader) => Some(
                self.readers
                    .get(reader)
                    .cloned()
                    .ok_or_else(|| StoreError::UnknownReader(reader.clone()))?,
            ),
            None => None,
        };

        let event = self.inner.lock().append(scan, location);
        debug!(
            record = %event.record_id(),
            subject = %event.subject(),
            direction = event.direction_label(),
            "Event appended"
        );
        Ok(event)
    }

    /// Rebuilds the store from records loaded off disk.
    ///
    /// Existing events are discarded and every counter is zeroed. Records
    /// carry no location, so occupancy stays at zero afterwards. Returns the
    /// number of events restored.
    pub fn restore(&self, records: &[LogRecord]) -> usize {
        let mut inner = self.inner.lock();
        inner.events.clear();
        inner.events.reserve(records.len());
        inner.last_state.clear();
        inner.next_id = RecordId::new(1);
        inner.clamped_exits = 0;
        inner.over_capacity_entries = 0;
        for loc in inner.locations.values_mut() {
            loc.reset();
        }

        for record in records {
            let scan = Scan::new(record.subject.clone(), record.timestamp, ScanSource::Replay);
            inner.append(scan, None);
        }
        inner.events.len()
    }

    /// Returns every event for `subject`, in insertion order.
    pub fn find_by_subject(&self, subject: &SubjectId) -> Vec<AttendanceEvent> {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|e| e.subject() == subject)
            .cloned()
            .collect()
    }

    /// Stable in-place sort of the log by timestamp.
    ///
    /// Subject state is left alone; it tracks append order, not time order.
    pub fn sort_by_time(&self) {
        self.inner.lock().events.sort_by_key(|e| e.timestamp());
    }

    /// Consistent copy of the whole log.
    pub fn snapshot(&self) -> Vec<AttendanceEvent> {
        self.inner.lock().events.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    /// Direction of the subject's most recent event.
    pub fn last_state(&self, subject: &SubjectId) -> Option<bool> {
        self.inner.lock().last_state.get(subject).copied()
    }

    pub fn occupancy(&self, location: &LocationId) -> Option<u32> {
        self.inner
            .lock()
            .locations
            .get(location)
            .map(Location::occupancy)
    }

    /// Copy of every location counter, ordered by id.
    pub fn locations(&self) -> Vec<Location> {
        self.inner.lock().locations.values().cloned().collect()
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock();
        StoreStats {
            events: inner.events.len(),
            subjects: inner.last_state.len(),
            present: inner.last_state.values().filter(|&&e| e).count(),
            clamped_exits: inner.clamped_exits,
            over_capacity_entries: inner.over_capacity_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(s: &str) -> SubjectId {
        SubjectId::new(s).unwrap()
    }

    fn scan(s: &str, ts: i64) -> Scan {
        Scan::new(id(s), ts, ScanSource::Admin)
    }

    fn lab_store(capacity: u32) -> AttendanceStore {
        let lab = Location::new(LocationId::from("LAB-1"), "Lab", capacity);
        let readers = HashMap::from([(ReaderId::from("R1"), LocationId::from("LAB-1"))]);
        AttendanceStore::new(vec![lab], readers)
    }

    #[test]
    fn test_append_alternates_direction() {
        let store = AttendanceStore::unmapped();
        let first = store.append(scan("MHS001", 100)).unwrap();
        let second = store.append(scan("MHS001", 200)).unwrap();
        let other = store.append(scan("MHS002", 300)).unwrap();

        assert!(first.is_entry());
        assert!(!second.is_entry());
        assert!(other.is_entry());
        assert_eq!(store.last_state(&id("MHS001")), Some(false));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_record_ids_increase() {
        let store = AttendanceStore::unmapped();
        let a = store.append(scan("A1", 1)).unwrap();
        let b = store.append(scan("B1", 1)).unwrap();
        assert_eq!(a.record_id().as_u64(), 1);
        assert_eq!(b.record_id().as_u64(), 2);
    }

    #[test]
    fn test_find_by_subject_keeps_insertion_order() {
        let store = AttendanceStore::unmapped();
        store.append(scan("A1", 30)).unwrap();
        store.append(scan("B1", 20)).unwrap();
        store.append(scan("A1", 10)).unwrap();

        let found = store.find_by_subject(&id("A1"));
        let stamps: Vec<i64> = found.iter().map(|e| e.timestamp()).collect();
        assert_eq!(stamps, vec![30, 10]);
        assert!(store.find_by_subject(&id("ZZ9")).is_empty());
    }

    #[test]
    fn test_sort_by_time_is_stable() {
        let store = AttendanceStore::unmapped();
        store.append(scan("A1", 50)).unwrap();
        store.append(scan("B1", 10)).unwrap();
        store.append(scan("C1", 50)).unwrap();
        store.append(scan("D1", 10)).unwrap();

        store.sort_by_time();
        let order: Vec<String> = store
            .snapshot()
            .iter()
            .map(|e| e.subject().to_string())
            .collect();
        assert_eq!(order, vec!["B1", "D1", "A1", "C1"]);
        // Subject state is untouched by sorting
        assert_eq!(store.last_state(&id("A1")), Some(true));
    }

    #[test]
    fn test_reader_resolves_location_and_occupancy() {
        let store = lab_store(30);
        let loc = LocationId::from("LAB-1");
        let reader = Some(ReaderId::from("R1"));

        let event = store
            .append(scan("MHS001", 1).with_reader(reader.clone()))
            .unwrap();
        assert_eq!(event.location(), Some(&loc));
        assert_eq!(store.occupancy(&loc), Some(1));

        store.append(scan("MHS001", 2).with_reader(reader)).unwrap();
        assert_eq!(store.occupancy(&loc), Some(0));
    }

    #[test]
    fn test_unknown_reader_rejected() {
        let store = lab_store(30);
        let err = store
            .append(scan("MHS001", 1).with_reader(Some(ReaderId::from("NOPE"))))
            .unwrap_err();
        assert_eq!(err, StoreError::UnknownReader(ReaderId::from("NOPE")));
        assert!(store.is_empty());
        assert_eq!(store.last_state(&id("MHS001")), None);
    }

    #[test]
    fn test_bare_exit_recorded_but_clamped() {
        let store = lab_store(30);
        let loc = LocationId::from("LAB-1");

        // Entry without a reader, then exit through one
        store.append(scan("MHS001", 1)).unwrap();
        let exit = store
            .append(scan("MHS001", 2).with_reader(Some(ReaderId::from("R1"))))
            .unwrap();

        assert!(!exit.is_entry());
        assert_eq!(store.occupancy(&loc), Some(0));
        assert_eq!(store.stats().clamped_exits, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_over_capacity_counted() {
        let store = lab_store(1);
        let reader = Some(ReaderId::from("R1"));
        store.append(scan("A1", 1).with_reader(reader.clone())).unwrap();
        store.append(scan("B1", 2).with_reader(reader)).unwrap();
        assert_eq!(store.occupancy(&LocationId::from("LAB-1")), Some(2));
        assert_eq!(store.stats().over_capacity_entries, 1);
    }

    #[test]
    fn test_restore_rebuilds_state() {
        let store = lab_store(30);
        store
            .append(scan("OLD", 1).with_reader(Some(ReaderId::from("R1"))))
            .unwrap();

        let records = vec![
            LogRecord::new(id("MHS001"), 100),
            LogRecord::new(id("MHS001"), 200),
            LogRecord::new(id("MHS002"), 300),
        ];
        assert_eq!(store.restore(&records), 3);

        let events = store.snapshot();
        assert_eq!(events.len(), 3);
        assert!(events[0].is_entry());
        assert!(!events[1].is_entry());
        assert!(events[2].is_entry());
        assert_eq!(events[0].record_id().as_u64(), 1);
        assert_eq!(store.occupancy(&LocationId::from("LAB-1")), Some(0));
        assert_eq!(store.last_state(&id("OLD")), None);

        let stats = store.stats();
        assert_eq!(stats.subjects, 2);
        assert_eq!(stats.present, 1);
    }

    #[test]
    fn test_concurrent_appends_alternate() {
        let store = Arc::new(AttendanceStore::unmapped());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for ts in 0..50 {
                        store.append(scan("SHARED", ts)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let events = store.find_by_subject(&id("SHARED"));
        assert_eq!(events.len(), 400);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.is_entry(), i % 2 == 0);
        }
    }
}
