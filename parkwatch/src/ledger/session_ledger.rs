//! The session ledger: slot allocation and session lifecycle.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info, warn};

use super::{AllocationError, ClosureError, Clock, SystemClock};
use crate::mirror::ReplicationSink;
use crate::models::{normalize_plate, LedgerChange, ParkingSession, SlotNumber};
use crate::store::{CsvStore, SessionStore, StoreError};

/// In-memory table of parking sessions backed by a durable store.
///
/// Every successful [`allocate`](Self::allocate) or [`close`](Self::close)
/// rewrites the store before returning and then publishes a
/// [`LedgerChange`] to the replication sink, if one is attached. The
/// store is the only source of truth; the sink is never consulted.
pub struct SessionLedger<S = CsvStore> {
    store: S,
    sessions: Vec<ParkingSession>,
    max_slots: SlotNumber,
    clock: Box<dyn Clock>,
    sink: Option<Box<dyn ReplicationSink>>,
}

impl<S: SessionStore> SessionLedger<S> {
    /// Load the ledger from `store` for a lot with `max_slots` slots.
    ///
    /// Fails if the stored history breaks the occupancy invariants.
    pub fn open(store: S, max_slots: SlotNumber) -> Result<Self, StoreError> {
        let sessions = store.load()?;
        validate(&sessions, max_slots)?;

        info!(
            sessions = sessions.len(),
            parked = sessions.iter().filter(|s| s.is_open()).count(),
            max_slots,
            "ledger opened"
        );

        Ok(Self {
            store,
            sessions,
            max_slots,
            clock: Box::new(SystemClock),
            sink: None,
        })
    }

    /// Replace the timestamp source.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Attach a sink that receives every committed change.
    #[must_use]
    pub fn with_sink(mut self, sink: impl ReplicationSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Give `plate` the lowest free slot.
    pub fn allocate(&mut self, plate: &str) -> Result<SlotNumber, AllocationError> {
        let plate = normalize_plate(plate);
        if plate.is_empty() {
            return Err(AllocationError::EmptyPlate);
        }

        if let Some(session) = self.find_open(&plate) {
            return Err(AllocationError::AlreadyParked {
                slot: session.slot,
                plate,
            });
        }

        let slot = self
            .lowest_free_slot()
            .ok_or(AllocationError::NoSlotsAvailable)?;

        self.sessions
            .push(ParkingSession::open(plate, slot, self.clock.now()));

        if let Err(e) = self.store.save(&self.sessions) {
            self.sessions.pop();
            return Err(e.into());
        }

        let session = &self.sessions[self.sessions.len() - 1];
        info!(plate = %session.plate, slot, "slot allocated");
        let change = LedgerChange::from_session(session);
        self.publish(change);

        Ok(slot)
    }

    /// Close the open session for `plate` and return the slot it freed.
    pub fn close(&mut self, plate: &str) -> Result<SlotNumber, ClosureError> {
        let plate = normalize_plate(plate);

        let Some(index) = self
            .sessions
            .iter()
            .position(|s| s.is_open() && s.plate == plate)
        else {
            return Err(ClosureError::NotFound { plate });
        };

        // A clock stepped backwards must not produce an exit before the entry.
        let exit_time = self.clock.now().max(self.sessions[index].entry_time);
        self.sessions[index].exit_time = Some(exit_time);

        if let Err(e) = self.store.save(&self.sessions) {
            self.sessions[index].exit_time = None;
            return Err(e.into());
        }

        let session = &self.sessions[index];
        info!(plate = %session.plate, slot = session.slot, "slot released");
        let (slot, change) = (session.slot, LedgerChange::from_session(session));
        self.publish(change);

        Ok(slot)
    }

    /// Full history in insertion order.
    pub fn sessions(&self) -> &[ParkingSession] {
        &self.sessions
    }

    /// Sessions whose car is still parked, ordered by slot.
    pub fn open_sessions(&self) -> Vec<&ParkingSession> {
        let mut open: Vec<_> = self.sessions.iter().filter(|s| s.is_open()).collect();
        open.sort_by_key(|s| s.slot);
        open
    }

    /// The open session for `plate`, if the car is parked.
    pub fn find_open(&self, plate: &str) -> Option<&ParkingSession> {
        let plate = normalize_plate(plate);
        self.sessions
            .iter()
            .find(|s| s.is_open() && s.plate == plate)
    }

    /// Free slots in ascending order.
    pub fn available_slots(&self) -> Vec<SlotNumber> {
        let occupied = self.occupied_slots();
        (1..=self.max_slots)
            .filter(|slot| !occupied.contains(slot))
            .collect()
    }

    pub const fn max_slots(&self) -> SlotNumber {
        self.max_slots
    }

    // Recomputed from the full history on every call.
    fn occupied_slots(&self) -> BTreeSet<SlotNumber> {
        self.sessions
            .iter()
            .filter(|s| s.is_open())
            .map(|s| s.slot)
            .collect()
    }

    fn lowest_free_slot(&self) -> Option<SlotNumber> {
        let occupied = self.occupied_slots();
        (1..=self.max_slots).find(|slot| !occupied.contains(slot))
    }

    fn publish(&self, change: LedgerChange) {
        if let Some(sink) = &self.sink {
            debug!(plate = change.plate(), slot = change.slot(), "publishing change");
            sink.publish(change);
        }
    }
}

/// Check the stored history against the occupancy invariants.
fn validate(sessions: &[ParkingSession], max_slots: SlotNumber) -> Result<(), StoreError> {
    let mut plates = HashSet::new();
    let mut slots = HashSet::new();

    for session in sessions {
        if session.slot == 0 {
            return Err(StoreError::Inconsistent(format!(
                "car {} has slot 0",
                session.plate
            )));
        }

        if let Some(exit_time) = session.exit_time {
            if exit_time < session.entry_time {
                warn!(
                    plate = %session.plate,
                    slot = session.slot,
                    "session exit time precedes its entry time"
                );
            }
            continue;
        }

        if session.slot > max_slots {
            return Err(StoreError::Inconsistent(format!(
                "car {} is parked in slot {} but the lot has {max_slots} slots",
                session.plate, session.slot
            )));
        }
        if !plates.insert(session.plate.as_str()) {
            return Err(StoreError::Inconsistent(format!(
                "car {} is parked twice",
                session.plate
            )));
        }
        if !slots.insert(session.slot) {
            return Err(StoreError::Inconsistent(format!(
                "slot {} holds two cars",
                session.slot
            )));
        }
    }

    Ok(())
}
