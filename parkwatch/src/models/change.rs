//! Change events emitted by the ledger for replication.

use chrono::NaiveDateTime;

use super::session::{ParkingSession, SlotNumber};

/// A committed change to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerChange {
    /// A car was assigned a slot.
    Entered {
        plate: String,
        slot: SlotNumber,
        entry_time: NaiveDateTime,
    },
    /// A car left its slot.
    Exited {
        plate: String,
        slot: SlotNumber,
        entry_time: NaiveDateTime,
        exit_time: NaiveDateTime,
    },
}

impl LedgerChange {
    /// Build the change describing the current state of a session.
    pub fn from_session(session: &ParkingSession) -> Self {
        match session.exit_time {
            None => Self::Entered {
                plate: session.plate.clone(),
                slot: session.slot,
                entry_time: session.entry_time,
            },
            Some(exit_time) => Self::Exited {
                plate: session.plate.clone(),
                slot: session.slot,
                entry_time: session.entry_time,
                exit_time,
            },
        }
    }

    pub fn plate(&self) -> &str {
        match self {
            Self::Entered { plate, .. } | Self::Exited { plate, .. } => plate,
        }
    }

    pub const fn slot(&self) -> SlotNumber {
        match self {
            Self::Entered { slot, .. } | Self::Exited { slot, .. } => *slot,
        }
    }
}
