use thiserror::Error;

use crate::models::SlotNumber;
use crate::store::StoreError;

/// Why a car could not be given a slot.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("car {plate} is already parked in slot {slot}")]
    AlreadyParked { plate: String, slot: SlotNumber },

    #[error("no slots available")]
    NoSlotsAvailable,

    #[error("plate is empty")]
    EmptyPlate,

    #[error("failed to record entry: {0}")]
    Store(#[from] StoreError),
}

/// Why a car's session could not be closed.
///
/// A plate that never parked and a plate that already left both map to
/// `NotFound`.
#[derive(Debug, Error)]
pub enum ClosureError {
    #[error("car {plate} not found in any slot")]
    NotFound { plate: String },

    #[error("failed to record exit: {0}")]
    Store(#[from] StoreError),
}
