//! Data models for parking sessions.

mod change;
mod session;

pub use change::LedgerChange;
pub use session::{
    format_timestamp, normalize_plate, parse_timestamp, truncate_to_seconds, ParkingSession,
    SlotNumber,
};
