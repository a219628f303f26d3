//! Parking session ledger.

mod clock;
mod error;
mod session_ledger;

pub use clock::{Clock, SystemClock};
pub use error::{AllocationError, ClosureError};
pub use session_ledger::SessionLedger;
