//! Parking session model.

use chrono::{NaiveDateTime, Timelike};

/// A numbered parking position, starting at 1.
pub type SlotNumber = u32;

/// Timestamp layout used by the ledger file and the mirror.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Status of a parking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// The car is currently parked.
    Open,
    /// The car has left.
    Closed,
}

impl SessionStatus {
    /// Convert status to string for display.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "parked",
            Self::Closed => "left",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One parking event: a plate occupying a slot from entry until exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkingSession {
    /// Normalized plate string.
    pub plate: String,
    /// When the car entered.
    pub entry_time: NaiveDateTime,
    /// When the car left. `None` while the car is parked.
    pub exit_time: Option<NaiveDateTime>,
    /// Slot held by this session.
    pub slot: SlotNumber,
}

impl ParkingSession {
    /// Create a new open session. The plate must already be normalized.
    pub fn open(plate: String, slot: SlotNumber, entry_time: NaiveDateTime) -> Self {
        Self {
            plate,
            entry_time,
            exit_time: None,
            slot,
        }
    }

    /// Whether the car is still parked.
    pub const fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    pub const fn status(&self) -> SessionStatus {
        if self.is_open() {
            SessionStatus::Open
        } else {
            SessionStatus::Closed
        }
    }
}

/// Normalize a plate for comparison and storage.
///
/// Removes every whitespace character and upper-cases ASCII letters, so
/// `" ab 123 "` and `"AB123"` name the same car.
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Drop sub-second precision; the ledger file only keeps whole seconds.
pub fn truncate_to_seconds(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Format a timestamp the way the ledger stores it.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp string flexibly.
///
/// Accepts the ledger layout, an ISO `T` separator, and fractional seconds.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const LAYOUTS: &[&str] = &[
        TIMESTAMP_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];

    let s = s.trim();
    LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
        .map(truncate_to_seconds)
}
