//! Gate console: reads commands, drives the providers and the ledger.

mod command;
mod console;

use std::fmt;

use thiserror::Error;

use crate::ledger::{AllocationError, ClosureError};
use crate::models::{format_timestamp, ParkingSession, SlotNumber};

pub use command::Command;
pub use console::Controller;

/// Where the console is in handling a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    /// Waiting for the next command.
    Idle,
    /// Waiting for the camera.
    AwaitingCapture,
    /// The recognizer produced this plate.
    PlateDetected(String),
    /// The recognizer produced nothing.
    NoPlateDetected,
    /// The console has stopped.
    Shutdown,
}

/// Everything that can go wrong while handling one command.
///
/// None of these stop the console.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("no plate detected, please try again")]
    NoPlateDetected,

    #[error("camera unavailable: {0}")]
    CaptureUnavailable(String),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Closure(#[from] ClosureError),

    #[error("invalid command '{0}', enter entry, exit or quit")]
    UnknownCommand(String),
}

/// Result of a successfully handled command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Entered { plate: String, slot: SlotNumber },
    Exited { plate: String, slot: SlotNumber },
    /// The operator cancelled the capture. Nothing is reported.
    Cancelled,
    Status(Vec<String>),
    Help,
    Shutdown,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entered { plate, slot } => write!(f, "Allocated slot {slot} for {plate}"),
            Self::Exited { plate, slot } => write!(f, "Car {plate} exited from slot {slot}"),
            Self::Cancelled => Ok(()),
            Self::Status(lines) => write!(f, "{}", lines.join("\n")),
            Self::Help => write!(f, "{}", Command::HELP),
            Self::Shutdown => write!(f, "System shutdown."),
        }
    }
}

/// One line per slot: who is parked there, or that it is free.
pub fn occupancy_lines(max_slots: SlotNumber, open: &[&ParkingSession]) -> Vec<String> {
    let mut lines: Vec<String> = (1..=max_slots)
        .map(|slot| match open.iter().find(|s| s.slot == slot) {
            Some(session) => format!(
                "Slot {slot:<3} {:<12} since {}",
                session.plate,
                format_timestamp(session.entry_time)
            ),
            None => format!("Slot {slot:<3} free"),
        })
        .collect();

    let parked = open.len();
    lines.push(format!(
        "{parked} parked, {} free",
        (max_slots as usize).saturating_sub(parked)
    ));
    lines
}
