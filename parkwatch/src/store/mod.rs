//! Durable storage for the session ledger.

mod csv_file;
mod lock;

use std::path::PathBuf;

use thiserror::Error;

use crate::models::ParkingSession;

pub use csv_file::CsvStore;
pub use lock::LedgerLock;

/// Errors raised while reading or writing the ledger.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed ledger file: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid ledger row at line {line}: {reason}")]
    InvalidRow { line: u64, reason: String },

    #[error("inconsistent ledger: {0}")]
    Inconsistent(String),

    #[error("ledger {} is locked by process {pid}", path.display())]
    Locked { path: PathBuf, pid: u32 },

    #[error("ledger lock {} has an unreadable owner", path.display())]
    LockUnreadable { path: PathBuf },

    #[error("failed to replace ledger file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// The authoritative record set behind a [`crate::ledger::SessionLedger`].
///
/// `save` always receives the complete history; implementations rewrite
/// rather than append.
pub trait SessionStore {
    /// Read every stored session. A store that does not exist yet is empty.
    fn load(&self) -> Result<Vec<ParkingSession>, StoreError>;

    /// Replace the stored record set.
    fn save(&mut self, sessions: &[ParkingSession]) -> Result<(), StoreError>;
}
