//! CSV-backed ledger file.
//!
//! Layout is one row per session with the header
//! `Plate_Number,Entry_Time,Exit_Time,Parking_Slot`. Open sessions leave
//! `Exit_Time` empty. Rewrites go through a temporary file in the same
//! directory that is renamed over the ledger, so a crash mid-write never
//! leaves a truncated file behind.

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{LedgerLock, SessionStore, StoreError};
use crate::models::{
    format_timestamp, normalize_plate, parse_timestamp, ParkingSession, SlotNumber,
};

const HEADER: [&str; 4] = ["Plate_Number", "Entry_Time", "Exit_Time", "Parking_Slot"];

/// A ledger row as it appears in the file.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    #[serde(rename = "Plate_Number")]
    plate: String,
    #[serde(rename = "Entry_Time")]
    entry_time: String,
    #[serde(rename = "Exit_Time", default)]
    exit_time: Option<String>,
    #[serde(rename = "Parking_Slot")]
    slot: String,
}

impl From<&ParkingSession> for LedgerRow {
    fn from(session: &ParkingSession) -> Self {
        Self {
            plate: session.plate.clone(),
            entry_time: format_timestamp(session.entry_time),
            exit_time: session.exit_time.map(format_timestamp),
            slot: session.slot.to_string(),
        }
    }
}

impl LedgerRow {
    fn into_session(self, line: u64) -> Result<ParkingSession, StoreError> {
        let invalid = |reason: String| StoreError::InvalidRow { line, reason };

        let plate = normalize_plate(&self.plate);
        if plate.is_empty() {
            return Err(invalid("empty plate".to_string()));
        }

        let entry_time = parse_timestamp(&self.entry_time)
            .ok_or_else(|| invalid(format!("invalid entry time: {}", self.entry_time)))?;

        // Spreadsheet exports write missing values as empty or "nan".
        let exit_time = match self.exit_time.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) if s.eq_ignore_ascii_case("nan") => None,
            Some(s) => Some(
                parse_timestamp(s).ok_or_else(|| invalid(format!("invalid exit time: {s}")))?,
            ),
        };

        let slot = parse_slot(&self.slot)
            .ok_or_else(|| invalid(format!("invalid slot: {}", self.slot)))?;

        Ok(ParkingSession {
            plate,
            entry_time,
            exit_time,
            slot,
        })
    }
}

/// Parse a slot number, tolerating float-formatted integers like `3.0`.
fn parse_slot(s: &str) -> Option<SlotNumber> {
    let s = s.trim();
    if let Ok(slot) = s.parse::<SlotNumber>() {
        return Some(slot);
    }

    let value = s.parse::<f64>().ok()?;
    if value.fract() != 0.0 || value < 0.0 || value > f64::from(SlotNumber::MAX) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(value as SlotNumber)
}

/// Ledger stored as a CSV file.
#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    _lock: Option<LedgerLock>,
}

impl CsvStore {
    /// Open the ledger for writing, taking the single-writer lock.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let lock = LedgerLock::acquire(&path)?;
        debug!(lock = %lock.path().display(), "ledger lock acquired");
        Ok(Self {
            path,
            _lock: Some(lock),
        })
    }

    /// Open the ledger for reading only. No lock is taken.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _lock: None,
        }
    }

    fn parent_dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}

impl SessionStore for CsvStore {
    fn load(&self) -> Result<Vec<ParkingSession>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "ledger file missing, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(file);
        let headers = reader.headers()?.clone();

        let mut sessions = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, csv::Position::line);
            let row: LedgerRow = record.deserialize(Some(&headers))?;
            sessions.push(row.into_session(line)?);
        }

        debug!(path = %self.path.display(), count = sessions.len(), "loaded ledger");
        Ok(sessions)
    }

    fn save(&mut self, sessions: &[ParkingSession]) -> Result<(), StoreError> {
        let dir = self.parent_dir().to_path_buf();
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;

        {
            let mut writer = WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());
            writer.write_record(HEADER)?;
            for session in sessions {
                writer.serialize(LedgerRow::from(session))?;
            }
            writer.flush().map_err(|e| StoreError::io(&self.path, e))?;
        }

        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(&self.path, e))?;
        tmp.persist(&self.path)?;

        debug!(path = %self.path.display(), count = sessions.len(), "ledger written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ts(s: &str) -> chrono::NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn sample() -> Vec<ParkingSession> {
        vec![
            ParkingSession {
                plate: "ABC123".to_string(),
                entry_time: ts("2024-03-01 08:00:00"),
                exit_time: Some(ts("2024-03-01 09:30:00")),
                slot: 1,
            },
            ParkingSession::open("XYZ999".to_string(), 2, ts("2024-03-01 08:05:10")),
        ]
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = CsvStore::read_only(dir.path().join("parking_data.csv"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_reproduces_sessions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parking_data.csv");
        let mut store = CsvStore::open(&path).unwrap();

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
    }

    #[test]
    fn file_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parking_data.csv");
        let mut store = CsvStore::open(&path).unwrap();
        store.save(&sample()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Plate_Number,Entry_Time,Exit_Time,Parking_Slot");
        assert_eq!(lines[1], "ABC123,2024-03-01 08:00:00,2024-03-01 09:30:00,1");
        assert_eq!(lines[2], "XYZ999,2024-03-01 08:05:10,,2");
    }

    #[test]
    fn empty_ledger_still_has_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parking_data.csv");
        let mut store = CsvStore::open(&path).unwrap();
        store.save(&[]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "Plate_Number,Entry_Time,Exit_Time,Parking_Slot");
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn load_tolerates_spreadsheet_exports() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parking_data.csv");
        std::fs::write(
            &path,
            "Plate_Number,Entry_Time,Exit_Time,Parking_Slot\n\
             ab 123,2024-03-01 08:00:00,nan,3.0\n",
        )
        .unwrap();

        let sessions = CsvStore::read_only(&path).load().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].plate, "AB123");
        assert_eq!(sessions[0].slot, 3);
        assert!(sessions[0].is_open());
    }

    #[test]
    fn load_rejects_bad_timestamp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parking_data.csv");
        std::fs::write(
            &path,
            "Plate_Number,Entry_Time,Exit_Time,Parking_Slot\nABC123,soon,,1\n",
        )
        .unwrap();

        let err = CsvStore::read_only(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::InvalidRow { line: 2, .. }));
    }

    #[test]
    fn parse_slot_variants() {
        assert_eq!(parse_slot("4"), Some(4));
        assert_eq!(parse_slot(" 7.0 "), Some(7));
        assert_eq!(parse_slot("2.5"), None);
        assert_eq!(parse_slot("-1"), None);
        assert_eq!(parse_slot("slot"), None);
    }
}
