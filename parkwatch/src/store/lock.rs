//! Single-writer lock for a ledger file.
//!
//! The lock is a sibling file `<ledger>.lock` holding the owner's pid. The
//! pid is written to a staging file first and hard-linked into place, so the
//! lock never exists without its owner. A lock whose owner is no longer
//! running is taken over; one whose owner cannot be read is left alone.

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::NamedTempFile;
use tracing::warn;

use super::StoreError;

/// Stale-lock takeovers to attempt before giving up on a contended lock.
const TAKEOVER_ATTEMPTS: usize = 3;

/// Held for as long as a writer owns the ledger. Dropping it releases the lock.
#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
}

impl LedgerLock {
    /// Take the lock for `ledger_path`.
    pub fn acquire(ledger_path: &Path) -> Result<Self, StoreError> {
        let path = lock_path_for(ledger_path);
        let dir = parent_dir(&path);

        for _ in 0..TAKEOVER_ATTEMPTS {
            match Self::try_create(&path, dir) {
                Ok(lock) => return Ok(lock),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }

            let owner = match read_owner(&path) {
                Ok(owner) => owner,
                // Released between our attempt and the read.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(&path, e)),
            };
            let Some(pid) = owner else {
                return Err(StoreError::LockUnreadable { path });
            };
            if process_alive(pid) {
                return Err(StoreError::Locked { path, pid });
            }

            warn!(path = %path.display(), pid, "taking over stale ledger lock");
            take_over_stale(&path, dir, pid)?;
        }

        Err(StoreError::io(
            &path,
            io::Error::new(ErrorKind::WouldBlock, "ledger lock is contended"),
        ))
    }

    fn try_create(path: &Path, dir: &Path) -> io::Result<Self> {
        let mut staged = NamedTempFile::new_in(dir)?;
        write!(staged, "{}", std::process::id())?;
        staged.flush()?;
        fs::hard_link(staged.path(), path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if matches!(read_owner(&self.path), Ok(Some(pid)) if pid == std::process::id()) {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Move a stale lock out of the way.
///
/// The lock is renamed aside before it is deleted. If what was moved is no
/// longer the stale lock but a live writer's fresh one, it is put back.
fn take_over_stale(path: &Path, dir: &Path, stale_pid: u32) -> Result<(), StoreError> {
    let aside = NamedTempFile::new_in(dir)
        .map_err(|e| StoreError::io(dir, e))?
        .into_temp_path();

    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::io(path, e)),
    }

    match read_owner(&aside) {
        Ok(Some(pid)) if pid != stale_pid && process_alive(pid) => {
            let _ = fs::hard_link(&aside, path);
            Err(StoreError::Locked {
                path: path.to_path_buf(),
                pid,
            })
        }
        _ => Ok(()),
    }
}

fn lock_path_for(ledger_path: &Path) -> PathBuf {
    let mut name = ledger_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn read_owner(path: &Path) -> io::Result<Option<u32>> {
    Ok(fs::read_to_string(path)?.trim().parse().ok())
}

/// Check whether a process is running (signal 0 checks without delivering).
fn process_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .is_ok_and(|output| output.status.success())
}
