// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Durable per-artifact coordination through sidecar files.
//!
//! A `<stem>.lock` beside the target archive means a worker is (or was)
//! active on it; peers skip rather than wait, and a lock left behind by a
//! killed process keeps the artifact parked until the operator clears it.
//! A `<stem>.bad` records a terminal failure and causes a permanent skip.

use std::io;
use std::path::{Path, PathBuf};

use fs_err as fs;
use log::debug;

/// Why an artifact was skipped without any work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Another worker holds (or held) the lock
    Locked,
    /// A previous run recorded a terminal failure
    Bad,
}

/// The sidecar pair for one artifact stem
#[derive(Debug, Clone)]
pub struct Sidecar {
    lock: PathBuf,
    bad: PathBuf,
}

impl Sidecar {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            lock: dir.join(format!("{stem}.lock")),
            bad: dir.join(format!("{stem}.bad")),
        }
    }

    /// Check both sidecars before starting work
    pub fn skip_reason(&self) -> Option<Skip> {
        if self.bad.is_file() {
            return Some(Skip::Bad);
        }
        if self.lock.is_file() {
            return Some(Skip::Locked);
        }
        None
    }

    /// Create the lock sidecar. Losing the creation race to a peer is a
    /// skip, not an error.
    pub fn acquire(&self) -> io::Result<Option<Guard>> {
        match fs::OpenOptions::new().write(true).create_new(true).open(&self.lock) {
            Ok(_) => Ok(Some(Guard {
                lock: self.lock.clone(),
                bad: self.bad.clone(),
            })),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("lost lock race on {}", self.lock.display());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// An acquired lock. Must be resolved with [`Guard::release`] or
/// [`Guard::mark_bad`]; dropping it leaves the lock on disk so a restart
/// after a kill skips the artifact instead of double-fetching it.
#[derive(Debug)]
pub struct Guard {
    lock: PathBuf,
    bad: PathBuf,
}

impl Guard {
    /// Successful completion: remove the lock
    pub fn release(self) -> io::Result<()> {
        fs::remove_file(&self.lock)
    }

    /// Terminal failure: record the reason and remove the lock
    pub fn mark_bad(self, reason: &str) -> io::Result<()> {
        fs::write(&self.bad, format!("{reason}\n"))?;
        fs::remove_file(&self.lock)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn acquire_release_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = Sidecar::new(dir.path(), "acme-util-1.0.0");

        assert_eq!(sidecar.skip_reason(), None);

        let guard = sidecar.acquire().unwrap().unwrap();
        assert!(dir.path().join("acme-util-1.0.0.lock").is_file());
        assert_eq!(sidecar.skip_reason(), Some(Skip::Locked));

        guard.release().unwrap();
        assert_eq!(sidecar.skip_reason(), None);
    }

    #[test]
    fn bad_marker_is_permanent_and_clears_lock() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = Sidecar::new(dir.path(), "acme-util-1.0.0");

        let guard = sidecar.acquire().unwrap().unwrap();
        guard.mark_bad("url failed HEAD check").unwrap();

        assert!(!dir.path().join("acme-util-1.0.0.lock").exists());
        let bad = dir.path().join("acme-util-1.0.0.bad");
        assert!(bad.is_file());
        assert_eq!(
            std::fs::read_to_string(bad).unwrap(),
            "url failed HEAD check\n"
        );
        assert_eq!(sidecar.skip_reason(), Some(Skip::Bad));
    }

    #[test]
    fn acquire_race_loser_skips() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = Sidecar::new(dir.path(), "acme-util-1.0.0");

        let _held = sidecar.acquire().unwrap().unwrap();
        assert!(sidecar.acquire().unwrap().is_none());
    }

    #[test]
    fn stale_lock_from_killed_worker_causes_skip() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = Sidecar::new(dir.path(), "acme-util-1.0.0");

        let guard = sidecar.acquire().unwrap().unwrap();
        drop(guard);

        assert_eq!(sidecar.skip_reason(), Some(Skip::Locked));
    }
}
