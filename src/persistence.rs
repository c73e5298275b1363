// =============================================================================
// Persistence — history snapshot, signal ledger, dashboard feed, run lock
// =============================================================================
//
// PERSIST is all-or-nothing for the history snapshot:
//
//   1. every artifact is serialised and written to `<path>.tmp`
//   2. the tmp files are renamed into place: ledger, dashboard, history last
//
// A failure in step 1 removes every tmp file and leaves all three artifacts
// as they were.  A failure in step 2 can only happen after the history's
// own tmp is ready and before its rename, so the previous snapshot is never
// partially overwritten.
//
// Reads are forgiving: a missing or unreadable snapshot is an empty one.
// =============================================================================

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Artifact, RunError};
use crate::runtime_config::RuntimeConfig;
use crate::types::{FinalSignal, HistorySnapshot};

/// Document served to the web dashboard.
#[derive(Debug, Serialize)]
struct DashboardFeed<'a> {
    metadata: DashboardMetadata,
    signals: &'a [FinalSignal],
}

#[derive(Debug, Serialize)]
struct DashboardMetadata {
    last_scan: String,
}

struct Staged {
    artifact: Artifact,
    tmp: PathBuf,
    target: PathBuf,
}

pub struct LedgerStore {
    history_path: PathBuf,
    ledger_path: PathBuf,
    dashboard_path: PathBuf,
}

impl LedgerStore {
    pub fn new(
        history_path: impl Into<PathBuf>,
        ledger_path: impl Into<PathBuf>,
        dashboard_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            history_path: history_path.into(),
            ledger_path: ledger_path.into(),
            dashboard_path: dashboard_path.into(),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            config.history_path.clone(),
            config.ledger_path.clone(),
            config.dashboard_path.clone(),
        )
    }

    /// Previous run's snapshot. Missing or corrupt ⇒ empty (cold start).
    pub fn load_history(&self) -> HistorySnapshot {
        match read_snapshot(&self.history_path) {
            Ok(Some(snapshot)) => {
                info!(path = %self.history_path.display(), tickers = snapshot.len(), "history loaded");
                snapshot
            }
            Ok(None) => {
                info!(path = %self.history_path.display(), "no history yet, cold start");
                HistorySnapshot::new()
            }
            Err(e) => {
                warn!(path = %self.history_path.display(), error = %format!("{e:#}"), "history unreadable, treating as empty");
                HistorySnapshot::new()
            }
        }
    }

    /// Write the new snapshot, the signal ledger and the dashboard feed.
    pub fn persist(
        &self,
        snapshot: &HistorySnapshot,
        signals: &[FinalSignal],
    ) -> Result<(), RunError> {
        let dashboard = DashboardFeed {
            metadata: DashboardMetadata {
                last_scan: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            },
            signals,
        };

        let mut staged: Vec<Staged> = Vec::with_capacity(3);
        if let Err(e) = self.stage_all(&mut staged, snapshot, signals, &dashboard) {
            discard(&staged);
            return Err(e);
        }

        for (idx, item) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(&item.tmp, &item.target) {
                discard(&staged[idx..]);
                return Err(RunError::Persist {
                    artifact: item.artifact,
                    path: item.target.clone(),
                    source: anyhow::Error::new(e).context("atomic rename failed"),
                });
            }
        }

        info!(
            history = %self.history_path.display(),
            ledger = %self.ledger_path.display(),
            dashboard = %self.dashboard_path.display(),
            tickers = snapshot.len(),
            signals = signals.len(),
            "artifacts persisted (atomic)"
        );
        Ok(())
    }

    /// History goes last so a rename failure never reaches it first.
    fn stage_all(
        &self,
        staged: &mut Vec<Staged>,
        snapshot: &HistorySnapshot,
        signals: &[FinalSignal],
        dashboard: &DashboardFeed<'_>,
    ) -> Result<(), RunError> {
        staged.push(stage(Artifact::SignalLedger, &self.ledger_path, signals)?);
        staged.push(stage(Artifact::DashboardFeed, &self.dashboard_path, dashboard)?);
        staged.push(stage(Artifact::HistorySnapshot, &self.history_path, snapshot)?);
        Ok(())
    }
}

fn read_snapshot(path: &Path) -> Result<Option<HistorySnapshot>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let snapshot = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(snapshot))
}

fn stage<T: Serialize + ?Sized>(
    artifact: Artifact,
    target: &Path,
    value: &T,
) -> Result<Staged, RunError> {
    let tmp = tmp_path(target);
    let write = || -> Result<()> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(value)
            .with_context(|| format!("failed to serialise {artifact}"))?;
        fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        Ok(())
    };

    write().map_err(|source| {
        let _ = fs::remove_file(&tmp);
        RunError::Persist {
            artifact,
            path: target.to_path_buf(),
            source,
        }
    })?;

    Ok(Staged {
        artifact,
        tmp,
        target: target.to_path_buf(),
    })
}

fn discard(staged: &[Staged]) {
    for item in staged {
        if let Err(e) = fs::remove_file(&item.tmp) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %item.tmp.display(), error = %e, "failed to remove tmp file");
            }
        }
    }
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

// =============================================================================
// Run lock
// =============================================================================

/// Exclusive marker file held for the lifetime of one run. Removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, RunError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| RunError::Lock {
                path: path.clone(),
                source,
            })?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(RunError::Locked { path });
            }
            Err(source) => return Err(RunError::Lock { path, source }),
        };

        // Best effort: the lock is the file's existence, not its content.
        let _ = writeln!(file, "pid={} since={}", std::process::id(), Utc::now().to_rfc3339());

        info!(path = %path.display(), "run lock acquired");
        Ok(Self { path })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "run lock released"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to release run lock"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AsymmetryRating, HistoryEntry};
    use std::collections::BTreeSet;

    fn store(dir: &Path) -> LedgerStore {
        LedgerStore::new(
            dir.join("data/history.json"),
            dir.join("data/current_signals.json"),
            dir.join("web/data.json"),
        )
    }

    fn snapshot(pairs: &[(&str, u64)]) -> HistorySnapshot {
        pairs
            .iter()
            .map(|(t, c)| (t.to_string(), HistoryEntry { count: *c }))
            .collect()
    }

    fn signal(ticker: &str) -> FinalSignal {
        FinalSignal {
            ticker: ticker.into(),
            signal_strength: 3,
            velocity: 1,
            avg_sentiment: 0.4,
            blind_spot: true,
            analyst_rating: AsymmetryRating::ContrarianBull,
            est_position_shares: 10,
            sources: BTreeSet::from(["Reddit: stocks".to_string()]),
            current_price: 100.0,
            trend_sentiment: 0.0,
            bullish_search_vol: 0,
            bearish_search_vol: 0,
        }
    }

    #[test]
    fn missing_history_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(dir.path()).load_history().is_empty());
    }

    #[test]
    fn corrupt_history_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/history.json"), "{not json").unwrap();
        assert!(store.load_history().is_empty());
    }

    #[test]
    fn history_entries_without_count_default_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/history.json"), r#"{"TSLA":{"count":4,"sources":[]},"GME":{}}"#).unwrap();
        let history = store.load_history();
        assert_eq!(history["TSLA"].count, 4);
        assert_eq!(history["GME"].count, 0);
    }

    #[test]
    fn persist_writes_all_three_artifacts_and_replaces_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.persist(&snapshot(&[("OLD", 9)]), &[]).unwrap();
        store
            .persist(&snapshot(&[("TSLA", 3)]), &[signal("TSLA")])
            .unwrap();

        let history = store.load_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history["TSLA"].count, 3);

        let ledger: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("data/current_signals.json")).unwrap())
                .unwrap();
        assert_eq!(ledger[0]["ticker"], "TSLA");
        assert_eq!(ledger[0]["analyst_rating"], "CONTRARIAN BULL");

        let dashboard: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("web/data.json")).unwrap()).unwrap();
        assert!(dashboard["metadata"]["last_scan"].is_string());
        assert_eq!(dashboard["signals"].as_array().unwrap().len(), 1);

        assert!(!dir.path().join("data/history.json.tmp").exists());
    }

    #[test]
    fn failed_persist_names_artifact_and_keeps_prior_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.persist(&snapshot(&[("AMC", 2)]), &[]).unwrap();

        // Make the dashboard directory unusable.
        fs::remove_dir_all(dir.path().join("web")).unwrap();
        fs::write(dir.path().join("web"), "not a directory").unwrap();

        let err = store
            .persist(&snapshot(&[("AMC", 7)]), &[signal("AMC")])
            .unwrap_err();
        assert_eq!(err.artifact(), Some(Artifact::DashboardFeed));

        assert_eq!(store.load_history()["AMC"].count, 2);
        assert!(!dir.path().join("data/current_signals.json.tmp").exists());
    }

    #[test]
    fn second_lock_is_refused_until_first_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/history.lock");

        let first = RunLock::acquire(&path).unwrap();
        assert!(matches!(RunLock::acquire(&path), Err(RunError::Locked { .. })));

        drop(first);
        assert!(!path.exists());
        assert!(RunLock::acquire(&path).is_ok());
    }
}
