// =============================================================================
// Run Errors — the only faults that end a pipeline run
// =============================================================================
//
// Producer, endpoint and provider faults never surface here: they are logged
// and degrade coverage.  A run fails only when it cannot persist, cannot take
// the run lock, or is asked to stop before persisting.
// =============================================================================

use std::path::PathBuf;

use thiserror::Error;

/// Files written by the PERSIST stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    HistorySnapshot,
    SignalLedger,
    DashboardFeed,
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HistorySnapshot => write!(f, "history snapshot"),
            Self::SignalLedger => write!(f, "signal ledger"),
            Self::DashboardFeed => write!(f, "dashboard feed"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to write {artifact} to {}", path.display())]
    Persist {
        artifact: Artifact,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("another run holds the lock at {}", path.display())]
    Locked { path: PathBuf },
    #[error("run lock at {} could not be created", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("run cancelled before persistence")]
    Cancelled,
}

impl RunError {
    /// The artifact that failed to write, if this is a persistence fault.
    pub fn artifact(&self) -> Option<Artifact> {
        match self {
            Self::Persist { artifact, .. } => Some(*artifact),
            _ => None,
        }
    }

    /// The message followed by every underlying cause, `outer: inner: ...`.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            out.push_str(": ");
            out.push_str(&err.to_string());
            cause = err.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_error_names_the_artifact() {
        let err = RunError::Persist {
            artifact: Artifact::HistorySnapshot,
            path: PathBuf::from("data/history.json"),
            source: anyhow::anyhow!("disk full"),
        };
        assert_eq!(err.artifact(), Some(Artifact::HistorySnapshot));
        let msg = err.to_string();
        assert!(msg.contains("history snapshot"));
        assert!(msg.contains("data/history.json"));
    }

    #[test]
    fn cause_is_reported_once() {
        let err = RunError::Persist {
            artifact: Artifact::DashboardFeed,
            path: PathBuf::from("web/data.json"),
            source: anyhow::anyhow!("disk full"),
        };
        assert!(!err.to_string().contains("disk full"));
        assert_eq!(err.report(), "failed to write dashboard feed to web/data.json: disk full");
        assert_eq!(anyhow::Error::from(err).chain().filter(|c| c.to_string().contains("disk full")).count(), 1);
    }

    #[test]
    fn non_persist_errors_have_no_artifact() {
        assert_eq!(RunError::Cancelled.artifact(), None);
    }
}
