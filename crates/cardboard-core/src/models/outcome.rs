//! Sync run report

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CollectionKind;

/// A sync pipeline that can be triggered on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTarget {
    Collection,
    Accessories,
    Hotness,
    Plays,
}

impl SyncTarget {
    pub const ALL: [Self; 4] = [
        Self::Collection,
        Self::Accessories,
        Self::Hotness,
        Self::Plays,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Accessories => "accessories",
            Self::Hotness => "hotness",
            Self::Plays => "plays",
        }
    }

    #[must_use]
    pub fn collection_kind(self) -> Option<CollectionKind> {
        match self {
            Self::Collection => Some(CollectionKind::Games),
            Self::Accessories => Some(CollectionKind::Accessories),
            Self::Hotness | Self::Plays => None,
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|target| target.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown sync target `{}`", s.trim()))
    }
}

/// Final state of a run that reached the commit stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Committed,
    /// Committed, but some entities failed and were left untouched
    PartialSuccess,
}

/// Report of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub target: SyncTarget,
    pub status: RunStatus,
    /// Entities in the list snapshot (games scanned, for plays)
    pub listed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Entities left untouched because nothing changed
    pub skipped: usize,
    /// Entities whose fetch failed this run
    pub failed: usize,
    pub inserted_labels: Vec<String>,
    pub updated_labels: Vec<String>,
    pub deleted_labels: Vec<String>,
    pub failed_labels: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncOutcome {
    #[must_use]
    pub fn new(target: SyncTarget, started_at: DateTime<Utc>) -> Self {
        Self {
            target,
            status: RunStatus::Committed,
            listed: 0,
            inserted: 0,
            updated: 0,
            deleted: 0,
            skipped: 0,
            failed: 0,
            inserted_labels: Vec::new(),
            updated_labels: Vec::new(),
            deleted_labels: Vec::new(),
            failed_labels: Vec::new(),
            started_at,
            finished_at: started_at,
        }
    }

    pub fn record_failure(&mut self, label: String) {
        self.failed += 1;
        self.failed_labels.push(label);
    }

    /// Stamp the finish time and settle the status from the failure count.
    #[must_use]
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.status = if self.failed > 0 {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Committed
        };
        self
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.inserted + self.updated + self.deleted > 0
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: listed {}, inserted {}, updated {}, deleted {}, skipped {}, failed {}",
            self.target,
            self.listed,
            self.inserted,
            self.updated,
            self.deleted,
            self.skipped,
            self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_round_trips_through_str() {
        for target in SyncTarget::ALL {
            assert_eq!(target.as_str().parse::<SyncTarget>(), Ok(target));
        }
        assert!("everything".parse::<SyncTarget>().is_err());
    }

    #[test]
    fn finish_marks_partial_success_on_failures() {
        let mut outcome = SyncOutcome::new(SyncTarget::Collection, Utc::now());
        assert_eq!(outcome.clone().finish().status, RunStatus::Committed);

        outcome.record_failure("Catan".to_string());
        let outcome = outcome.finish();
        assert_eq!(outcome.status, RunStatus::PartialSuccess);
        assert_eq!(outcome.failed_labels, vec!["Catan".to_string()]);
    }

    #[test]
    fn outcome_serializes_with_snake_case_status() {
        let outcome = SyncOutcome::new(SyncTarget::Plays, Utc::now()).finish();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "committed");
        assert_eq!(json["target"], "plays");
    }
}
