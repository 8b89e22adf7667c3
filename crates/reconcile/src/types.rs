//! Core types for reconciliation passes

use crate::error::ErrorClass;
use serde::{Deserialize, Serialize};

/// How a kind's remote resources are identified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identity {
    /// By a server-assigned identifier
    Nominal,
    /// By attribute equivalence after normalization
    Structural,
}

/// Result of observing one declared resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// Remote resource exists
    pub exists: bool,
    /// Remote resource matches the declared parameters
    pub up_to_date: bool,
    /// Unset parameters were filled in from the remote resource
    pub late_initialized: bool,
    /// Human-readable diff when drifted
    pub diff: Option<String>,
}

impl Observation {
    /// The resource does not exist remotely
    pub fn absent() -> Self {
        Self::default()
    }

    /// Next action this observation calls for
    pub fn action(&self) -> Action {
        if !self.exists {
            Action::Create
        } else if !self.up_to_date {
            Action::Update
        } else {
            Action::None
        }
    }
}

/// Action a pass would take for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// In sync
    None,
    /// Remote resource is absent
    Create,
    /// Remote resource drifted
    Update,
    /// Declaration was removed
    Delete,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::None => write!(f, "no change"),
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// Result of reconciling one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Already in sync
    NoChange,
    /// Remote resource was created
    Created,
    /// Remote resource was updated
    Updated,
    /// Remote resource was archived or removed
    Deleted,
    /// Pass failed for this resource
    Failed { error: String, class: ErrorClass },
    /// Pass did nothing (dry run)
    Skipped { reason: String },
}

impl Outcome {
    /// Check if the outcome represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the outcome represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Updated | Self::Deleted)
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub retryable: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted + self.skipped + self.failed + self.no_change
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.retryable += other.retryable;
        self.no_change += other.no_change;
    }

    /// Add an outcome to the summary
    pub fn add_result(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::NoChange => self.no_change += 1,
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Deleted => self.deleted += 1,
            Outcome::Failed { class, .. } => {
                self.failed += 1;
                if class.is_retryable() {
                    self.retryable += 1;
                }
            }
            Outcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Observe only, report what would change
    pub dry_run: bool,
    /// Number of resources reconciled in parallel
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_action() {
        assert_eq!(Observation::absent().action(), Action::Create);

        let drifted = Observation {
            exists: true,
            up_to_date: false,
            ..Default::default()
        };
        assert_eq!(drifted.action(), Action::Update);

        let synced = Observation {
            exists: true,
            up_to_date: true,
            ..Default::default()
        };
        assert_eq!(synced.action(), Action::None);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&Outcome::Created);
        summary.add_result(&Outcome::NoChange);
        summary.add_result(&Outcome::Failed {
            error: "timeout".into(),
            class: ErrorClass::Recoverable,
        });
        summary.add_result(&Outcome::Failed {
            error: "bad request".into(),
            class: ErrorClass::Fatal,
        });

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.total_changes(), 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.retryable, 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_summary_merge() {
        let mut a = ExecuteSummary {
            created: 1,
            deleted: 2,
            ..Default::default()
        };
        let b = ExecuteSummary {
            created: 3,
            no_change: 4,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.created, 4);
        assert_eq!(a.deleted, 2);
        assert_eq!(a.no_change, 4);
        assert!(a.is_success());
    }

    #[test]
    fn test_outcome_predicates() {
        assert!(Outcome::Deleted.is_change());
        assert!(!Outcome::NoChange.is_change());
        assert!(
            !Outcome::Failed {
                error: String::new(),
                class: ErrorClass::Fatal
            }
            .is_success()
        );
    }
}
