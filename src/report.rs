use std::fmt;

use serde::Serialize;

use crate::contract::OperationKind;
use crate::error::OperationError;
use crate::record::{NaturalKey, RemoteId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationStatus {
    Succeeded {
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_id: Option<RemoteId>,
    },
    /// The destination refused the operation.
    Failed { error: OperationError },
    /// The operation was never dispatched (missing parent, cancelled run).
    Skipped { error: OperationError },
}

/// Result of one planned operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub model: String,
    pub key: NaturalKey,
    pub kind: OperationKind,
    #[serde(flatten)]
    pub status: OperationStatus,
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, OperationStatus::Succeeded { .. })
    }

    pub fn error(&self) -> Option<&OperationError> {
        match &self.status {
            OperationStatus::Succeeded { .. } => None,
            OperationStatus::Failed { error } | OperationStatus::Skipped { error } => Some(error),
        }
    }
}

/// Everything the executor did during one run, in dispatch-plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    outcomes: Vec<OperationOutcome>,
}

impl SyncReport {
    pub(crate) fn push(&mut self, outcome: OperationOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[OperationOutcome] {
        &self.outcomes
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OperationStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OperationStatus::Skipped { .. }))
    }

    pub fn outcome(&self, model: &str, key: &NaturalKey) -> Option<&OperationOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.model == model && &o.key == key)
    }

    /// True when every planned operation succeeded.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(OperationOutcome::is_success)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            succeeded: self.succeeded().count(),
            failed: self.failed().count(),
            skipped: self.skipped().count(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "succeeded: {} | failed: {} | skipped: {}",
            self.succeeded, self.failed, self.skipped
        )
    }
}
