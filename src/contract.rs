//! # contract: adapter interfaces of the reconciliation core
//!
//! Adapters are the only way records get in and operations get out:
//! - [`SourceAdapter`] loads the source of truth (files, vendor APIs).
//! - [`DestinationAdapter`] loads the current destination state and applies
//!   one [`Operation`] at a time.
//!
//! Both traits are async and annotated for `mockall`, so tests can script a
//! destination without any network access. Mocks are exported behind the
//! `test-export-mocks` feature (on by default) for use from `tests/`.
//!
//! Adapters hand over records that already carry a valid natural key and
//! normalized values; the core performs no coercion.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::Serialize;

use crate::error::{AdapterError, DestinationError};
use crate::lookup::LookupTable;
use crate::record::{NaturalKey, RemoteId};
use crate::recordset::RecordSet;
use crate::value::Value;

/// Owner of a record being created or updated, resolved to its destination id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentRef {
    pub model: String,
    pub key: NaturalKey,
    pub remote_id: RemoteId,
}

/// A single write against the destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Create {
        model: String,
        key: NaturalKey,
        identifiers: BTreeMap<String, Value>,
        attributes: BTreeMap<String, Value>,
        parent: Option<ParentRef>,
    },
    /// Carries only the changed fields, never the full record.
    Update {
        model: String,
        key: NaturalKey,
        remote_id: Option<RemoteId>,
        changes: BTreeMap<String, Value>,
        parent: Option<ParentRef>,
        /// The record moves under `parent`; `changes` may then be empty.
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        reparent: bool,
    },
    Delete {
        model: String,
        key: NaturalKey,
        remote_id: Option<RemoteId>,
    },
}

impl Operation {
    pub fn model(&self) -> &str {
        match self {
            Operation::Create { model, .. }
            | Operation::Update { model, .. }
            | Operation::Delete { model, .. } => model,
        }
    }

    pub fn key(&self) -> &NaturalKey {
        match self {
            Operation::Create { key, .. }
            | Operation::Update { key, .. }
            | Operation::Delete { key, .. } => key,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create { .. } => OperationKind::Create,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        })
    }
}

/// What the destination reports back for a successful operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A create succeeded and the destination assigned this identifier.
    Created(RemoteId),
    /// An update or delete succeeded.
    Applied,
}

/// Loads the source of truth.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn load(&self) -> Result<RecordSet, AdapterError>;
}

/// Loads and writes the destination system.
///
/// `apply` receives the run's [`LookupTable`] so an implementation can resolve
/// references (brand, package, category ids) without ambient state.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    async fn load(&self) -> Result<RecordSet, AdapterError>;

    async fn apply(
        &self,
        operation: Operation,
        lookup: &LookupTable,
    ) -> Result<ApplyOutcome, DestinationError>;
}
