//! Error types for syncly-core.
//!
//! Construction errors (`IdentityError`, `RecordError`, `SchemaError`,
//! `RecordSetError`) are raised before any diffing happens. Per-operation
//! failures end up in the [`crate::report::SyncReport`] as [`OperationError`]s
//! and never abort a run. [`SyncError`] covers failures of the run as a whole.

use serde::Serialize;
use thiserror::Error;

use crate::record::NaturalKey;

/// Boxed error returned by adapters when loading a record set.
pub type AdapterError = Box<dyn std::error::Error + Send + Sync>;

/// A record could not be given a usable natural key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("{model}: identifier field '{field}' is missing")]
    MissingField { model: String, field: String },

    #[error("{model}: identifier field '{field}' is empty")]
    EmptyField { model: String, field: String },

    #[error("{model}: identifier field '{field}' must be a scalar value")]
    NotScalar { model: String, field: String },
}

/// A record could not be built from the values handed to the builder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("{model}: '{attribute}' is not a declared attribute")]
    UnknownAttribute { model: String, attribute: String },
}

/// Model declarations that do not form a valid schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("model '{0}' is declared more than once")]
    DuplicateModel(String),

    #[error("model '{0}' declares no identifier fields")]
    NoIdentifiers(String),

    #[error("model '{model}' declares '{field}' as both identifier and attribute")]
    OverlappingField { model: String, field: String },

    #[error("model '{model}' names unknown parent '{parent}'")]
    UnknownParent { model: String, parent: String },

    #[error("model '{0}' is part of a parent cycle")]
    Cycle(String),

    #[error("source and destination record sets use different schemas")]
    Mismatch,
}

/// A record was refused by a [`crate::recordset::RecordSet`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordSetError {
    #[error("model '{0}' is not declared in the schema")]
    UnknownModel(String),

    #[error("{model} {key} is already present")]
    DuplicateKey { model: String, key: NaturalKey },

    #[error("{model} {key} must be added as a child of a '{parent}' record")]
    OrphanChild {
        model: String,
        key: NaturalKey,
        parent: String,
    },

    #[error("{model} {key} cannot be owned by a '{found}' record, expected '{expected}'")]
    ParentMismatch {
        model: String,
        key: NaturalKey,
        expected: String,
        found: String,
    },

    #[error("parent {model} {key} not found")]
    ParentNotFound { model: String, key: NaturalKey },
}

/// Failure reported by a destination adapter for a single operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DestinationError {
    /// The destination refused the record's attributes.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Any other failure to apply the operation.
    #[error("{0}")]
    Rejected(String),
}

/// Outcome of an operation that did not succeed, keyed by the record it was for.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum OperationError {
    #[error("{model} {key}: validation failed: {detail}")]
    Validation {
        model: String,
        key: NaturalKey,
        detail: String,
    },

    #[error("{model} {key}: {detail}")]
    Apply {
        model: String,
        key: NaturalKey,
        detail: String,
    },

    #[error("{model} {key}: required {parent_model} {parent_key} is not available")]
    Dependency {
        model: String,
        key: NaturalKey,
        parent_model: String,
        parent_key: NaturalKey,
    },

    #[error("{model} {key}: still owns {child_model} {child_key}, which was not deleted")]
    Blocked {
        model: String,
        key: NaturalKey,
        child_model: String,
        child_key: NaturalKey,
    },

    #[error("{model} {key}: not dispatched, run was cancelled")]
    Cancelled { model: String, key: NaturalKey },
}

impl OperationError {
    /// Wraps a destination failure, keeping validation detail verbatim.
    pub fn from_destination(model: &str, key: &NaturalKey, err: DestinationError) -> Self {
        match err {
            DestinationError::Validation(detail) => OperationError::Validation {
                model: model.to_string(),
                key: key.clone(),
                detail,
            },
            DestinationError::Rejected(detail) => OperationError::Apply {
                model: model.to_string(),
                key: key.clone(),
                detail,
            },
        }
    }

    pub fn key(&self) -> &NaturalKey {
        match self {
            OperationError::Validation { key, .. }
            | OperationError::Apply { key, .. }
            | OperationError::Dependency { key, .. }
            | OperationError::Blocked { key, .. }
            | OperationError::Cancelled { key, .. } => key,
        }
    }
}

/// Errors that abort a whole synchronisation run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("loading source records failed: {0}")]
    SourceLoad(#[source] AdapterError),

    #[error("loading destination records failed: {0}")]
    DestinationLoad(#[source] AdapterError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("writing diff output failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("serializing diff failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("environment variable {var} has invalid value '{value}'")]
    InvalidEnv { var: String, value: String },
}
