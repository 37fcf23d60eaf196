#![doc = "syncly-core: reconciliation engine for syncly."]

//! Loads records from a source and a destination, computes which records must
//! be created, updated or deleted, and applies those operations in dependency
//! order.
//!
//! # Usage
//! Describe the models with a [`schema::Schema`], fill a [`recordset::RecordSet`]
//! per side through [`contract::SourceAdapter`] and
//! [`contract::DestinationAdapter`] implementations, then call
//! [`synchronise::synchronise`]. [`diff::diff`] and [`executor::Executor`] can be
//! used on their own.

pub mod config;
pub mod contract;
pub mod diff;
pub mod error;
pub mod executor;
pub mod load_config;
pub mod lookup;
pub mod memory;
pub mod record;
pub mod recordset;
pub mod report;
pub mod schema;
pub mod synchronise;
pub mod value;

pub use config::{ExecutorConfig, SyncConfig};
pub use contract::{ApplyOutcome, DestinationAdapter, Operation, OperationKind, ParentRef, SourceAdapter};
pub use diff::{diff, DiffPlan, DiffSummary, ModelDiff, RecordLink};
pub use error::{
    AdapterError, ConfigError, DestinationError, IdentityError, OperationError, RecordError,
    RecordSetError, SchemaError, SyncError,
};
pub use executor::{CancelHandle, Executor};
pub use lookup::LookupTable;
pub use record::{NaturalKey, Record, RecordBuilder, RemoteId};
pub use recordset::RecordSet;
pub use report::{OperationOutcome, OperationStatus, SyncReport};
pub use schema::{ModelSchema, Schema};
pub use synchronise::{synchronise, SynchroniseOutcome};
pub use value::Value;
