//! In-memory adapters.
//!
//! [`InMemorySource`] serves a fixed [`RecordSet`]. [`InMemoryDestination`]
//! behaves like a small remote system: it assigns identifiers on create,
//! refuses children without an existing owner, refuses to delete records that
//! still own children, and can be given a validator to reject operations.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::contract::{ApplyOutcome, DestinationAdapter, Operation, SourceAdapter};
use crate::error::{AdapterError, DestinationError};
use crate::lookup::LookupTable;
use crate::record::{NaturalKey, Record, RemoteId};
use crate::recordset::RecordSet;
use crate::schema::Schema;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct InMemorySource {
    records: RecordSet,
}

impl InMemorySource {
    pub fn new(records: RecordSet) -> Self {
        Self { records }
    }
}

#[async_trait]
impl SourceAdapter for InMemorySource {
    async fn load(&self) -> Result<RecordSet, AdapterError> {
        Ok(self.records.clone())
    }
}

type Validator = Box<dyn Fn(&Operation) -> Result<(), DestinationError> + Send + Sync>;

#[derive(Debug, Clone)]
struct Stored {
    model: String,
    key: NaturalKey,
    remote_id: RemoteId,
    parent: Option<RemoteId>,
    identifiers: BTreeMap<String, Value>,
    attributes: BTreeMap<String, Value>,
    ignore: bool,
}

#[derive(Default)]
struct State {
    records: Vec<Stored>,
    applied: Vec<Operation>,
}

pub struct InMemoryDestination {
    schema: Arc<Schema>,
    state: Mutex<State>,
    validator: Option<Validator>,
}

impl fmt::Debug for InMemoryDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryDestination")
            .field("schema", &self.schema)
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

impl InMemoryDestination {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            state: Mutex::new(State::default()),
            validator: None,
        }
    }

    /// Starts from existing records. Records without a remote id get one.
    pub fn from_record_set(records: &RecordSet) -> Self {
        let mut state = State::default();
        for root in records.roots() {
            seed(root, None, &mut state.records);
        }
        Self {
            schema: Arc::clone(records.schema()),
            state: Mutex::new(state),
            validator: None,
        }
    }

    /// Runs `validator` before every operation; an error rejects it.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Operation) -> Result<(), DestinationError> + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Operations accepted so far, in the order they were applied.
    pub async fn applied(&self) -> Vec<Operation> {
        self.state.lock().await.applied.clone()
    }

    pub async fn remote_id(&self, model: &str, key: &NaturalKey) -> Option<RemoteId> {
        let state = self.state.lock().await;
        state
            .records
            .iter()
            .find(|r| r.model == model && &r.key == key)
            .map(|r| r.remote_id.clone())
    }

    /// Remote id of the owner of a stored record.
    pub async fn parent_of(&self, model: &str, key: &NaturalKey) -> Option<RemoteId> {
        let state = self.state.lock().await;
        state
            .records
            .iter()
            .find(|r| r.model == model && &r.key == key)
            .and_then(|r| r.parent.clone())
    }

    fn create(
        &self,
        state: &mut State,
        model: &str,
        key: &NaturalKey,
        identifiers: &BTreeMap<String, Value>,
        attributes: &BTreeMap<String, Value>,
        parent: Option<RemoteId>,
    ) -> Result<RemoteId, DestinationError> {
        if state.records.iter().any(|r| r.model == model && &r.key == key) {
            return Err(DestinationError::Rejected(format!("{model} {key} already exists")));
        }
        self.check_owner(state, model, key, parent.as_ref())?;

        let remote_id = RemoteId::from(Uuid::new_v4());
        state.records.push(Stored {
            model: model.to_string(),
            key: key.clone(),
            remote_id: remote_id.clone(),
            parent,
            identifiers: identifiers.clone(),
            attributes: attributes.clone(),
            ignore: false,
        });
        Ok(remote_id)
    }

    /// A record of a child model needs an existing owner of the parent model.
    fn check_owner(
        &self,
        state: &State,
        model: &str,
        key: &NaturalKey,
        owner: Option<&RemoteId>,
    ) -> Result<(), DestinationError> {
        let schema = self
            .schema
            .model(model)
            .ok_or_else(|| DestinationError::Rejected(format!("unknown model '{model}'")))?;
        match (&schema.parent, owner) {
            (Some(parent_model), Some(id)) => {
                if !state
                    .records
                    .iter()
                    .any(|r| &r.model == parent_model && &r.remote_id == id)
                {
                    return Err(DestinationError::Rejected(format!(
                        "{parent_model} with id {id} does not exist"
                    )));
                }
                Ok(())
            }
            (Some(parent_model), None) => Err(DestinationError::Rejected(format!(
                "{model} {key} needs a {parent_model} owner"
            ))),
            (None, _) => Ok(()),
        }
    }

    fn position(
        state: &State,
        model: &str,
        key: &NaturalKey,
        remote_id: Option<&RemoteId>,
    ) -> Result<usize, DestinationError> {
        state
            .records
            .iter()
            .position(|r| match remote_id {
                Some(id) => r.model == model && &r.remote_id == id,
                None => r.model == model && &r.key == key,
            })
            .ok_or_else(|| DestinationError::Rejected(format!("{model} {key} not found")))
    }
}

fn seed(record: &Record, parent: Option<&RemoteId>, out: &mut Vec<Stored>) {
    let remote_id = record
        .remote_id()
        .cloned()
        .unwrap_or_else(|| RemoteId::from(Uuid::new_v4()));
    out.push(Stored {
        model: record.model().to_string(),
        key: record.key().clone(),
        remote_id: remote_id.clone(),
        parent: parent.cloned(),
        identifiers: record.identifiers().clone(),
        attributes: record.attributes().clone(),
        ignore: record.is_ignored(),
    });
    for child in record.children() {
        seed(child, Some(&remote_id), out);
    }
}

#[async_trait]
impl DestinationAdapter for InMemoryDestination {
    async fn load(&self) -> Result<RecordSet, AdapterError> {
        let state = self.state.lock().await;
        let mut records = RecordSet::new(Arc::clone(&self.schema));

        for model in self.schema.models() {
            for stored in state.records.iter().filter(|r| r.model == model.name) {
                let mut builder = Record::builder(model).remote_id(stored.remote_id.clone());
                for (name, value) in stored.identifiers.iter().chain(&stored.attributes) {
                    builder = builder.field(name, value.clone());
                }
                if stored.ignore {
                    builder = builder.ignore();
                }
                let record = builder.build()?;

                match &stored.parent {
                    None => records.insert(record)?,
                    Some(parent_id) => {
                        let owner = state
                            .records
                            .iter()
                            .find(|r| &r.remote_id == parent_id)
                            .ok_or_else(|| format!("owner {parent_id} of {} {} is gone", stored.model, stored.key))?;
                        records.insert_child(&owner.model, &owner.key, record)?;
                    }
                }
            }
        }
        Ok(records)
    }

    async fn apply(
        &self,
        operation: Operation,
        _lookup: &LookupTable,
    ) -> Result<ApplyOutcome, DestinationError> {
        if let Some(validator) = &self.validator {
            validator(&operation)?;
        }

        let mut state = self.state.lock().await;
        let outcome = match &operation {
            Operation::Create {
                model,
                key,
                identifiers,
                attributes,
                parent,
            } => {
                let parent = parent.as_ref().map(|p| p.remote_id.clone());
                let id = self.create(&mut state, model, key, identifiers, attributes, parent)?;
                ApplyOutcome::Created(id)
            }
            Operation::Update {
                model,
                key,
                remote_id,
                changes,
                parent,
                reparent,
            } => {
                let index = Self::position(&state, model, key, remote_id.as_ref())?;
                if *reparent {
                    let owner = parent.as_ref().map(|p| p.remote_id.clone());
                    self.check_owner(&state, model, key, owner.as_ref())?;
                    state.records[index].parent = owner;
                }
                let stored = &mut state.records[index];
                for (name, value) in changes {
                    stored.attributes.insert(name.clone(), value.clone());
                }
                ApplyOutcome::Applied
            }
            Operation::Delete {
                model,
                key,
                remote_id,
            } => {
                let index = Self::position(&state, model, key, remote_id.as_ref())?;
                let id = state.records[index].remote_id.clone();
                if state.records.iter().any(|r| r.parent.as_ref() == Some(&id)) {
                    return Err(DestinationError::Rejected(format!(
                        "{model} {key} still owns other records"
                    )));
                }
                state.records.remove(index);
                ApplyOutcome::Applied
            }
        };

        debug!(model = operation.model(), key = %operation.key(), kind = %operation.kind(), "[MEMORY] Operation applied");
        state.applied.push(operation);
        Ok(outcome)
    }
}
