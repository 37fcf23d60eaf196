use std::collections::HashMap;

use crate::record::{NaturalKey, RemoteId};
use crate::recordset::RecordSet;

/// Request-scoped map between natural keys and destination identifiers.
///
/// Seeded from the destination's loaded records (reference-only ones such as
/// brands and packages included) and extended as creates succeed. A fresh
/// table is built for every run.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    by_key: HashMap<(String, NaturalKey), RemoteId>,
    by_remote: HashMap<(String, RemoteId), NaturalKey>,
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record_set(records: &RecordSet) -> Self {
        let mut table = Self::new();
        for entry in records.all_entries() {
            if let Some(id) = entry.record.remote_id() {
                table.insert(entry.record.model(), entry.record.key().clone(), id.clone());
            }
        }
        table
    }

    pub fn insert(&mut self, model: &str, key: NaturalKey, id: RemoteId) {
        self.by_remote
            .insert((model.to_string(), id.clone()), key.clone());
        self.by_key.insert((model.to_string(), key), id);
    }

    pub fn remote_id(&self, model: &str, key: &NaturalKey) -> Option<&RemoteId> {
        self.by_key.get(&(model.to_string(), key.clone()))
    }

    pub fn key_for(&self, model: &str, id: &RemoteId) -> Option<&NaturalKey> {
        self.by_remote.get(&(model.to_string(), id.clone()))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
