use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::RecordSetError;
use crate::record::{NaturalKey, Record};
use crate::schema::Schema;

/// A record as seen from its model, with the record that owns it.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    pub record: &'a Record,
    pub parent: Option<&'a Record>,
    /// Set when the record or any of its owners is reference-only.
    pub ignored: bool,
}

/// All records loaded from one side of a sync, for every model of a schema.
///
/// Insertion order is kept. Within a model no two records share a natural key,
/// whether they sit at the top level or inside another record's children.
#[derive(Debug, Clone)]
pub struct RecordSet {
    schema: Arc<Schema>,
    roots: Vec<Record>,
    keys: HashMap<String, HashSet<NaturalKey>>,
}

impl RecordSet {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            roots: Vec::new(),
            keys: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Adds a top-level record together with its children.
    pub fn insert(&mut self, record: Record) -> Result<(), RecordSetError> {
        let model = self
            .schema
            .model(record.model())
            .ok_or_else(|| RecordSetError::UnknownModel(record.model().to_string()))?;
        if let Some(parent) = &model.parent {
            return Err(RecordSetError::OrphanChild {
                model: record.model().to_string(),
                key: record.key().clone(),
                parent: parent.clone(),
            });
        }
        let pending = self.check_tree(&record)?;
        self.commit(pending);
        self.roots.push(record);
        Ok(())
    }

    /// Adds `child` (and its subtree) to an already inserted record.
    pub fn insert_child(
        &mut self,
        parent_model: &str,
        parent_key: &NaturalKey,
        child: Record,
    ) -> Result<(), RecordSetError> {
        let model = self
            .schema
            .model(child.model())
            .ok_or_else(|| RecordSetError::UnknownModel(child.model().to_string()))?;
        if model.parent.as_deref() != Some(parent_model) {
            return Err(RecordSetError::ParentMismatch {
                model: child.model().to_string(),
                key: child.key().clone(),
                expected: model.parent.clone().unwrap_or_default(),
                found: parent_model.to_string(),
            });
        }
        let pending = self.check_tree(&child)?;
        let parent = find_mut(&mut self.roots, parent_model, parent_key).ok_or_else(|| {
            RecordSetError::ParentNotFound {
                model: parent_model.to_string(),
                key: parent_key.clone(),
            }
        })?;
        parent.children_mut().push(child);
        self.commit(pending);
        Ok(())
    }

    pub fn contains(&self, model: &str, key: &NaturalKey) -> bool {
        self.keys.get(model).is_some_and(|keys| keys.contains(key))
    }

    pub fn get(&self, model: &str, key: &NaturalKey) -> Option<&Record> {
        if !self.contains(model, key) {
            return None;
        }
        self.entries(model)
            .into_iter()
            .map(|entry| entry.record)
            .find(|record| record.key() == key)
    }

    /// Records of `model` in insertion order; children follow their parents'
    /// order, depth first.
    pub fn entries(&self, model: &str) -> Vec<Entry<'_>> {
        let mut out = Vec::new();
        for root in &self.roots {
            collect(root, None, false, model, &mut out);
        }
        out
    }

    /// Every record of every model, depth first.
    pub fn all_entries(&self) -> Vec<Entry<'_>> {
        let mut out = Vec::new();
        for root in &self.roots {
            collect_all(root, None, false, &mut out);
        }
        out
    }

    pub fn len(&self, model: &str) -> usize {
        self.keys.get(model).map_or(0, HashSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> &[Record] {
        &self.roots
    }

    /// Validates a subtree against the schema and the keys already present,
    /// returning the keys it would add.
    fn check_tree(&self, record: &Record) -> Result<Vec<(String, NaturalKey)>, RecordSetError> {
        let mut pending: Vec<(String, NaturalKey)> = Vec::new();
        let mut stack = vec![record];
        while let Some(current) = stack.pop() {
            if !self.schema.contains(current.model()) {
                return Err(RecordSetError::UnknownModel(current.model().to_string()));
            }
            let duplicate = self.contains(current.model(), current.key())
                || pending
                    .iter()
                    .any(|(m, k)| m == current.model() && k == current.key());
            if duplicate {
                return Err(RecordSetError::DuplicateKey {
                    model: current.model().to_string(),
                    key: current.key().clone(),
                });
            }
            for child in current.children() {
                let expected = self
                    .schema
                    .model(child.model())
                    .ok_or_else(|| RecordSetError::UnknownModel(child.model().to_string()))?
                    .parent
                    .clone();
                if expected.as_deref() != Some(current.model()) {
                    return Err(RecordSetError::ParentMismatch {
                        model: child.model().to_string(),
                        key: child.key().clone(),
                        expected: expected.unwrap_or_default(),
                        found: current.model().to_string(),
                    });
                }
                stack.push(child);
            }
            pending.push((current.model().to_string(), current.key().clone()));
        }
        Ok(pending)
    }

    fn commit(&mut self, pending: Vec<(String, NaturalKey)>) {
        for (model, key) in pending {
            self.keys.entry(model).or_default().insert(key);
        }
    }
}

fn collect<'a>(
    record: &'a Record,
    parent: Option<&'a Record>,
    ignored: bool,
    model: &str,
    out: &mut Vec<Entry<'a>>,
) {
    let ignored = ignored || record.is_ignored();
    if record.model() == model {
        out.push(Entry {
            record,
            parent,
            ignored,
        });
    }
    for child in record.children() {
        collect(child, Some(record), ignored, model, out);
    }
}

fn collect_all<'a>(
    record: &'a Record,
    parent: Option<&'a Record>,
    ignored: bool,
    out: &mut Vec<Entry<'a>>,
) {
    let ignored = ignored || record.is_ignored();
    out.push(Entry {
        record,
        parent,
        ignored,
    });
    for child in record.children() {
        collect_all(child, Some(record), ignored, out);
    }
}

fn find_mut<'a>(records: &'a mut [Record], model: &str, key: &NaturalKey) -> Option<&'a mut Record> {
    for record in records.iter_mut() {
        if record.model() == model && record.key() == key {
            return Some(record);
        }
        if let Some(found) = find_mut(record.children_mut(), model, key) {
            return Some(found);
        }
    }
    None
}
