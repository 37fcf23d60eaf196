//! Computes create/update/delete sets between a source and a destination
//! [`RecordSet`].
//!
//! The diff is a pure function of its inputs: it performs no I/O, does not
//! normalize values and holds no locks. One [`ModelDiff`] is produced per
//! declared model, in the schema's dependency order, so a plan can be applied
//! top to bottom for creates and bottom to top for deletes.
//!
//! A parent's diff covers its own attributes only. Children that were added or
//! removed show up in the child model's diff, never as a change on the parent.
//! A child that sits under a different owner on each side is an update that
//! moves it (see [`UpdateEntry::moved_from`]).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::error::SchemaError;
use crate::record::{NaturalKey, Record, RemoteId};
use crate::recordset::{Entry, RecordSet};
use crate::schema::ModelSchema;
use crate::value::Value;

const MAX_RENDERED_VALUE: usize = 200;

/// Model and key of a record, used to point at owners and children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RecordLink {
    pub model: String,
    pub key: NaturalKey,
}

impl RecordLink {
    pub fn new(model: impl Into<String>, key: NaturalKey) -> Self {
        Self {
            model: model.into(),
            key,
        }
    }

    fn to(record: &Record) -> Self {
        Self::new(record.model(), record.key().clone())
    }

    fn of(parent: Option<&Record>) -> Option<Self> {
        parent.map(Self::to)
    }
}

impl fmt::Display for RecordLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.model, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateEntry {
    pub key: NaturalKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<RecordLink>,
    pub identifiers: BTreeMap<String, Value>,
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    pub name: String,
    pub source: Value,
    /// `None` when the destination does not carry the attribute at all.
    pub destination: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateEntry {
    pub key: NaturalKey,
    /// Owner on the source side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<RecordLink>,
    /// Owner on the destination side, set only when it differs from `parent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_from: Option<RecordLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    pub changes: Vec<AttributeChange>,
}

impl UpdateEntry {
    /// The update payload: changed fields with their source values.
    pub fn changed_fields(&self) -> BTreeMap<String, Value> {
        self.changes
            .iter()
            .map(|c| (c.name.clone(), c.source.clone()))
            .collect()
    }

    pub fn is_move(&self) -> bool {
        self.moved_from.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteEntry {
    pub key: NaturalKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<RecordLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    pub attributes: BTreeMap<String, Value>,
    /// Destination children that stay where they are (reference-only or
    /// skipped), so this record cannot go without orphaning them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kept_children: Vec<RecordLink>,
}

/// Differences for a single model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDiff {
    pub model: String,
    pub creates: Vec<CreateEntry>,
    pub updates: Vec<UpdateEntry>,
    pub deletes: Vec<DeleteEntry>,
    /// Records present on both sides with nothing to change.
    pub unchanged: usize,
    /// Records left alone because they are reference-only.
    pub skipped: usize,
}

impl ModelDiff {
    fn empty(model: &str) -> Self {
        Self {
            model: model.to_string(),
            creates: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
            unchanged: 0,
            skipped: 0,
        }
    }

    pub fn has_changes(&self) -> bool {
        !(self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty())
    }

    pub fn create_keys(&self) -> Vec<&NaturalKey> {
        self.creates.iter().map(|c| &c.key).collect()
    }

    pub fn update_keys(&self) -> Vec<&NaturalKey> {
        self.updates.iter().map(|u| &u.key).collect()
    }

    pub fn delete_keys(&self) -> Vec<&NaturalKey> {
        self.deletes.iter().map(|d| &d.key).collect()
    }

    pub fn update(&self, key: &NaturalKey) -> Option<&UpdateEntry> {
        self.updates.iter().find(|u| &u.key == key)
    }

    pub fn delete(&self, key: &NaturalKey) -> Option<&DeleteEntry> {
        self.deletes.iter().find(|d| &d.key == key)
    }
}

/// Per-model diffs of one run, parents before children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffPlan {
    models: Vec<ModelDiff>,
    /// Owners of the records the plan touches, for nested rendering.
    #[serde(skip)]
    owners: HashMap<RecordLink, RecordLink>,
}

impl DiffPlan {
    pub fn models(&self) -> &[ModelDiff] {
        &self.models
    }

    pub fn model(&self, name: &str) -> Option<&ModelDiff> {
        self.models.iter().find(|m| m.model == name)
    }

    pub fn has_changes(&self) -> bool {
        self.models.iter().any(ModelDiff::has_changes)
    }

    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for m in &self.models {
            summary.create += m.creates.len();
            summary.update += m.updates.len();
            summary.delete += m.deletes.len();
            summary.no_change += m.unchanged;
            summary.skip += m.skipped;
        }
        summary
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Operation counts across all models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
    pub skip: usize,
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "create: {} | update: {} | delete: {} | no-change: {} | skip: {}",
            self.create, self.update, self.delete, self.no_change, self.skip
        )
    }
}

/// Diffs every model of the shared schema.
pub fn diff(source: &RecordSet, destination: &RecordSet) -> Result<DiffPlan, SchemaError> {
    if source.schema() != destination.schema() {
        return Err(SchemaError::Mismatch);
    }
    let mut models: Vec<ModelDiff> = source
        .schema()
        .models()
        .iter()
        .map(|model| diff_model(model, source, destination))
        .collect();
    mark_kept_children(&mut models, destination);
    let owners = owners_of(&models, source, destination);
    Ok(DiffPlan { models, owners })
}

/// Diffs a single model.
///
/// Deletes come back with empty `kept_children`; [`diff`] fills them in once
/// every model is known.
pub fn diff_model(model: &ModelSchema, source: &RecordSet, destination: &RecordSet) -> ModelDiff {
    let src_entries = source.entries(&model.name);
    let dst_entries = destination.entries(&model.name);

    let dst_by_key: HashMap<&NaturalKey, &Entry<'_>> =
        dst_entries.iter().map(|e| (e.record.key(), e)).collect();
    let src_keys: HashSet<&NaturalKey> = src_entries.iter().map(|e| e.record.key()).collect();

    let mut out = ModelDiff::empty(&model.name);

    for src in &src_entries {
        if src.ignored {
            out.skipped += 1;
            continue;
        }
        match dst_by_key.get(src.record.key()) {
            None => out.creates.push(CreateEntry {
                key: src.record.key().clone(),
                parent: RecordLink::of(src.parent),
                identifiers: src.record.identifiers().clone(),
                attributes: src.record.attributes().clone(),
            }),
            Some(dst) if dst.ignored => out.skipped += 1,
            Some(dst) => {
                let changes = changed_attributes(model, src.record, dst.record);
                let parent = RecordLink::of(src.parent);
                let previous = RecordLink::of(dst.parent);
                let moved_from = if parent != previous { previous } else { None };
                if changes.is_empty() && moved_from.is_none() {
                    out.unchanged += 1;
                } else {
                    out.updates.push(UpdateEntry {
                        key: src.record.key().clone(),
                        parent,
                        moved_from,
                        remote_id: dst.record.remote_id().cloned(),
                        changes,
                    });
                }
            }
        }
    }

    for dst in &dst_entries {
        if src_keys.contains(dst.record.key()) {
            continue;
        }
        if dst.ignored {
            out.skipped += 1;
            continue;
        }
        out.deletes.push(DeleteEntry {
            key: dst.record.key().clone(),
            parent: RecordLink::of(dst.parent),
            remote_id: dst.record.remote_id().cloned(),
            attributes: dst.record.attributes().clone(),
            kept_children: Vec::new(),
        });
    }

    debug!(
        model = %model.name,
        creates = out.creates.len(),
        updates = out.updates.len(),
        deletes = out.deletes.len(),
        unchanged = out.unchanged,
        skipped = out.skipped,
        "[DIFF] Model compared"
    );
    out
}

/// Records, for every delete, the destination children that neither go with
/// it nor move to another owner.
fn mark_kept_children(models: &mut [ModelDiff], destination: &RecordSet) {
    let mut leaving: HashSet<RecordLink> = HashSet::new();
    for m in models.iter() {
        for d in &m.deletes {
            leaving.insert(RecordLink::new(&m.model, d.key.clone()));
        }
        for u in m.updates.iter().filter(|u| u.is_move()) {
            leaving.insert(RecordLink::new(&m.model, u.key.clone()));
        }
    }

    for m in models.iter_mut() {
        for d in m.deletes.iter_mut() {
            let Some(record) = destination.get(&m.model, &d.key) else {
                continue;
            };
            d.kept_children = record
                .children()
                .iter()
                .map(RecordLink::to)
                .filter(|child| !leaving.contains(child))
                .collect();
        }
    }
}

/// Owner chains of every record the plan references.
fn owners_of(
    models: &[ModelDiff],
    source: &RecordSet,
    destination: &RecordSet,
) -> HashMap<RecordLink, RecordLink> {
    let mut all: HashMap<RecordLink, RecordLink> = HashMap::new();
    for entry in destination.all_entries().into_iter().chain(source.all_entries()) {
        if let Some(parent) = entry.parent {
            all.insert(RecordLink::to(entry.record), RecordLink::to(parent));
        }
    }

    let mut owners = HashMap::new();
    let mut pending: Vec<RecordLink> = models
        .iter()
        .flat_map(|m| {
            m.creates
                .iter()
                .filter_map(|c| c.parent.clone())
                .chain(m.updates.iter().filter_map(|u| u.parent.clone()))
                .chain(m.deletes.iter().filter_map(|d| d.parent.clone()))
        })
        .collect();
    while let Some(link) = pending.pop() {
        if owners.contains_key(&link) {
            continue;
        }
        if let Some(owner) = all.get(&link) {
            owners.insert(link, owner.clone());
            pending.push(owner.clone());
        }
    }
    owners
}

/// Attributes the source expresses with a value the destination lacks or
/// holds differently, in declaration order.
fn changed_attributes(model: &ModelSchema, src: &Record, dst: &Record) -> Vec<AttributeChange> {
    model
        .attributes
        .iter()
        .filter_map(|name| {
            let source = src.attribute(name)?;
            let destination = dst.attribute(name);
            if destination == Some(source) {
                return None;
            }
            Some(AttributeChange {
                name: name.clone(),
                source: source.clone(),
                destination: destination.cloned(),
            })
        })
        .collect()
}

fn truncate(value: &Value) -> String {
    let rendered = value.to_string();
    match rendered.char_indices().nth(MAX_RENDERED_VALUE) {
        Some((cut, _)) => format!("{}...", &rendered[..cut]),
        None => rendered,
    }
}

/// One line of the rendered tree with its detail lines.
struct Row {
    link: RecordLink,
    parent: Option<RecordLink>,
    marker: char,
    lines: Vec<String>,
}

impl DiffPlan {
    fn rows(&self) -> Vec<Row> {
        let mut rows = Vec::new();
        for m in &self.models {
            for c in &m.creates {
                rows.push(Row {
                    link: RecordLink::new(&m.model, c.key.clone()),
                    parent: c.parent.clone(),
                    marker: '+',
                    lines: c
                        .attributes
                        .iter()
                        .map(|(name, value)| format!("+ {name}: {}", truncate(value)))
                        .collect(),
                });
            }
            for u in &m.updates {
                let mut lines = Vec::new();
                if let (Some(old), Some(new)) = (&u.moved_from, &u.parent) {
                    lines.push(format!("+ parent: {new}"));
                    lines.push(format!("- parent: {old}"));
                }
                for change in &u.changes {
                    lines.push(format!("+ {}: {}", change.name, truncate(&change.source)));
                    if let Some(old) = &change.destination {
                        lines.push(format!("- {}: {}", change.name, truncate(old)));
                    }
                }
                rows.push(Row {
                    link: RecordLink::new(&m.model, u.key.clone()),
                    parent: u.parent.clone(),
                    marker: '!',
                    lines,
                });
            }
            for d in &m.deletes {
                rows.push(Row {
                    link: RecordLink::new(&m.model, d.key.clone()),
                    parent: d.parent.clone(),
                    marker: '-',
                    lines: d
                        .attributes
                        .iter()
                        .map(|(name, value)| format!("- {name}: {}", truncate(value)))
                        .collect(),
                });
            }
        }

        // Unchanged owners still get a line so their children can nest.
        let mut i = 0;
        while i < rows.len() {
            if let Some(parent) = rows[i].parent.clone() {
                if !rows.iter().any(|r| r.link == parent) {
                    rows.push(Row {
                        parent: self.owners.get(&parent).cloned(),
                        link: parent,
                        marker: '*',
                        lines: Vec::new(),
                    });
                }
            }
            i += 1;
        }
        rows
    }

    fn render(
        &self,
        f: &mut fmt::Formatter<'_>,
        rows: &[Row],
        parent: Option<&RecordLink>,
        indent: usize,
    ) -> fmt::Result {
        let pad = " ".repeat(indent);
        for m in &self.models {
            let mut group = rows
                .iter()
                .filter(|r| r.link.model == m.model && r.parent.as_ref() == parent)
                .peekable();
            if group.peek().is_none() {
                continue;
            }
            writeln!(f, "{pad}* {}", m.model)?;
            for row in group {
                writeln!(f, "{pad}  {} {}", row.marker, row.link.key)?;
                for line in &row.lines {
                    writeln!(f, "{pad}    {line}")?;
                }
                self.render(f, rows, Some(&row.link), indent + 4)?;
            }
        }
        Ok(())
    }
}

/// Renders the plan as a tree: `+` create, `!` update, `-` delete, `*` an
/// unchanged owner. Children nest under their owner.
impl fmt::Display for DiffPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.rows();
        self.render(f, &rows, None, 0)
    }
}
