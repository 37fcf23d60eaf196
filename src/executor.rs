//! Applies a [`DiffPlan`] to a destination in dependency order.
//!
//! Creates and updates run model by model, parents first, so that identifiers
//! assigned to freshly created parents are in the [`LookupTable`] before any
//! child operation is built. Deletes run the other way round, children first.
//!
//! A delete is skipped as blocked while its record still owns a child that is
//! not deleted or moved away in the same run.
//!
//! Failures are recorded per key and never stop independent work unless
//! `continue_on_failure` is off. Nothing is retried here.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::ExecutorConfig;
use crate::contract::{ApplyOutcome, DestinationAdapter, Operation, OperationKind, ParentRef};
use crate::diff::{CreateEntry, DeleteEntry, DiffPlan, ModelDiff, UpdateEntry};
use crate::error::OperationError;
use crate::lookup::LookupTable;
use crate::record::NaturalKey;
use crate::report::{OperationOutcome, OperationStatus, SyncReport};

/// Stops the executor from dispatching further operations.
///
/// Operations already sent to the destination run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Spaces successive destination calls by a minimum interval.
#[derive(Debug)]
struct Throttle {
    interval: std::time::Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    fn new(interval: std::time::Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        // Held across the sleep so concurrent callers queue up behind it.
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            tokio::time::sleep_until(previous + self.interval).await;
        }
        *last_call = Some(Instant::now());
    }
}

enum Prepared {
    Dispatch(Operation),
    Skip(OperationOutcome),
}

type RecordRef = (String, NaturalKey);

pub struct Executor {
    config: ExecutorConfig,
    cancel: CancelHandle,
    throttle: Throttle,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        let throttle = Throttle::new(config.min_call_interval());
        Self {
            config,
            cancel: CancelHandle::default(),
            throttle,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Applies every operation of `plan`, extending `lookup` with the
    /// identifiers of created records.
    pub async fn execute<D>(
        &self,
        plan: &DiffPlan,
        destination: &D,
        lookup: &mut LookupTable,
    ) -> SyncReport
    where
        D: DestinationAdapter + ?Sized,
    {
        let summary = plan.summary();
        info!(
            creates = summary.create,
            updates = summary.update,
            deletes = summary.delete,
            max_concurrency = self.config.max_concurrency,
            "[SYNC][APPLY] Starting execution of diff plan"
        );

        let mut report = SyncReport::default();
        // Records whose create did not go through; their children cannot be created.
        let mut unavailable: HashSet<RecordRef> = HashSet::new();
        // Owners that must survive, with the child that is still there.
        let mut retained: HashMap<RecordRef, RecordRef> = seed_retained(plan);

        for model in plan.models() {
            if model.creates.is_empty() && model.updates.is_empty() {
                continue;
            }
            debug!(model = %model.model, "[SYNC][APPLY] Creating and updating");
            let mut batch = Vec::with_capacity(model.creates.len() + model.updates.len());
            for entry in &model.creates {
                batch.push(prepare_create(&model.model, entry, lookup, &unavailable));
            }
            for entry in &model.updates {
                batch.push(prepare_update(&model.model, entry, lookup, &unavailable));
            }

            for outcome in self.run_batch(batch, destination, lookup).await {
                match outcome.kind {
                    OperationKind::Create => match &outcome.status {
                        OperationStatus::Succeeded {
                            remote_id: Some(id),
                        } => lookup.insert(&outcome.model, outcome.key.clone(), id.clone()),
                        _ => {
                            unavailable.insert((outcome.model.clone(), outcome.key.clone()));
                        }
                    },
                    // A move that did not happen leaves the child with its old owner.
                    OperationKind::Update if !outcome.is_success() => {
                        if let Some(old) = model.update(&outcome.key).and_then(|u| u.moved_from.as_ref()) {
                            retained
                                .entry((old.model.clone(), old.key.clone()))
                                .or_insert_with(|| (outcome.model.clone(), outcome.key.clone()));
                        }
                    }
                    _ => {}
                }
                report.push(outcome);
            }
        }

        for model in plan.models().iter().rev() {
            if model.deletes.is_empty() {
                continue;
            }
            debug!(model = %model.model, "[SYNC][APPLY] Deleting");
            let batch = model
                .deletes
                .iter()
                .map(|entry| prepare_delete(model, entry, &retained))
                .collect();

            for outcome in self.run_batch(batch, destination, lookup).await {
                if !outcome.is_success() {
                    if let Some(parent) = model
                        .deletes
                        .iter()
                        .find(|d| d.key == outcome.key)
                        .and_then(|d| d.parent.as_ref())
                    {
                        retained
                            .entry((parent.model.clone(), parent.key.clone()))
                            .or_insert_with(|| (outcome.model.clone(), outcome.key.clone()));
                    }
                }
                report.push(outcome);
            }
        }

        info!(
            summary = %report.summary(),
            "[SYNC][APPLY] Execution finished"
        );
        report
    }

    /// Dispatches a batch with bounded concurrency; outcomes come back in
    /// batch order.
    async fn run_batch<D>(
        &self,
        batch: Vec<Prepared>,
        destination: &D,
        lookup: &LookupTable,
    ) -> Vec<OperationOutcome>
    where
        D: DestinationAdapter + ?Sized,
    {
        let concurrency = self.config.max_concurrency.max(1);
        let mut outcomes: Vec<(usize, OperationOutcome)> = stream::iter(batch.into_iter().enumerate())
            .map(|(index, prepared)| async move {
                let outcome = match prepared {
                    Prepared::Skip(outcome) => outcome,
                    Prepared::Dispatch(operation) => {
                        self.dispatch(operation, destination, lookup).await
                    }
                };
                (index, outcome)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    async fn dispatch<D>(
        &self,
        operation: Operation,
        destination: &D,
        lookup: &LookupTable,
    ) -> OperationOutcome
    where
        D: DestinationAdapter + ?Sized,
    {
        let model = operation.model().to_string();
        let key = operation.key().clone();
        let kind = operation.kind();

        if self.cancel.is_cancelled() {
            return cancelled(model, key, kind);
        }
        self.throttle.wait().await;
        if self.cancel.is_cancelled() {
            return cancelled(model, key, kind);
        }

        debug!(model = %model, key = %key, kind = %kind, "[SYNC][APPLY] Dispatching operation");
        let status = match destination.apply(operation, lookup).await {
            Ok(ApplyOutcome::Created(id)) => OperationStatus::Succeeded {
                remote_id: Some(id),
            },
            Ok(ApplyOutcome::Applied) if kind == OperationKind::Create => OperationStatus::Failed {
                error: OperationError::Apply {
                    model: model.clone(),
                    key: key.clone(),
                    detail: "destination did not return an identifier for the created record"
                        .to_string(),
                },
            },
            Ok(ApplyOutcome::Applied) => OperationStatus::Succeeded { remote_id: None },
            Err(err) => OperationStatus::Failed {
                error: OperationError::from_destination(&model, &key, err),
            },
        };

        if matches!(status, OperationStatus::Failed { .. }) && !self.config.continue_on_failure {
            debug!(model = %model, key = %key, "[SYNC][APPLY] Failure with continue_on_failure off, cancelling");
            self.cancel.cancel();
        }

        OperationOutcome {
            model,
            key,
            kind,
            status,
        }
    }
}

fn skipped(error: OperationError, kind: OperationKind) -> OperationOutcome {
    OperationOutcome {
        model: error_model(&error).to_string(),
        key: error.key().clone(),
        kind,
        status: OperationStatus::Skipped { error },
    }
}

fn error_model(error: &OperationError) -> &str {
    match error {
        OperationError::Validation { model, .. }
        | OperationError::Apply { model, .. }
        | OperationError::Dependency { model, .. }
        | OperationError::Blocked { model, .. }
        | OperationError::Cancelled { model, .. } => model,
    }
}

fn cancelled(model: String, key: NaturalKey, kind: OperationKind) -> OperationOutcome {
    skipped(OperationError::Cancelled { model, key }, kind)
}

fn prepare_create(
    model: &str,
    entry: &CreateEntry,
    lookup: &LookupTable,
    unavailable: &HashSet<RecordRef>,
) -> Prepared {
    let parent = match &entry.parent {
        None => None,
        Some(link) => {
            let remote_id = if unavailable.contains(&(link.model.clone(), link.key.clone())) {
                None
            } else {
                lookup.remote_id(&link.model, &link.key)
            };
            match remote_id {
                Some(remote_id) => Some(ParentRef {
                    model: link.model.clone(),
                    key: link.key.clone(),
                    remote_id: remote_id.clone(),
                }),
                None => {
                    return Prepared::Skip(skipped(
                        OperationError::Dependency {
                            model: model.to_string(),
                            key: entry.key.clone(),
                            parent_model: link.model.clone(),
                            parent_key: link.key.clone(),
                        },
                        OperationKind::Create,
                    ))
                }
            }
        }
    };
    Prepared::Dispatch(Operation::Create {
        model: model.to_string(),
        key: entry.key.clone(),
        identifiers: entry.identifiers.clone(),
        attributes: entry.attributes.clone(),
        parent,
    })
}

/// Updated records already exist in the destination, so their owner does
/// too; the owner's id is attached when it is known. A move needs the new
/// owner's id and is skipped without it.
fn prepare_update(
    model: &str,
    entry: &UpdateEntry,
    lookup: &LookupTable,
    unavailable: &HashSet<RecordRef>,
) -> Prepared {
    let parent = entry.parent.as_ref().and_then(|link| {
        if unavailable.contains(&(link.model.clone(), link.key.clone())) {
            return None;
        }
        lookup.remote_id(&link.model, &link.key).map(|id| ParentRef {
            model: link.model.clone(),
            key: link.key.clone(),
            remote_id: id.clone(),
        })
    });
    if let Some(link) = entry.parent.as_ref().filter(|_| entry.is_move() && parent.is_none()) {
        return Prepared::Skip(skipped(
            OperationError::Dependency {
                model: model.to_string(),
                key: entry.key.clone(),
                parent_model: link.model.clone(),
                parent_key: link.key.clone(),
            },
            OperationKind::Update,
        ));
    }
    Prepared::Dispatch(Operation::Update {
        model: model.to_string(),
        key: entry.key.clone(),
        remote_id: entry.remote_id.clone(),
        changes: entry.changed_fields(),
        parent,
        reparent: entry.is_move(),
    })
}

/// Deletes whose destination record keeps children that are not going away.
fn seed_retained(plan: &DiffPlan) -> HashMap<RecordRef, RecordRef> {
    let mut retained = HashMap::new();
    for model in plan.models() {
        for entry in &model.deletes {
            if let Some(child) = entry.kept_children.first() {
                retained.insert(
                    (model.model.clone(), entry.key.clone()),
                    (child.model.clone(), child.key.clone()),
                );
            }
        }
    }
    retained
}

fn prepare_delete(
    model: &ModelDiff,
    entry: &DeleteEntry,
    retained: &HashMap<RecordRef, RecordRef>,
) -> Prepared {
    if let Some((child_model, child_key)) = retained.get(&(model.model.clone(), entry.key.clone())) {
        return Prepared::Skip(skipped(
            OperationError::Blocked {
                model: model.model.clone(),
                key: entry.key.clone(),
                child_model: child_model.clone(),
                child_key: child_key.clone(),
            },
            OperationKind::Delete,
        ));
    }
    Prepared::Dispatch(Operation::Delete {
        model: model.model.clone(),
        key: entry.key.clone(),
        remote_id: entry.remote_id.clone(),
    })
}
