//! Coordinates one load-diff-apply run between a source and a destination.

use std::fs;

use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::contract::{DestinationAdapter, SourceAdapter};
use crate::diff::{diff, DiffPlan};
use crate::error::SyncError;
use crate::executor::Executor;
use crate::lookup::LookupTable;
use crate::report::SyncReport;

/// What a run produced. `report` is `None` for dry runs.
#[derive(Debug)]
pub struct SynchroniseOutcome {
    pub diff: DiffPlan,
    pub report: Option<SyncReport>,
    pub lookup: LookupTable,
}

pub async fn synchronise<S, D>(
    config: &SyncConfig,
    source: &S,
    destination: &D,
) -> Result<SynchroniseOutcome, SyncError>
where
    S: SourceAdapter + ?Sized,
    D: DestinationAdapter + ?Sized,
{
    info!(dry_run = config.dry_run, "[SYNC] Starting synchronisation");

    let source_records = source.load().await.map_err(|e| {
        error!(error = %e, "[SYNC][ERROR] Loading source records failed");
        SyncError::SourceLoad(e)
    })?;
    info!(models = source_records.schema().models().len(), "[SYNC] Source records loaded");

    let destination_records = destination.load().await.map_err(|e| {
        error!(error = %e, "[SYNC][ERROR] Loading destination records failed");
        SyncError::DestinationLoad(e)
    })?;
    info!("[SYNC] Destination records loaded");

    let plan = diff(&source_records, &destination_records).map_err(|e| {
        error!(error = %e, "[SYNC][ERROR] Diff failed");
        SyncError::Schema(e)
    })?;
    info!(summary = %plan.summary(), "[SYNC] Diff computed");
    debug!(diff = %plan, "[SYNC][DEBUG] Diff tree");

    if let Some(path) = &config.diff_output {
        let json = plan.to_json_pretty()?;
        fs::write(path, json).map_err(|e| {
            error!(error = ?e, path = ?path, "[SYNC][ERROR] Writing diff output failed");
            SyncError::Io(e)
        })?;
        info!(path = ?path, "[SYNC] Diff written");
    }

    let mut lookup = LookupTable::from_record_set(&destination_records);

    if config.dry_run {
        info!("[SYNC] Dry run, no changes applied");
        return Ok(SynchroniseOutcome {
            diff: plan,
            report: None,
            lookup,
        });
    }

    if !plan.has_changes() {
        info!("[SYNC] Destination already in sync");
        return Ok(SynchroniseOutcome {
            diff: plan,
            report: Some(SyncReport::default()),
            lookup,
        });
    }

    let executor = Executor::new(config.executor.clone());
    let report = executor.execute(&plan, destination, &mut lookup).await;
    info!(summary = %report.summary(), "[SYNC] Synchronisation finished");

    Ok(SynchroniseOutcome {
        diff: plan,
        report: Some(report),
        lookup,
    })
}
