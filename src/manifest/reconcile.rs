//! Orphaned chunk reconciliation
//!
//! After a conversion run, the chunks previously recorded for a source file
//! but not produced again are orphans: they are deleted from the remote and
//! dropped from the manifest. Deletion is best effort; an orphan that cannot
//! be deleted stays recorded so a later run tries again.
//!
//! [`Reconciler::clean`] applies the same deletion to every recorded chunk of
//! a source.

use super::types::Manifest;
use crate::remote::RemoteStore;
use crate::retry::{with_retry, RetryPolicy};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Outcome of reconciling or cleaning one source file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Recorded chunks selected for deletion
    pub orphaned: Vec<String>,
    /// Orphans deleted (or that would be, on a dry run)
    pub deleted: Vec<String>,
    /// Orphans whose deletion failed; still recorded
    pub failed: Vec<String>,
}

/// Chunks recorded for `source` that are not in `actual`, in name order
///
/// Must be called on the manifest as it was before this run's chunks are
/// recorded.
pub fn find_orphans(manifest: &Manifest, source: &str, actual: &[String]) -> Vec<String> {
    let actual: BTreeSet<&str> = actual.iter().map(String::as_str).collect();
    manifest
        .chunk_names(source)
        .into_iter()
        .filter(|name| !actual.contains(name.as_str()))
        .collect()
}

/// Applies a run's chunk set to the manifest and removes orphans
pub struct Reconciler<'a> {
    remote: &'a dyn RemoteStore,
    retry: RetryPolicy,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler deleting through `remote`
    pub fn new(remote: &'a dyn RemoteStore, retry: RetryPolicy) -> Self {
        Self {
            remote,
            retry,
            dry_run: false,
        }
    }

    /// Report the orphans but leave the remote and the manifest untouched
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Record `actual` as the chunks of `source` and delete the orphans
    ///
    /// After this returns, the recorded chunks of `source` are exactly
    /// `actual` plus [`ReconcileReport::failed`].
    pub async fn reconcile(
        &self,
        manifest: &mut Manifest,
        source: &str,
        actual: &[String],
    ) -> ReconcileReport {
        let orphaned = find_orphans(manifest, source, actual);
        let mut report = ReconcileReport {
            orphaned: orphaned.clone(),
            ..ReconcileReport::default()
        };

        if self.dry_run {
            for name in orphaned {
                info!("[dry-run] Would delete orphaned chunk {name}");
                report.deleted.push(name);
            }
            return report;
        }

        let entry = manifest.source_mut(source);
        for name in actual {
            entry.record_chunk(name);
        }
        self.delete_recorded(manifest, source, orphaned, &mut report).await;

        report
    }

    /// Delete every recorded chunk of `source` and drop the deleted ones
    ///
    /// Chunks whose deletion fails stay recorded. The conversion stamp is
    /// cleared once anything was deleted, so the next conversion is not
    /// skipped.
    pub async fn clean(&self, manifest: &mut Manifest, source: &str) -> ReconcileReport {
        let recorded = manifest.chunk_names(source);
        let mut report = ReconcileReport {
            orphaned: recorded.clone(),
            ..ReconcileReport::default()
        };

        if self.dry_run {
            for name in recorded {
                info!("[dry-run] Would delete chunk {name}");
                report.deleted.push(name);
            }
            return report;
        }

        self.delete_recorded(manifest, source, recorded, &mut report).await;
        if !report.deleted.is_empty() {
            manifest.source_mut(source).conversion = None;
        }

        report
    }

    async fn delete_recorded(
        &self,
        manifest: &mut Manifest,
        source: &str,
        names: Vec<String>,
        report: &mut ReconcileReport,
    ) {
        for name in names {
            let operation = format!("Deletion of {name}");
            match with_retry(&self.retry, &operation, |_| self.remote.delete(&name)).await {
                Ok(()) => {
                    manifest.source_mut(source).remove_chunk(&name);
                    info!("Deleted chunk {name}");
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!("Could not delete chunk {name}, keeping it recorded: {e}");
                    report.failed.push(name);
                }
            }
        }
    }
}
