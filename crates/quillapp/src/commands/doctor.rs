//! Repair the mirrored tree from the document.
//!
//! The document is authoritative. The doctor never edits entity data; it
//! fills in missing paths, rewrites metadata or content files that are gone,
//! and removes `.tmp` files left behind by an interrupted write.

use serde::Serialize;

use crate::error::Result;
use crate::store::entity_files::{
    assign_missing_paths, Mirrored, COLLECTIONS_DIR, NOTEBOOKS_DIR, TMP_SUFFIX,
};
use crate::store::{EntityFiles, HierarchyStore, StorageBackend};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorReport {
    pub paths_assigned: usize,
    pub files_restored: usize,
    pub temp_files_removed: usize,
}

impl DoctorReport {
    pub fn is_clean(&self) -> bool {
        self.paths_assigned == 0 && self.files_restored == 0 && self.temp_files_removed == 0
    }
}

fn repair<B: StorageBackend, E: Mirrored>(files: &EntityFiles<'_, B>, entity: &E) -> Result<usize> {
    let missing = files.missing_files(entity)?;
    if missing.is_empty() {
        return Ok(0);
    }
    tracing::warn!(path = entity.mirror_path(), ?missing, "restoring mirrored files");
    files.update(entity)?;
    Ok(missing.len())
}

fn remove_stale<B: StorageBackend>(store: &HierarchyStore<B>) -> Result<usize> {
    let backend = store.backend();
    let files = store.files();
    let mut stale = files.stale_temp_files(NOTEBOOKS_DIR)?;
    stale.extend(files.stale_temp_files(COLLECTIONS_DIR)?);
    stale.extend(
        backend
            .list_files("")?
            .into_iter()
            .filter(|f| !f.contains('/') && f.starts_with(".hierarchy-") && f.ends_with(TMP_SUFFIX)),
    );
    for tmp in &stale {
        backend.remove_file(tmp)?;
        tracing::info!(path = %tmp, "removed stale temp file");
    }
    Ok(stale.len())
}

/// Check every live entity against the mirrored tree and fix what is off.
pub fn run<B: StorageBackend>(store: &HierarchyStore<B>) -> Result<DoctorReport> {
    store.mutate("doctor", |doc, files| {
        let mut report = DoctorReport {
            paths_assigned: assign_missing_paths(doc)?,
            temp_files_removed: remove_stale(store)?,
            ..Default::default()
        };

        for nb in doc.structure.notebooks.values().filter(|nb| !nb.deleted) {
            report.files_restored += repair(files, nb)?;
            for ch in nb.chapters.values().filter(|ch| !ch.deleted) {
                report.files_restored += repair(files, ch)?;
                for note in ch.notes.values().filter(|n| !n.deleted) {
                    report.files_restored += repair(files, note)?;
                }
            }
        }
        for collection in doc.structure.notebook_collections.values() {
            report.files_restored += repair(files, collection)?;
        }

        if report.is_clean() {
            tracing::debug!("mirrored tree is consistent");
        } else {
            tracing::info!(
                paths = report.paths_assigned,
                files = report.files_restored,
                temps = report.temp_files_removed,
                "mirrored tree repaired"
            );
        }
        Ok(report)
    })
}
