//! Version reconciliation state machine.
//!
//! Drives the archive through the strictly ordered sequence that turns a
//! previous published version plus a local directory into a new version:
//! create draft, update metadata, import links, prune links, register and
//! upload new content, publish (optional).
//!
//! The archive enforces the ordering: links must be imported before they can
//! be pruned (import fails on a non-empty link set), content can only be
//! uploaded for a registered link, and a draft with pending uploads cannot
//! be published. The first failing transition aborts the remaining pipeline;
//! no compensating rollback is attempted, so a draft may be left partially
//! reconciled and its id is reported for manual inspection.

use crate::checksum;
use crate::diff::{self, ReconciliationPlan};
use crate::record::{FileSet, RecordVersion, RetentionPolicy, VersionStatus};
use crate::store::{RecordStore, StoreError};
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// Pipeline transitions, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    /// Local directory indexing; runs before any remote call.
    IndexLocalFiles,
    CreateVersion,
    UpdateMetadata,
    ImportLinks,
    PruneLinks,
    RegisterAndUpload,
    Publish,
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcileStep::IndexLocalFiles => "local file indexing",
            ReconcileStep::CreateVersion => "new version creation",
            ReconcileStep::UpdateMetadata => "metadata update",
            ReconcileStep::ImportLinks => "file link import",
            ReconcileStep::PruneLinks => "file link pruning",
            ReconcileStep::RegisterAndUpload => "file registration and upload",
            ReconcileStep::Publish => "publication",
        };
        write!(f, "{}", name)
    }
}

/// A reconciliation failure, annotated with enough context for the caller to
/// state what was completed and what was not.
#[derive(Debug)]
pub struct ReconcileError {
    /// The transition that failed.
    pub step: ReconcileStep,
    /// The file being processed, for per-file transitions.
    pub file: Option<String>,
    /// The draft's id, when the failure happened after draft creation.
    pub draft_id: Option<String>,
    pub source: StoreError,
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.step)?;
        if let Some(file) = &self.file {
            write!(f, " for '{}'", file)?;
        }
        write!(f, ": {}", self.source)?;
        match &self.draft_id {
            Some(id) => write!(f, "; draft left at id {}", id),
            None => Ok(()),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Bounded retry for the create-version transition.
///
/// The archive reports a conflict when a draft for the next version already
/// exists and is still being settled. Retrying the creation a bounded number
/// of times replaces the unbounded re-invocation some older clients used.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Inputs for one reconciliation session. Immutable for its duration.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    /// Id of the latest published version of the record.
    pub previous_id: String,
    /// Directory holding the data files intended for the new version.
    pub local_dir: PathBuf,
    /// Control files in `local_dir` that are not data files.
    pub exclude: Vec<String>,
    /// Ready-made metadata section to write to the draft, if any.
    pub metadata: Option<Value>,
    pub policy: RetentionPolicy,
    /// Publish the draft once reconciled; otherwise leave it open.
    pub publish: bool,
}

/// Outcome of a completed reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    /// The new version as left on the archive.
    pub version: RecordVersion,
    /// The plan that was executed.
    pub plan: ReconciliationPlan,
}

/// Executes the reconciliation pipeline against a record store.
pub struct Reconciler<'a, S> {
    store: &'a S,
    retry: RetryPolicy,
}

impl<'a, S: RecordStore> Reconciler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(store: &'a S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Run the full pipeline for one request.
    ///
    /// Every remote call is awaited before the next is issued; there is no
    /// parallelism and no cancellation once started.
    pub async fn run(&self, request: &ReconcileRequest) -> Result<ReconcileReport, ReconcileError> {
        // An unreadable directory must fail before any remote call is made,
        // so no draft is left behind for a purely local problem.
        let local = checksum::index_directory(&request.local_dir, &request.exclude)
            .map_err(|e| ReconcileError {
                step: ReconcileStep::IndexLocalFiles,
                file: None,
                draft_id: None,
                source: StoreError::Io(e),
            })?;
        debug!(files = local.len(), dir = %request.local_dir.display(), "local directory indexed");

        let draft_id = self.create_version(&request.previous_id).await?;
        info!(draft = %draft_id, previous = %request.previous_id, "new draft version created");

        if let Some(section) = &request.metadata {
            self.update_metadata(&draft_id, section).await?;
            info!(draft = %draft_id, "draft metadata updated");
        }

        let remote_linked = self.import_links(&draft_id).await?;
        info!(
            draft = %draft_id,
            links = remote_linked.len(),
            "file links imported from previous version"
        );

        // The plan is computed once; everything after this point only
        // executes it.
        let plan = diff::diff(&remote_linked, &local, request.policy);
        info!(
            keep = plan.keep.len(),
            drop = plan.drop.len(),
            upload = plan.upload.len(),
            "reconciliation plan computed"
        );

        self.prune_links(&draft_id, &plan).await?;
        self.register_and_upload(&draft_id, &plan, request).await?;

        let status = if request.publish {
            self.publish(&draft_id).await?;
            info!(draft = %draft_id, "new version published");
            VersionStatus::Published
        } else {
            info!(draft = %draft_id, "draft left open");
            VersionStatus::Draft
        };

        // Kept links resolve to the remote descriptors, uploads to the local
        // index; together they describe the link set the archive now holds.
        let mut linked_files = FileSet::new();
        for name in &plan.keep {
            if let Some(descriptor) = remote_linked.get(name) {
                linked_files.insert(descriptor.clone());
            }
        }
        for name in &plan.upload {
            if let Some(descriptor) = local.get(name) {
                linked_files.insert(descriptor.clone());
            }
        }

        Ok(ReconcileReport {
            version: RecordVersion {
                id: draft_id,
                status,
                linked_files,
            },
            plan,
        })
    }

    /// Transition 1: create the draft, retrying draft conflicts within the
    /// configured bound.
    async fn create_version(&self, previous_id: &str) -> Result<String, ReconcileError> {
        let mut attempt = 1;
        loop {
            match self.store.create_version(previous_id).await {
                Ok(id) => return Ok(id),
                Err(StoreError::Conflict(reason)) if attempt < self.retry.max_attempts => {
                    info!(attempt, %reason, "draft conflict on version creation, retrying");
                    attempt += 1;
                }
                Err(source) => {
                    return Err(ReconcileError {
                        step: ReconcileStep::CreateVersion,
                        file: None,
                        draft_id: None,
                        source,
                    });
                }
            }
        }
    }

    /// Transition 2: graft the caller-supplied metadata section onto the
    /// draft's document. The section is taken as-is; shaping it is the
    /// caller's concern.
    async fn update_metadata(&self, draft_id: &str, section: &Value) -> Result<(), ReconcileError> {
        let fail = |source| ReconcileError {
            step: ReconcileStep::UpdateMetadata,
            file: None,
            draft_id: Some(draft_id.to_string()),
            source,
        };

        let mut doc = self.store.get_metadata(draft_id).await.map_err(fail)?;
        if let Some(root) = doc.as_object_mut() {
            root.insert("metadata".to_string(), section.clone());
        }
        touch_updated(&mut doc);
        self.store.put_metadata(draft_id, &doc).await.map_err(fail)
    }

    /// Transition 3: clear any pre-existing links, then import the previous
    /// version's links in one remote action. Returns the imported link set,
    /// which is the `remote_linked` input of the plan.
    async fn import_links(&self, draft_id: &str) -> Result<FileSet, ReconcileError> {
        let fail = |file: Option<String>, source| ReconcileError {
            step: ReconcileStep::ImportLinks,
            file,
            draft_id: Some(draft_id.to_string()),
            source,
        };

        // A reused draft can come back with links already attached, and the
        // import action refuses to run over a non-empty link set.
        let pre_existing = self
            .store
            .list_linked_files(draft_id)
            .await
            .map_err(|e| fail(None, e))?;
        for file in pre_existing.iter() {
            debug!(draft = %draft_id, file = %file.name, "clearing pre-existing link");
            self.store
                .delete_link(draft_id, &file.name)
                .await
                .map_err(|e| fail(Some(file.name.clone()), e))?;
        }

        self.store
            .import_links(draft_id)
            .await
            .map_err(|e| fail(None, e))?;

        self.store
            .list_linked_files(draft_id)
            .await
            .map_err(|e| fail(None, e))
    }

    /// Transition 4: delete every link the plan drops, in lexicographic
    /// order. Runs strictly after import; the targets are links that were
    /// just imported.
    async fn prune_links(
        &self,
        draft_id: &str,
        plan: &ReconciliationPlan,
    ) -> Result<(), ReconcileError> {
        for name in &plan.drop {
            self.store
                .delete_link(draft_id, name)
                .await
                .map_err(|source| ReconcileError {
                    step: ReconcileStep::PruneLinks,
                    file: Some(name.clone()),
                    draft_id: Some(draft_id.to_string()),
                    source,
                })?;
            debug!(draft = %draft_id, file = %name, "stale link removed");
        }
        Ok(())
    }

    /// Transition 5: for every upload, register the link, stream the
    /// content, and commit, in lexicographic file order. All three calls
    /// must succeed before a file counts as attached.
    async fn register_and_upload(
        &self,
        draft_id: &str,
        plan: &ReconciliationPlan,
        request: &ReconcileRequest,
    ) -> Result<(), ReconcileError> {
        let fail = |name: &String, source| ReconcileError {
            step: ReconcileStep::RegisterAndUpload,
            file: Some(name.clone()),
            draft_id: Some(draft_id.to_string()),
            source,
        };

        for name in &plan.upload {
            let path = request.local_dir.join(name);

            self.store
                .register_file(draft_id, name)
                .await
                .map_err(|e| fail(name, e))?;
            self.store
                .upload_content(draft_id, name, &path)
                .await
                .map_err(|e| fail(name, e))?;
            self.store
                .commit_upload(draft_id, name)
                .await
                .map_err(|e| fail(name, e))?;

            debug!(draft = %draft_id, file = %name, "file uploaded and committed");
        }

        if !plan.upload.is_empty() {
            info!(draft = %draft_id, count = plan.upload.len(), "new content uploaded");
        }
        Ok(())
    }

    /// Transition 6: stamp the publication date into the draft metadata and
    /// publish.
    async fn publish(&self, draft_id: &str) -> Result<(), ReconcileError> {
        let fail = |source| ReconcileError {
            step: ReconcileStep::Publish,
            file: None,
            draft_id: Some(draft_id.to_string()),
            source,
        };

        let mut doc = self.store.get_metadata(draft_id).await.map_err(fail)?;
        stamp_publication_date(&mut doc);
        self.store.put_metadata(draft_id, &doc).await.map_err(fail)?;

        self.store.publish(draft_id).await.map_err(fail)
    }
}

/// Refresh the document's `updated` timestamp (RFC 3339, UTC).
fn touch_updated(doc: &mut Value) {
    let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false);
    if let Some(root) = doc.as_object_mut() {
        root.insert("updated".to_string(), Value::String(now));
    }
}

/// Set `metadata.publication_date` to the current UTC date, `YYYY-MM-DD`.
fn stamp_publication_date(doc: &mut Value) {
    let today = Utc::now().format("%Y-%m-%d").to_string();
    if let Some(root) = doc.as_object_mut() {
        let metadata = root
            .entry("metadata".to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Some(section) = metadata.as_object_mut() {
            section.insert("publication_date".to_string(), Value::String(today));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publication_date_is_stamped_into_the_metadata_section() {
        let mut doc = json!({"id": "abc", "metadata": {"title": "t"}});
        stamp_publication_date(&mut doc);

        let date = doc["metadata"]["publication_date"].as_str().unwrap();
        assert_eq!(date.len(), 10);
        assert_eq!(&date[4..5], "-");
        assert_eq!(doc["metadata"]["title"], "t");
    }

    #[test]
    fn updated_timestamp_is_refreshed_on_the_document_root() {
        let mut doc = json!({"id": "abc", "updated": "2020-01-01T00:00:00.000000+00:00"});
        touch_updated(&mut doc);

        let updated = doc["updated"].as_str().unwrap();
        assert!(updated.starts_with("20"));
        assert_ne!(updated, "2020-01-01T00:00:00.000000+00:00");
        assert!(updated.contains('T'));
    }

    #[test]
    fn missing_metadata_section_is_created() {
        let mut doc = json!({"id": "abc"});
        stamp_publication_date(&mut doc);

        assert!(doc["metadata"]["publication_date"].is_string());
    }

    #[test]
    fn error_display_names_step_file_and_draft() {
        let err = ReconcileError {
            step: ReconcileStep::PruneLinks,
            file: Some("data.csv".to_string()),
            draft_id: Some("abcde-12345".to_string()),
            source: StoreError::Protocol {
                status: 500,
                message: "server error".to_string(),
            },
        };

        let rendered = err.to_string();
        assert!(rendered.contains("file link pruning failed"));
        assert!(rendered.contains("'data.csv'"));
        assert!(rendered.contains("draft left at id abcde-12345"));
    }
}
