//! Record-store collaborator interface.
//!
//! The reconciler drives the archive exclusively through this trait; the
//! production implementation is the REST client in `client`, and the tests
//! substitute an in-memory store with failure injection.

use crate::record::FileSet;
use async_trait::async_trait;
use std::path::Path;

/// Result type for record-store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by record-store operations.
///
/// None of these are recovered locally; every one is fatal to the current
/// reconciliation session.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The archive could not be reached at the transport level.
    #[error("archive unreachable: {0}")]
    Connectivity(String),

    /// The access token was rejected.
    #[error("authorization rejected (HTTP {status}): check the access token")]
    Authorization { status: u16 },

    /// A referenced record, version, or file does not exist remotely.
    #[error("not found on the archive: {0}")]
    NotFound(String),

    /// The remote state disagrees with the expected call ordering, e.g. a
    /// link import onto a draft that already has links, or a concurrent
    /// mutation of the draft by another process.
    #[error("conflict reported by the archive: {0}")]
    Conflict(String),

    /// Any other non-success response from the archive.
    #[error("archive returned HTTP {status}: {message}")]
    Protocol { status: u16, message: String },

    /// Local file or directory access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Version/draft lifecycle and file-link operations of the remote archive.
///
/// A draft created through `create_version` is owned by the calling session
/// until it is published or abandoned; the store does not enforce exclusivity
/// against other writers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a new draft version from a published version. Returns the id
    /// assigned to the draft by the archive.
    async fn create_version(&self, previous_id: &str) -> Result<String>;

    /// Fetch the draft's full metadata document.
    async fn get_metadata(&self, id: &str) -> Result<serde_json::Value>;

    /// Replace the draft's full metadata document.
    async fn put_metadata(&self, id: &str, doc: &serde_json::Value) -> Result<()>;

    /// Copy all file links from the draft's predecessor version into the
    /// draft, as a single atomic remote action. Fails if the draft already
    /// has any links.
    async fn import_links(&self, id: &str) -> Result<()>;

    /// List the files currently linked to the draft, with the checksums the
    /// archive reports for them.
    async fn list_linked_files(&self, id: &str) -> Result<FileSet>;

    /// Remove one file link from the draft.
    async fn delete_link(&self, id: &str, name: &str) -> Result<()>;

    /// Register `name` as a pending link on the draft. The archive addresses
    /// the pending upload by `(id, name)`, so no separate handle is returned.
    async fn register_file(&self, id: &str, name: &str) -> Result<()>;

    /// Stream the content of the local file at `path` into the registered
    /// link `name`.
    async fn upload_content(&self, id: &str, name: &str, path: &Path) -> Result<()>;

    /// Complete the upload of `name`, making the link fully attached.
    async fn commit_upload(&self, id: &str, name: &str) -> Result<()>;

    /// Publish the draft, making it immutable and visible to all users.
    async fn publish(&self, id: &str) -> Result<()>;
}
