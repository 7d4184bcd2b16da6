//! Arcsync Core Library
//!
//! Client-side version reconciliation for records on a content-addressed
//! archive:
//! - Record data model (file descriptors, link sets, versions)
//! - Checksum indexing of local upload directories
//! - Link-set diffing into a reconciliation plan
//! - Record-store trait and REST client for the archive API
//! - Version reconciler state machine
//! - Client configuration loading

pub mod checksum;
pub mod client;
pub mod config;
pub mod diff;
pub mod record;
pub mod reconcile;
pub mod store;

pub use client::ArchiveClient;
pub use config::ArchiveConfig;
pub use diff::{diff, ReconciliationPlan};
pub use record::{Checksum, FileDescriptor, FileSet, RecordVersion, RetentionPolicy, VersionStatus};
pub use reconcile::{
    ReconcileError, ReconcileReport, ReconcileRequest, ReconcileStep, Reconciler, RetryPolicy,
};
pub use store::{RecordStore, StoreError};
