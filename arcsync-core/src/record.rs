//! Record data model for the archive.
//!
//! A record on the archive is a chain of versions; each version links a set
//! of named files whose content is addressed by an MD5 checksum reported by
//! the archive itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Algorithm-tagged content checksum, e.g. `md5:0cc175b9c0f1b6a831c399e269772661`.
///
/// The tag and hex digest are compared byte-exact against what the archive
/// reports for linked files, so the local indexer must produce identifiers
/// in exactly this format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Wrap an already-tagged identifier string.
    pub fn new(tagged: impl Into<String>) -> Self {
        Self(tagged.into())
    }

    /// Tag an MD5 digest as the archive does.
    pub fn from_md5_digest(digest: md5::Digest) -> Self {
        Self(format!("md5:{}", hex::encode(digest.0)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named file with its content checksum.
///
/// Created fresh on every scan or listing; two descriptors are equal iff
/// both the name and the checksum match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub checksum: Checksum,
}

/// A set of files keyed by unique name.
///
/// Iteration is lexicographic by name, so every API call sequence derived
/// from a `FileSet` is reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSet {
    files: BTreeMap<String, FileDescriptor>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor, replacing any previous entry of the same name.
    pub fn insert(&mut self, descriptor: FileDescriptor) -> Option<FileDescriptor> {
        self.files.insert(descriptor.name.clone(), descriptor)
    }

    pub fn get(&self, name: &str) -> Option<&FileDescriptor> {
        self.files.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// File names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Descriptors in lexicographic name order.
    pub fn iter(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<FileDescriptor> for FileSet {
    fn from_iter<I: IntoIterator<Item = FileDescriptor>>(iter: I) -> Self {
        let mut set = Self::new();
        for descriptor in iter {
            set.insert(descriptor);
        }
        set
    }
}

/// Lifecycle state of a record version on the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionStatus {
    /// Owned by the reconciliation session until published or abandoned.
    Draft,
    /// Immutable and visible to all archive users.
    Published,
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionStatus::Draft => write!(f, "draft"),
            VersionStatus::Published => write!(f, "published"),
        }
    }
}

/// One version of a record as seen by the archive.
#[derive(Debug, Clone)]
pub struct RecordVersion {
    pub id: String,
    pub status: VersionStatus,
    pub linked_files: FileSet,
}

/// Governs what happens to files linked to the previous version but absent
/// from the local directory: dropped when `discard_missing` is set, kept
/// otherwise. Changed content always replaces, regardless of this flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub discard_missing: bool,
}
