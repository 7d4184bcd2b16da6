//! Checksum indexing for local upload directories.
//!
//! The archive reports `md5:`-tagged checksums for linked files; indexing the
//! local directory with the same algorithm and the same tag format makes the
//! comparison in `diff` byte-exact without downloading any content.

use crate::record::{Checksum, FileDescriptor, FileSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read granularity for streaming checksum computation.
const CHUNK_SIZE: usize = 8192;

/// Compute the tagged MD5 checksum of a single file.
///
/// The file is streamed in fixed-size chunks; content of any size hashes in
/// constant memory.
pub fn checksum_file(path: &Path) -> std::io::Result<Checksum> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }

    Ok(Checksum::from_md5_digest(context.compute()))
}

/// Index every regular file directly inside `dir` (non-recursive).
///
/// `exclude` names control files that are not data files, e.g. a metadata
/// descriptor sitting next to the uploads. The operation is all-or-nothing:
/// the first I/O error aborts the scan and no partial index is returned.
pub fn index_directory(dir: &Path, exclude: &[String]) -> std::io::Result<FileSet> {
    let mut set = FileSet::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name().into_string().map_err(|raw| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("non-UTF-8 file name {:?} in {}", raw, dir.display()),
            )
        })?;

        if exclude.iter().any(|excluded| excluded == &name) {
            continue;
        }

        let checksum = checksum_file(&entry.path())?;
        set.insert(FileDescriptor { name, checksum });
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &[u8]) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn checksum_matches_known_md5_vector() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "hello.txt", b"hello");

        let checksum = checksum_file(&dir.path().join("hello.txt")).unwrap();
        assert_eq!(checksum.as_str(), "md5:5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn checksum_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "data.csv", b"col1,col2\n1,2\n");

        let first = checksum_file(&dir.path().join("data.csv")).unwrap();
        let second = checksum_file(&dir.path().join("data.csv")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn checksum_differs_on_single_byte_change() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.bin", b"payload-0");
        write_file(dir.path(), "b.bin", b"payload-1");

        let a = checksum_file(&dir.path().join("a.bin")).unwrap();
        let b = checksum_file(&dir.path().join("b.bin")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn index_covers_regular_files_only() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "one.dat", b"one");
        write_file(dir.path(), "two.dat", b"two");
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write_file(&dir.path().join("nested"), "three.dat", b"three");

        let set = index_directory(dir.path(), &[]).unwrap();
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["one.dat", "two.dat"]);
    }

    #[test]
    fn index_skips_excluded_control_files() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "metadata.yaml", b"title: x");
        write_file(dir.path(), "results.json", b"{}");

        let exclude = vec!["metadata.yaml".to_string()];
        let set = index_directory(dir.path(), &exclude).unwrap();

        assert!(!set.contains("metadata.yaml"));
        assert!(set.contains("results.json"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn index_fails_on_unreadable_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");

        assert!(index_directory(&missing, &[]).is_err());
    }
}
