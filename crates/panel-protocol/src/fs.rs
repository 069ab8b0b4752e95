//! Host filesystem partition.
//!
//! [`FsPartition`] maps partition paths onto a directory of the host. Paths
//! from the serial peer are taken relative to that root whether or not they
//! start with `/`; any `..` component is refused.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::StorageError;
use crate::storage::{DirEntry, DirHandle, EntryKind, FileHandle, OpenMode, Partition};

/// A partition rooted at a host directory.
#[derive(Debug, Clone)]
pub struct FsPartition {
    root: PathBuf,
}

impl FsPartition {
    /// Use `root` as partition root. The directory is not created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `root` as partition root, creating it if needed.
    pub fn mount(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let partition = Self::new(root);
        fs::create_dir_all(&partition.root)?;
        debug!(root = %partition.root.display(), "partition mounted");
        Ok(partition)
    }

    /// Host directory backing the partition.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str, allow_root: bool) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path.trim().trim_start_matches('/'));
        let invalid = |reason: &str| StorageError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => return Err(invalid("parent components are not allowed")),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("must be relative to the partition"))
                }
            }
        }
        if resolved == self.root && !allow_root {
            return Err(invalid("empty path"));
        }
        Ok(resolved)
    }
}

impl Partition for FsPartition {
    fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn FileHandle>, StorageError> {
        let full = self.resolve(path, false)?;
        let file = match mode {
            OpenMode::Read => File::open(&full)?,
            OpenMode::Write => File::create(&full)?,
        };
        debug!(path = %full.display(), ?mode, "file opened");
        Ok(Box::new(FsFile { file }))
    }

    fn open_dir(&self, path: &str) -> Result<Box<dyn DirHandle>, StorageError> {
        let full = self.resolve(path, true)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&full)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let kind = if file_type.is_file() {
                EntryKind::File
            } else if file_type.is_dir() {
                EntryKind::Directory
            } else {
                continue;
            };
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if DirEntry::is_listable_name(&name) {
                entries.push(DirEntry { name, kind });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(path = %full.display(), entries = entries.len(), "directory opened");
        Ok(Box::new(FsDir {
            total: entries.len(),
            entries: entries.into(),
        }))
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path, false)?;
        if fs::metadata(&full)?.is_dir() {
            fs::remove_dir(&full)?;
        } else {
            fs::remove_file(&full)?;
        }
        Ok(())
    }

    fn make_dir(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path, false)?;
        fs::create_dir(&full)?;
        Ok(())
    }
}

struct FsFile {
    file: File,
}

impl FileHandle for FsFile {
    fn read(&mut self, len: usize) -> Result<Vec<u8>, StorageError> {
        let mut buf = Vec::with_capacity(len);
        let limit = u64::try_from(len).unwrap_or(u64::MAX);
        (&self.file).take(limit).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, StorageError> {
        self.file.write_all(data)?;
        Ok(data.len())
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.file.metadata()?.len())
    }
}

struct FsDir {
    total: usize,
    entries: VecDeque<DirEntry>,
}

impl DirHandle for FsDir {
    fn num_files(&self) -> usize {
        self.total
    }

    fn next_entry(&mut self) -> Option<DirEntry> {
        self.entries.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition() -> (tempfile::TempDir, FsPartition) {
        let dir = tempfile::tempdir().unwrap();
        let partition = FsPartition::new(dir.path());
        (dir, partition)
    }

    #[test]
    fn write_then_read_back() {
        let (_dir, partition) = partition();
        let mut file = partition.open("/note.txt", OpenMode::Write).unwrap();
        assert_eq!(file.write(b"hello world").unwrap(), 11);
        drop(file);

        let mut file = partition.open("note.txt", OpenMode::Read).unwrap();
        assert_eq!(file.size().unwrap(), 11);
        assert_eq!(file.read(5).unwrap(), b"hello");
        assert_eq!(file.read(100).unwrap(), b" world");
        assert!(file.read(4).unwrap().is_empty());
    }

    #[test]
    fn parent_components_are_refused() {
        let (_dir, partition) = partition();
        let err = partition.open("../escape", OpenMode::Write).err().unwrap();
        assert!(matches!(err, StorageError::InvalidPath { .. }));
        assert!(partition.make_dir("a/../../b").is_err());
    }

    #[test]
    fn empty_path_is_only_valid_for_listing() {
        let (_dir, partition) = partition();
        assert!(partition.open("", OpenMode::Read).is_err());
        assert!(partition.open_dir("/").is_ok());
    }

    #[test]
    fn listing_reports_files_and_directories_in_name_order() {
        let (dir, partition) = partition();
        fs::write(dir.path().join("b.png"), b"x").unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();

        let mut listing = partition.open_dir("").unwrap();
        assert_eq!(listing.num_files(), 2);
        assert_eq!(
            listing.next_entry(),
            Some(DirEntry {
                name: "a".into(),
                kind: EntryKind::Directory
            })
        );
        assert_eq!(listing.next_entry().unwrap().kind.code(), 1);
        assert_eq!(listing.next_entry(), None);
    }

    #[test]
    fn remove_handles_files_and_empty_directories() {
        let (dir, partition) = partition();
        partition.make_dir("sub").unwrap();
        fs::write(dir.path().join("sub/f"), b"x").unwrap();

        assert!(partition.remove("sub").is_err());
        partition.remove("sub/f").unwrap();
        partition.remove("sub").unwrap();
        assert!(!dir.path().join("sub").exists());
    }

    #[test]
    fn non_ascii_names_are_hidden() {
        assert!(DirEntry::is_listable_name("plain-name_1.txt"));
        assert!(!DirEntry::is_listable_name("caf\u{e9}"));
    }
}
