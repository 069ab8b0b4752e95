//! Storage collaborators used by the file-transfer stubs.
//!
//! The stubs only see these traits; [`FsPartition`](crate::FsPartition) is
//! the host implementation.

use crate::error::StorageError;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read from the start.
    Read,
    /// Create or truncate, then write.
    Write,
}

/// Kind of a listed directory entry. The discriminants are the dirent type
/// codes sent to the serial peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    /// Regular file.
    File = 1,
    /// Sub-directory.
    Directory = 2,
}

impl EntryKind {
    /// Wire code of the entry kind.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name, without the directory part.
    pub name: String,
    /// Entry kind.
    pub kind: EntryKind,
}

impl DirEntry {
    /// Listing filter: only plain ASCII names are reported, control
    /// characters included, DEL and above excluded.
    pub fn is_listable_name(name: &str) -> bool {
        name.bytes().all(|b| b < 127)
    }
}

/// An open file. Dropping the handle closes it.
pub trait FileHandle: Send {
    /// Read up to `len` bytes; fewer are returned at end of file.
    fn read(&mut self, len: usize) -> Result<Vec<u8>, StorageError>;

    /// Write `data`, returning the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, StorageError>;

    /// Size of the file in bytes.
    fn size(&self) -> Result<u64, StorageError>;
}

/// An open directory iterated one entry at a time.
pub trait DirHandle: Send {
    /// Number of listable entries.
    fn num_files(&self) -> usize;

    /// Next listable entry, `None` once exhausted.
    fn next_entry(&mut self) -> Option<DirEntry>;
}

/// A mounted storage area.
pub trait Partition: Send + Sync {
    /// Open a file relative to the partition root.
    fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn FileHandle>, StorageError>;

    /// Open a directory relative to the partition root.
    fn open_dir(&self, path: &str) -> Result<Box<dyn DirHandle>, StorageError>;

    /// Remove a file or an empty directory.
    fn remove(&self, path: &str) -> Result<(), StorageError>;

    /// Create a directory. The parent must exist.
    fn make_dir(&self, path: &str) -> Result<(), StorageError>;
}
