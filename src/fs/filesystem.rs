use std::io::Write;

use super::entry::FileEntry;
use crate::error::Result;

/// Path-based browsing of a mounted volume, the surface a shell drives.
pub trait Filesystem {
    /// Get the root directory entry.
    fn root(&mut self) -> Result<FileEntry>;

    /// List the contents of a directory. `.` and `..` are not included.
    fn list_directory(&mut self, entry: &FileEntry) -> Result<Vec<FileEntry>>;

    /// Read file contents (up to `max_bytes`).
    fn read_file(&mut self, entry: &FileEntry, max_bytes: usize) -> Result<Vec<u8>>;

    /// Volume label, if available.
    fn volume_label(&self) -> Option<&str>;

    /// Filesystem type name (e.g., "FAT16", "FAT32").
    fn fs_type(&self) -> &str;

    /// Total filesystem size in bytes.
    fn total_size(&self) -> u64;

    /// Used space in bytes.
    fn used_size(&self) -> u64;

    /// Stream file data to a writer. Returns the number of bytes written.
    /// Default delegates to `read_file(entry, usize::MAX)`.
    fn write_file_to(&mut self, entry: &FileEntry, writer: &mut dyn Write) -> Result<u64> {
        let data = self.read_file(entry, usize::MAX)?;
        writer.write_all(&data)?;
        Ok(data.len() as u64)
    }
}

/// Trait for filesystems that support write operations (add/delete files and folders).
pub trait EditableFilesystem: Filesystem {
    /// Create a file in the given parent directory.
    ///
    /// `data` is a reader providing the file contents; `data_len` is the total size.
    /// Returns the new file's entry.
    fn create_file(
        &mut self,
        parent: &FileEntry,
        name: &str,
        data: &mut dyn std::io::Read,
        data_len: u64,
    ) -> Result<FileEntry>;

    /// Create a subdirectory in the given parent directory.
    fn create_directory(&mut self, parent: &FileEntry, name: &str) -> Result<FileEntry>;

    /// Delete a file or empty directory.
    ///
    /// Returns an error if the entry is a non-empty directory.
    fn delete_entry(&mut self, parent: &FileEntry, entry: &FileEntry) -> Result<()>;

    /// Recursively delete a directory and all its contents.
    ///
    /// Default implementation lists children, recurses, then calls `delete_entry`.
    fn delete_recursive(&mut self, parent: &FileEntry, entry: &FileEntry) -> Result<()> {
        if entry.is_directory() {
            let children = self.list_directory(entry)?;
            for child in &children {
                if child.is_directory() {
                    self.delete_recursive(entry, child)?;
                } else {
                    self.delete_entry(entry, child)?;
                }
            }
        }
        self.delete_entry(parent, entry)
    }

    /// Flush metadata that is not written through (FAT32 FSInfo).
    fn sync_metadata(&mut self) -> Result<()>;

    /// Returns the number of free bytes available on the filesystem.
    fn free_space(&mut self) -> Result<u64>;
}
