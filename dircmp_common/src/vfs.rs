use crate::{FileEntry, FileMetadata, VfsError};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Virtual File System trait for abstracting filesystem operations
///
/// The comparison engine only reads through `read_dir`, `metadata` and
/// `open_file`. Everything else is forwarded untouched by the overlay view,
/// so a decorator can wrap any implementation without knowing its details.
/// Implementations are shared between threads and must be safe for
/// concurrent use.
pub trait Vfs: Send + Sync {
    /// Uniquely identifies the VFS instance (e.g., "local", "overlay:left:local")
    fn instance_id(&self) -> &str;

    /// Returns the metadata for a specific path
    fn metadata(&self, path: &Path) -> Result<FileMetadata, VfsError>;

    /// Lists the contents of a directory.
    ///
    /// A directory that does not exist must be reported as
    /// `VfsError::NotFound` (or an IO error of kind `NotFound`), distinct
    /// from every other failure.
    fn read_dir(&self, path: &Path) -> Result<Vec<FileEntry>, VfsError>;

    /// Opens a file for reading (returns a Read trait object)
    fn open_file(&self, path: &Path) -> Result<Box<dyn Read + Send>, VfsError>;

    /// Removes a file
    fn remove_file(&self, path: &Path) -> Result<(), VfsError>;

    /// Copies a file from src to dest
    fn copy_file(&self, src: &Path, dest: &Path) -> Result<(), VfsError>;

    /// Checks if a path exists
    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_ok()
    }

    /// Check if this VFS supports write operations
    fn is_writable(&self) -> bool {
        false
    }

    /// Get the capabilities of this VFS
    fn capabilities(&self) -> VfsCapabilities {
        VfsCapabilities::default()
    }

    /// Create a new file and return a writer
    /// Returns Unsupported error if not writable
    fn create_file(&self, _path: &Path) -> Result<Box<dyn Write + Send>, VfsError> {
        Err(VfsError::Unsupported("Write operations not supported".to_string()))
    }

    /// Create a directory
    fn create_dir(&self, _path: &Path) -> Result<(), VfsError> {
        Err(VfsError::Unsupported("Write operations not supported".to_string()))
    }

    /// Create a directory and all parent directories
    fn create_dir_all(&self, _path: &Path) -> Result<(), VfsError> {
        Err(VfsError::Unsupported("Write operations not supported".to_string()))
    }

    /// Remove a directory and everything below it
    fn remove_dir_all(&self, _path: &Path) -> Result<(), VfsError> {
        Err(VfsError::Unsupported("Write operations not supported".to_string()))
    }

    /// Rename a file or directory in place
    fn rename(&self, _from: &Path, _to: &Path) -> Result<(), VfsError> {
        Err(VfsError::Unsupported("Write operations not supported".to_string()))
    }

    /// Move a file or directory, possibly across directories
    fn move_item(&self, from: &Path, to: &Path) -> Result<(), VfsError> {
        self.rename(from, to)
    }

    /// Delete a file or a whole directory tree
    fn delete(&self, path: &Path) -> Result<(), VfsError> {
        if self.metadata(path)?.is_dir {
            self.remove_dir_all(path)
        } else {
            self.remove_file(path)
        }
    }

    /// Set file modification time
    fn set_mtime(&self, _path: &Path, _mtime: SystemTime) -> Result<(), VfsError> {
        Err(VfsError::Unsupported("Write operations not supported".to_string()))
    }

    /// Write file content from bytes
    fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), VfsError> {
        let mut writer = self.create_file(path)?;
        writer.write_all(content).map_err(VfsError::Io)?;
        Ok(())
    }

    /// Copy several files; one result per pair, in input order
    fn copy_batch(&self, pairs: &[(PathBuf, PathBuf)]) -> Vec<Result<(), VfsError>> {
        pairs.iter().map(|(src, dest)| self.copy_file(src, dest)).collect()
    }

    /// Move several items; one result per pair, in input order
    fn move_batch(&self, pairs: &[(PathBuf, PathBuf)]) -> Vec<Result<(), VfsError>> {
        pairs.iter().map(|(src, dest)| self.move_item(src, dest)).collect()
    }

    /// Delete several items; one result per path, in input order
    fn delete_batch(&self, paths: &[PathBuf]) -> Vec<Result<(), VfsError>> {
        paths.iter().map(|path| self.delete(path)).collect()
    }

    /// Flush any pending writes
    fn flush(&self) -> Result<(), VfsError> {
        Ok(())
    }
}

/// Capabilities flags for VFS implementations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VfsCapabilities {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    pub rename: bool,
    pub create_dir: bool,
    pub set_mtime: bool,
}

impl VfsCapabilities {
    /// Full read-write capabilities (local filesystem)
    pub fn full() -> Self {
        Self {
            read: true,
            write: true,
            delete: true,
            rename: true,
            create_dir: true,
            set_mtime: true,
        }
    }
}
