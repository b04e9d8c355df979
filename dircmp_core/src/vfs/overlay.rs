//! Single-side, diff-filtered view of a comparison session.
//!
//! `OverlayVfs` wraps the session's filesystem the way a filtering VFS would:
//! directory listings are synthesized from cached folder decisions, every
//! other operation is forwarded untouched. Mutations never invalidate the
//! session; callers report changed paths through
//! [`ComparisonSession::invalidate_path`] themselves.

use crate::session::ComparisonSession;
use dircmp_common::{
    fold_case, FileEntry, FileMetadata, Side, Vfs, VfsCapabilities, VfsError,
};
use std::cmp::Ordering;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

pub struct OverlayVfs {
    instance_id: String,
    session: Arc<ComparisonSession>,
    side: Side,
}

impl OverlayVfs {
    pub fn new(session: Arc<ComparisonSession>, side: Side) -> Self {
        let label = match side {
            Side::Left => "left",
            Side::Right => "right",
        };
        let instance_id = format!("overlay:{}:{}", label, session.vfs().instance_id());
        Self {
            instance_id,
            session,
            side,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn session(&self) -> &Arc<ComparisonSession> {
        &self.session
    }

    fn inner(&self) -> &dyn Vfs {
        self.session.vfs().as_ref()
    }
}

/// Case-insensitive ordinal order, case-sensitive ordinal as tie-break
pub fn compare_names(a: &str, b: &str) -> Ordering {
    fold_case(a).cmp(&fold_case(b)).then_with(|| a.cmp(b))
}

impl Vfs for OverlayVfs {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata, VfsError> {
        self.inner().metadata(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<FileEntry>, VfsError> {
        let relative = self
            .session
            .relative_path(self.side, path)
            .ok_or_else(|| VfsError::OutsideRoot(path.display().to_string()))?;

        let decision = self.session.get_or_compute(&relative);
        if let Some(failure) = decision.status.failure() {
            return Err(VfsError::from(failure));
        }

        let show_identical = self.session.show_identical();
        let mut entries: Vec<FileEntry> = decision
            .items
            .values()
            .filter(|item| item.is_different || show_identical)
            .filter_map(|item| item.side(self.side))
            .map(|snapshot| FileEntry {
                name: snapshot.name.clone(),
                file_name: snapshot.file_name.clone(),
                size: snapshot.size,
                modified: snapshot.modified,
                is_dir: snapshot.is_dir,
                attributes: snapshot.attributes,
            })
            .collect();
        entries.sort_by(|a, b| compare_names(&a.name, &b.name));
        Ok(entries)
    }

    fn open_file(&self, path: &Path) -> Result<Box<dyn Read + Send>, VfsError> {
        self.inner().open_file(path)
    }

    fn remove_file(&self, path: &Path) -> Result<(), VfsError> {
        self.inner().remove_file(path)
    }

    fn copy_file(&self, src: &Path, dest: &Path) -> Result<(), VfsError> {
        self.inner().copy_file(src, dest)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner().exists(path)
    }

    fn is_writable(&self) -> bool {
        self.inner().is_writable()
    }

    fn capabilities(&self) -> VfsCapabilities {
        self.inner().capabilities()
    }

    fn create_file(&self, path: &Path) -> Result<Box<dyn Write + Send>, VfsError> {
        self.inner().create_file(path)
    }

    fn create_dir(&self, path: &Path) -> Result<(), VfsError> {
        self.inner().create_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), VfsError> {
        self.inner().create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), VfsError> {
        self.inner().remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), VfsError> {
        self.inner().rename(from, to)
    }

    fn move_item(&self, from: &Path, to: &Path) -> Result<(), VfsError> {
        self.inner().move_item(from, to)
    }

    fn delete(&self, path: &Path) -> Result<(), VfsError> {
        self.inner().delete(path)
    }

    fn set_mtime(&self, path: &Path, mtime: SystemTime) -> Result<(), VfsError> {
        self.inner().set_mtime(path, mtime)
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), VfsError> {
        self.inner().write_file(path, content)
    }

    fn copy_batch(&self, pairs: &[(PathBuf, PathBuf)]) -> Vec<Result<(), VfsError>> {
        self.inner().copy_batch(pairs)
    }

    fn move_batch(&self, pairs: &[(PathBuf, PathBuf)]) -> Vec<Result<(), VfsError>> {
        self.inner().move_batch(pairs)
    }

    fn delete_batch(&self, paths: &[PathBuf]) -> Vec<Result<(), VfsError>> {
        self.inner().delete_batch(paths)
    }

    fn flush(&self) -> Result<(), VfsError> {
        self.inner().flush()
    }
}
