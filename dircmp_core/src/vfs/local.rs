use dircmp_common::{FileAttributes, FileEntry, FileMetadata, Vfs, VfsCapabilities, VfsError};
use rayon::prelude::*;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// Local filesystem VFS implementation addressed by absolute paths
pub struct LocalVfs {
    instance_id: String,
    use_trash: bool,
}

impl LocalVfs {
    pub fn new() -> Self {
        Self {
            instance_id: "local".to_string(),
            use_trash: false,
        }
    }

    /// Send deleted items to the OS trash instead of removing them
    pub fn with_trash(mut self, enabled: bool) -> Self {
        self.use_trash = enabled;
        self
    }

    pub fn uses_trash(&self) -> bool {
        self.use_trash
    }
}

impl Default for LocalVfs {
    fn default() -> Self {
        Self::new()
    }
}

fn map_io(path: &Path, err: io::Error) -> VfsError {
    match err.kind() {
        io::ErrorKind::NotFound => VfsError::NotFound(path.display().to_string()),
        io::ErrorKind::PermissionDenied => VfsError::PermissionDenied(path.display().to_string()),
        _ => VfsError::Io(err),
    }
}

// Link metadata comes from the target, so the reparse bit is restored from the link itself
#[cfg(windows)]
fn attributes_of(_name: &str, meta: &fs::Metadata, is_link: bool) -> FileAttributes {
    use std::os::windows::fs::MetadataExt;
    let mut attrs = FileAttributes(meta.file_attributes());
    if is_link {
        attrs.insert(FileAttributes::REPARSE_POINT);
    }
    attrs
}

#[cfg(not(windows))]
fn attributes_of(name: &str, meta: &fs::Metadata, is_link: bool) -> FileAttributes {
    let mut attrs = FileAttributes::empty();
    if meta.is_dir() {
        attrs.insert(FileAttributes::DIRECTORY);
    }
    if meta.permissions().readonly() {
        attrs.insert(FileAttributes::READONLY);
    }
    if name.starts_with('.') {
        attrs.insert(FileAttributes::HIDDEN);
    }
    if is_link {
        attrs.insert(FileAttributes::REPARSE_POINT);
    }
    attrs
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    let cross = err.raw_os_error() == Some(18); // EXDEV

    #[cfg(windows)]
    let cross = err.raw_os_error() == Some(17); // ERROR_NOT_SAME_DEVICE

    #[cfg(not(any(unix, windows)))]
    let cross = { let _ = err; true };

    cross
}

impl Vfs for LocalVfs {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata, VfsError> {
        let link_meta = fs::symlink_metadata(path).map_err(|e| map_io(path, e))?;
        let is_symlink = link_meta.file_type().is_symlink();
        let meta = if is_symlink {
            fs::metadata(path).unwrap_or(link_meta)
        } else {
            link_meta
        };

        Ok(FileMetadata {
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            is_dir: meta.is_dir(),
            is_symlink,
            attributes: attributes_of(&entry_name(path), &meta, is_symlink),
        })
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<FileEntry>, VfsError> {
        let meta = fs::metadata(path).map_err(|e| map_io(path, e))?;
        if !meta.is_dir() {
            return Err(VfsError::NotADirectory(path.display().to_string()));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| map_io(path, e))? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry in {}: {}", path.display(), e);
                    continue;
                }
            };
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy().into_owned();
            let is_link = entry.file_type().map(|t| t.is_symlink()).unwrap_or(false);

            // Links report their target; dangling links fall back to the link itself
            let meta = if is_link {
                fs::metadata(entry.path()).or_else(|_| entry.metadata())
            } else {
                entry.metadata()
            };
            let meta = match meta {
                Ok(meta) => meta,
                Err(e) => {
                    debug!("Skipping entry {} without metadata: {}", name, e);
                    continue;
                }
            };

            entries.push(FileEntry {
                attributes: attributes_of(&name, &meta, is_link),
                name,
                file_name,
                size: if meta.is_dir() { 0 } else { meta.len() },
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                is_dir: meta.is_dir(),
            });
        }

        Ok(entries)
    }

    fn open_file(&self, path: &Path) -> Result<Box<dyn Read + Send>, VfsError> {
        if !path.is_file() {
            return Err(VfsError::NotAFile(path.display().to_string()));
        }

        let file = fs::File::open(path).map_err(|e| map_io(path, e))?;
        Ok(Box::new(file))
    }

    fn remove_file(&self, path: &Path) -> Result<(), VfsError> {
        fs::remove_file(path).map_err(|e| map_io(path, e))?;
        Ok(())
    }

    fn copy_file(&self, src: &Path, dest: &Path) -> Result<(), VfsError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = fs::copy(src, dest).map_err(|e| map_io(src, e))?;

        // Preserve timestamps
        if let Ok(modified) = fs::metadata(src).and_then(|m| m.modified()) {
            let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(modified));
        }

        debug!("Copied {} bytes from {} to {}", bytes, src.display(), dest.display());
        Ok(())
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn capabilities(&self) -> VfsCapabilities {
        VfsCapabilities::full()
    }

    fn create_file(&self, path: &Path) -> Result<Box<dyn Write + Send>, VfsError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = fs::File::create(path)?;
        Ok(Box::new(file))
    }

    fn create_dir(&self, path: &Path) -> Result<(), VfsError> {
        fs::create_dir(path)?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), VfsError> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), VfsError> {
        fs::remove_dir_all(path).map_err(|e| map_io(path, e))?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), VfsError> {
        fs::rename(from, to).map_err(|e| map_io(from, e))?;
        Ok(())
    }

    fn move_item(&self, from: &Path, to: &Path) -> Result<(), VfsError> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }

        // Try rename first (fast path for same filesystem)
        match fs::rename(from, to) {
            Ok(()) => {
                debug!("Moved {} to {} (rename)", from.display(), to.display());
                Ok(())
            }
            Err(e) if is_cross_device(&e) => {
                if from.is_dir() {
                    return Err(VfsError::Unsupported(format!(
                        "Cannot move directory across devices: {}",
                        from.display()
                    )));
                }
                debug!("Cross-filesystem move detected, using copy+delete fallback");
                self.copy_file(from, to)?;
                fs::remove_file(from).map_err(|e| map_io(from, e))?;
                Ok(())
            }
            Err(e) => Err(map_io(from, e)),
        }
    }

    fn delete(&self, path: &Path) -> Result<(), VfsError> {
        if self.use_trash {
            trash::delete(path)
                .map_err(|e| VfsError::Io(io::Error::other(e.to_string())))?;
            info!("Moved {} to trash", path.display());
            return Ok(());
        }

        let meta = fs::symlink_metadata(path).map_err(|e| map_io(path, e))?;
        if meta.is_dir() {
            self.remove_dir_all(path)
        } else {
            self.remove_file(path)
        }
    }

    fn set_mtime(&self, path: &Path, mtime: SystemTime) -> Result<(), VfsError> {
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(mtime))?;
        Ok(())
    }

    fn copy_batch(&self, pairs: &[(PathBuf, PathBuf)]) -> Vec<Result<(), VfsError>> {
        pairs
            .par_iter()
            .map(|(src, dest)| self.copy_file(src, dest))
            .collect()
    }

    fn move_batch(&self, pairs: &[(PathBuf, PathBuf)]) -> Vec<Result<(), VfsError>> {
        pairs
            .par_iter()
            .map(|(src, dest)| self.move_item(src, dest))
            .collect()
    }

    fn delete_batch(&self, paths: &[PathBuf]) -> Vec<Result<(), VfsError>> {
        paths.par_iter().map(|path| self.delete(path)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_local_vfs_metadata() {
        let temp = TempDir::new().unwrap();
        let test_file = temp.path().join("test.txt");
        fs::write(&test_file, b"hello").unwrap();

        let vfs = LocalVfs::new();
        let meta = vfs.metadata(&test_file).unwrap();

        assert_eq!(meta.size, 5);
        assert!(!meta.is_dir);
        assert!(!meta.is_symlink);
    }

    #[test]
    fn test_local_vfs_read_dir() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("file1.txt"), b"a").unwrap();
        fs::write(temp.path().join("file2.txt"), b"bb").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();

        let vfs = LocalVfs::new();
        let mut entries = vfs.read_dir(temp.path()).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["file1.txt", "file2.txt", "sub"]);
        assert_eq!(entries[1].size, 2);
        assert!(entries[2].is_dir);
        assert!(entries[2].attributes.contains(FileAttributes::DIRECTORY));
    }

    #[test]
    fn test_local_vfs_read_dir_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let vfs = LocalVfs::new();
        let err = vfs.read_dir(&temp.path().join("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_local_vfs_read_dir_on_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("file.txt"), b"a").unwrap();
        let vfs = LocalVfs::new();
        match vfs.read_dir(&temp.path().join("file.txt")) {
            Err(VfsError::NotADirectory(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_local_vfs_symlinked_dir_is_reparse_point() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link")).unwrap();

        let vfs = LocalVfs::new();
        let entries = vfs.read_dir(temp.path()).unwrap();
        let link = entries.iter().find(|e| e.name == "link").unwrap();
        assert!(link.is_dir);
        assert!(link.attributes.is_reparse_point());

        let real = entries.iter().find(|e| e.name == "real").unwrap();
        assert!(!real.attributes.is_reparse_point());
    }

    #[cfg(windows)]
    #[test]
    fn test_local_vfs_link_attributes_carry_reparse_bit() {
        let temp = TempDir::new().unwrap();
        let meta = fs::metadata(temp.path()).unwrap();
        assert!(attributes_of("dir", &meta, true).is_reparse_point());
        assert!(!attributes_of("dir", &meta, false).is_reparse_point());
    }

    #[cfg(windows)]
    #[test]
    fn test_local_vfs_symlinked_dir_is_reparse_point_windows() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real")).unwrap();
        // Directory symlinks need developer mode or elevation
        if std::os::windows::fs::symlink_dir(temp.path().join("real"), temp.path().join("link")).is_err() {
            return;
        }

        let vfs = LocalVfs::new();
        let entries = vfs.read_dir(temp.path()).unwrap();
        let link = entries.iter().find(|e| e.name == "link").unwrap();
        assert!(link.is_dir);
        assert!(link.attributes.is_reparse_point());
        assert!(vfs.metadata(&temp.path().join("link")).unwrap().attributes.is_reparse_point());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_local_vfs_read_dir_keeps_raw_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let raw = OsStr::from_bytes(b"bad\xffname");
        fs::create_dir(temp.path().join(raw)).unwrap();

        let vfs = LocalVfs::new();
        let entries = vfs.read_dir(temp.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name, raw);
        assert!(vfs.read_dir(&temp.path().join(&entries[0].file_name)).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_local_vfs_hidden_and_readonly_attributes() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join(".hidden");
        fs::write(&file, b"x").unwrap();
        let mut perms = fs::metadata(&file).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&file, perms).unwrap();

        let vfs = LocalVfs::new();
        let attrs = vfs.metadata(&file).unwrap().attributes;
        assert!(attrs.contains(FileAttributes::HIDDEN));
        assert!(attrs.contains(FileAttributes::READONLY));
    }

    #[test]
    fn test_local_vfs_capabilities() {
        let vfs = LocalVfs::new();
        let caps = vfs.capabilities();
        assert!(vfs.is_writable());
        assert_eq!(caps, VfsCapabilities::full());
    }

    #[test]
    fn test_local_vfs_create_file_nested() {
        let temp = TempDir::new().unwrap();
        let vfs = LocalVfs::new();

        // Create file in nested directory that doesn't exist yet
        let target = temp.path().join("subdir/deep/file.txt");
        let mut writer = vfs.create_file(&target).unwrap();
        writer.write_all(b"nested content").unwrap();
        drop(writer);

        let content = fs::read_to_string(&target).unwrap();
        assert_eq!(content, "nested content");
    }

    #[test]
    fn test_local_vfs_copy_preserves_mtime() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("source.txt");
        fs::write(&src, b"copy me").unwrap();
        let stamp = filetime::FileTime::from_unix_time(1_577_836_800, 0);
        filetime::set_file_mtime(&src, stamp).unwrap();

        let vfs = LocalVfs::new();
        let dest = temp.path().join("out/dest.txt");
        vfs.copy_file(&src, &dest).unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "copy me");
        let copied = filetime::FileTime::from_last_modification_time(&fs::metadata(&dest).unwrap());
        assert_eq!(copied.unix_seconds(), stamp.unix_seconds());
    }

    #[test]
    fn test_local_vfs_move_and_rename() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("old.txt"), b"content").unwrap();

        let vfs = LocalVfs::new();
        vfs.rename(&temp.path().join("old.txt"), &temp.path().join("new.txt"))
            .unwrap();
        assert!(!temp.path().join("old.txt").exists());

        vfs.move_item(&temp.path().join("new.txt"), &temp.path().join("moved/new.txt"))
            .unwrap();
        assert!(temp.path().join("moved/new.txt").exists());
        assert!(!temp.path().join("new.txt").exists());
    }

    #[test]
    fn test_local_vfs_delete_file_and_tree() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("gone.txt"), b"x").unwrap();
        fs::create_dir_all(temp.path().join("tree/inner")).unwrap();
        fs::write(temp.path().join("tree/inner/f"), b"x").unwrap();

        let vfs = LocalVfs::new();
        vfs.delete(&temp.path().join("gone.txt")).unwrap();
        vfs.delete(&temp.path().join("tree")).unwrap();

        assert!(!temp.path().join("gone.txt").exists());
        assert!(!temp.path().join("tree").exists());
    }

    #[test]
    fn test_local_vfs_trash_delete_never_loses_silently() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("trash_me.txt");
        fs::write(&file, b"x").unwrap();

        let vfs = LocalVfs::new().with_trash(true);
        assert!(vfs.uses_trash());
        assert!(!LocalVfs::new().uses_trash());

        // Headless hosts may have no usable trash; the file must then survive
        match vfs.delete(&file) {
            Ok(()) => assert!(!file.exists()),
            Err(_) => assert!(file.exists()),
        }
    }

    #[test]
    fn test_local_vfs_batches_report_per_item() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), b"a").unwrap();
        fs::write(temp.path().join("b"), b"b").unwrap();

        let vfs = LocalVfs::new();
        let results = vfs.copy_batch(&[
            (temp.path().join("a"), temp.path().join("copy/a")),
            (temp.path().join("missing"), temp.path().join("copy/missing")),
            (temp.path().join("b"), temp.path().join("copy/b")),
        ]);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());

        let deleted = vfs.delete_batch(&[temp.path().join("a"), temp.path().join("b")]);
        assert!(deleted.iter().all(Result::is_ok));
        assert!(!temp.path().join("a").exists());
    }

    #[test]
    fn test_local_vfs_set_mtime() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("test.txt");
        fs::write(&file, b"content").unwrap();

        let vfs = LocalVfs::new();

        // 2020-01-01 00:00:00 UTC
        let target_time = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1577836800);
        vfs.set_mtime(&file, target_time).unwrap();

        let mtime = fs::metadata(&file).unwrap().modified().unwrap();
        let diff = mtime.duration_since(target_time).unwrap_or_default();
        assert!(diff.as_secs() < 2);
    }

    #[test]
    fn test_local_vfs_open_and_read() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("readable.txt"), b"read me").unwrap();

        let vfs = LocalVfs::new();
        let mut reader = vfs.open_file(&temp.path().join("readable.txt")).unwrap();

        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "read me");
    }
}
