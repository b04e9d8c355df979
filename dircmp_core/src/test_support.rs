//! In-memory filesystem for exercising the engine without touching disk.

use dircmp_common::{FileAttributes, FileEntry, FileMetadata, Vfs, VfsCapabilities, VfsError};
use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
enum Node {
    Dir { attributes: FileAttributes },
    File { data: Vec<u8>, modified: SystemTime, attributes: FileAttributes },
}

type ListHook = Box<dyn Fn(&Path) + Send + Sync>;

#[derive(Default)]
struct Faults {
    list: HashSet<PathBuf>,
    open: HashSet<PathBuf>,
}

pub(crate) struct MemoryVfs {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
    faults: Mutex<Faults>,
    list_hook: Mutex<Option<ListHook>>,
    list_count: AtomicUsize,
    open_count: AtomicUsize,
}

/// Drop `.`, trailing separators and other noise so lookups are exact
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

impl MemoryVfs {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Mutex::new(BTreeMap::new()),
            faults: Mutex::new(Faults::default()),
            list_hook: Mutex::new(None),
            list_count: AtomicUsize::new(0),
            open_count: AtomicUsize::new(0),
        }
    }

    fn add_node(&self, path: &Path, node: Node) {
        let path = normalize(path);
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        for ancestor in path.ancestors().skip(1) {
            if ancestor.file_name().is_some() {
                nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir {
                    attributes: FileAttributes::DIRECTORY,
                });
            }
        }
        nodes.insert(path, node);
    }

    pub(crate) fn add_dir(&self, path: &str) {
        self.add_node(
            Path::new(path),
            Node::Dir {
                attributes: FileAttributes::DIRECTORY,
            },
        );
    }

    pub(crate) fn add_file(&self, path: &str, data: &[u8], mtime_secs: u64) {
        self.add_node(
            Path::new(path),
            Node::File {
                data: data.to_vec(),
                modified: SystemTime::UNIX_EPOCH + Duration::from_secs(mtime_secs),
                attributes: FileAttributes::ARCHIVE,
            },
        );
    }

    pub(crate) fn mark_reparse_point(&self, path: &str) {
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(Node::Dir { attributes } | Node::File { attributes, .. }) =
            nodes.get_mut(&normalize(Path::new(path)))
        {
            attributes.insert(FileAttributes::REPARSE_POINT);
        }
    }

    /// Listing `path` fails with `PermissionDenied`
    pub(crate) fn fail_list(&self, path: &str) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .list
            .insert(normalize(Path::new(path)));
    }

    /// Opening `path` fails with `PermissionDenied`
    pub(crate) fn fail_open(&self, path: &str) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .open
            .insert(normalize(Path::new(path)));
    }

    /// Runs before every directory listing, outside any lock
    pub(crate) fn set_list_hook(&self, hook: impl Fn(&Path) + Send + Sync + 'static) {
        *self.list_hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    pub(crate) fn list_count(&self) -> usize {
        self.list_count.load(Ordering::SeqCst)
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    fn node(&self, path: &Path) -> Option<Node> {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize(path))
            .cloned()
    }

    fn is_faulty(&self, path: &Path, list: bool) -> bool {
        let faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        let set = if list { &faults.list } else { &faults.open };
        set.contains(&normalize(path))
    }
}

impl Vfs for MemoryVfs {
    fn instance_id(&self) -> &str {
        "memory"
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata, VfsError> {
        match self.node(path) {
            Some(Node::Dir { attributes }) => Ok(FileMetadata {
                size: 0,
                modified: SystemTime::UNIX_EPOCH,
                is_dir: true,
                is_symlink: attributes.is_reparse_point(),
                attributes,
            }),
            Some(Node::File {
                data,
                modified,
                attributes,
            }) => Ok(FileMetadata {
                size: data.len() as u64,
                modified,
                is_dir: false,
                is_symlink: false,
                attributes,
            }),
            None => Err(VfsError::NotFound(path.display().to_string())),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<FileEntry>, VfsError> {
        self.list_count.fetch_add(1, Ordering::SeqCst);
        {
            let hook = self.list_hook.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(hook) = hook.as_ref() {
                hook(path);
            }
        }

        if self.is_faulty(path, true) {
            return Err(VfsError::PermissionDenied(path.display().to_string()));
        }

        let dir = normalize(path);
        let nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        match nodes.get(&dir) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File { .. }) => return Err(VfsError::NotADirectory(path.display().to_string())),
            None => return Err(VfsError::NotFound(path.display().to_string())),
        }

        Ok(nodes
            .iter()
            .filter(|(child, _)| child.parent() == Some(dir.as_path()))
            .filter_map(|(child, node)| {
                let name = child.file_name()?;
                Some(match node {
                    Node::Dir { attributes } => {
                        FileEntry::new(name, 0, SystemTime::UNIX_EPOCH, true, *attributes)
                    }
                    Node::File {
                        data,
                        modified,
                        attributes,
                    } => FileEntry::new(name, data.len() as u64, *modified, false, *attributes),
                })
            })
            .collect())
    }

    fn open_file(&self, path: &Path) -> Result<Box<dyn Read + Send>, VfsError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        if self.is_faulty(path, false) {
            return Err(VfsError::PermissionDenied(path.display().to_string()));
        }
        match self.node(path) {
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data))),
            Some(Node::Dir { .. }) => Err(VfsError::NotAFile(path.display().to_string())),
            None => Err(VfsError::NotFound(path.display().to_string())),
        }
    }

    fn remove_file(&self, path: &Path) -> Result<(), VfsError> {
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        match nodes.get(&normalize(path)) {
            Some(Node::File { .. }) => {
                nodes.remove(&normalize(path));
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(VfsError::NotAFile(path.display().to_string())),
            None => Err(VfsError::NotFound(path.display().to_string())),
        }
    }

    fn copy_file(&self, src: &Path, dest: &Path) -> Result<(), VfsError> {
        match self.node(src) {
            Some(node @ Node::File { .. }) => {
                self.add_node(dest, node);
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(VfsError::NotAFile(src.display().to_string())),
            None => Err(VfsError::NotFound(src.display().to_string())),
        }
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn capabilities(&self) -> VfsCapabilities {
        VfsCapabilities {
            read: true,
            write: false,
            delete: true,
            rename: false,
            create_dir: false,
            set_mtime: false,
        }
    }
}
