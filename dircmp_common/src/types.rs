use crate::FolderFailure;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::ops::BitOr;
use std::time::SystemTime;
use uuid::Uuid;

/// One entry returned by a directory listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// UTF-8 form of the name, used for matching and display
    pub name: String,
    /// Exact on-disk name; every child path is built from this one
    pub file_name: OsString,
    pub size: u64,
    pub modified: SystemTime,
    pub is_dir: bool,
    pub attributes: FileAttributes,
}

impl FileEntry {
    /// Entry whose display name is derived from the raw on-disk name
    pub fn new(
        file_name: impl Into<OsString>,
        size: u64,
        modified: SystemTime,
        is_dir: bool,
        attributes: FileAttributes,
    ) -> Self {
        let file_name = file_name.into();
        Self {
            name: file_name.to_string_lossy().into_owned(),
            file_name,
            size,
            modified,
            is_dir,
            attributes,
        }
    }
}

/// Metadata for a single file or directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size: u64,
    pub modified: SystemTime,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub attributes: FileAttributes,
}

/// Windows-style attribute word. On platforms without native attributes the
/// local filesystem synthesizes the subset it can observe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileAttributes(pub u32);

impl FileAttributes {
    pub const READONLY: FileAttributes = FileAttributes(0x0001);
    pub const HIDDEN: FileAttributes = FileAttributes(0x0002);
    pub const SYSTEM: FileAttributes = FileAttributes(0x0004);
    pub const DIRECTORY: FileAttributes = FileAttributes(0x0010);
    pub const ARCHIVE: FileAttributes = FileAttributes(0x0020);
    pub const REPARSE_POINT: FileAttributes = FileAttributes(0x0400);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: FileAttributes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FileAttributes) {
        self.0 |= other.0;
    }

    /// Junctions and symlinks; never followed when comparing subdirectories
    pub const fn is_reparse_point(self) -> bool {
        self.contains(Self::REPARSE_POINT)
    }
}

impl BitOr for FileAttributes {
    type Output = FileAttributes;

    fn bitor(self, rhs: FileAttributes) -> FileAttributes {
        FileAttributes(self.0 | rhs.0)
    }
}

/// Why an entry was classified as different
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiffReasons(u16);

impl DiffReasons {
    pub const ONLY_IN_LEFT: DiffReasons = DiffReasons(1 << 0);
    pub const ONLY_IN_RIGHT: DiffReasons = DiffReasons(1 << 1);
    pub const TYPE_MISMATCH: DiffReasons = DiffReasons(1 << 2);
    pub const SIZE: DiffReasons = DiffReasons(1 << 3);
    pub const TIME: DiffReasons = DiffReasons(1 << 4);
    pub const ATTRIBUTES: DiffReasons = DiffReasons(1 << 5);
    pub const CONTENT: DiffReasons = DiffReasons(1 << 6);
    pub const SUBDIR_ATTRIBUTES: DiffReasons = DiffReasons(1 << 7);
    pub const SUBDIR_CONTENT: DiffReasons = DiffReasons(1 << 8);

    const LABELS: [(DiffReasons, &'static str); 9] = [
        (Self::ONLY_IN_LEFT, "only-in-left"),
        (Self::ONLY_IN_RIGHT, "only-in-right"),
        (Self::TYPE_MISMATCH, "type"),
        (Self::SIZE, "size"),
        (Self::TIME, "time"),
        (Self::ATTRIBUTES, "attributes"),
        (Self::CONTENT, "content"),
        (Self::SUBDIR_ATTRIBUTES, "subdir-attributes"),
        (Self::SUBDIR_CONTENT, "subdir-content"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: DiffReasons) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: DiffReasons) {
        self.0 |= other.0;
    }

    /// Human-readable names of the set reasons, in bit order
    pub fn labels(self) -> Vec<&'static str> {
        Self::LABELS
            .iter()
            .filter(|(reason, _)| self.contains(*reason))
            .map(|(_, label)| *label)
            .collect()
    }
}

impl BitOr for DiffReasons {
    type Output = DiffReasons;

    fn bitor(self, rhs: DiffReasons) -> DiffReasons {
        DiffReasons(self.0 | rhs.0)
    }
}

impl fmt::Display for DiffReasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.labels().join(","))
    }
}

/// Which half of a comparison an operation refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Folds a name for case-insensitive ordinal comparison.
///
/// Every character with a one-to-one uppercase mapping is replaced by it;
/// characters whose uppercase form expands (e.g. `ß`) are kept as-is, which
/// matches how ordinal ignore-case comparison treats them.
pub fn fold_case(name: &str) -> String {
    name.chars()
        .map(|c| {
            let mut upper = c.to_uppercase();
            match (upper.next(), upper.next()) {
                (Some(u), None) => u,
                _ => c,
            }
        })
        .collect()
}

/// A name or relative path normalized once for case-insensitive lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseKey(String);

impl CaseKey {
    pub fn new(name: &str) -> Self {
        Self(fold_case(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CaseKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Metadata of one side of an entry, captured when the decision was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    /// Name on this side (casing may differ from the other side)
    pub name: String,
    pub file_name: OsString,
    pub is_dir: bool,
    pub size: u64,
    pub modified: SystemTime,
    pub attributes: FileAttributes,
}

impl From<FileEntry> for EntrySnapshot {
    fn from(entry: FileEntry) -> Self {
        Self {
            name: entry.name,
            file_name: entry.file_name,
            is_dir: entry.is_dir,
            size: entry.size,
            modified: entry.modified,
            attributes: entry.attributes,
        }
    }
}

/// Classification of one entry of a folder pair
#[derive(Debug, Clone)]
pub struct ItemDecision {
    /// Display name; the left casing wins when both sides have the entry
    pub name: String,
    pub left: Option<EntrySnapshot>,
    pub right: Option<EntrySnapshot>,
    pub is_different: bool,
    pub select_left: bool,
    pub select_right: bool,
    pub reasons: DiffReasons,
}

impl ItemDecision {
    pub fn exists_left(&self) -> bool {
        self.left.is_some()
    }

    pub fn exists_right(&self) -> bool {
        self.right.is_some()
    }

    pub fn side(&self, side: Side) -> Option<&EntrySnapshot> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    pub fn exists_on(&self, side: Side) -> bool {
        self.side(side).is_some()
    }

    /// True when the entry is a directory on every side where it exists
    pub fn is_dir(&self) -> bool {
        self.left.iter().chain(self.right.iter()).all(|s| s.is_dir)
    }

    /// A directory on both sides with no reparse point on either
    pub fn is_followable_dir(&self) -> bool {
        match (&self.left, &self.right) {
            (Some(l), Some(r)) => {
                l.is_dir
                    && r.is_dir
                    && !l.attributes.is_reparse_point()
                    && !r.attributes.is_reparse_point()
            }
            _ => false,
        }
    }
}

/// Outcome of enumerating a folder pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderStatus {
    Success,
    Failed(FolderFailure),
}

impl FolderStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, FolderStatus::Success)
    }

    pub fn failure(&self) -> Option<&FolderFailure> {
        match self {
            FolderStatus::Success => None,
            FolderStatus::Failed(failure) => Some(failure),
        }
    }
}

/// Classification of every entry of one folder pair.
///
/// Immutable once built; the session replaces it wholesale.
#[derive(Debug, Clone)]
pub struct FolderDecision {
    /// Structural version the decision was computed against
    pub version: u64,
    pub status: FolderStatus,
    pub items: HashMap<CaseKey, ItemDecision>,
}

impl FolderDecision {
    pub fn failed(version: u64, failure: FolderFailure) -> Self {
        Self {
            version,
            status: FolderStatus::Failed(failure),
            items: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ItemDecision> {
        self.items.get(&CaseKey::new(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(&CaseKey::new(name))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when the folder could be read and at least one entry differs
    pub fn has_differences(&self) -> bool {
        self.items.values().any(|item| item.is_different)
    }
}

/// Comparison criteria and presentation flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareSettings {
    pub compare_size: bool,
    pub compare_time: bool,
    pub compare_attributes: bool,
    pub compare_content: bool,
    /// Recurse into directories present on both sides
    pub compare_subdirs: bool,
    pub compare_subdir_attributes: bool,
    /// Select directories that exist in one pane only
    pub select_subdirs_only_in_one_pane: bool,
    pub ignore_files_enabled: bool,
    /// Semicolon-delimited wildcard patterns, e.g. `*.log;*.tmp`
    pub ignore_files: String,
    pub ignore_dirs_enabled: bool,
    pub ignore_dirs: String,
    /// Presentation only: never affects what is computed or cached
    pub show_identical: bool,
}

impl Default for CompareSettings {
    fn default() -> Self {
        Self {
            compare_size: true,
            compare_time: true,
            compare_attributes: false,
            compare_content: false,
            compare_subdirs: true,
            compare_subdir_attributes: false,
            select_subdirs_only_in_one_pane: true,
            ignore_files_enabled: false,
            ignore_files: String::new(),
            ignore_dirs_enabled: false,
            ignore_dirs: String::new(),
            show_identical: true,
        }
    }
}

impl CompareSettings {
    /// Whether switching from `other` to `self` can change any diff outcome
    pub fn affects_comparison(&self, other: &CompareSettings) -> bool {
        self.compare_size != other.compare_size
            || self.compare_time != other.compare_time
            || self.compare_attributes != other.compare_attributes
            || self.compare_content != other.compare_content
            || self.compare_subdirs != other.compare_subdirs
            || self.compare_subdir_attributes != other.compare_subdir_attributes
            || self.select_subdirs_only_in_one_pane != other.select_subdirs_only_in_one_pane
            || self.ignore_files_enabled != other.ignore_files_enabled
            || self.ignore_files != other.ignore_files
            || self.ignore_dirs_enabled != other.ignore_dirs_enabled
            || self.ignore_dirs != other.ignore_dirs
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Default comparison settings for new sessions
    #[serde(default)]
    pub settings: CompareSettings,

    /// Enable portable mode (config alongside binary)
    #[serde(default)]
    pub portable_mode: bool,
}

/// Session identifier for a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
