//! Comparison session: roots, settings, versioned decision cache.
//!
//! All mutable state sits behind one mutex that is only held for map
//! lookups and updates. Directory enumeration, content reads and recursion
//! into subfolders always run with the lock released; a finished decision is
//! committed only if the structural version it was computed under is still
//! current.

use crate::engine::{classify_entry, merge_listings, FolderContext};
use crate::pattern::IgnoreRules;
use crate::telemetry::{ProgressCallback, ScanStats, ScanTelemetry};
use dircmp_common::{
    fold_case, CaseKey, CompareSettings, FileEntry, FolderDecision, FolderFailure, FolderStatus,
    ItemDecision, SessionId, Side, Vfs,
};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

struct SessionState {
    left_root: PathBuf,
    right_root: PathBuf,
    settings: Arc<CompareSettings>,
    ignore: Arc<IgnoreRules>,
    structural_version: u64,
    ui_version: u64,
    cache: HashMap<CaseKey, Arc<FolderDecision>>,
}

impl SessionState {
    fn bump_all(&mut self) {
        self.structural_version += 1;
        self.ui_version += 1;
        self.cache.clear();
    }

    fn root(&self, side: Side) -> &Path {
        match side {
            Side::Left => &self.left_root,
            Side::Right => &self.right_root,
        }
    }
}

/// Everything a folder computation needs, captured under the lock
struct Snapshot {
    version: u64,
    settings: Arc<CompareSettings>,
    ignore: Arc<IgnoreRules>,
    left_root: PathBuf,
    right_root: PathBuf,
}

/// Entry counts over a decision tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderSummary {
    pub identical: usize,
    pub different: usize,
    pub left_only: usize,
    pub right_only: usize,
    pub failed_folders: usize,
}

impl FolderSummary {
    pub fn total(&self) -> usize {
        self.identical + self.different + self.left_only + self.right_only
    }

    pub fn has_differences(&self) -> bool {
        self.different + self.left_only + self.right_only > 0
    }

    pub fn record(&mut self, item: &ItemDecision) {
        match (item.exists_left(), item.exists_right()) {
            (true, false) => self.left_only += 1,
            (false, true) => self.right_only += 1,
            _ if item.is_different => self.different += 1,
            _ => self.identical += 1,
        }
    }

    pub fn record_folder(&mut self, decision: &FolderDecision) {
        if decision.status.is_success() {
            decision.items.values().for_each(|item| self.record(item));
        } else {
            self.failed_folders += 1;
        }
    }
}

/// A live comparison between two directory trees
pub struct ComparisonSession {
    id: SessionId,
    vfs: Arc<dyn Vfs>,
    state: Mutex<SessionState>,
    telemetry: ScanTelemetry,
}

impl ComparisonSession {
    pub fn new(
        vfs: Arc<dyn Vfs>,
        left_root: impl Into<PathBuf>,
        right_root: impl Into<PathBuf>,
        settings: CompareSettings,
    ) -> Self {
        let id = SessionId::new();
        let left_root = left_root.into();
        let right_root = right_root.into();
        info!(
            "Session {} comparing {} with {} on {}",
            id,
            left_root.display(),
            right_root.display(),
            vfs.instance_id()
        );

        Self {
            id,
            vfs,
            state: Mutex::new(SessionState {
                left_root,
                right_root,
                ignore: Arc::new(IgnoreRules::from_settings(&settings)),
                settings: Arc::new(settings),
                structural_version: 1,
                ui_version: 1,
                cache: HashMap::new(),
            }),
            telemetry: ScanTelemetry::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The real filesystem both sides are read from
    pub fn vfs(&self) -> &Arc<dyn Vfs> {
        &self.vfs
    }

    pub fn roots(&self) -> (PathBuf, PathBuf) {
        let state = self.lock_state();
        (state.left_root.clone(), state.right_root.clone())
    }

    pub fn root(&self, side: Side) -> PathBuf {
        self.lock_state().root(side).to_path_buf()
    }

    pub fn settings(&self) -> CompareSettings {
        self.lock_state().settings.as_ref().clone()
    }

    pub fn show_identical(&self) -> bool {
        self.lock_state().settings.show_identical
    }

    pub fn structural_version(&self) -> u64 {
        self.lock_state().structural_version
    }

    pub fn ui_version(&self) -> u64 {
        self.lock_state().ui_version
    }

    pub fn cached_folder_count(&self) -> usize {
        self.lock_state().cache.len()
    }

    /// Whether a decision for `relative` is cached and valid for the current version
    pub fn is_cached(&self, relative: &Path) -> bool {
        let state = self.lock_state();
        state
            .cache
            .get(&folder_key(relative))
            .is_some_and(|d| d.version == state.structural_version)
    }

    /// Replace both roots; every cached decision is dropped
    pub fn set_roots(&self, left_root: impl Into<PathBuf>, right_root: impl Into<PathBuf>) {
        let mut state = self.lock_state();
        state.left_root = left_root.into();
        state.right_root = right_root.into();
        state.bump_all();
        info!(
            "Session {} roots changed to {} / {} (version {})",
            self.id,
            state.left_root.display(),
            state.right_root.display(),
            state.structural_version
        );
    }

    /// Apply new settings. Only diff-affecting changes invalidate the cache.
    pub fn set_settings(&self, settings: CompareSettings) {
        let mut state = self.lock_state();
        if settings.affects_comparison(&state.settings) {
            state.ignore = Arc::new(IgnoreRules::from_settings(&settings));
            state.settings = Arc::new(settings);
            state.bump_all();
            info!(
                "Session {} comparison settings changed (version {})",
                self.id, state.structural_version
            );
        } else {
            state.settings = Arc::new(settings);
            debug!("Session {} cosmetic settings changed", self.id);
        }
    }

    /// Drop every cached decision
    pub fn invalidate_all(&self) {
        let mut state = self.lock_state();
        state.bump_all();
        info!(
            "Session {} fully invalidated (version {})",
            self.id, state.structural_version
        );
    }

    /// Forget decisions affected by a change at `path`.
    ///
    /// The path is resolved against each root independently. With
    /// `include_subtree` the folder itself and everything below it is
    /// dropped; every ancestor folder up to the root is always dropped.
    /// Only the UI version moves, so decisions already handed out stay valid.
    pub fn invalidate_path(&self, path: &Path, include_subtree: bool) {
        let mut state = self.lock_state();
        let mut removed = 0usize;

        for side in [Side::Left, Side::Right] {
            let Some(relative) = strip_root(state.root(side), path) else {
                continue;
            };

            if include_subtree {
                let prefix = folder_key(&relative);
                let before = state.cache.len();
                state
                    .cache
                    .retain(|key, _| !is_same_or_descendant(key.as_str(), prefix.as_str()));
                removed += before - state.cache.len();
            }

            let mut ancestor = relative.parent();
            while let Some(folder) = ancestor {
                if state.cache.remove(&folder_key(folder)).is_some() {
                    removed += 1;
                }
                ancestor = folder.parent();
            }
        }

        state.ui_version += 1;
        debug!(
            "Session {} invalidated {} (subtree: {}), dropped {} cached folders",
            self.id,
            path.display(),
            include_subtree,
            removed
        );
    }

    /// Path of `absolute` relative to the root of `side`, compared case-insensitively
    pub fn relative_path(&self, side: Side, absolute: &Path) -> Option<PathBuf> {
        let state = self.lock_state();
        strip_root(state.root(side), absolute)
    }

    pub fn absolute_path(&self, side: Side, relative: &Path) -> PathBuf {
        self.lock_state().root(side).join(relative)
    }

    pub fn scan_stats(&self) -> ScanStats {
        self.telemetry.stats()
    }

    pub fn set_progress_callback(&self, callback: Option<ProgressCallback>) {
        self.telemetry.set_callback(callback);
    }

    /// Decision for the folder at `relative` (empty for the roots), computed
    /// on demand and memoized for the current structural version.
    ///
    /// A failure to read the folder is returned as the decision's status.
    pub fn get_or_compute(&self, relative: &Path) -> Arc<FolderDecision> {
        self.resolve_folder(relative, relative, relative)
    }

    fn resolve_folder(&self, key_path: &Path, left_rel: &Path, right_rel: &Path) -> Arc<FolderDecision> {
        let key = folder_key(key_path);

        let snapshot = {
            let state = self.lock_state();
            if let Some(cached) = state.cache.get(&key) {
                if cached.version == state.structural_version {
                    debug!("Cache hit for '{}'", key.as_str());
                    return Arc::clone(cached);
                }
            }
            Snapshot {
                version: state.structural_version,
                settings: Arc::clone(&state.settings),
                ignore: Arc::clone(&state.ignore),
                left_root: state.left_root.clone(),
                right_root: state.right_root.clone(),
            }
        };

        let decision = {
            let _scan = self.telemetry.begin_scan();
            Arc::new(self.compute_folder(&snapshot, key_path, left_rel, right_rel))
        };

        let mut state = self.lock_state();
        if state.structural_version == snapshot.version {
            state.cache.insert(key, Arc::clone(&decision));
        } else {
            debug!(
                "Discarding decision for '{}' computed under stale version {} (now {})",
                key.as_str(),
                snapshot.version,
                state.structural_version
            );
        }
        decision
    }

    fn compute_folder(
        &self,
        snapshot: &Snapshot,
        key_path: &Path,
        left_rel: &Path,
        right_rel: &Path,
    ) -> FolderDecision {
        let left_dir = snapshot.left_root.join(left_rel);
        let right_dir = snapshot.right_root.join(right_rel);
        debug!(
            "Computing folder '{}' ({} vs {})",
            key_path.display(),
            left_dir.display(),
            right_dir.display()
        );

        let left = match self.list_side(&left_dir, &snapshot.ignore) {
            Ok(entries) => entries,
            Err(failure) => return FolderDecision::failed(snapshot.version, failure),
        };
        let right = match self.list_side(&right_dir, &snapshot.ignore) {
            Ok(entries) => entries,
            Err(failure) => return FolderDecision::failed(snapshot.version, failure),
        };
        self.telemetry.record_folder(left.len() + right.len());

        let ctx = FolderContext {
            settings: &snapshot.settings,
            vfs: self.vfs.as_ref(),
            left_dir: &left_dir,
            right_dir: &right_dir,
        };

        let merged = merge_listings(left, right);
        let mut items = HashMap::with_capacity(merged.len());
        for (name_key, pair) in merged {
            let classified = classify_entry(&ctx, pair, |left_name, right_name| {
                self.resolve_folder(
                    &key_path.join(left_name),
                    &left_rel.join(left_name),
                    &right_rel.join(right_name),
                )
            });
            match classified {
                Ok(Some(item)) => {
                    items.insert(name_key, item);
                }
                Ok(None) => {}
                Err(failure) => {
                    debug!(
                        "Folder '{}' inherits failure from a subfolder: {}",
                        key_path.display(),
                        failure
                    );
                    return FolderDecision::failed(snapshot.version, failure);
                }
            }
        }

        FolderDecision {
            version: snapshot.version,
            status: FolderStatus::Success,
            items,
        }
    }

    /// List one side, dropping dot entries and ignored names. A folder that
    /// does not exist lists as empty.
    fn list_side(&self, dir: &Path, ignore: &IgnoreRules) -> Result<Vec<FileEntry>, FolderFailure> {
        match self.vfs.read_dir(dir) {
            Ok(entries) => Ok(entries
                .into_iter()
                .filter(|e| e.name != "." && e.name != "..")
                .filter(|e| !ignore.is_ignored(&e.name, e.is_dir))
                .collect()),
            Err(e) if e.is_not_found() => {
                debug!("{} does not exist, treating as empty", dir.display());
                Ok(Vec::new())
            }
            Err(e) => {
                warn!("Failed to enumerate {}: {}", dir.display(), e);
                Err(FolderFailure::from(&e))
            }
        }
    }

    /// Visit the folder at `relative` and every folder below it that
    /// subfolder comparison enters, each parent before its children.
    ///
    /// Only directories present on both sides and not reparse points are
    /// entered, and only when subfolder comparison is on. Failed folders are
    /// visited but never descended into. Children are resolved with each
    /// side's own on-disk name.
    pub fn walk<F>(&self, relative: &Path, mut visit: F)
    where
        F: FnMut(&Path, &FolderDecision),
    {
        let recurse = self.lock_state().settings.compare_subdirs;
        let start = relative.to_path_buf();
        let mut pending = vec![(start.clone(), start.clone(), start)];

        while let Some((key_path, left_rel, right_rel)) = pending.pop() {
            let decision = self.resolve_folder(&key_path, &left_rel, &right_rel);
            visit(&key_path, &decision);
            if !recurse || !decision.status.is_success() {
                continue;
            }
            for item in decision.items.values().filter(|item| item.is_followable_dir()) {
                if let (Some(left), Some(right)) = (&item.left, &item.right) {
                    pending.push((
                        key_path.join(&left.file_name),
                        left_rel.join(&left.file_name),
                        right_rel.join(&right.file_name),
                    ));
                }
            }
        }
    }

    /// Count entries below `relative` over the folders [`walk`](Self::walk) visits
    pub fn summarize(&self, relative: &Path) -> FolderSummary {
        let mut summary = FolderSummary::default();
        self.walk(relative, |_, decision| summary.record_folder(decision));
        summary
    }
}

/// Cache key for a relative folder: normal components joined with `/`, folded
pub(crate) fn folder_key(relative: &Path) -> CaseKey {
    let joined = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    CaseKey::new(&joined)
}

fn is_same_or_descendant(key: &str, folder: &str) -> bool {
    folder.is_empty()
        || key == folder
        || (key.len() > folder.len() && key.starts_with(folder) && key.as_bytes()[folder.len()] == b'/')
}

/// Strip `root` from `path` component by component, ignoring case
fn strip_root(root: &Path, path: &Path) -> Option<PathBuf> {
    let mut remaining = path.components().filter(|c| !matches!(c, Component::CurDir));
    for root_part in root.components().filter(|c| !matches!(c, Component::CurDir)) {
        let part = remaining.next()?;
        if fold_case(&part.as_os_str().to_string_lossy())
            != fold_case(&root_part.as_os_str().to_string_lossy())
        {
            return None;
        }
    }
    Some(remaining.collect())
}
