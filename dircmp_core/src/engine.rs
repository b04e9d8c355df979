//! Entry merging and classification for one folder pair.
//!
//! The session drives enumeration and caching; this module turns two
//! listings into item decisions. Subfolder decisions are obtained through a
//! callback so recursion goes back through the session's memoized lookup.

use crate::content::ContentComparator;
use dircmp_common::{
    CaseKey, CompareSettings, DiffReasons, EntrySnapshot, FileEntry, FolderDecision,
    FolderFailure, FolderStatus, ItemDecision, Vfs,
};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Both sides of one merged entry
#[derive(Debug, Default)]
pub(crate) struct EntryPair {
    pub left: Option<FileEntry>,
    pub right: Option<FileEntry>,
}

/// Merge two listings by case-insensitive name. The left side is seeded
/// first, so its casing is used for the display name.
pub(crate) fn merge_listings(left: Vec<FileEntry>, right: Vec<FileEntry>) -> HashMap<CaseKey, EntryPair> {
    let mut merged: HashMap<CaseKey, EntryPair> = HashMap::with_capacity(left.len().max(right.len()));

    for entry in left {
        let slot = merged.entry(CaseKey::new(&entry.name)).or_default();
        if slot.left.is_none() {
            slot.left = Some(entry);
        } else {
            debug!("Ignoring case-duplicate left entry {}", entry.name);
        }
    }
    for entry in right {
        let slot = merged.entry(CaseKey::new(&entry.name)).or_default();
        if slot.right.is_none() {
            slot.right = Some(entry);
        } else {
            debug!("Ignoring case-duplicate right entry {}", entry.name);
        }
    }

    merged
}

/// Everything classification needs to know about the folder pair
pub(crate) struct FolderContext<'a> {
    pub settings: &'a CompareSettings,
    pub vfs: &'a dyn Vfs,
    pub left_dir: &'a Path,
    pub right_dir: &'a Path,
}

/// Classify one merged entry.
///
/// `subfolder` is called with the raw on-disk left and right names when the
/// entry is a directory pair that must be compared recursively. A failed
/// subfolder decision aborts the whole folder.
pub(crate) fn classify_entry<F>(
    ctx: &FolderContext<'_>,
    pair: EntryPair,
    subfolder: F,
) -> Result<Option<ItemDecision>, FolderFailure>
where
    F: FnOnce(&OsStr, &OsStr) -> Arc<FolderDecision>,
{
    let settings = ctx.settings;

    let item = match (pair.left, pair.right) {
        (None, None) => return Ok(None),
        (Some(left), None) => {
            let select = !left.is_dir || settings.select_subdirs_only_in_one_pane;
            ItemDecision {
                name: left.name.clone(),
                left: Some(left.into()),
                right: None,
                is_different: true,
                select_left: select,
                select_right: false,
                reasons: DiffReasons::ONLY_IN_LEFT,
            }
        }
        (None, Some(right)) => {
            let select = !right.is_dir || settings.select_subdirs_only_in_one_pane;
            ItemDecision {
                name: right.name.clone(),
                left: None,
                right: Some(right.into()),
                is_different: true,
                select_left: false,
                select_right: select,
                reasons: DiffReasons::ONLY_IN_RIGHT,
            }
        }
        (Some(left), Some(right)) if left.is_dir != right.is_dir => ItemDecision {
            name: left.name.clone(),
            left: Some(left.into()),
            right: Some(right.into()),
            is_different: true,
            select_left: true,
            select_right: true,
            reasons: DiffReasons::TYPE_MISMATCH,
        },
        (Some(left), Some(right)) if left.is_dir => classify_dirs(ctx, left, right, subfolder)?,
        (Some(left), Some(right)) => classify_files(ctx, left, right),
    };

    Ok(Some(item))
}

fn classify_dirs<F>(
    ctx: &FolderContext<'_>,
    left: FileEntry,
    right: FileEntry,
    subfolder: F,
) -> Result<ItemDecision, FolderFailure>
where
    F: FnOnce(&OsStr, &OsStr) -> Arc<FolderDecision>,
{
    let settings = ctx.settings;
    let mut reasons = DiffReasons::empty();

    if settings.compare_subdir_attributes && left.attributes != right.attributes {
        reasons.insert(DiffReasons::SUBDIR_ATTRIBUTES);
    }

    let follow = !left.attributes.is_reparse_point() && !right.attributes.is_reparse_point();
    if settings.compare_subdirs && follow {
        let child = subfolder(&left.file_name, &right.file_name);
        if let FolderStatus::Failed(failure) = &child.status {
            return Err(failure.clone());
        }
        if child.has_differences() {
            reasons.insert(DiffReasons::SUBDIR_CONTENT);
        }
    } else if settings.compare_subdirs {
        debug!("Not following reparse point {}", left.name);
    }

    let is_different = !reasons.is_empty();
    Ok(ItemDecision {
        name: left.name.clone(),
        left: Some(left.into()),
        right: Some(right.into()),
        is_different,
        select_left: is_different,
        select_right: is_different,
        reasons,
    })
}

fn classify_files(ctx: &FolderContext<'_>, left: FileEntry, right: FileEntry) -> ItemDecision {
    let settings = ctx.settings;
    let mut reasons = DiffReasons::empty();
    let (mut select_left, mut select_right) = (false, false);

    if settings.compare_size && left.size != right.size {
        reasons.insert(DiffReasons::SIZE);
        if left.size > right.size {
            select_left = true;
        } else {
            select_right = true;
        }
    }

    if settings.compare_time && left.modified != right.modified {
        reasons.insert(DiffReasons::TIME);
        if left.modified > right.modified {
            select_left = true;
        } else {
            select_right = true;
        }
    }

    if settings.compare_attributes && left.attributes != right.attributes {
        reasons.insert(DiffReasons::ATTRIBUTES);
        select_left = true;
        select_right = true;
    }

    if settings.compare_content && content_differs(ctx, &left, &right) {
        reasons.insert(DiffReasons::CONTENT);
        select_left = true;
        select_right = true;
    }

    ItemDecision {
        name: left.name.clone(),
        is_different: !reasons.is_empty(),
        left: Some(EntrySnapshot::from(left)),
        right: Some(EntrySnapshot::from(right)),
        select_left,
        select_right,
        reasons,
    }
}

fn content_differs(ctx: &FolderContext<'_>, left: &FileEntry, right: &FileEntry) -> bool {
    if left.size != right.size {
        return true;
    }

    let left_path = ctx.left_dir.join(&left.file_name);
    let right_path = ctx.right_dir.join(&right.file_name);
    match ContentComparator::new(ctx.vfs).files_equal(&left_path, &right_path) {
        Ok(equal) => !equal,
        Err(e) => {
            warn!(
                "Treating {} as different, content read failed: {}",
                left_path.display(),
                e
            );
            true
        }
    }
}
