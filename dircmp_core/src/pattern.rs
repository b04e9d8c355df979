//! Case-insensitive wildcard matching for ignore lists.
//!
//! Patterns use `*` (any run, including empty) and `?` (exactly one
//! character); a list is a semicolon-delimited string such as `*.log; ~*`.

use dircmp_common::{fold_case, CompareSettings};

/// Split a semicolon-delimited pattern string into trimmed, non-empty tokens
pub fn split_patterns(text: &str) -> Vec<String> {
    text.split(';')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Match `name` against a single wildcard pattern, ignoring case
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = fold_case(pattern).chars().collect();
    let name: Vec<char> = fold_case(name).chars().collect();
    match_folded(&pattern, &name)
}

// Single left-to-right scan; on mismatch, resume just after the most recent
// `*` and let it swallow one more character.
fn match_folded(pattern: &[char], name: &[char]) -> bool {
    let (mut p, mut n) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_match = 0;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_match = n;
            p += 1;
        } else if let Some(star_pos) = star {
            p = star_pos + 1;
            star_match += 1;
            n = star_match;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// A parsed pattern list with every token folded once up front
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    patterns: Vec<Vec<char>>,
}

impl PatternList {
    pub fn parse(text: &str) -> Self {
        let patterns = split_patterns(text)
            .iter()
            .map(|token| fold_case(token).chars().collect())
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True if `name` matches any pattern in the list
    pub fn matches(&self, name: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let name: Vec<char> = fold_case(name).chars().collect();
        self.patterns.iter().any(|pattern| match_folded(pattern, &name))
    }
}

/// File and directory ignore lists resolved from the active settings
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    files: PatternList,
    dirs: PatternList,
}

impl IgnoreRules {
    pub fn from_settings(settings: &CompareSettings) -> Self {
        let files = if settings.ignore_files_enabled {
            PatternList::parse(&settings.ignore_files)
        } else {
            PatternList::default()
        };
        let dirs = if settings.ignore_dirs_enabled {
            PatternList::parse(&settings.ignore_dirs)
        } else {
            PatternList::default()
        };
        Self { files, dirs }
    }

    pub fn is_ignored(&self, name: &str, is_dir: bool) -> bool {
        if is_dir {
            self.dirs.matches(name)
        } else {
            self.files.matches(name)
        }
    }
}
