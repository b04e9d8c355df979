pub mod content;
mod engine;
pub mod pattern;
pub mod session;
pub mod telemetry;
pub mod vfs;

#[cfg(test)]
mod test_support;

pub use content::{ContentComparator, CHUNK_SIZE};
pub use pattern::{IgnoreRules, PatternList};
pub use session::{ComparisonSession, FolderSummary};
pub use telemetry::{ProgressCallback, ScanPhase, ScanProgress, ScanStats};
pub use vfs::{LocalVfs, OverlayVfs};
