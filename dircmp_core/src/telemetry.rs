//! Scan progress counters and throttled progress notifications.
//!
//! Counters are plain atomics so folder computations never touch the session
//! lock to report progress. The callback slot has its own small mutex that is
//! only held long enough to clone the handle.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Minimum spacing between two `Progress` notifications
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(80);

/// Snapshot of the scan counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub folders_scanned: u64,
    pub entries_scanned: u64,
    pub active_scans: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// First folder computation started while none was running
    Started,
    Progress,
    /// Last running folder computation finished
    Finished,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub stats: ScanStats,
}

pub type ProgressCallback = Arc<dyn Fn(&ScanProgress) + Send + Sync>;

pub(crate) struct ScanTelemetry {
    folders_scanned: AtomicU64,
    entries_scanned: AtomicU64,
    active_scans: AtomicUsize,
    epoch: Instant,
    last_notify_ms: AtomicU64,
    callback: Mutex<Option<ProgressCallback>>,
}

impl ScanTelemetry {
    pub(crate) fn new() -> Self {
        Self {
            folders_scanned: AtomicU64::new(0),
            entries_scanned: AtomicU64::new(0),
            active_scans: AtomicUsize::new(0),
            epoch: Instant::now(),
            last_notify_ms: AtomicU64::new(0),
            callback: Mutex::new(None),
        }
    }

    pub(crate) fn set_callback(&self, callback: Option<ProgressCallback>) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = callback;
    }

    pub(crate) fn stats(&self) -> ScanStats {
        ScanStats {
            folders_scanned: self.folders_scanned.load(Ordering::Relaxed),
            entries_scanned: self.entries_scanned.load(Ordering::Relaxed),
            active_scans: self.active_scans.load(Ordering::Relaxed),
        }
    }

    /// Marks one folder computation as running until the guard drops
    pub(crate) fn begin_scan(&self) -> ScanGuard<'_> {
        if self.active_scans.fetch_add(1, Ordering::AcqRel) == 0 {
            self.last_notify_ms.store(self.elapsed_ms(), Ordering::Relaxed);
            self.notify(ScanPhase::Started);
        }
        ScanGuard { telemetry: self }
    }

    pub(crate) fn record_folder(&self, entries: usize) {
        self.folders_scanned.fetch_add(1, Ordering::Relaxed);
        self.entries_scanned.fetch_add(entries as u64, Ordering::Relaxed);

        let now = self.elapsed_ms();
        let last = self.last_notify_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) >= PROGRESS_INTERVAL.as_millis() as u64
            && self
                .last_notify_ms
                .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            self.notify(ScanPhase::Progress);
        }
    }

    fn end_scan(&self) {
        if self.active_scans.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify(ScanPhase::Finished);
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn notify(&self, phase: ScanPhase) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(&ScanProgress {
                phase,
                stats: self.stats(),
            });
        }
    }
}

pub(crate) struct ScanGuard<'a> {
    telemetry: &'a ScanTelemetry,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.telemetry.end_scan();
    }
}
