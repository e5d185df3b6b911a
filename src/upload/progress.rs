use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{UploadError, UploadSummary};

/// Shared per-batch counters. All workers report here; the mutex keeps
/// the counters and the error list consistent. Also renders the one-line
/// per-file markers as outcomes arrive.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<Mutex<UploadSummary>>,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(UploadSummary {
                total,
                ..UploadSummary::default()
            })),
        }
    }

    pub fn record_uploaded(&self, path: &Path, file_id: i64, encrypted_bytes: u64) {
        {
            let mut summary = self.inner.lock().unwrap();
            summary.completed += 1;
            summary.uploaded_bytes += encrypted_bytes;
        }
        println!("  uploaded      {} (file {})", path.display(), file_id);
    }

    pub fn record_skipped(&self, path: &Path, file_id: i64) {
        {
            let mut summary = self.inner.lock().unwrap();
            summary.skipped += 1;
        }
        println!("  skipped       {} (already uploaded as file {})", path.display(), file_id);
    }

    pub fn record_failed(&self, path: &Path, error: &UploadError) {
        {
            let mut summary = self.inner.lock().unwrap();
            summary.failed += 1;
            summary.errors.push(format!("{}: {}", path.display(), error));
        }
        println!("  failed        {} ({})", path.display(), error);
    }

    /// Snapshot of the counters so far.
    pub fn summary(&self) -> UploadSummary {
        self.inner.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_counters_accumulate() {
        let tracker = ProgressTracker::new(3);
        let path = PathBuf::from("/p/a.jpg");

        tracker.record_uploaded(&path, 1, 100);
        tracker.record_skipped(&path, 2);
        tracker.record_failed(&path, &UploadError::Cancelled);

        let summary = tracker.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.uploaded_bytes, 100);
        assert_eq!(summary.errors.len(), 1);
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn test_concurrent_updates() {
        let tracker = ProgressTracker::new(64);
        let mut handles = Vec::new();
        for i in 0..64 {
            let tracker = tracker.clone();
            handles.push(std::thread::spawn(move || {
                tracker.record_uploaded(Path::new("/p/x.jpg"), i, 10);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = tracker.summary();
        assert_eq!(summary.completed, 64);
        assert_eq!(summary.uploaded_bytes, 640);
    }
}
