use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Which direction a job runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Encrypt,
    Decrypt,
}

/// Monotonically non-decreasing progress for one job.
///
/// `bytes_total` is the source size; for decryption that is ciphertext
/// consumed, for encryption plaintext read. Never rewound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub bytes_processed: u64,
    pub bytes_total: u64,
}

impl Progress {
    pub fn new(bytes_total: u64) -> Self {
        Self {
            bytes_processed: 0,
            bytes_total,
        }
    }

    /// Advance by `n` bytes. Progress only moves forward.
    pub fn advance(&mut self, n: u64) {
        self.bytes_processed = self.bytes_processed.saturating_add(n);
    }

    pub fn ratio(&self) -> f64 {
        if self.bytes_total == 0 {
            1.0
        } else {
            self.bytes_processed as f64 / self.bytes_total as f64
        }
    }
}

/// Progress callback type.
pub type ProgressFn = Box<dyn Fn(Progress) + Send + Sync>;

/// Cooperative cancellation flag, checked once per chunk loop iteration.
///
/// Cancellation is never preemptive: a chunk either fully completes or is
/// never started.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_monotonic() {
        let mut p = Progress::new(100);
        p.advance(30);
        p.advance(30);
        assert_eq!(p.bytes_processed, 60);
        assert!((p.ratio() - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_empty_total() {
        let p = Progress::new(0);
        assert!((p.ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
