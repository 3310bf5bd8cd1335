//! Wall-time and memory usage tracking for task execution.

use std::fmt;
use std::time::Instant;

/// Peak resident set size of the current process, in KiB.
/// Returns 0 on platforms without a getrusage equivalent.
#[cfg(target_os = "macos")]
fn peak_rss_kb() -> i64 {
    // Darwin reports ru_maxrss in bytes, not KiB.
    getrusage_maxrss() / 1024
}

#[cfg(all(unix, not(target_os = "macos")))]
fn peak_rss_kb() -> i64 {
    getrusage_maxrss()
}

#[cfg(unix)]
fn getrusage_maxrss() -> i64 {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc == 0 {
        usage.ru_maxrss as i64
    } else {
        0
    }
}

#[cfg(not(unix))]
fn peak_rss_kb() -> i64 {
    0
}

/// Tracks the time and memory used between [LoadTracker::start] and
/// [LoadTracker::finish].
pub struct LoadTracker {
    start_time: Instant,
    start_rss_kb: i64,
}

impl LoadTracker {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
            start_rss_kb: peak_rss_kb(),
        }
    }

    pub fn finish(self) -> LoadReport {
        LoadReport {
            elapsed_s: self.start_time.elapsed().as_secs_f64(),
            start_rss_kb: self.start_rss_kb,
            end_rss_kb: peak_rss_kb(),
        }
    }
}

pub struct LoadReport {
    pub elapsed_s: f64,
    pub start_rss_kb: i64,
    pub end_rss_kb: i64,
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "elapsed: {:.3} s; memory usage: {} MiB -> {} MiB (diff {} KiB)",
            self.elapsed_s,
            self.start_rss_kb / 1024,
            self.end_rss_kb / 1024,
            self.end_rss_kb - self.start_rss_kb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_reports_elapsed_time() {
        let tracker = LoadTracker::start();
        let report = tracker.finish();
        assert!(report.elapsed_s >= 0.0);
        assert!(report.end_rss_kb >= report.start_rss_kb);
    }
}
