//! Section timing for the processing path.
//!
//! A `Profiler` is owned by whoever drives the session and handed to the
//! subsystems that want timing. Registering a section takes a lock once; after
//! that a section is an `Arc<SectionStats>` whose counters are plain atomics,
//! so timing a block never contends with other threads.
//!
//! ```text
//! let stats = profiler.section("spatialize");   // once, off the audio path
//! {
//!     let _t = stats.scope();                   // per block
//!     ...
//! }                                             // elapsed recorded on drop
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Accumulated timings for one named section.
#[derive(Debug)]
pub struct SectionStats {
    total_ns: AtomicU64,
    count: AtomicU64,
    min_ns: AtomicU64,
    max_ns: AtomicU64,
}

impl Default for SectionStats {
    fn default() -> Self {
        Self {
            total_ns: AtomicU64::new(0),
            count: AtomicU64::new(0),
            min_ns: AtomicU64::new(u64::MAX),
            max_ns: AtomicU64::new(0),
        }
    }
}

impl SectionStats {
    /// Starts timing; the elapsed time is recorded when the guard drops.
    pub fn scope(&self) -> ScopedTimer<'_> {
        ScopedTimer {
            stats: self,
            start: Instant::now(),
        }
    }

    pub fn record(&self, elapsed: Duration) {
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_ns.fetch_add(ns, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.min_ns.fetch_min(ns, Ordering::Relaxed);
        self.max_ns.fetch_max(ns, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.total_ns.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
        self.min_ns.store(u64::MAX, Ordering::Relaxed);
        self.max_ns.store(0, Ordering::Relaxed);
    }

    fn sample(&self, name: &str) -> ProfileSample {
        let count = self.count.load(Ordering::Relaxed);
        let total_ns = self.total_ns.load(Ordering::Relaxed);
        let min_ns = self.min_ns.load(Ordering::Relaxed);
        ProfileSample {
            name: name.to_owned(),
            count,
            total_ns,
            mean_ns: if count == 0 { 0 } else { total_ns / count },
            min_ns: if count == 0 { 0 } else { min_ns },
            max_ns: self.max_ns.load(Ordering::Relaxed),
        }
    }
}

/// Records the time between its creation and its drop, on every exit path.
#[must_use = "the section is timed until this guard is dropped"]
pub struct ScopedTimer<'a> {
    stats: &'a SectionStats,
    start: Instant,
}

impl ScopedTimer<'_> {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        self.stats.record(self.start.elapsed());
    }
}

/// Report row for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSample {
    pub name: String,
    pub count: u64,
    pub total_ns: u64,
    pub mean_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
}

/// Registry of named sections.
#[derive(Debug, Default)]
pub struct Profiler {
    sections: Mutex<BTreeMap<String, Arc<SectionStats>>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stats for `name`, registering it on first use.
    ///
    /// Call this during setup and keep the `Arc`; it takes the registry lock.
    pub fn section(&self, name: &str) -> Arc<SectionStats> {
        let mut sections = self.sections.lock();
        if let Some(stats) = sections.get(name) {
            return Arc::clone(stats);
        }
        let stats = Arc::new(SectionStats::default());
        sections.insert(name.to_owned(), Arc::clone(&stats));
        stats
    }

    /// Snapshot of every section, sorted by name.
    pub fn report(&self) -> Vec<ProfileSample> {
        self.sections
            .lock()
            .iter()
            .map(|(name, stats)| stats.sample(name))
            .collect()
    }

    /// Zeroes every section. Registered handles stay valid.
    pub fn reset(&self) {
        for stats in self.sections.lock().values() {
            stats.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_records_on_drop() {
        let profiler = Profiler::new();
        let stats = profiler.section("block");
        {
            let _t = stats.scope();
            std::thread::sleep(Duration::from_millis(2));
        }
        let report = profiler.report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].name, "block");
        assert_eq!(report[0].count, 1);
        assert!(report[0].min_ns >= 2_000_000);
        assert_eq!(report[0].min_ns, report[0].max_ns);
    }

    #[test]
    fn early_return_still_records() {
        fn timed(stats: &SectionStats, bail: bool) -> Option<()> {
            let _t = stats.scope();
            if bail {
                return None;
            }
            Some(())
        }

        let stats = SectionStats::default();
        timed(&stats, true);
        timed(&stats, false);
        assert_eq!(stats.count(), 2);
    }

    #[test]
    fn same_name_shares_stats() {
        let profiler = Profiler::new();
        let a = profiler.section("mix");
        let b = profiler.section("mix");
        a.record(Duration::from_nanos(100));
        b.record(Duration::from_nanos(300));

        let sample = &profiler.report()[0];
        assert_eq!(sample.count, 2);
        assert_eq!(sample.total_ns, 400);
        assert_eq!(sample.mean_ns, 200);
        assert_eq!(sample.min_ns, 100);
        assert_eq!(sample.max_ns, 300);
    }

    #[test]
    fn reset_keeps_handles_and_zeroes_counts() {
        let profiler = Profiler::new();
        let stats = profiler.section("dc");
        stats.record(Duration::from_micros(5));
        profiler.reset();

        let sample = &profiler.report()[0];
        assert_eq!(sample.count, 0);
        assert_eq!(sample.min_ns, 0);

        stats.record(Duration::from_nanos(7));
        assert_eq!(profiler.report()[0].count, 1);
    }

    #[test]
    fn report_serializes_camel_case() {
        let profiler = Profiler::new();
        profiler.section("window").record(Duration::from_nanos(10));
        let json = serde_json::to_value(profiler.report()).unwrap();
        assert_eq!(json[0]["totalNs"], 10);
        assert_eq!(json[0]["name"], "window");
    }
}
