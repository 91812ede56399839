use colored::Colorize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Process-wide walk counters.
///
/// `active` is the termination oracle: the seed starts at 1, every
/// submitter increments before its child becomes reachable, and each task
/// decrements as its very last step. The decrement to zero wakes
/// `wait_idle`. Incrementing after submission instead would race with a
/// child that finishes instantly.
#[derive(Debug, Default)]
pub struct WalkStats {
    pub dirs_scanned: AtomicU64,
    pub files_scanned: AtomicU64,
    pub matches_found: AtomicU64,
    active: AtomicUsize,
    idle_lock: Mutex<()>,
    idle_cond: Condvar,
}

impl WalkStats {
    pub fn new() -> Self {
        WalkStats::default()
    }

    /// Call before the task is handed to the pool.
    pub fn task_created(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// The final act of every task; also the undo for a failed submission.
    pub fn task_done(&self) {
        if self.active.fetch_sub(1, Ordering::Release) == 1 {
            // Taking the lock orders this notify after a concurrent
            // waiter's predicate check.
            let _guard = self.idle_lock.lock().expect("BUG: stats lock poisoned");
            self.idle_cond.notify_all();
        }
    }

    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Blocks until the whole task tree has drained.
    pub fn wait_idle(&self) {
        let mut guard = self.idle_lock.lock().expect("BUG: stats lock poisoned");
        while self.active.load(Ordering::Acquire) > 0 {
            guard = self
                .idle_cond
                .wait(guard)
                .expect("BUG: stats lock poisoned");
        }
    }

    pub fn dir_scanned(&self) {
        self.dirs_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn match_found(&self, regular_file: bool) {
        if regular_file {
            self.files_scanned.fetch_add(1, Ordering::Relaxed);
        }
        self.matches_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn matches(&self) -> u64 {
        self.matches_found.load(Ordering::Relaxed)
    }

    /// One dim line on stderr after the walk.
    pub fn print_summary(&self, elapsed: Duration) {
        let line = format!(
            "Searched {} directories and {} files. Found {} matches in {:.2} seconds.",
            self.dirs_scanned.load(Ordering::Relaxed),
            self.files_scanned.load(Ordering::Relaxed),
            self.matches_found.load(Ordering::Relaxed),
            elapsed.as_secs_f64()
        );
        eprintln!("\n{}", line.dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn counters_accumulate() {
        let s = WalkStats::new();
        s.dir_scanned();
        s.dir_scanned();
        s.match_found(true);
        s.match_found(false);
        assert_eq!(s.dirs_scanned.load(Ordering::Relaxed), 2);
        assert_eq!(s.files_scanned.load(Ordering::Relaxed), 1);
        assert_eq!(s.matches(), 2);
    }

    #[test]
    fn wait_idle_blocks_until_last_task() {
        let stats = Arc::new(WalkStats::new());
        stats.task_created();
        stats.task_created();
        let remote = Arc::clone(&stats);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.task_done();
            thread::sleep(Duration::from_millis(20));
            remote.task_done();
        });
        stats.wait_idle();
        assert_eq!(stats.active_tasks(), 0);
        handle.join().unwrap();
    }

    #[test]
    fn failed_submission_reconciles() {
        let s = WalkStats::new();
        s.task_created();
        s.task_created();
        s.task_done(); // the submission that never made it
        s.task_done();
        assert_eq!(s.active_tasks(), 0);
    }
}
