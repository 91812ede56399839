use crate::errors::FfErr;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// One unit of work, executed by exactly one worker.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Why a submission was rejected. Both cases are structural: the caller
/// must treat the task as never dispatched and reconcile its counters.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("task queue is full")]
    Full,
    #[error("task pool is shut down")]
    Closed,
}

/// Fixed-size worker pool over a bounded queue.
///
/// `submit` never blocks. On shutdown the workers drain whatever is still
/// queued, then exit; new submissions fail.
pub struct TaskPool {
    tx: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    pub fn new(threads: usize, capacity: usize) -> Result<TaskPool, FfErr> {
        if threads == 0 || capacity == 0 {
            return Err(FfErr::PoolSize);
        }
        let (tx, rx) = channel::bounded::<Task>(capacity);
        let mut workers = Vec::with_capacity(threads);
        for n in 0..threads {
            let rx: Receiver<Task> = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("walk-{}", n))
                .spawn(move || {
                    // Ends only once the queue is closed and empty.
                    for task in rx.iter() {
                        task();
                    }
                })
                .map_err(FfErr::Pool)?;
            workers.push(handle);
        }
        Ok(TaskPool {
            tx: Some(tx),
            workers,
        })
    }

    /// Submission handle for tasks that fork further tasks.
    pub fn spawner(&self) -> Spawner {
        Spawner {
            tx: self
                .tx
                .as_ref()
                .expect("BUG: spawner requested after shutdown")
                .clone(),
        }
    }

    pub fn submit(&self, task: Task) -> Result<(), SubmitError> {
        match &self.tx {
            Some(tx) => Spawner::send(tx, task),
            None => Err(SubmitError::Closed),
        }
    }

    /// Closes the queue, waits for the workers to drain it, joins them.
    pub fn shutdown(&mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cheap clone of the pool's submission side. Tasks in flight hold one, so
/// the queue stays open until the task tree has drained.
#[derive(Clone)]
pub struct Spawner {
    tx: Sender<Task>,
}

impl Spawner {
    pub fn submit(&self, task: Task) -> Result<(), SubmitError> {
        Spawner::send(&self.tx, task)
    }

    fn send(tx: &Sender<Task>, task: Task) -> Result<(), SubmitError> {
        match tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SubmitError::Full),
            Err(TrySendError::Disconnected(_)) => Err(SubmitError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};

    #[test]
    fn rejects_degenerate_sizes() {
        assert!(TaskPool::new(0, 16).is_err());
        assert!(TaskPool::new(2, 0).is_err());
    }

    #[test]
    fn executes_submitted_tasks() {
        let mut pool = TaskPool::new(4, 64).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn shutdown_drains_the_queue() {
        // One worker, so most of the 50 tasks are still queued when
        // shutdown is called. All of them must run anyway.
        let mut pool = TaskPool::new(1, 64).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let mut pool = TaskPool::new(1, 4).unwrap();
        pool.shutdown();
        assert_eq!(pool.submit(Box::new(|| ())), Err(SubmitError::Closed));
    }

    #[test]
    fn full_queue_rejects_without_blocking() {
        let mut pool = TaskPool::new(1, 2).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        pool.submit(Box::new(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        }))
        .unwrap();
        // The single worker is now parked inside the task above.
        started_rx.recv().unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let ran = Arc::clone(&ran);
            pool.submit(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        assert_eq!(pool.submit(Box::new(|| ())), Err(SubmitError::Full));

        release_tx.send(()).unwrap();
        pool.shutdown();
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn spawner_submits_from_inside_a_task() {
        let mut pool = TaskPool::new(2, 16).unwrap();
        let spawner = pool.spawner();
        let (tx, rx) = mpsc::channel();
        pool.submit(Box::new(move || {
            let tx = tx.clone();
            spawner
                .submit(Box::new(move || tx.send(42).unwrap()))
                .unwrap();
        }))
        .unwrap();
        assert_eq!(rx.recv().unwrap(), 42);
        pool.shutdown();
    }
}
