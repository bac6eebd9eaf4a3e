//! Keyed job batching.
//!
//! Observers re-run their queries through the scheduler. Inside a batch,
//! scheduling the same key twice keeps only the latest job, so an observer
//! touched by several writes of one commit refreshes once.

use std::cell::{Cell, RefCell};

type Job = Box<dyn FnOnce()>;

/// Batches keyed jobs until the outermost batch ends.
#[derive(Default)]
pub struct Scheduler {
    depth: Cell<usize>,
    queue: RefCell<Vec<(u64, Job)>>,
    next_key: Cell<u64>,
}

impl Scheduler {
    /// Creates a new scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a key unique to this scheduler.
    pub fn key(&self) -> u64 {
        let key = self.next_key.get();
        self.next_key.set(key + 1);
        key
    }

    /// Whether a batch is open.
    pub fn in_batch(&self) -> bool {
        self.depth.get() > 0
    }

    /// Runs `f` inside a batch. Jobs scheduled meanwhile run when the
    /// outermost batch ends.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.depth.set(self.depth.get() + 1);
        let result = f();
        self.depth.set(self.depth.get() - 1);
        if self.depth.get() == 0 {
            self.flush();
        }
        result
    }

    /// Schedules a job. Outside a batch it runs immediately; inside, it
    /// replaces any pending job with the same key.
    pub fn schedule(&self, key: u64, job: impl FnOnce() + 'static) {
        if !self.in_batch() {
            job();
            return;
        }
        let mut queue = self.queue.borrow_mut();
        match queue.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = Box::new(job),
            None => queue.push((key, Box::new(job))),
        }
    }

    /// Number of pending jobs.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    fn flush(&self) {
        loop {
            let jobs = std::mem::take(&mut *self.queue.borrow_mut());
            if jobs.is_empty() {
                break;
            }
            log::trace!("scheduler: running {} job(s)", jobs.len());
            // Jobs scheduled by these jobs queue up for the next round.
            self.depth.set(self.depth.get() + 1);
            for (_, job) in jobs {
                job();
            }
            self.depth.set(self.depth.get() - 1);
        }
    }
}
