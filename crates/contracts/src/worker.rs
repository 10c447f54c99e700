//! Worker - single-thread FIFO task queue with graceful shutdown
//!
//! Shared by the postprocessors, the recorder's save path and anything
//! else that needs "push cheaply, process in order on a dedicated thread".
//!
//! - `push` only holds the queue lock long enough to append, and refuses
//!   the item instead of blocking when the queue is at capacity
//! - `push_control` is never refused for capacity; it is for rare items
//!   such as resets that must not be lost behind a backlog
//! - items are handled strictly in push order
//! - a panicking item is logged and counted, the worker keeps running
//! - `shutdown` sets the flag, wakes the thread and joins it; queued
//!   items that were not yet dequeued are dropped

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::ContractError;

/// Queue capacity of [`Worker::spawn`]
pub const DEFAULT_WORKER_CAPACITY: usize = 1024;

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    available: Condvar,
    shutdown: AtomicBool,
    processed: AtomicU64,
    panicked: AtomicU64,
    refused: AtomicU64,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Dedicated worker thread consuming a FIFO queue
pub struct Worker<T: Send + 'static> {
    name: String,
    shared: Arc<Shared<T>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Worker<T> {
    /// Spawn the worker thread with [`DEFAULT_WORKER_CAPACITY`]; `handler`
    /// runs once per pushed item.
    pub fn spawn<F>(name: impl Into<String>, handler: F) -> Result<Self, ContractError>
    where
        F: FnMut(T) + Send + 'static,
    {
        Self::spawn_bounded(name, DEFAULT_WORKER_CAPACITY, handler)
    }

    /// Spawn the worker thread holding at most `capacity` queued items
    pub fn spawn_bounded<F>(
        name: impl Into<String>,
        capacity: usize,
        mut handler: F,
    ) -> Result<Self, ContractError>
    where
        F: FnMut(T) + Send + 'static,
    {
        let name = name.into();
        let capacity = capacity.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_WORKER_CAPACITY))),
            capacity,
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            processed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            refused: AtomicU64::new(0),
        });

        let thread_shared = Arc::clone(&shared);
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                debug!(worker = %thread_name, "worker started");
                while let Some(item) = Self::next_item(&thread_shared) {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| handler(item)));
                    match result {
                        Ok(()) => {
                            thread_shared.processed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(payload) => {
                            thread_shared.panicked.fetch_add(1, Ordering::Relaxed);
                            error!(
                                worker = %thread_name,
                                panic = panic_message(payload.as_ref()),
                                "work item panicked, continuing"
                            );
                        }
                    }
                }
                debug!(worker = %thread_name, "worker stopped");
            })?;

        Ok(Self {
            name,
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Block until an item is available or shutdown is requested.
    fn next_item(shared: &Shared<T>) -> Option<T> {
        let mut queue = shared.lock();
        loop {
            if shared.shutdown.load(Ordering::Acquire) {
                return None;
            }
            if let Some(item) = queue.pop_front() {
                return Some(item);
            }
            queue = shared
                .available
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue an item. Returns `false` if the worker has shut down or
    /// the queue is full; a full queue counts the item as refused.
    pub fn push(&self, item: T) -> bool {
        self.enqueue(item, true)
    }

    /// Enqueue an item regardless of capacity. Returns `false` only if the
    /// worker has shut down.
    pub fn push_control(&self, item: T) -> bool {
        self.enqueue(item, false)
    }

    fn enqueue(&self, item: T, bounded: bool) -> bool {
        let mut queue = self.shared.lock();
        if self.shared.shutdown.load(Ordering::Acquire) {
            return false;
        }
        if bounded && queue.len() >= self.shared.capacity {
            self.shared.refused.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        queue.push_back(item);
        drop(queue);
        self.shared.available.notify_one();
        true
    }

    /// Items queued but not yet dequeued
    pub fn pending(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Items refused because the queue was full
    pub fn refused(&self) -> u64 {
        self.shared.refused.load(Ordering::Relaxed)
    }

    /// Items handled without panicking
    pub fn processed(&self) -> u64 {
        self.shared.processed.load(Ordering::Relaxed)
    }

    /// Items whose handler panicked
    pub fn panicked(&self) -> u64 {
        self.shared.panicked.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Request shutdown, wake the thread and join it.
    ///
    /// Idempotent. Items still queued are discarded.
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.lock();
            self.shared.shutdown.store(true, Ordering::Release);
            queue.clear();
        }
        self.shared.available.notify_all();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!(worker = %self.name, "worker thread panicked during shutdown");
            }
        }
    }
}

impl<T: Send + 'static> Drop for Worker<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
