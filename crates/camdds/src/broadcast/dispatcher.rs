// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 naskel.com

//! Single-worker serialized task queue.
//!
//! All broadcaster state mutation funnels through one dedicated worker
//! thread: `invoke` enqueues and returns immediately, tasks run strictly in
//! submission order, and no two tasks ever overlap. That serialization is
//! what makes the device map safe without a per-operation lock, and it
//! decouples callers (device-event callbacks arriving on arbitrary
//! threads) from any work that touches the bus.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    tx: Option<Sender<Task>>,
    rx: Option<Receiver<Task>>,
    worker: Option<JoinHandle<()>>,
    started: bool,
}

/// Serialized task queue with one dedicated worker thread.
pub struct Dispatcher {
    inner: Mutex<Inner>,
    stopped: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            inner: Mutex::new(Inner {
                tx: Some(tx),
                rx: Some(rx),
                worker: None,
                started: false,
            }),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the worker. Idempotent; a second call is a no-op.
    ///
    /// Tasks enqueued before `start` are kept and run once the worker is
    /// up, still in submission order.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        if inner.started || self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let Some(rx) = inner.rx.take() else {
            return;
        };
        let stopped = Arc::clone(&self.stopped);
        inner.worker = Some(thread::spawn(move || worker_loop(&rx, &stopped)));
        inner.started = true;
        log::debug!("[dispatcher] worker started");
    }

    /// Enqueue a task and return immediately.
    ///
    /// After `stop` the task is silently dropped; callers racing a
    /// shutdown must tolerate that.
    pub fn invoke<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.stopped.load(Ordering::SeqCst) {
            log::debug!("[dispatcher] task dropped, dispatcher is stopped");
            return;
        }
        let inner = self.inner.lock();
        if let Some(tx) = &inner.tx {
            let _ = tx.send(Box::new(task));
        }
    }

    /// Stop the worker and join it. Idempotent.
    ///
    /// Tasks still queued when `stop` is called do not run.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let worker = {
            let mut inner = self.inner.lock();
            // Closing the channel wakes the worker out of a blocking recv.
            inner.tx = None;
            inner.worker.take()
        };
        if let Some(handle) = worker {
            if handle.join().is_err() {
                log::error!("[dispatcher] worker panicked outside a task");
            }
        }
        log::debug!("[dispatcher] stopped");
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(rx: &Receiver<Task>, stopped: &AtomicBool) {
    // The iterator ends when the sender side is dropped by `stop`. Buffered
    // tasks are still delivered after the disconnect, so re-check the stop
    // flag before running each one.
    for task in rx.iter() {
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            log::error!("[dispatcher] task panicked; worker continues");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn drain_marker(dispatcher: &Dispatcher) {
        let (tx, rx) = mpsc::channel();
        dispatcher.invoke(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(5))
            .expect("dispatcher did not drain");
    }

    #[test]
    fn test_tasks_run_in_fifo_order() {
        let dispatcher = Dispatcher::new();
        dispatcher.start();

        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..100 {
            let order = Arc::clone(&order);
            dispatcher.invoke(move || order.lock().push(i));
        }
        drain_marker(&dispatcher);

        let seen = order.lock().clone();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_tasks_enqueued_before_start_run_after_start() {
        let dispatcher = Dispatcher::new();
        let ran = Arc::new(AtomicBool::new(false));
        {
            let ran = Arc::clone(&ran);
            dispatcher.invoke(move || ran.store(true, Ordering::SeqCst));
        }
        assert!(!ran.load(Ordering::SeqCst));

        dispatcher.start();
        drain_marker(&dispatcher);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_invoke_after_stop_is_dropped() {
        let dispatcher = Dispatcher::new();
        dispatcher.start();
        dispatcher.stop();

        let ran = Arc::new(AtomicBool::new(false));
        {
            let ran = Arc::clone(&ran);
            dispatcher.invoke(move || ran.store(true, Ordering::SeqCst));
        }
        // Nothing to wait on; the worker is gone. Give it a moment anyway.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let dispatcher = Dispatcher::new();
        dispatcher.start();
        dispatcher.start();
        drain_marker(&dispatcher);
        dispatcher.stop();
        dispatcher.stop();
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let dispatcher = Dispatcher::new();
        dispatcher.start();

        dispatcher.invoke(|| panic!("task exploded"));

        let ran = Arc::new(AtomicBool::new(false));
        {
            let ran = Arc::clone(&ran);
            dispatcher.invoke(move || ran.store(true, Ordering::SeqCst));
        }
        drain_marker(&dispatcher);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_joins_within_bounded_time() {
        let dispatcher = Arc::new(Dispatcher::new());
        dispatcher.start();

        let (tx, rx) = mpsc::channel();
        let d = Arc::clone(&dispatcher);
        thread::spawn(move || {
            d.stop();
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(5))
            .expect("stop() hung");
    }
}
