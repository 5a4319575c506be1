//! Background persistence worker.
//!
//! The game loop (single-threaded) captures snapshots of whatever must be
//! written and hands them to this thread as opaque closures over an `mpsc`
//! channel, so the worker never races with the owner of the live data.
//!
//! Guarantees: FIFO within the queue, at-least-once execution, and a
//! failing task logs and is dropped; the dirty bit on the owning entity
//! stays set, so the next periodic cycle retries.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

/// A unit of work for the saver thread. Captures everything it needs.
pub type SaveTask = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

enum SaveJob {
    Task(SaveTask),
    /// The saver thread acks via the provided channel once every prior job
    /// has completed (the channel is FIFO).
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// Handle for the background saver thread.
pub struct AsyncSaver {
    tx: mpsc::Sender<SaveJob>,
    handle: Option<JoinHandle<()>>,
}

impl AsyncSaver {
    /// Spawn the worker thread.
    pub fn spawn() -> AsyncSaver {
        let (tx, rx) = mpsc::channel::<SaveJob>();

        let handle = thread::Builder::new()
            .name("async-saver".into())
            .spawn(move || saver_thread_main(rx))
            .expect("failed to spawn async saver thread");

        AsyncSaver {
            tx,
            handle: Some(handle),
        }
    }

    /// Enqueue a save task. Non-blocking; the mutex inside the channel is
    /// held only for the push.
    pub fn queue(&self, task: SaveTask) {
        if self.tx.send(SaveJob::Task(task)).is_err() {
            log::error!("Async saver is gone; dropping save task");
        }
    }

    /// Block until every queued task has completed.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.tx.send(SaveJob::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Signal the worker to stop and join it. Tasks queued before the stop
    /// still run. Safe to call more than once.
    pub fn stop(&mut self) {
        let _ = self.tx.send(SaveJob::Shutdown);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                log::error!("Async saver thread panicked: {e:?}");
            }
        }
    }
}

impl Drop for AsyncSaver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn saver_thread_main(rx: mpsc::Receiver<SaveJob>) {
    log::info!("Async saver thread started.");

    while let Ok(job) = rx.recv() {
        match job {
            SaveJob::Task(task) => run_task(task),
            SaveJob::Flush(ack) => {
                // All prior jobs have already run (channel is FIFO).
                let _ = ack.send(());
            }
            SaveJob::Shutdown => break,
        }
    }

    // Drain whatever is still queued before exiting.
    while let Ok(job) = rx.try_recv() {
        match job {
            SaveJob::Task(task) => run_task(task),
            SaveJob::Flush(ack) => {
                let _ = ack.send(());
            }
            SaveJob::Shutdown => {}
        }
    }

    log::info!("Async saver thread exiting.");
}

fn run_task(task: SaveTask) {
    if let Err(e) = task() {
        log::error!("Async save failed: {e:#}");
    }
}
