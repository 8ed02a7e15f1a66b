//! ---
//! snet_section: "04-client-session"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Connection session, receive loop and worker pool."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
//! Fixed-size pool of named worker threads fed by a bounded queue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use snet_common::WorkerConfig;
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Reasons a job was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The queue is at capacity (only from [`WorkerPool::try_execute`]).
    #[error("worker pool queue is full")]
    Full,
    /// [`WorkerPool::shutdown`] has run.
    #[error("worker pool is shut down")]
    ShutDown,
    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Bounded pool used to run sends and other blocking work off UI threads.
///
/// Jobs run in submission order per worker; a panicking job is logged and the
/// worker carries on with the next one.
pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<SyncSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    panicked: Arc<AtomicU64>,
    threads: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("threads", &self.threads)
            .field("panicked", &self.panicked_jobs())
            .finish()
    }
}

impl WorkerPool {
    /// Start `threads` workers sharing a queue of `queue_bound` pending jobs.
    ///
    /// Zero values are raised to one.
    pub fn new(name: &str, threads: usize, queue_bound: usize) -> Result<Self, PoolError> {
        let threads = threads.max(1);
        let (sender, receiver) = mpsc::sync_channel::<Job>(queue_bound.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let panicked = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = Arc::clone(&receiver);
            let panicked = Arc::clone(&panicked);
            let worker_name = format!("{name}-worker-{index}");
            let spawned = thread::Builder::new()
                .name(worker_name.clone())
                .spawn(move || run_worker(&worker_name, &receiver, &panicked));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    // let the already started workers observe a closed queue
                    drop(sender);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(err));
                }
            }
        }
        debug!(pool = name, threads, queue_bound, "worker pool started");

        Ok(Self {
            name: name.to_owned(),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            panicked,
            threads,
        })
    }

    /// Pool sized from the `[workers]` configuration section.
    pub fn from_config(name: &str, config: &WorkerConfig) -> Result<Self, PoolError> {
        Self::new(name, config.threads, config.queue_bound)
    }

    /// Queue a job, blocking while the queue is full.
    pub fn execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender()?;
        sender.send(Box::new(job)).map_err(|_| PoolError::ShutDown)
    }

    /// Queue a job without blocking.
    pub fn try_execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender()?;
        sender.try_send(Box::new(job)).map_err(|err| match err {
            TrySendError::Full(_) => PoolError::Full,
            TrySendError::Disconnected(_) => PoolError::ShutDown,
        })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Jobs that panicked since the pool started.
    pub fn panicked_jobs(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Stop accepting jobs, let queued ones finish, and join the workers.
    ///
    /// Idempotent. When called from one of the pool's own workers that worker
    /// is detached instead of joined.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!(pool = %self.name, "worker thread terminated abnormally");
            }
        }
        debug!(pool = %self.name, "worker pool stopped");
    }

    fn sender(&self) -> Result<SyncSender<Job>, PoolError> {
        self.sender.lock().clone().ok_or(PoolError::ShutDown)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(name: &str, receiver: &Mutex<Receiver<Job>>, panicked: &AtomicU64) {
    loop {
        let job = { receiver.lock().recv() };
        let Ok(job) = job else {
            break;
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            panicked.fetch_add(1, Ordering::Relaxed);
            warn!(worker = name, "job panicked");
        }
    }
}
