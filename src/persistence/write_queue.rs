// Offloads file writes to a single background worker so store operations
// only ever wait on the in-memory lock, never on disk latency.
//
// One worker per queue consumes jobs in order, which is what makes
// last-content-wins rewrites of a collection file safe: the content queued
// most recently is the content that lands last.
//
// Shutdown closes the channel and joins the worker, so the drain is an
// explicit signal rather than a sleep-poll loop. Work offered after the
// queue is stopped fails loudly with `QueueClosed`.

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

const QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("the write queue is stopped and cannot accept new work")]
pub struct QueueClosed;

/// One full rewrite of one file. The directory is created if needed.
#[derive(Debug)]
pub struct FileWrite {
    pub directory: PathBuf,
    pub filename: String,
    pub content: String,
}

pub struct WriteQueue {
    name: &'static str,
    sender: Mutex<Option<mpsc::Sender<FileWrite>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WriteQueue {
    /// The name tags log lines so multiple queues can be told apart.
    pub fn new(name: &'static str) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);
        let worker = tokio::spawn(run_worker(receiver));
        Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub async fn enqueue(&self, write: FileWrite) -> Result<(), QueueClosed> {
        let guard = self.sender.lock().await;
        match guard.as_ref() {
            Some(sender) => sender.send(write).await.map_err(|_| QueueClosed),
            None => Err(QueueClosed),
        }
    }

    /// Refuses all further work, then waits until every queued write has
    /// reached disk. Safe to call more than once.
    pub async fn stop(&self) {
        self.sender.lock().await.take();
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                tracing::error!(queue = self.name, %err, "write queue worker did not drain cleanly");
            }
            tracing::info!(queue = self.name, "write queue stopped");
        }
    }
}

async fn run_worker(mut receiver: mpsc::Receiver<FileWrite>) {
    while let Some(write) = receiver.recv().await {
        let target = write.directory.join(&write.filename);
        if let Err(err) = persist(&write).await {
            tracing::error!(file = %target.display(), %err, "background file write failed");
        }
    }
}

async fn persist(write: &FileWrite) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&write.directory).await?;
    tokio::fs::write(write.directory.join(&write.filename), &write.content).await
}
