//! Process-wide bounded FIFO of database tasks, drained by a small fixed
//! worker pool. Stylistically grounded on `krukah-robopoker`'s
//! `workers::Pool`/`Worker` split (a fixed-size worker vec, each polling a
//! shared queue), reworked around `tokio::sync::mpsc` + `oneshot` to carry
//! the barrier/reply contract of spec §4.B rather than robopoker's
//! fixed MCCFR batch shape.
//!
//! Generic over the shared resource `R` a job closure receives (in
//! practice `Arc<tokio_postgres::Client>`, wired up in [`crate::persistence::store`])
//! so the queue itself stays independent of any particular store.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::GambitError;

const MAX_RETRIES: u32 = 5;
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A single queued unit of work plus its optional barrier wiring. A task
/// with `wait_on` set does not run until that receiver resolves; a task
/// with `blocks` set signals it once the job has completed, letting a
/// caller chain a strict sequence of writes (the Hub does this for every
/// per-match persist, per spec §4.D/§5).
struct QueuedTask {
    job: Box<dyn FnOnce() -> JobFuture + Send>,
    wait_on: Option<oneshot::Receiver<()>>,
    blocks: Option<oneshot::Sender<()>>,
}

/// Handle to a running worker pool over resource `R`. Cloning shares the
/// same queue and the same underlying resource.
#[derive(Clone)]
pub struct PersistenceQueue<R> {
    sender: mpsc::UnboundedSender<QueuedTask>,
    resource: Arc<R>,
}

impl<R: Send + Sync + 'static> PersistenceQueue<R> {
    /// Spawns `workers` tasks draining a shared queue over `resource`.
    /// The queue never silently drops a task except when every sender
    /// handle (including this one) is dropped, at which point the
    /// workers exit once drained.
    pub fn spawn(resource: R, workers: usize) -> Self {
        let resource = Arc::new(resource);
        let (sender, receiver) = mpsc::unbounded_channel::<QueuedTask>();
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..workers.max(1) {
            let receiver = receiver.clone();
            tokio::spawn(async move {
                loop {
                    let task = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    let Some(task) = task else {
                        log::debug!("persistence worker {worker_id} shutting down, queue closed");
                        break;
                    };
                    if let Some(wait_on) = task.wait_on {
                        let _ = wait_on.await;
                    }
                    (task.job)().await;
                    if let Some(blocks) = task.blocks {
                        let _ = blocks.send(());
                    }
                }
            });
        }

        Self { sender, resource }
    }

    pub fn resource(&self) -> Arc<R> {
        self.resource.clone()
    }

    /// Fire-and-forget submission: the caller never learns the outcome.
    /// Used for work whose failure is only interesting as a log line
    /// (e.g. a best-effort state snapshot).
    pub fn submit_fire_and_forget<F, Fut>(
        &self,
        wait_on: Option<oneshot::Receiver<()>>,
        blocks: Option<oneshot::Sender<()>>,
        job: F,
    ) where
        F: FnOnce(Arc<R>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let resource = self.resource.clone();
        let task = QueuedTask {
            job: Box::new(move || -> JobFuture { Box::pin(job(resource)) }),
            wait_on,
            blocks,
        };
        if self.sender.send(task).is_err() {
            log::warn!("persistence queue closed, dropping fire-and-forget task");
        }
    }

    /// Synchronous-return submission: awaits the worker's result. Retries
    /// transient storage errors up to [`MAX_RETRIES`] times with a fixed
    /// backoff before surfacing; any other error surfaces immediately.
    pub async fn submit<T, F, Fut>(
        &self,
        wait_on: Option<oneshot::Receiver<()>>,
        blocks: Option<oneshot::Sender<()>>,
        job: F,
    ) -> Result<T, GambitError>
    where
        T: Send + 'static,
        F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, GambitError>> + Send + 'static,
    {
        let job = Arc::new(job);
        let (tx, rx) = oneshot::channel();

        self.submit_fire_and_forget(wait_on, blocks, move |resource| async move {
            let mut attempt = 0u32;
            let result = loop {
                match job(resource.clone()).await {
                    Ok(value) => break Ok(value),
                    Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                        attempt += 1;
                        log::warn!(
                            "transient storage error (attempt {attempt}/{MAX_RETRIES}), retrying: {err}"
                        );
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                    Err(err) => break Err(err),
                }
            };
            let _ = tx.send(result);
        });

        rx.await.map_err(|_| GambitError::QueueClosed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn barrier_orders_two_writes() {
        let order: Arc<AsyncMutex<Vec<u32>>> = Arc::new(AsyncMutex::new(Vec::new()));
        let (tx, rx) = oneshot::channel();
        let queue: PersistenceQueue<AsyncMutex<Vec<u32>>> =
            PersistenceQueue::spawn(AsyncMutex::new(Vec::new()), 1);
        let _ = order;

        let _: Result<(), GambitError> = queue
            .submit(None, Some(tx), move |resource| async move {
                resource.lock().await.push(1);
                Ok(())
            })
            .await;

        let _: Result<(), GambitError> = queue
            .submit(Some(rx), None, move |resource| async move {
                resource.lock().await.push(2);
                Ok(())
            })
            .await;

        assert_eq!(*queue.resource().lock().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn fire_and_forget_runs_without_a_reply() {
        let queue: PersistenceQueue<AtomicUsize> = PersistenceQueue::spawn(AtomicUsize::new(0), 1);
        queue.submit_fire_and_forget(None, None, |resource| async move {
            resource.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.resource().load(Ordering::SeqCst), 1);
    }
}
