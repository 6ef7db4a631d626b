//! Bounded FIFO job pool
//!
//! A single dispatcher task owns the semaphore and hands permits out in the
//! order jobs were enqueued. Every job waits in its own task for either its
//! permit or its cancellation token, so a job cancelled while queued settles
//! immediately without ever occupying a slot.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};
use uuid::Uuid;

/// What a queued job was granted
#[derive(Debug)]
pub enum Admission {
    /// A concurrency slot, released when dropped
    Granted(OwnedSemaphorePermit),
    /// The job was cancelled (or the pool shut down) before a slot was free
    Cancelled,
}

struct Ticket {
    job_id: Uuid,
    cancel: CancellationToken,
    grant: oneshot::Sender<OwnedSemaphorePermit>,
}

/// Bounded job pool
#[derive(Debug)]
pub struct Scheduler {
    queue: mpsc::UnboundedSender<Ticket>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    semaphore: Arc<Semaphore>,
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket").field("job_id", &self.job_id).finish()
    }
}

impl Scheduler {
    /// Creates the pool and starts its dispatcher
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(max_concurrent_jobs: usize, shutdown: CancellationToken) -> Self {
        let semaphore = Arc::new(Semaphore::new(max_concurrent_jobs));
        let (queue, rx) = mpsc::unbounded_channel();
        let tracker = TaskTracker::new();

        tracker.spawn(dispatch(rx, Arc::clone(&semaphore), shutdown.clone()));
        info!("Scheduler started (max {} concurrent job(s))", max_concurrent_jobs);

        Self {
            queue,
            tracker,
            shutdown,
            semaphore,
        }
    }

    /// Queues a job without waiting
    ///
    /// `job` runs in its own task once the job is admitted or cancelled.
    pub fn enqueue<F, Fut>(&self, job_id: Uuid, cancel: CancellationToken, job: F)
    where
        F: FnOnce(Admission) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (grant, granted) = oneshot::channel();
        let ticket = Ticket {
            job_id,
            cancel: cancel.clone(),
            grant,
        };
        if self.queue.send(ticket).is_err() {
            debug!("Scheduler is shut down, job {} will not be admitted", job_id);
        }

        self.tracker.spawn(async move {
            let admission = tokio::select! {
                biased;
                _ = cancel.cancelled() => Admission::Cancelled,
                permit = granted => match permit {
                    Ok(permit) => Admission::Granted(permit),
                    Err(_) => Admission::Cancelled,
                },
            };
            job(admission).await;
        });
    }

    /// Free concurrency slots
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Cancels everything and waits for all job tasks to settle
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Scheduler stopped");
    }
}

async fn dispatch(
    mut queue: mpsc::UnboundedReceiver<Ticket>,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
) {
    loop {
        let ticket = tokio::select! {
            _ = shutdown.cancelled() => break,
            ticket = queue.recv() => match ticket {
                Some(ticket) => ticket,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = ticket.cancel.cancelled() => {
                debug!("Job {} cancelled while queued", ticket.job_id);
                continue;
            }
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        debug!("Admitting job {}", ticket.job_id);
        if ticket.grant.send(permit).is_err() {
            debug!("Job {} went away before admission", ticket.job_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_admits_in_order_within_bound() {
        let scheduler = Scheduler::new(1, CancellationToken::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let release = Arc::new(Notify::new());

        for i in 0..3 {
            let order = Arc::clone(&order);
            let release = Arc::clone(&release);
            scheduler.enqueue(Uuid::new_v4(), CancellationToken::new(), move |admission| {
                async move {
                    assert!(matches!(admission, Admission::Granted(_)));
                    order.lock().push(i);
                    release.notified().await;
                    drop(admission);
                }
            });
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*order.lock(), vec![0]);
        assert_eq!(scheduler.available_slots(), 0);

        for expected in [vec![0, 1], vec![0, 1, 2]] {
            release.notify_one();
            tokio::time::timeout(Duration::from_secs(5), async {
                while *order.lock() != expected {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .unwrap();
        }
        release.notify_one();
    }

    #[tokio::test]
    async fn test_cancelled_while_queued_skips_slot() {
        let scheduler = Scheduler::new(1, CancellationToken::new());
        let release = Arc::new(Notify::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        {
            let release = Arc::clone(&release);
            let tx = tx.clone();
            scheduler.enqueue(Uuid::new_v4(), CancellationToken::new(), move |admission| {
                async move {
                    tx.send(("first", matches!(admission, Admission::Granted(_)))).unwrap();
                    release.notified().await;
                }
            });
        }

        let cancel = CancellationToken::new();
        {
            let tx = tx.clone();
            scheduler.enqueue(Uuid::new_v4(), cancel.clone(), move |admission| async move {
                tx.send(("second", matches!(admission, Admission::Granted(_)))).unwrap();
            });
        }

        assert_eq!(rx.recv().await, Some(("first", true)));
        cancel.cancel();
        assert_eq!(rx.recv().await, Some(("second", false)));
        release.notify_one();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_queued_jobs() {
        let shutdown = CancellationToken::new();
        let scheduler = Scheduler::new(1, shutdown.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        for name in ["running", "queued"] {
            let tx = tx.clone();
            let cancel = shutdown.child_token();
            scheduler.enqueue(Uuid::new_v4(), cancel.clone(), move |admission| async move {
                if matches!(admission, Admission::Granted(_)) {
                    cancel.cancelled().await;
                }
                tx.send((name, matches!(admission, Admission::Granted(_)))).unwrap();
            });
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_secs(5), scheduler.shutdown())
            .await
            .unwrap();

        let mut seen = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec![("queued", false), ("running", true)]);
    }
}
