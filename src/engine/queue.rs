//! Single-flight job queue
//!
//! A FIFO processed sequentially by one worker task. Enqueueing an id
//! that is already pending or running is a no-op; the id frees up once
//! its task resolves, success or failure.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, error};

struct Job {
    id: String,
    task: BoxFuture<'static, anyhow::Result<()>>,
}

/// Deduplicated FIFO task runner.
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl JobQueue {
    /// Create the queue and spawn its worker.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let in_flight: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        let worker_set = in_flight.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                debug!(id = %job.id, "job started");
                if let Err(e) = job.task.await {
                    // Failures are logged; the worker keeps draining
                    error!(id = %job.id, error = %e, "job failed");
                }
                worker_set.lock().expect("queue lock").remove(&job.id);
                debug!(id = %job.id, "job finished");
            }
        });

        Self { tx, in_flight }
    }

    /// Enqueue `task` under `id`. Returns `false` (and drops the task)
    /// when `id` is already in flight.
    pub fn enqueue<F>(&self, id: impl Into<String>, task: F) -> bool
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = id.into();
        {
            let mut in_flight = self.in_flight.lock().expect("queue lock");
            if !in_flight.insert(id.clone()) {
                debug!(id = %id, "duplicate job ignored");
                return false;
            }
        }
        let job = Job {
            id: id.clone(),
            task: Box::pin(task),
        };
        if self.tx.send(job).is_err() {
            // Worker is gone; do not leave the id stuck
            self.in_flight.lock().expect("queue lock").remove(&id);
            return false;
        }
        true
    }

    /// Number of ids currently pending or running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().expect("queue lock").len()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout, Duration};

    #[tokio::test]
    async fn duplicate_ids_run_once() {
        let queue = JobQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let c1 = counter.clone();
        assert!(queue.enqueue("j1", async move {
            gate_rx.await.ok();
            c1.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        // Second enqueue while the first is still pending: no-op
        let c2 = counter.clone();
        assert!(!queue.enqueue("j1", async move {
            c2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        gate_tx.send(()).unwrap();
        timeout(Duration::from_secs(2), async {
            while queue.in_flight_count() > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // After completion the id is reusable
        let c3 = counter.clone();
        assert!(queue.enqueue("j1", async move {
            c3.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        timeout(Duration::from_secs(2), async {
            while queue.in_flight_count() > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn worker_survives_failing_jobs() {
        let queue = JobQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        assert!(queue.enqueue("bad", async { anyhow::bail!("boom") }));
        let r = ran.clone();
        assert!(queue.enqueue("good", async move {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        timeout(Duration::from_secs(2), async {
            while queue.in_flight_count() > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn jobs_run_in_fifo_order() {
        let queue = JobQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let order = order.clone();
            queue.enqueue(format!("j{}", i), async move {
                order.lock().unwrap().push(i);
                Ok(())
            });
        }
        timeout(Duration::from_secs(2), async {
            while queue.in_flight_count() > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }
}
