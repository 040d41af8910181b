//! Per-backend admission over a shared worker pool
//!
//! Every backend has a FIFO queue. MySQL batches are admitted as soon as they
//! arrive; Postgres and DuckDB admit one batch at a time and start the next
//! only once the previous one has finished, whether it succeeded or not.
//! Admitted batches then compete for the `workers` permits of a single
//! semaphore shared by all backends.
//!
//! The queues and in-flight flags are owned by one event loop. Submissions,
//! completions and drain requests all arrive as [`DispatchEvent`]s, so no
//! lock guards the admission state and no polling is involved.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::{ConnectionSource, ConnectionSources};
use crate::config::DispatcherConfig;
use crate::metrics::{CONNECTION_FAILURES_TOTAL, TASKS_IN_FLIGHT};
use crate::runner::BatchRunner;
use crate::types::{Admission, Backend, BackendTask};
use crate::{BenchError, Result};

/// Point-in-time view of the dispatcher queues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    queued: [usize; 3],
    in_flight: [usize; 3],
    /// Tasks whose execution has ended, successfully or not
    pub finished: usize,
    pub draining: bool,
}

impl QueueSnapshot {
    pub fn queued(&self, backend: Backend) -> usize {
        self.queued[backend.index()]
    }

    pub fn in_flight(&self, backend: Backend) -> usize {
        self.in_flight[backend.index()]
    }

    pub fn total_queued(&self) -> usize {
        self.queued.iter().sum()
    }

    pub fn total_in_flight(&self) -> usize {
        self.in_flight.iter().sum()
    }

    pub fn is_idle(&self) -> bool {
        self.total_queued() == 0 && self.total_in_flight() == 0
    }
}

enum DispatchEvent {
    Submit(BackendTask),
    Finished(Backend),
    Drain,
}

pub struct BackendDispatcher {
    events: mpsc::UnboundedSender<DispatchEvent>,
    accepting: AtomicBool,
    submitted: AtomicUsize,
    snapshot: watch::Receiver<QueueSnapshot>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackendDispatcher {
    /// Spawn the dispatch loop on the current runtime
    pub fn start(config: &DispatcherConfig, sources: ConnectionSources, runner: Arc<BatchRunner>) -> Self {
        let workers = config.workers.max(1);
        let (events, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(QueueSnapshot::default());

        let dispatch_loop = DispatchLoop {
            events: events.clone(),
            queues: Default::default(),
            in_flight: [0; 3],
            finished: 0,
            draining: false,
            workers: Arc::new(Semaphore::new(workers)),
            sources,
            runner,
            snapshot: snapshot_tx,
        };
        info!(workers, "Starting backend dispatcher");
        let handle = tokio::spawn(dispatch_loop.run(rx));

        Self {
            events,
            accepting: AtomicBool::new(true),
            submitted: AtomicUsize::new(0),
            snapshot,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Route a batch to its backend queue; never blocks
    pub fn submit(&self, task: BackendTask) -> Result<()> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(BenchError::ShuttingDown);
        }
        self.events
            .send(DispatchEvent::Submit(task))
            .map_err(|_| BenchError::ShuttingDown)?;
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        *self.snapshot.borrow()
    }

    /// Wait until every task submitted so far has finished
    pub async fn wait_idle(&self) {
        let target = self.submitted.load(Ordering::SeqCst);
        let mut snapshot = self.snapshot.clone();
        // Err means the loop is gone, in which case nothing is left to wait for
        let _ = snapshot.wait_for(|s| s.finished >= target && s.is_idle()).await;
    }

    /// Stop accepting tasks; queued and in-flight tasks still run to completion
    pub fn close(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(DispatchEvent::Drain);
        }
    }

    /// Close, then wait for the queues to drain and the loop to exit
    pub async fn shutdown(&self) -> Result<()> {
        self.close();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| BenchError::Dispatcher(format!("dispatch loop failed: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for BackendDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

struct DispatchLoop {
    events: mpsc::UnboundedSender<DispatchEvent>,
    queues: [VecDeque<BackendTask>; 3],
    in_flight: [usize; 3],
    finished: usize,
    draining: bool,
    workers: Arc<Semaphore>,
    sources: ConnectionSources,
    runner: Arc<BatchRunner>,
    snapshot: watch::Sender<QueueSnapshot>,
}

impl DispatchLoop {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<DispatchEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                DispatchEvent::Submit(task) => {
                    let backend = task.backend();
                    debug!(backend = %backend, job = %task.job.job_name, queries = task.batch.len(), "Task queued");
                    self.queues[backend.index()].push_back(task);
                }
                DispatchEvent::Finished(backend) => {
                    let slot = &mut self.in_flight[backend.index()];
                    *slot = slot.saturating_sub(1);
                    self.finished += 1;
                    TASKS_IN_FLIGHT.with_label_values(&[backend.name()]).dec();
                }
                DispatchEvent::Drain => {
                    info!("Draining dispatcher queues");
                    self.draining = true;
                }
            }

            self.admit();
            self.publish();

            if self.draining && self.is_idle() {
                break;
            }
        }

        rx.close();
        while let Ok(event) = rx.try_recv() {
            if let DispatchEvent::Submit(task) = event {
                warn!(backend = %task.backend(), job = %task.job.job_name, "Task submitted during shutdown was dropped");
            }
        }
        info!(finished = self.finished, "Backend dispatcher stopped");
    }

    fn admit(&mut self) {
        for backend in Backend::ALL {
            let i = backend.index();
            match backend.admission() {
                Admission::Concurrent => {
                    while let Some(task) = self.queues[i].pop_front() {
                        self.launch(task);
                    }
                }
                Admission::SingleFlight => {
                    if self.in_flight[i] == 0 {
                        if let Some(task) = self.queues[i].pop_front() {
                            self.launch(task);
                        }
                    }
                }
            }
        }
    }

    fn launch(&mut self, task: BackendTask) {
        let backend = task.backend();
        self.in_flight[backend.index()] += 1;
        TASKS_IN_FLIGHT.with_label_values(&[backend.name()]).inc();

        let guard = FlightGuard {
            backend,
            events: self.events.clone(),
        };
        let workers = Arc::clone(&self.workers);
        let source = self.sources.get(backend);
        let runner = Arc::clone(&self.runner);

        tokio::spawn(async move {
            // Dropped last: the worker permit and the connection go back first
            let _guard = guard;
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            execute(source, &runner, task).await;
        });
    }

    fn is_idle(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty) && self.in_flight.iter().all(|n| *n == 0)
    }

    fn publish(&self) {
        let mut queued = [0; 3];
        for (slot, queue) in queued.iter_mut().zip(&self.queues) {
            *slot = queue.len();
        }
        self.snapshot.send_replace(QueueSnapshot {
            queued,
            in_flight: self.in_flight,
            finished: self.finished,
            draining: self.draining,
        });
    }
}

async fn execute(source: Option<Arc<dyn ConnectionSource>>, runner: &BatchRunner, task: BackendTask) {
    let backend = task.backend();
    let acquired = match source {
        Some(source) => source.acquire().await,
        None => Err(BenchError::ConnectionAcquisition {
            backend,
            reason: "no connection source configured".to_string(),
        }),
    };

    let mut client = match acquired {
        Ok(client) => client,
        Err(e) => {
            CONNECTION_FAILURES_TOTAL.with_label_values(&[backend.name()]).inc();
            error!(backend = %backend, job = %task.job.job_name, "Batch aborted: {}", e);
            return;
        }
    };

    runner.run(client.as_mut(), task).await;
}

/// Reports the end of a task to the loop however the task exits
struct FlightGuard {
    backend: Backend,
    events: mpsc::UnboundedSender<DispatchEvent>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let _ = self.events.send(DispatchEvent::Finished(self.backend));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ResultStore;
    use crate::types::BenchmarkJob;

    fn task(backend: Backend) -> BackendTask {
        let job = BenchmarkJob::new("SELECT 1", backend, "tpch", "noop").unwrap();
        BackendTask::new(Vec::new(), Arc::new(job))
    }

    #[test]
    fn test_snapshot_accessors() {
        let snapshot = QueueSnapshot {
            queued: [2, 0, 1],
            in_flight: [0, 1, 0],
            finished: 4,
            draining: false,
        };
        assert_eq!(snapshot.queued(Backend::MySQL), 2);
        assert_eq!(snapshot.in_flight(Backend::Postgres), 1);
        assert_eq!(snapshot.total_queued(), 3);
        assert!(!snapshot.is_idle());
        assert!(QueueSnapshot::default().is_idle());
    }

    #[tokio::test]
    async fn test_missing_source_finishes_task() {
        let store = Arc::new(ResultStore::new());
        let dispatcher = BackendDispatcher::start(
            &DispatcherConfig { workers: 2 },
            ConnectionSources::new(),
            Arc::new(BatchRunner::new(Arc::clone(&store))),
        );

        dispatcher.submit(task(Backend::DuckDB)).unwrap();
        dispatcher.submit(task(Backend::DuckDB)).unwrap();
        dispatcher.wait_idle().await;

        let snapshot = dispatcher.snapshot();
        assert_eq!(snapshot.finished, 2);
        assert!(snapshot.is_idle());
        assert!(store.is_empty());
        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_after_close_is_rejected() {
        let dispatcher = BackendDispatcher::start(
            &DispatcherConfig::default(),
            ConnectionSources::new(),
            Arc::new(BatchRunner::new(Arc::new(ResultStore::new()))),
        );
        dispatcher.close();
        assert!(matches!(
            dispatcher.submit(task(Backend::MySQL)),
            Err(BenchError::ShuttingDown)
        ));
        dispatcher.shutdown().await.unwrap();
    }
}
