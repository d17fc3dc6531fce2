//! Per-content job queue.
//!
//! Jobs for the same content item run strictly in arrival order, one at a
//! time; jobs for different content items run concurrently across the
//! worker pool. The queue keeps one FIFO per content id and signals a
//! content id on the ready channel only while no worker holds it, so each
//! id is owned by at most one worker at any moment.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use federation_core::{ContentId, FederationJob};
use tokio::sync::mpsc;

#[derive(Default)]
struct QueueState {
    /// Pending jobs per content id, oldest first.
    queues: HashMap<ContentId, VecDeque<FederationJob>>,
    /// Content ids currently signalled on the ready channel or held by a
    /// worker.
    scheduled: HashSet<ContentId>,
}

/// Work distribution point between job producers and the worker pool.
pub struct JobQueue {
    state: Mutex<QueueState>,
    ready_tx: mpsc::UnboundedSender<ContentId>,
}

impl JobQueue {
    /// Creates the queue and the ready channel workers consume.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ContentId>) {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            ready_tx,
        });
        (queue, ready_rx)
    }

    /// Adds a job. Signals the content id unless a worker already holds it,
    /// in which case [`JobQueue::finish`] re-signals.
    pub fn push(&self, job: FederationJob) {
        let content_id = job.content_id.clone();
        let signal = {
            let mut state = self.state.lock().expect("lock poisoned");
            state
                .queues
                .entry(content_id.clone())
                .or_default()
                .push_back(job);
            state.scheduled.insert(content_id.clone())
        };
        if signal {
            // Send fails only when the dispatcher is gone.
            let _ = self.ready_tx.send(content_id);
        }
    }

    /// Takes the oldest queued job for a content id.
    pub fn take_next(&self, content_id: &ContentId) -> Option<FederationJob> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.queues.get_mut(content_id)?.pop_front()
    }

    /// Releases a content id after its job finishes, re-signalling when
    /// more jobs arrived while the worker held it.
    pub fn finish(&self, content_id: &ContentId) {
        let resignal = {
            let mut state = self.state.lock().expect("lock poisoned");
            let has_more = state
                .queues
                .get(content_id)
                .is_some_and(|queue| !queue.is_empty());
            if !has_more {
                state.queues.remove(content_id);
                state.scheduled.remove(content_id);
            }
            has_more
        };
        if resignal {
            let _ = self.ready_tx.send(content_id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use federation_core::{JobOperation, Protocol};
    use tokio::sync::mpsc::error::TryRecvError;

    fn job(content: &str, operation: JobOperation) -> FederationJob {
        FederationJob::new(content, operation, vec![Protocol::RepoProtocol])
    }

    #[tokio::test]
    async fn push_signals_each_content_once() {
        let (queue, mut ready_rx) = JobQueue::new();
        queue.push(job("a", JobOperation::Create));
        queue.push(job("a", JobOperation::Update));

        assert_eq!(ready_rx.try_recv().unwrap(), ContentId::from_string("a"));
        assert!(matches!(ready_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn distinct_content_signals_independently() {
        let (queue, mut ready_rx) = JobQueue::new();
        queue.push(job("a", JobOperation::Create));
        queue.push(job("b", JobOperation::Create));

        assert_eq!(ready_rx.try_recv().unwrap(), ContentId::from_string("a"));
        assert_eq!(ready_rx.try_recv().unwrap(), ContentId::from_string("b"));
    }

    #[tokio::test]
    async fn jobs_drain_in_arrival_order() {
        let (queue, mut ready_rx) = JobQueue::new();
        queue.push(job("a", JobOperation::Create));
        queue.push(job("a", JobOperation::Update));
        queue.push(job("a", JobOperation::Delete));

        let id = ready_rx.try_recv().unwrap();
        assert_eq!(
            queue.take_next(&id).unwrap().operation,
            JobOperation::Create
        );
        queue.finish(&id);

        let id = ready_rx.try_recv().unwrap();
        assert_eq!(
            queue.take_next(&id).unwrap().operation,
            JobOperation::Update
        );
        queue.finish(&id);

        let id = ready_rx.try_recv().unwrap();
        assert_eq!(
            queue.take_next(&id).unwrap().operation,
            JobOperation::Delete
        );
        queue.finish(&id);

        assert!(matches!(ready_rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(queue.take_next(&ContentId::from_string("a")).is_none());
    }

    #[tokio::test]
    async fn finish_without_backlog_releases_content() {
        let (queue, mut ready_rx) = JobQueue::new();
        queue.push(job("a", JobOperation::Create));

        let id = ready_rx.try_recv().unwrap();
        queue.take_next(&id).unwrap();
        queue.finish(&id);

        // The id was released, so a fresh push signals again.
        queue.push(job("a", JobOperation::Delete));
        assert_eq!(ready_rx.try_recv().unwrap(), ContentId::from_string("a"));
    }

    #[tokio::test]
    async fn push_while_held_defers_signal_to_finish() {
        let (queue, mut ready_rx) = JobQueue::new();
        queue.push(job("a", JobOperation::Create));

        let id = ready_rx.try_recv().unwrap();
        queue.take_next(&id).unwrap();

        // Arrives while the worker still holds the id: no second signal yet.
        queue.push(job("a", JobOperation::Update));
        assert!(matches!(ready_rx.try_recv(), Err(TryRecvError::Empty)));

        queue.finish(&id);
        assert_eq!(ready_rx.try_recv().unwrap(), ContentId::from_string("a"));
    }
}
