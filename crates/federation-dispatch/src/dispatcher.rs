//! The sync dispatcher: a fixed worker pool draining the per-content queue.
//!
//! Each job targets one content item and a set of protocols. Workers walk
//! the protocols independently, so one network failing never blocks the
//! others. Every remote call lands its result in the mapping table before
//! the worker moves on; the in-memory queue can be lost at any time and the
//! reconciliation sweep rebuilds the backlog from mapping status.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use federation_core::{
    AdapterError, AdapterResult, CanonicalContent, ContentId, EmbedKind, FederationConfig,
    FederationJob, JobOperation, Protocol, ProtocolAdapter, RemoteRef,
};
use federation_store::{Database, FederationMapping, MappingStatus};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{DispatchError, DispatchResult};
use crate::queue::JobQueue;

/// Database handle shared between the dispatcher, the importer, and the
/// operator surface.
pub type SharedDatabase = Arc<Mutex<Database>>;

type AdapterMap = HashMap<Protocol, Arc<dyn ProtocolAdapter>>;

/// Replies waiting for their parent to sync, keyed by the parent's id and
/// the protocol the parent has not reached yet.
type DeferredReplies = HashMap<(ContentId, Protocol), Vec<FederationJob>>;

/// Runtime tuning for the sync dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of concurrent workers draining the job queue.
    pub worker_count: usize,
    /// Attempts allowed per (content, protocol) before the mapping is
    /// marked failed.
    pub retry_ceiling: u32,
    /// Delay before the first retry; doubles per subsequent attempt.
    pub backoff_base: Duration,
    /// Upper bound on the retry delay.
    pub backoff_max: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&FederationConfig::default())
    }
}

impl From<&FederationConfig> for DispatcherConfig {
    fn from(config: &FederationConfig) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            retry_ceiling: config.retry_ceiling,
            backoff_base: config.backoff_base(),
            backoff_max: config.backoff_max(),
        }
    }
}

/// Owns the worker pool and the job queue.
///
/// Constructed stopped; [`SyncDispatcher::start`] spawns the workers and the
/// task feeding change-event jobs into the queue. [`SyncDispatcher::shutdown`]
/// lets in-flight jobs finish and abandons the rest to the next
/// reconciliation sweep.
pub struct SyncDispatcher {
    config: DispatcherConfig,
    db: SharedDatabase,
    adapters: Arc<AdapterMap>,
    queue: Arc<JobQueue>,
    ready_rx: Mutex<Option<mpsc::UnboundedReceiver<ContentId>>>,
    job_rx: Mutex<Option<mpsc::UnboundedReceiver<FederationJob>>>,
    deferred: Arc<Mutex<DeferredReplies>>,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncDispatcher {
    /// Creates a stopped dispatcher. `job_rx` is the receiving end of the
    /// change-event channel; jobs can also be queued directly with
    /// [`SyncDispatcher::enqueue`].
    pub fn new(
        config: DispatcherConfig,
        db: SharedDatabase,
        adapters: Vec<Arc<dyn ProtocolAdapter>>,
        job_rx: mpsc::UnboundedReceiver<FederationJob>,
    ) -> Self {
        let adapters: AdapterMap = adapters
            .into_iter()
            .map(|adapter| (adapter.protocol(), adapter))
            .collect();
        let (queue, ready_rx) = JobQueue::new();
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            db,
            adapters: Arc::new(adapters),
            queue,
            ready_rx: Mutex::new(Some(ready_rx)),
            job_rx: Mutex::new(Some(job_rx)),
            deferred: Arc::new(Mutex::new(HashMap::new())),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the job feed and the worker pool. Panics when called twice.
    pub fn start(&self) {
        let mut job_rx = self
            .job_rx
            .lock()
            .expect("lock poisoned")
            .take()
            .expect("dispatcher already started");
        let ready_rx = self
            .ready_rx
            .lock()
            .expect("lock poisoned")
            .take()
            .expect("dispatcher already started");
        let ready_rx = Arc::new(tokio::sync::Mutex::new(ready_rx));

        let mut handles = self.handles.lock().expect("lock poisoned");

        let queue = self.queue.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    maybe_job = job_rx.recv() => match maybe_job {
                        Some(job) => queue.push(job),
                        None => break,
                    },
                }
            }
            debug!("Job feed stopped");
        }));

        let ctx = WorkerContext {
            config: self.config.clone(),
            db: self.db.clone(),
            adapters: self.adapters.clone(),
            queue: self.queue.clone(),
            deferred: self.deferred.clone(),
        };
        for worker_id in 0..self.config.worker_count {
            let ctx = ctx.clone();
            let ready_rx = ready_rx.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                ctx,
                ready_rx,
                shutdown_rx,
            )));
        }

        info!(workers = self.config.worker_count, "Sync dispatcher started");
    }

    /// Signals shutdown and waits for the pool to stop. Jobs already being
    /// processed run to completion; queued jobs are not started.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().expect("lock poisoned");
            guard.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        info!("Sync dispatcher stopped");
    }

    /// Queues a job directly, bypassing the change-event channel.
    pub fn enqueue(&self, job: FederationJob) {
        self.queue.push(job);
    }

    /// Re-drives every pending mapping left over from a previous run.
    ///
    /// Pending is the only status that means "work was accepted but never
    /// confirmed"; synced, failed, and tombstoned rows are left alone.
    /// Returns the number of (content, protocol) pairs queued.
    pub fn reconcile_pending(&self) -> DispatchResult<usize> {
        let mappings = {
            let db = self.db.lock().expect("lock poisoned");
            db.list_mappings_by_status(MappingStatus::Pending)?
        };
        let count = self.enqueue_for_mappings(mappings);
        if count > 0 {
            info!(count, "Reconciliation sweep queued unconfirmed mappings");
        }
        Ok(count)
    }

    /// Resets every mapping in the given status to pending with a fresh
    /// retry budget and queues it again. Returns the number of
    /// (content, protocol) pairs queued.
    pub fn resweep(&self, status: MappingStatus) -> DispatchResult<usize> {
        if matches!(status, MappingStatus::Synced | MappingStatus::Tombstoned) {
            return Err(DispatchError::ResweepNotAllowed(status));
        }

        let mappings = {
            let db = self.db.lock().expect("lock poisoned");
            let mappings = db.list_mappings_by_status(status)?;
            for mapping in &mappings {
                db.reset_for_redrive(&mapping.content_id, mapping.protocol)?;
            }
            mappings
        };
        let count = self.enqueue_for_mappings(mappings);
        info!(count, status = %status, "Resweep queued mappings");
        Ok(count)
    }

    /// Turns mapping rows into jobs, one per content item. Deleted content
    /// gets a delete job so its tombstone still lands; everything else is
    /// re-driven as a create, which the upsert path turns into an update
    /// when a remote id already exists.
    fn enqueue_for_mappings(&self, mappings: Vec<FederationMapping>) -> usize {
        let mut grouped: Vec<(ContentId, Vec<Protocol>)> = Vec::new();
        for mapping in mappings {
            match grouped.iter_mut().find(|(id, _)| *id == mapping.content_id) {
                Some((_, protocols)) => protocols.push(mapping.protocol),
                None => grouped.push((mapping.content_id, vec![mapping.protocol])),
            }
        }

        let mut jobs = Vec::new();
        {
            let db = self.db.lock().expect("lock poisoned");
            for (content_id, protocols) in grouped {
                match db.get_content(&content_id) {
                    Ok(Some(content)) => {
                        let operation = if content.is_deleted() {
                            JobOperation::Delete
                        } else {
                            JobOperation::Create
                        };
                        jobs.push(FederationJob::new(content_id, operation, protocols));
                    }
                    Ok(None) => {
                        warn!(content_id = %content_id, "Mapping without a content row, skipping");
                    }
                    Err(err) => {
                        error!(content_id = %content_id, error = %err, "Content lookup failed during sweep");
                    }
                }
            }
        }

        let count = jobs.iter().map(|job| job.protocols.len()).sum();
        for job in jobs {
            self.queue.push(job);
        }
        count
    }
}

impl std::fmt::Debug for SyncDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDispatcher")
            .field("config", &self.config)
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Shared state cloned into each worker task.
#[derive(Clone)]
struct WorkerContext {
    config: DispatcherConfig,
    db: SharedDatabase,
    adapters: Arc<AdapterMap>,
    queue: Arc<JobQueue>,
    deferred: Arc<Mutex<DeferredReplies>>,
}

/// What one (content, protocol) dispatch concluded.
enum Outcome {
    /// The remote copy now matches the canonical item.
    Published,
    /// The remote copy is confirmed gone.
    Tombstoned,
    /// Duplicate delivery or tombstone guard; nothing to do.
    Skipped,
    /// Reply parked until its parent syncs on this protocol.
    Deferred,
    /// Transient failure recorded; retry after backoff.
    TransientFailure { attempts: u32 },
    /// Budget exhausted or the remote rejected the item.
    Failed,
}

async fn worker_loop(
    worker_id: usize,
    ctx: WorkerContext,
    ready_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<ContentId>>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker_id, "Federation worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let next = {
            let mut ready_rx = ready_rx.lock().await;
            tokio::select! {
                _ = shutdown_rx.changed() => None,
                maybe_id = ready_rx.recv() => maybe_id,
            }
        };
        let Some(content_id) = next else { break };

        if let Some(job) = ctx.queue.take_next(&content_id) {
            process_job(&ctx, job).await;
        }
        ctx.queue.finish(&content_id);
    }
    debug!(worker_id, "Federation worker stopped");
}

async fn process_job(ctx: &WorkerContext, job: FederationJob) {
    let content = {
        let db = ctx.db.lock().expect("lock poisoned");
        match db.get_content(&job.content_id) {
            Ok(Some(content)) => content,
            Ok(None) => {
                warn!(
                    content_id = %job.content_id,
                    operation = %job.operation,
                    "Job references unknown content, dropping"
                );
                return;
            }
            Err(err) => {
                error!(content_id = %job.content_id, error = %err, "Content lookup failed, dropping job");
                return;
            }
        }
    };

    // A late create or update for locally deleted content must not publish
    // it, so the operation folds to delete whenever the row is soft-deleted.
    let operation = if content.is_deleted() {
        JobOperation::Delete
    } else {
        job.operation
    };

    let mut retries: Vec<(Protocol, u32)> = Vec::new();
    for &protocol in &job.protocols {
        let Some(adapter) = ctx.adapters.get(&protocol) else {
            debug!(content_id = %content.id, protocol = %protocol, "No adapter configured, skipping");
            continue;
        };

        let outcome = match operation {
            JobOperation::Create | JobOperation::Update => {
                dispatch_upsert(ctx, adapter.as_ref(), &content, protocol).await
            }
            JobOperation::Delete => {
                dispatch_delete(ctx, adapter.as_ref(), &content, protocol).await
            }
        };

        match outcome {
            Ok(Outcome::Published) => release_deferred(ctx, &content.id, protocol),
            Ok(Outcome::TransientFailure { attempts }) => retries.push((protocol, attempts)),
            Ok(_) => {}
            Err(err) => {
                // Mapping state is behind but still pending; the next
                // reconciliation sweep re-drives it.
                error!(
                    content_id = %content.id,
                    protocol = %protocol,
                    error = %err,
                    "Store error while dispatching, leaving protocol to the sweep"
                );
            }
        }
    }

    for (protocol, attempts) in retries {
        schedule_retry(ctx, &job, protocol, attempts);
    }
}

/// Creates or updates the remote copy on one protocol.
async fn dispatch_upsert(
    ctx: &WorkerContext,
    adapter: &dyn ProtocolAdapter,
    content: &CanonicalContent,
    protocol: Protocol,
) -> DispatchResult<Outcome> {
    // The pending row goes in before any remote call so a crash mid-dispatch
    // leaves a trace the reconciliation sweep can find.
    let mapping = {
        let db = ctx.db.lock().expect("lock poisoned");
        db.ensure_mapping(&content.id, protocol)?
    };

    if mapping.is_tombstoned() {
        debug!(content_id = %content.id, protocol = %protocol, "Mapping tombstoned, ignoring create/update");
        return Ok(Outcome::Skipped);
    }
    if mapping.is_synced() {
        if let Some(last_attempt) = mapping.last_attempt_at {
            if content.updated_at <= last_attempt {
                debug!(content_id = %content.id, protocol = %protocol, "Remote copy already current");
                return Ok(Outcome::Skipped);
            }
        }
    }

    let reply = match resolve_reply(ctx, content, protocol)? {
        ReplyResolution::NotAReply => None,
        ReplyResolution::Ready(remote) => Some(remote),
        ReplyResolution::AwaitingParent(parent_id) => {
            park_reply(ctx, &parent_id, content, protocol);
            return Ok(Outcome::Deferred);
        }
    };

    let result = match mapping.remote_ref() {
        Some(remote) => update_remote(adapter, &remote, content, reply.as_ref()).await,
        None => adapter
            .publish(content, reply.as_ref())
            .await
            .map(|receipt| (receipt.remote, receipt.dropped)),
    };

    match result {
        Ok((remote, dropped)) => {
            if !dropped.is_empty() {
                warn!(
                    content_id = %content.id,
                    protocol = %protocol,
                    dropped = ?dropped,
                    "Embeds the protocol cannot carry were dropped"
                );
            }
            {
                let db = ctx.db.lock().expect("lock poisoned");
                db.mark_sync_success(&content.id, protocol, &remote, content.updated_at)?;
            }
            info!(content_id = %content.id, protocol = %protocol, remote_id = %remote.id, "Content synced");
            Ok(Outcome::Published)
        }
        Err(err) => record_failure(ctx, &content.id, protocol, err),
    }
}

/// Updates the remote record, falling back to a fresh publish when the
/// remote reports the record gone.
async fn update_remote(
    adapter: &dyn ProtocolAdapter,
    remote: &RemoteRef,
    content: &CanonicalContent,
    reply: Option<&RemoteRef>,
) -> AdapterResult<(RemoteRef, Vec<EmbedKind>)> {
    match adapter.update(remote, content, reply).await {
        Ok(receipt) => {
            let digest = receipt.digest.or_else(|| remote.digest.clone());
            let remote = RemoteRef {
                id: remote.id.clone(),
                digest,
            };
            Ok((remote, receipt.dropped))
        }
        Err(AdapterError::NotFound(_)) => {
            info!(content_id = %content.id, remote_id = %remote.id, "Remote record vanished, re-publishing");
            let receipt = adapter.publish(content, reply).await?;
            Ok((receipt.remote, receipt.dropped))
        }
        Err(err) => Err(err),
    }
}

/// Deletes the remote copy on one protocol and tombstones the mapping.
async fn dispatch_delete(
    ctx: &WorkerContext,
    adapter: &dyn ProtocolAdapter,
    content: &CanonicalContent,
    protocol: Protocol,
) -> DispatchResult<Outcome> {
    let mapping = {
        let db = ctx.db.lock().expect("lock poisoned");
        db.get_mapping(&content.id, protocol)?
    };

    let remote = match &mapping {
        Some(mapping) if mapping.is_tombstoned() => {
            debug!(content_id = %content.id, protocol = %protocol, "Already tombstoned");
            return Ok(Outcome::Skipped);
        }
        Some(mapping) => mapping.remote_ref(),
        // Never federated here. Tombstoning anyway blocks a late create
        // from publishing deleted content.
        None => None,
    };

    if let Some(remote) = remote {
        match adapter.delete(&remote).await {
            // An already-absent remote record counts as deleted.
            Ok(()) | Err(AdapterError::NotFound(_)) => {}
            Err(err) => return record_failure(ctx, &content.id, protocol, err),
        }
    }

    {
        let db = ctx.db.lock().expect("lock poisoned");
        db.mark_tombstoned(&content.id, protocol)?;
    }
    info!(content_id = %content.id, protocol = %protocol, "Remote copy tombstoned");
    Ok(Outcome::Tombstoned)
}

/// How the parent of a reply stands on one protocol.
enum ReplyResolution {
    NotAReply,
    /// Parent synced; its remote reference threads the reply.
    Ready(RemoteRef),
    /// Parent missing, pending, failed, or tombstoned on this protocol.
    AwaitingParent(ContentId),
}

fn resolve_reply(
    ctx: &WorkerContext,
    content: &CanonicalContent,
    protocol: Protocol,
) -> DispatchResult<ReplyResolution> {
    let Some(parent_id) = &content.reply_to_id else {
        return Ok(ReplyResolution::NotAReply);
    };

    let parent = {
        let db = ctx.db.lock().expect("lock poisoned");
        db.get_mapping(parent_id, protocol)?
    };
    match parent
        .filter(|mapping| mapping.is_synced())
        .and_then(|mapping| mapping.remote_ref())
    {
        Some(remote) => Ok(ReplyResolution::Ready(remote)),
        None => Ok(ReplyResolution::AwaitingParent(parent_id.clone())),
    }
}

/// Parks a reply until its parent syncs on the protocol. Parking is not an
/// attempt: the retry budget stays untouched. The parked job lives in
/// memory only; its pending mapping row is what survives a restart, and the
/// reconciliation sweep re-drives it from there.
fn park_reply(
    ctx: &WorkerContext,
    parent_id: &ContentId,
    content: &CanonicalContent,
    protocol: Protocol,
) {
    let mut deferred = ctx.deferred.lock().expect("lock poisoned");
    let slot = deferred.entry((parent_id.clone(), protocol)).or_default();
    if slot.iter().any(|job| job.content_id == content.id) {
        return;
    }
    debug!(
        content_id = %content.id,
        parent_id = %parent_id,
        protocol = %protocol,
        "Reply parked until parent syncs"
    );
    slot.push(FederationJob::new(
        content.id.clone(),
        JobOperation::Create,
        vec![protocol],
    ));
}

/// Re-queues replies that were waiting for this content to sync.
fn release_deferred(ctx: &WorkerContext, parent_id: &ContentId, protocol: Protocol) {
    let jobs = {
        let mut deferred = ctx.deferred.lock().expect("lock poisoned");
        deferred.remove(&(parent_id.clone(), protocol))
    };
    let Some(jobs) = jobs else { return };
    for job in jobs {
        debug!(
            content_id = %job.content_id,
            parent_id = %parent_id,
            protocol = %protocol,
            "Parent synced, releasing parked reply"
        );
        ctx.queue.push(job);
    }
}

/// Records a failed attempt and decides between retry and failed.
fn record_failure(
    ctx: &WorkerContext,
    content_id: &ContentId,
    protocol: Protocol,
    err: AdapterError,
) -> DispatchResult<Outcome> {
    let db = ctx.db.lock().expect("lock poisoned");
    let attempts = db.record_failed_attempt(content_id, protocol, &err.to_string())?;

    if err.is_transient() && attempts < ctx.config.retry_ceiling {
        return Ok(Outcome::TransientFailure { attempts });
    }

    db.mark_failed(content_id, protocol)?;
    if err.is_transient() {
        error!(
            content_id = %content_id,
            protocol = %protocol,
            attempts,
            error = %err,
            "Retry budget exhausted, mapping marked failed"
        );
    } else {
        error!(
            content_id = %content_id,
            protocol = %protocol,
            error = %err,
            "Permanent federation failure, mapping marked failed"
        );
    }
    Ok(Outcome::Failed)
}

fn schedule_retry(ctx: &WorkerContext, job: &FederationJob, protocol: Protocol, attempts: u32) {
    let delay = compute_backoff(attempts, &ctx.config);
    warn!(
        content_id = %job.content_id,
        protocol = %protocol,
        attempt = attempts,
        delay_secs = delay.as_secs(),
        "Transient federation failure, retry scheduled"
    );
    let retry = job.narrowed_to(vec![protocol]);
    let queue = ctx.queue.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        queue.push(retry);
    });
}

/// Delay before the next attempt after `attempt_count` failures:
/// `base * 2^(attempt_count - 1)`, capped at `backoff_max`.
fn compute_backoff(attempt_count: u32, config: &DispatcherConfig) -> Duration {
    if attempt_count == 0 {
        return Duration::ZERO;
    }
    let base_ms = config.backoff_base.as_millis() as u64;
    let max_ms = config.backoff_max.as_millis() as u64;
    let multiplier = 1u64
        .checked_shl(attempt_count.saturating_sub(1))
        .unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DispatcherConfig {
        DispatcherConfig::default()
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = config();
        assert_eq!(compute_backoff(1, &config), Duration::from_secs(2));
        assert_eq!(compute_backoff(2, &config), Duration::from_secs(4));
        assert_eq!(compute_backoff(3, &config), Duration::from_secs(8));
        assert_eq!(compute_backoff(4, &config), Duration::from_secs(16));
        assert_eq!(compute_backoff(5, &config), Duration::from_secs(32));
    }

    #[test]
    fn backoff_caps_at_max() {
        let config = config();
        assert_eq!(compute_backoff(9, &config), Duration::from_secs(300));
        assert_eq!(compute_backoff(30, &config), Duration::from_secs(300));
    }

    #[test]
    fn backoff_survives_extreme_attempt_counts() {
        let config = config();
        assert_eq!(compute_backoff(80, &config), Duration::from_secs(300));
        assert_eq!(compute_backoff(u32::MAX, &config), Duration::from_secs(300));
    }

    #[test]
    fn backoff_zero_attempts_is_immediate() {
        assert_eq!(compute_backoff(0, &config()), Duration::ZERO);
    }

    #[test]
    fn dispatcher_config_from_federation_config() {
        let mut federation = FederationConfig::default();
        federation.worker_count = 8;
        federation.retry_ceiling = 3;
        federation.backoff_base_secs = 1;
        federation.backoff_max_secs = 60;

        let config = DispatcherConfig::from(&federation);
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.retry_ceiling, 3);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert_eq!(config.backoff_max, Duration::from_secs(60));
    }

    #[test]
    fn dispatcher_config_floors_worker_count() {
        let mut federation = FederationConfig::default();
        federation.worker_count = 0;
        assert_eq!(DispatcherConfig::from(&federation).worker_count, 1);
    }

    #[test]
    fn default_config_matches_engine_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.retry_ceiling, 5);
        assert_eq!(config.backoff_base, Duration::from_secs(2));
        assert_eq!(config.backoff_max, Duration::from_secs(300));
    }
}
