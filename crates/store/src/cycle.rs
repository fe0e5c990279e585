//! One kind's refresh cycle: fetch → diff → apply → notify.

use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use cloudrec_core::{diff, Fetch, OrgId, Record, ResourceKind, Scope, SnapshotSource, SyncError};
use metrics::{counter, histogram};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::cache::Cache;
use crate::config::RecorderConfig;
use crate::listener::{Listener, ListenerFailure, ListenerRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Fetching,
    Diffing,
    Applying,
    Notifying,
    /// The last cycle hit a fatal error. Left as-is until the next cycle starts.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum CycleOutcome {
    Applied,
    /// Snapshot matched the cache; nothing applied, nobody notified.
    Unchanged,
    /// Backend not configured; nothing fetched.
    Skipped(String),
}

impl CycleOutcome {
    fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Applied => "applied",
            CycleOutcome::Unchanged => "unchanged",
            CycleOutcome::Skipped(_) => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub kind: ResourceKind,
    pub org: OrgId,
    pub outcome: CycleOutcome,
    pub epoch: u64,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub listener_errors: Vec<ListenerFailure>,
    pub elapsed_ms: u64,
    pub finished_at: i64,
}

type FetchTask<R> = JoinHandle<Result<Fetch<R>, SyncError>>;

/// Cache, listeners and cycle driver for one kind of one tenant.
pub struct KindSync<R: Record> {
    org: OrgId,
    source: Arc<dyn SnapshotSource<R>>,
    cache: Arc<Cache<R>>,
    listeners: ListenerRegistry<R>,
    gate: Mutex<()>,
    state_tx: watch::Sender<CycleState>,
    fetch_timeout: Duration,
    /// Blocking fetch that outlived its cycle's timeout. At most one per kind.
    inflight: std::sync::Mutex<Option<FetchTask<R>>>,
}

impl<R: Record> KindSync<R> {
    pub fn new(org: OrgId, source: Arc<dyn SnapshotSource<R>>, config: &RecorderConfig) -> Self {
        let (state_tx, _) = watch::channel(CycleState::Idle);
        Self {
            org,
            source,
            cache: Arc::new(Cache::new()),
            listeners: ListenerRegistry::default(),
            gate: Mutex::new(()),
            state_tx,
            fetch_timeout: config.fetch_timeout,
            inflight: std::sync::Mutex::new(None),
        }
    }

    pub fn org(&self) -> OrgId { self.org }

    /// Read-only handle for lookups and snapshots.
    pub fn cache(&self) -> Arc<Cache<R>> { Arc::clone(&self.cache) }

    pub fn register_listener(&self, listener: Arc<dyn Listener<R>>) { self.listeners.register(listener) }

    pub fn listener_count(&self) -> usize { self.listeners.len() }

    pub fn state(&self) -> CycleState { *self.state_tx.borrow() }

    pub fn subscribe_state(&self) -> watch::Receiver<CycleState> { self.state_tx.subscribe() }

    fn set_state(&self, s: CycleState) { self.state_tx.send_replace(s); }

    /// Run one cycle. Cycles of the same kind are serialized; a failed cycle
    /// leaves the cache and every listener exactly as they were.
    pub async fn run_cycle(&self) -> Result<CycleReport, SyncError> {
        let _gate = self.gate.lock().await;
        let span = info_span!("cycle", kind = %R::KIND, org_id = %self.org);
        let started = Instant::now();
        let res = self.cycle(started).instrument(span).await;
        let outcome = match &res {
            Ok(report) => report.outcome.label(),
            Err(_) => "failed",
        };
        counter!("recorder_cycle_total", 1u64, "kind" => R::KIND.as_str(), "outcome" => outcome);
        histogram!("recorder_cycle_ms", started.elapsed().as_secs_f64() * 1000.0, "kind" => R::KIND.as_str());
        res
    }

    async fn cycle(&self, started: Instant) -> Result<CycleReport, SyncError> {
        self.set_state(CycleState::Fetching);
        let fetched = match self.fetch().await {
            Ok(f) => f,
            Err(e) => {
                self.set_state(CycleState::Failed);
                warn!(error = %e, "cycle failed while fetching; cache untouched");
                return Err(e);
            }
        };
        let new = match fetched {
            Fetch::Ready(snap) => snap,
            Fetch::Skip(reason) => {
                self.set_state(CycleState::Idle);
                debug!(reason = %reason, "cycle skipped");
                return Ok(self.report(CycleOutcome::Skipped(reason), 0, 0, 0, Vec::new(), started));
            }
        };

        self.set_state(CycleState::Diffing);
        let current = self.cache.snapshot();
        let cs = diff(self.org, &current.items, &new);
        if cs.is_empty() {
            self.set_state(CycleState::Idle);
            debug!(items = new.len(), "snapshot unchanged");
            return Ok(self.report(CycleOutcome::Unchanged, 0, 0, 0, Vec::new(), started));
        }

        self.set_state(CycleState::Applying);
        let applied = match self.cache.apply(&cs) {
            Ok(a) => a,
            Err(e) => {
                self.set_state(CycleState::Failed);
                warn!(error = %e, "change set rejected; cache untouched");
                return Err(SyncError::parse(R::KIND, self.org, e));
            }
        };
        let kind = R::KIND.as_str();
        counter!("recorder_changes_total", applied.added.len() as u64, "kind" => kind, "op" => "added");
        counter!("recorder_changes_total", applied.updated.len() as u64, "kind" => kind, "op" => "updated");
        counter!("recorder_changes_total", applied.deleted.len() as u64, "kind" => kind, "op" => "deleted");

        self.set_state(CycleState::Notifying);
        let failures = self.listeners.notify(Scope { org: self.org, kind: R::KIND }, &applied);
        self.set_state(CycleState::Idle);

        info!(
            epoch = applied.epoch,
            added = applied.added.len(),
            updated = applied.updated.len(),
            deleted = applied.deleted.len(),
            listener_errors = failures.len(),
            "cycle applied"
        );
        Ok(self.report(CycleOutcome::Applied, applied.added.len(), applied.updated.len(), applied.deleted.len(), failures, started))
    }

    /// Fetch a snapshot off the runtime, bounded by `fetch_timeout`.
    ///
    /// A fetch that times out keeps running on the blocking pool. The next
    /// cycle waits on that same task instead of starting another one, so a
    /// slow backend never sees two fetches for one kind at a time. A parked
    /// task that finished in the meantime is dropped and a fresh fetch starts.
    async fn fetch(&self) -> Result<Fetch<R>, SyncError> {
        let org = self.org;
        let parked = self.inflight.lock().unwrap_or_else(PoisonError::into_inner).take();
        let mut task = match parked {
            Some(task) if !task.is_finished() => {
                debug!("previous fetch still running; waiting on it");
                task
            }
            parked => {
                if parked.is_some() {
                    debug!("discarding result of a timed-out fetch");
                }
                let source = Arc::clone(&self.source);
                tokio::task::spawn_blocking(move || source.fetch(org))
            }
        };
        match tokio::time::timeout(self.fetch_timeout, &mut task).await {
            Ok(Ok(res)) => res,
            Ok(Err(join)) => Err(SyncError::SourceFetch { kind: R::KIND, org, source: anyhow!("fetch task aborted: {}", join) }),
            Err(_) => {
                *self.inflight.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
                Err(SyncError::Timeout { kind: R::KIND, org, secs: self.fetch_timeout.as_secs() })
            }
        }
    }

    fn report(
        &self,
        outcome: CycleOutcome,
        added: usize,
        updated: usize,
        deleted: usize,
        listener_errors: Vec<ListenerFailure>,
        started: Instant,
    ) -> CycleReport {
        CycleReport {
            kind: R::KIND,
            org: self.org,
            outcome,
            epoch: self.cache.epoch(),
            added,
            updated,
            deleted,
            listener_errors,
            elapsed_ms: started.elapsed().as_millis() as u64,
            finished_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_with_reason() {
        let skipped = serde_json::to_value(CycleOutcome::Skipped("no association store".into())).unwrap();
        assert_eq!(skipped, serde_json::json!({"outcome": "skipped", "reason": "no association store"}));
        assert_eq!(serde_json::to_value(CycleOutcome::Unchanged).unwrap(), serde_json::json!({"outcome": "unchanged"}));
        assert_eq!(CycleOutcome::Applied.label(), "applied");
    }
}
