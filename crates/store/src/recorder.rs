//! Process-scoped owner of every configured kind for one tenant.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use cloudrec_core::{AttrRow, OrgId, Record, ResourceKind, SnapshotSource, SyncError};
use rustc_hash::FxHashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RecorderConfig;
use crate::cycle::{CycleReport, CycleState, KindSync};

/// Type-erased view of a `KindSync` so kinds of different item types can be driven together.
#[async_trait::async_trait]
pub trait CycleRunner: Send + Sync {
    fn kind(&self) -> ResourceKind;
    fn state(&self) -> CycleState;
    fn cached(&self) -> usize;
    /// Cache contents as attribute rows, sorted by key.
    fn rows(&self) -> Vec<AttrRow>;
    async fn run(&self) -> Result<CycleReport, SyncError>;
}

#[async_trait::async_trait]
impl<R: Record> CycleRunner for KindSync<R> {
    fn kind(&self) -> ResourceKind { R::KIND }

    fn state(&self) -> CycleState { KindSync::state(self) }

    fn cached(&self) -> usize { self.cache().len() }

    fn rows(&self) -> Vec<AttrRow> {
        let snap = self.cache().snapshot();
        let mut items: Vec<&R> = snap.items.values().collect();
        items.sort_by_key(|a| a.key());
        items.into_iter().map(|r| r.to_row()).collect()
    }

    async fn run(&self) -> Result<CycleReport, SyncError> { self.run_cycle().await }
}

pub struct Recorder {
    org: OrgId,
    config: RecorderConfig,
    order: Vec<ResourceKind>,
    runners: FxHashMap<ResourceKind, Arc<dyn CycleRunner>>,
    typed: FxHashMap<ResourceKind, Arc<dyn Any + Send + Sync>>,
}

impl Recorder {
    pub fn new(org: OrgId, config: RecorderConfig) -> Self {
        Self { org, config, order: Vec::new(), runners: FxHashMap::default(), typed: FxHashMap::default() }
    }

    pub fn org(&self) -> OrgId { self.org }

    pub fn config(&self) -> &RecorderConfig { &self.config }

    /// Register a kind with its snapshot source. Registering a kind twice
    /// replaces the earlier entry (and its cache).
    pub fn register<R: Record>(&mut self, source: Arc<dyn SnapshotSource<R>>) -> Arc<KindSync<R>> {
        let sync = Arc::new(KindSync::new(self.org, source, &self.config));
        if self.runners.insert(R::KIND, sync.clone()).is_some() {
            warn!(kind = %R::KIND, org_id = %self.org, "kind registered twice; replacing");
        } else {
            self.order.push(R::KIND);
        }
        self.typed.insert(R::KIND, sync.clone());
        debug!(kind = %R::KIND, org_id = %self.org, "kind registered");
        sync
    }

    pub fn kind<R: Record>(&self) -> Option<Arc<KindSync<R>>> {
        self.typed.get(&R::KIND).cloned()?.downcast::<KindSync<R>>().ok()
    }

    pub fn runner(&self, kind: ResourceKind) -> Option<Arc<dyn CycleRunner>> { self.runners.get(&kind).cloned() }

    /// Registered kinds in registration order.
    pub fn kinds(&self) -> &[ResourceKind] { &self.order }

    /// Run one cycle of every kind concurrently. Kinds fail independently.
    pub async fn run_all(&self) -> Vec<(ResourceKind, Result<CycleReport, SyncError>)> {
        let runs = self.order.iter().filter_map(|k| self.runners.get(k).cloned()).map(|r| async move {
            let res = r.run().await;
            (r.kind(), res)
        });
        futures::future::join_all(runs).await
    }

    /// Spawn one worker per kind, each cycling on `interval`. Cycles of one
    /// kind never overlap; kinds never wait on each other.
    pub fn spawn_periodic(&self, interval: Duration) -> RecorderHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(self.order.len());
        for kind in self.order.iter() {
            let Some(runner) = self.runners.get(kind).cloned() else { continue };
            let mut stop = shutdown_rx.clone();
            let org = self.org;
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = runner.run().await {
                                debug!(kind = %runner.kind(), org_id = %org, error = %e, "cycle will retry on next tick");
                            }
                        }
                        _ = stop.changed() => break,
                    }
                }
                debug!(kind = %runner.kind(), org_id = %org, "kind worker stopped");
            }));
        }
        info!(org_id = %self.org, kinds = tasks.len(), interval_secs = interval.as_secs(), "periodic recorder started");
        RecorderHandle { shutdown_tx, tasks }
    }
}

/// Running periodic workers. Dropping the handle also stops them, without waiting.
pub struct RecorderHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RecorderHandle {
    /// Stop every worker once its in-flight cycle finishes.
    pub async fn shutdown(self) {
        self.shutdown_tx.send_replace(true);
        for t in self.tasks {
            if let Err(e) = t.await {
                warn!(error = %e, "kind worker ended abnormally");
            }
        }
        info!("periodic recorder stopped");
    }
}
