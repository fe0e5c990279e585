#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cloudrec_core::models::{PodIngressRuleBackend, Vm};
use cloudrec_core::{keyed, Fetch, OrgId, ResourceKind, SnapshotSource, SyncError};
use cloudrec_store::{CycleOutcome, PodIngressRuleBackendListener, Recorder, RecorderConfig};

struct Fixed<R> {
    items: Vec<R>,
    calls: AtomicUsize,
    seen_org: std::sync::Mutex<Option<OrgId>>,
}

impl<R> Fixed<R> {
    fn new(items: Vec<R>) -> Arc<Self> { Arc::new(Self { items, calls: AtomicUsize::new(0), seen_org: std::sync::Mutex::new(None) }) }
}

impl<R: cloudrec_core::Record> SnapshotSource<R> for Fixed<R> {
    fn fetch(&self, org: OrgId) -> Result<Fetch<R>, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_org.lock().unwrap() = Some(org);
        Ok(Fetch::Ready(keyed(self.items.clone())))
    }
}

struct Broken;

impl SnapshotSource<Vm> for Broken {
    fn fetch(&self, org: OrgId) -> Result<Fetch<Vm>, SyncError> {
        Err(SyncError::SourceFetch { kind: ResourceKind::Vm, org, source: anyhow::anyhow!("db down") })
    }
}

fn backend(lcuuid: &str, service: i64) -> PodIngressRuleBackend {
    PodIngressRuleBackend { lcuuid: lcuuid.into(), pod_service_id: service, ..Default::default() }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kinds_run_independently_and_fail_independently() {
    let mut recorder = Recorder::new(OrgId(2), RecorderConfig::default());
    recorder.register::<Vm>(Arc::new(Broken));
    let backends = Fixed::new(vec![backend("b1", 10), backend("b2", 10), backend("b3", 12)]);
    let sync = recorder.register::<PodIngressRuleBackend>(backends.clone());
    let index = Arc::new(PodIngressRuleBackendListener::new());
    sync.register_listener(index.clone());

    assert_eq!(recorder.kinds(), &[ResourceKind::Vm, ResourceKind::PodIngressRuleBackend]);

    let results = recorder.run_all().await;
    assert_eq!(results.len(), 2);
    for (kind, res) in results {
        match kind {
            ResourceKind::Vm => assert!(res.is_err()),
            ResourceKind::PodIngressRuleBackend => assert_eq!(res.unwrap().outcome, CycleOutcome::Applied),
            other => panic!("unexpected kind {}", other),
        }
    }

    assert_eq!(*backends.seen_org.lock().unwrap(), Some(OrgId(2)));
    assert_eq!(index.backends_of(10), vec!["b1".to_string(), "b2".to_string()]);
    let typed = recorder.kind::<PodIngressRuleBackend>().unwrap();
    assert_eq!(typed.cache().len(), 3);
    assert!(recorder.kind::<Vm>().unwrap().cache().is_empty());

    let rows = recorder.runner(ResourceKind::PodIngressRuleBackend).unwrap().rows();
    let ids: Vec<String> = rows.iter().map(|r| r["lcuuid"].to_string()).collect();
    assert_eq!(ids, vec!["b1", "b2", "b3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn periodic_workers_cycle_until_shutdown() {
    let mut recorder = Recorder::new(OrgId(1), RecorderConfig::default());
    let vms = Fixed::new(vec![Vm { lcuuid: "a".into(), ..Default::default() }]);
    let backends = Fixed::new(vec![backend("b1", 10)]);
    recorder.register::<Vm>(vms.clone());
    recorder.register::<PodIngressRuleBackend>(backends.clone());

    let handle = recorder.spawn_periodic(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(80)).await;
    handle.shutdown().await;

    let vm_calls = vms.calls.load(Ordering::SeqCst);
    let backend_calls = backends.calls.load(Ordering::SeqCst);
    assert!(vm_calls >= 2, "vm cycles: {}", vm_calls);
    assert!(backend_calls >= 2, "backend cycles: {}", backend_calls);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(vms.calls.load(Ordering::SeqCst), vm_calls);
    assert_eq!(recorder.kind::<Vm>().unwrap().cache().epoch(), 1);
}
