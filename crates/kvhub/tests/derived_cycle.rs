#![forbid(unsafe_code)]

use std::sync::Arc;

use cloudrec_core::models::{IpResource, IpResourceKey};
use cloudrec_core::{AttrRow, AttrValue, OrgId, RowSource};
use cloudrec_kvhub::{IpResourceSource, MemoryKv, IP_RESOURCE_NAMESPACE};
use cloudrec_store::{CycleOutcome, KindSync, RecorderConfig};

struct VmUids;

impl RowSource for VmUids {
    fn fetch_rows(&self, _org: OrgId, table: &str, _columns: &[&str]) -> anyhow::Result<Vec<AttrRow>> {
        if table != "vm" {
            return Ok(Vec::new());
        }
        let mut r = AttrRow::new();
        r.insert("id".into(), AttrValue::Int(42));
        r.insert("uid".into(), AttrValue::from("i-0042"));
        Ok(vec![r])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn association_changes_flow_through_the_cycle() {
    let org = OrgId(1);
    let kv = Arc::new(MemoryKv::new());
    kv.set(org, IP_RESOURCE_NAMESPACE, "3-10.0.0.1", r#"{"vm_ids":[42],"region_ids":[1]}"#);
    kv.set(org, IP_RESOURCE_NAMESPACE, "3-10.0.0.2", r#"{"vm_ids":[7]}"#);
    let source = Arc::new(IpResourceSource::new(Arc::new(VmUids), Some(kv.clone())));
    let sync = KindSync::<IpResource>::new(org, source, &RecorderConfig::default());

    let r = sync.run_cycle().await.unwrap();
    assert_eq!((r.added, r.updated, r.deleted), (2, 0, 0));
    let k1 = IpResourceKey { ip: "10.0.0.1".into(), subnet_id: 3 };
    let cached = sync.cache().get(&k1).unwrap();
    assert_eq!(cached.uid, "i-0042");
    assert_eq!(cached.region_id, 1);
    assert_eq!(sync.cache().get(&IpResourceKey { ip: "10.0.0.2".into(), subnet_id: 3 }).unwrap().uid, "");

    kv.set(org, IP_RESOURCE_NAMESPACE, "3-10.0.0.1", r#"{"vm_ids":[42],"region_ids":[2]}"#);
    assert!(kv.remove(org, IP_RESOURCE_NAMESPACE, "3-10.0.0.2"));
    let r = sync.run_cycle().await.unwrap();
    assert_eq!((r.added, r.updated, r.deleted), (0, 1, 1));
    assert_eq!(sync.cache().get(&k1).unwrap().region_id, 2);

    let r = sync.run_cycle().await.unwrap();
    assert_eq!(r.outcome, CycleOutcome::Unchanged);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_association_store_skips_without_touching_the_cache() {
    let source = Arc::new(IpResourceSource::new(Arc::new(VmUids), None));
    let sync = KindSync::<IpResource>::new(OrgId(1), source, &RecorderConfig::default());
    let r = sync.run_cycle().await.unwrap();
    assert!(matches!(r.outcome, CycleOutcome::Skipped(_)));
    assert_eq!(sync.cache().epoch(), 0);
    assert!(sync.cache().is_empty());
}
