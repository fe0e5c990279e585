//! IP-resource associations (`ch_ip_resource`), keyed `"<subnetId>-<ip>"`.

use cloudrec_core::models::{IpResource, IP_RESOURCE_TAGS};
use cloudrec_core::{AttrRow, AttrValue};

use crate::derived::{translate, DerivedRecord, DerivedSource};

/// Namespace the dimension-resource producer publishes IP associations under.
pub const IP_RESOURCE_NAMESPACE: &str = "deepflow_dimension_resource_ip";

/// Producer naming, applied in order. Must stay bit-exact.
pub const IP_RESOURCE_RENAMES: &[(&str, &str)] = &[
    ("l3_epc", "epc"),
    ("router", "vgw"),
    ("chost", "vm"),
    ("natgw", "nat_gateway"),
    ("dhcpgw", "dhcp_port"),
    ("redis", "redis_instance"),
    ("rds", "rds_instance"),
    ("subnet", "vl2"),
    ("pod_ns", "pod_namespace"),
];

pub type IpResourceSource = DerivedSource<IpResource>;

impl DerivedRecord for IpResource {
    const NAMESPACE: &'static str = IP_RESOURCE_NAMESPACE;
    const TAGS: &'static [&'static str] = IP_RESOURCE_TAGS;
    const RENAMES: &'static [(&'static str, &'static str)] = IP_RESOURCE_RENAMES;

    fn key_attrs(prefix: i64, ident: &str) -> AttrRow {
        let mut row = AttrRow::new();
        row.insert("IP".to_string(), AttrValue::from(ident));
        row.insert("SUBNET_ID".to_string(), AttrValue::Int(prefix));
        row
    }
}

/// `chost_id` → `vm_ids`, `l3_epc_name` → `epc_names`, ...
pub fn translate_tag(tag: &str) -> String { translate(IP_RESOURCE_RENAMES, tag) }

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cloudrec_core::models::IpResourceKey;
    use cloudrec_core::{AuxIdentities, AuxIdentityMap, AuxKind, Fetch, OrgId, RowSource, SnapshotSource, SyncError};

    use super::*;
    use crate::derived::{build_row, parse_entry_key};
    use crate::{AssociationStore, KvError, MemoryKv};

    struct Uids;

    impl RowSource for Uids {
        fn fetch_rows(&self, _org: OrgId, table: &str, _columns: &[&str]) -> anyhow::Result<Vec<AttrRow>> {
            let pairs: &[(i64, &str)] = match table {
                "vm" => &[(42, "i-0042"), (7, "i-0007")],
                "vpc" => &[(1, "vpc-1a2b")],
                _ => &[],
            };
            Ok(pairs
                .iter()
                .map(|(id, uid)| {
                    let mut r = AttrRow::new();
                    r.insert("id".into(), AttrValue::Int(*id));
                    r.insert("uid".into(), AttrValue::from(*uid));
                    r
                })
                .collect())
        }
    }

    fn source(kv: Option<Arc<dyn AssociationStore>>) -> IpResourceSource { IpResourceSource::new(Arc::new(Uids), kv) }

    fn kv_with(entries: &[(&str, &str)]) -> Arc<MemoryKv> {
        let kv = Arc::new(MemoryKv::new());
        for (k, v) in entries {
            kv.set(OrgId(1), IP_RESOURCE_NAMESPACE, *k, *v);
        }
        kv
    }

    fn ready(f: Fetch<IpResource>) -> cloudrec_core::Snapshot<IpResource> {
        match f {
            Fetch::Ready(s) => s,
            Fetch::Skip(r) => panic!("unexpected skip: {}", r),
        }
    }

    fn key(ip: &str, subnet_id: i64) -> IpResourceKey { IpResourceKey { ip: ip.into(), subnet_id } }

    #[test]
    fn rename_table_matches_producer_names() {
        assert_eq!(translate_tag("chost_id"), "vm_ids");
        assert_eq!(translate_tag("l3_epc_name"), "epc_names");
        assert_eq!(translate_tag("router_id"), "vgw_ids");
        assert_eq!(translate_tag("natgw_id"), "nat_gateway_ids");
        assert_eq!(translate_tag("dhcpgw_name"), "dhcp_port_names");
        assert_eq!(translate_tag("redis_id"), "redis_instance_ids");
        assert_eq!(translate_tag("rds_id"), "rds_instance_ids");
        assert_eq!(translate_tag("subnet_name"), "vl2_names");
        assert_eq!(translate_tag("pod_ns_id"), "pod_namespace_ids");
        assert_eq!(translate_tag("pod_service_id"), "pod_service_ids");
        assert_eq!(translate_tag("host_name"), "host_names");
    }

    #[test]
    fn first_element_and_uid_come_from_the_blob() {
        let mut aux = AuxIdentities::default();
        aux.insert(AuxKind::Vm, AuxIdentityMap::from_pairs([(42, "i-0042".to_string())]));
        let row = build_row::<IpResource>(3, "10.0.0.1", r#"{"vm_ids": [42, 7], "vm_names": ["web-1"]}"#, &aux).unwrap();
        assert_eq!(row["CHOST_ID"], AttrValue::Int(42));
        assert_eq!(row["CHOST_NAME"], AttrValue::from("web-1"));
        assert_eq!(row["uid"], AttrValue::from("i-0042"));
        assert_eq!(row["IP"], AttrValue::from("10.0.0.1"));
        assert_eq!(row["SUBNET_ID"], AttrValue::Int(3));
    }

    #[test]
    fn later_resolvable_tag_overwrites_uid_and_misses_write_empty() {
        let mut aux = AuxIdentities::default();
        aux.insert(AuxKind::Vpc, AuxIdentityMap::from_pairs([(1, "vpc-1a2b".to_string())]));
        aux.insert(AuxKind::Vm, AuxIdentityMap::default());
        // epc resolves first, the vm lookup comes later in tag order and misses
        let row = build_row::<IpResource>(3, "10.0.0.1", r#"{"epc_ids": [1], "vm_ids": [99]}"#, &aux).unwrap();
        assert_eq!(row["uid"], AttrValue::from(""));
        let row = build_row::<IpResource>(3, "10.0.0.1", r#"{"epc_ids": [1], "vl2_names": ["a"]}"#, &aux).unwrap();
        assert_eq!(row["uid"], AttrValue::from("vpc-1a2b"));
        assert_eq!(row["SUBNET_NAME"], AttrValue::from("a"));
    }

    #[test]
    fn empty_lists_and_other_value_types_are_ignored() {
        let row = build_row::<IpResource>(3, "10.0.0.1", r#"{"vm_ids": [], "az_ids": 5, "host_ids": [null]}"#, &AuxIdentities::default()).unwrap();
        assert_eq!(row.len(), 2);
        assert!(build_row::<IpResource>(3, "10.0.0.1", "null", &AuxIdentities::default()).is_ok());
    }

    #[test]
    fn entry_keys_split_on_a_single_dash() {
        assert_eq!(parse_entry_key("3-10.0.0.1"), Ok(Some((3, "10.0.0.1"))));
        assert_eq!(parse_entry_key("x-y-z"), Ok(None));
        assert_eq!(parse_entry_key("10.0.0.1"), Ok(None));
        assert!(parse_entry_key("abc-10.0.0.1").is_err());
    }

    #[test]
    fn malformed_and_zero_prefix_keys_are_skipped() {
        let kv = kv_with(&[("0-10.0.0.9", r#"{"vm_ids":[42]}"#), ("3-10.0.0.1", r#"{"vm_ids":[42]}"#), ("1-2-3", "{}")]);
        let snap = ready(source(Some(kv)).fetch(OrgId(1)).unwrap());
        assert_eq!(snap.len(), 1);
        let item = &snap[&key("10.0.0.1", 3)];
        assert_eq!(item.chost_id, 42);
        assert_eq!(item.uid, "i-0042");
    }

    #[test]
    fn non_numeric_prefix_fails_the_fetch() {
        let kv = kv_with(&[("abc-10.0.0.1", "{}"), ("3-10.0.0.1", "{}")]);
        let err = source(Some(kv)).fetch(OrgId(1)).unwrap_err();
        assert!(matches!(err, SyncError::Parse { .. }));
    }

    #[test]
    fn undecodable_blob_fails_the_fetch() {
        let kv = kv_with(&[("3-10.0.0.1", "{not json")]);
        assert!(matches!(source(Some(kv)).fetch(OrgId(1)).unwrap_err(), SyncError::Parse { .. }));
    }

    #[test]
    fn type_mismatch_fails_the_fetch() {
        let kv = kv_with(&[("3-10.0.0.1", r#"{"vm_ids":["i-42"]}"#)]);
        assert!(matches!(source(Some(kv)).fetch(OrgId(1)).unwrap_err(), SyncError::Parse { .. }));
    }

    #[test]
    fn subnet_id_comes_from_the_key() {
        let kv = kv_with(&[("3-10.0.0.1", r#"{"vl2_ids":[8]}"#)]);
        let snap = ready(source(Some(kv)).fetch(OrgId(1)).unwrap());
        assert!(snap.contains_key(&key("10.0.0.1", 3)));
    }

    struct Down(fn() -> KvError);

    impl AssociationStore for Down {
        fn hgetall(&self, _org: OrgId, _namespace: &str) -> Result<std::collections::HashMap<String, String>, KvError> {
            Err((self.0)())
        }
    }

    #[test]
    fn missing_connection_skips_and_read_errors_fail() {
        assert!(matches!(source(None).fetch(OrgId(1)).unwrap(), Fetch::Skip(_)));

        let unavailable = source(Some(Arc::new(Down(|| KvError::Unavailable("not configured".into())))));
        assert!(matches!(unavailable.fetch(OrgId(1)).unwrap(), Fetch::Skip(_)));

        let broken = source(Some(Arc::new(Down(|| KvError::Read {
            namespace: IP_RESOURCE_NAMESPACE.into(),
            source: anyhow::anyhow!("connection reset"),
        }))));
        assert!(matches!(broken.fetch(OrgId(1)).unwrap_err(), SyncError::SourceFetch { .. }));
    }
}
