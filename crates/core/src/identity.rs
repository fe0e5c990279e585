//! Numeric id → stable uid lookups for auxiliary kinds.
//!
//! Maps are rebuilt from scratch for every cycle that needs them and dropped
//! when the cycle ends. A failed fetch degrades to an empty map: uid
//! enrichment is best-effort.

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::source::RowSource;
use crate::OrgId;

/// Auxiliary kinds whose uid can enrich a derived item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuxKind {
    Vm,
    Rds,
    Redis,
    Lb,
    NatGateway,
    Vpc,
}

impl AuxKind {
    pub const ALL: [AuxKind; 6] = [AuxKind::Vm, AuxKind::Rds, AuxKind::Redis, AuxKind::Lb, AuxKind::NatGateway, AuxKind::Vpc];

    pub fn table(&self) -> &'static str {
        match self {
            AuxKind::Vm => "vm",
            AuxKind::Rds => "rds_instance",
            AuxKind::Redis => "redis_instance",
            AuxKind::Lb => "lb",
            AuxKind::NatGateway => "nat_gateway",
            AuxKind::Vpc => "vpc",
        }
    }

    /// Name used by the association producer, i.e. a translated tag with `_ids` stripped.
    pub fn tag_prefix(&self) -> &'static str {
        match self {
            AuxKind::Vm => "vm",
            AuxKind::Rds => "rds_instance",
            AuxKind::Redis => "redis_instance",
            AuxKind::Lb => "lb",
            AuxKind::NatGateway => "nat_gateway",
            AuxKind::Vpc => "epc",
        }
    }

    pub fn from_tag_prefix(prefix: &str) -> Option<AuxKind> {
        AuxKind::ALL.into_iter().find(|k| k.tag_prefix() == prefix)
    }
}

/// Numeric id → uid for one auxiliary kind.
#[derive(Debug, Clone, Default)]
pub struct AuxIdentityMap {
    uids: FxHashMap<i64, String>,
}

impl AuxIdentityMap {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i64, String)>) -> Self {
        Self { uids: pairs.into_iter().collect() }
    }

    pub fn resolve(&self, id: i64) -> Option<&str> { self.uids.get(&id).map(String::as_str) }
    pub fn len(&self) -> usize { self.uids.len() }
    pub fn is_empty(&self) -> bool { self.uids.is_empty() }
}

/// The set of maps built for one cycle.
#[derive(Debug, Clone, Default)]
pub struct AuxIdentities {
    maps: FxHashMap<AuxKind, AuxIdentityMap>,
}

impl AuxIdentities {
    pub fn insert(&mut self, kind: AuxKind, map: AuxIdentityMap) { self.maps.insert(kind, map); }

    pub fn get(&self, kind: AuxKind) -> Option<&AuxIdentityMap> { self.maps.get(&kind) }

    pub fn resolve(&self, kind: AuxKind, id: i64) -> Option<&str> { self.maps.get(&kind).and_then(|m| m.resolve(id)) }
}

pub struct AuxIdentityResolver<'a> {
    rows: &'a dyn RowSource,
}

impl<'a> AuxIdentityResolver<'a> {
    pub fn new(rows: &'a dyn RowSource) -> Self { Self { rows } }

    pub fn build(&self, org: OrgId, kinds: &[AuxKind]) -> AuxIdentities {
        let mut out = AuxIdentities::default();
        for kind in kinds {
            out.insert(*kind, self.build_one(org, *kind));
        }
        out
    }

    fn build_one(&self, org: OrgId, kind: AuxKind) -> AuxIdentityMap {
        let rows = match self.rows.fetch_rows(org, kind.table(), &["id", "uid"]) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(org_id = %org, table = kind.table(), error = %e, "aux identity fetch failed; uid lookups will miss");
                metrics::counter!("recorder_aux_fetch_errors_total", 1u64, "aux" => kind.table());
                return AuxIdentityMap::default();
            }
        };
        let map = AuxIdentityMap::from_pairs(rows.iter().filter_map(|row| {
            let id = row.get("id").and_then(|v| v.as_int())?;
            let uid = row.get("uid").and_then(|v| v.as_str()).unwrap_or_default();
            Some((id, uid.to_string()))
        }));
        debug!(org_id = %org, table = kind.table(), entries = map.len(), "aux identity map built");
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttrRow, AttrValue};

    struct Tables;

    impl RowSource for Tables {
        fn fetch_rows(&self, _org: OrgId, table: &str, _columns: &[&str]) -> anyhow::Result<Vec<AttrRow>> {
            match table {
                "vm" => {
                    let mut r = AttrRow::new();
                    r.insert("id".into(), AttrValue::Int(42));
                    r.insert("uid".into(), AttrValue::from("i-abc"));
                    Ok(vec![r])
                }
                "lb" => anyhow::bail!("table lb unavailable"),
                _ => Ok(vec![]),
            }
        }
    }

    #[test]
    fn failed_aux_kind_degrades_to_empty_map() {
        let ids = AuxIdentityResolver::new(&Tables).build(OrgId(1), &[AuxKind::Vm, AuxKind::Lb]);
        assert_eq!(ids.resolve(AuxKind::Vm, 42), Some("i-abc"));
        assert_eq!(ids.resolve(AuxKind::Vm, 7), None);
        assert!(ids.get(AuxKind::Lb).unwrap().is_empty());
    }

    #[test]
    fn epc_prefix_maps_to_vpc() {
        assert_eq!(AuxKind::from_tag_prefix("epc"), Some(AuxKind::Vpc));
        assert_eq!(AuxKind::from_tag_prefix("vm"), Some(AuxKind::Vm));
        assert_eq!(AuxKind::from_tag_prefix("pod"), None);
    }
}
