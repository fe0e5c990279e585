//! cloudrec core types: tenant scope, resource kinds, attribute schema, change sets.
//!
//! Everything here is pure data and logic. Backends live in `cloudrec-persist`
//! (relational rows) and `cloudrec-kvhub` (association blobs); the cache and
//! the cycle driver live in `cloudrec-store`.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod identity;
pub mod diff;
pub mod error;
pub mod models;
pub mod schema;
pub mod source;

pub use identity::{AuxIdentities, AuxIdentityMap, AuxIdentityResolver, AuxKind};
pub use diff::{diff, field_delta, ChangeSet, FieldDelta, Scope};
pub use error::{CoreError, SyncError};
pub use schema::{Attr, AttrRow, AttrType, AttrValue, Field, Record};
pub use source::{keyed, Fetch, RowSource, Snapshot, SnapshotSource, TableRecord, TableSource};

pub mod prelude {
    pub use super::{
        diff, AttrRow, AttrValue, ChangeSet, Fetch, FieldDelta, OrgId, Record, ResourceKind, Scope, Snapshot,
        SnapshotSource, SyncError,
    };
}

/// Tenant / organization scope. Every fetch, diff and log line carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrgId(pub u32);

impl OrgId {
    pub const DEFAULT: OrgId = OrgId(1);
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// A category of cloud resource synchronized as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vm,
    Vpc,
    Subnet,
    Lb,
    NatGateway,
    RdsInstance,
    RedisInstance,
    PodIngressRuleBackend,
    IpResource,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Vm,
        ResourceKind::Vpc,
        ResourceKind::Subnet,
        ResourceKind::Lb,
        ResourceKind::NatGateway,
        ResourceKind::RdsInstance,
        ResourceKind::RedisInstance,
        ResourceKind::PodIngressRuleBackend,
        ResourceKind::IpResource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vm => "vm",
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::Lb => "lb",
            ResourceKind::NatGateway => "nat_gateway",
            ResourceKind::RdsInstance => "rds_instance",
            ResourceKind::RedisInstance => "redis_instance",
            ResourceKind::PodIngressRuleBackend => "pod_ingress_rule_backend",
            ResourceKind::IpResource => "ip_resource",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == norm)
            .ok_or_else(|| format!("unknown resource kind: {} (expect one of vm, vpc, subnet, lb, nat_gateway, rds_instance, redis_instance, pod_ingress_rule_backend, ip_resource)", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parse_accepts_dashes_and_case() {
        assert_eq!("ip-resource".parse::<ResourceKind>().unwrap(), ResourceKind::IpResource);
        assert_eq!("NAT_GATEWAY".parse::<ResourceKind>().unwrap(), ResourceKind::NatGateway);
        assert!("pods".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn kind_names_roundtrip() {
        for k in ResourceKind::ALL {
            assert_eq!(k.as_str().parse::<ResourceKind>().unwrap(), k);
        }
    }
}
