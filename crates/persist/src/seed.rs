//! Demo data for a fresh database.

use anyhow::Result;
use cloudrec_core::models::{Lb, NatGateway, PodIngressRuleBackend, RdsInstance, RedisInstance, Subnet, Vm, Vpc};
use cloudrec_core::OrgId;
use serde::Serialize;
use tracing::info;

use crate::SqliteStore;

#[derive(Debug, Default, Clone, Serialize)]
pub struct SeedSummary {
    pub vms: usize,
    pub vpcs: usize,
    pub subnets: usize,
    pub lbs: usize,
    pub nat_gateways: usize,
    pub rds_instances: usize,
    pub redis_instances: usize,
    pub pod_ingress_rule_backends: usize,
}

fn lcuuid() -> String { uuid::Uuid::new_v4().to_string() }

/// Insert a small, self-consistent resource set. Ids are fixed so association
/// blobs can reference them (`vm_ids: [42]`, `epc_ids: [1]`, ...).
pub fn seed_demo(store: &SqliteStore, org: OrgId) -> Result<SeedSummary> {
    let region = "cn-north-1".to_string();
    let vpcs = vec![
        Vpc { id: 1, lcuuid: lcuuid(), uid: "vpc-1a2b".into(), name: "prod".into(), cidr: "10.0.0.0/16".into(), region: region.clone(), ..Default::default() },
        Vpc { id: 2, lcuuid: lcuuid(), uid: "vpc-3c4d".into(), name: "staging".into(), cidr: "10.1.0.0/16".into(), region: region.clone(), ..Default::default() },
    ];
    let subnets = vec![
        Subnet { id: 3, lcuuid: lcuuid(), name: "prod-a".into(), vpc_id: 1, cidr: "10.0.1.0/24".into(), region: region.clone(), ..Default::default() },
        Subnet { id: 4, lcuuid: lcuuid(), name: "staging-a".into(), vpc_id: 2, cidr: "10.1.1.0/24".into(), region: region.clone(), ..Default::default() },
    ];
    let vms = vec![
        Vm { id: 42, lcuuid: lcuuid(), uid: "i-0042".into(), name: "web-1".into(), state: 4, region: region.clone(), az: "cn-north-1a".into(), vpc_id: 1, host: "node-1".into(), ..Default::default() },
        Vm { id: 7, lcuuid: lcuuid(), uid: "i-0007".into(), name: "batch-1".into(), state: 4, region: region.clone(), az: "cn-north-1b".into(), vpc_id: 2, host: "node-2".into(), ..Default::default() },
    ];
    let lbs = vec![Lb { id: 5, lcuuid: lcuuid(), uid: "lb-0005".into(), name: "ingress".into(), model: 2, vip: "10.0.1.100".into(), vpc_id: 1, region: region.clone(), ..Default::default() }];
    let nats = vec![NatGateway { id: 6, lcuuid: lcuuid(), uid: "nat-0006".into(), name: "egress".into(), floating_ips: "203.0.113.10".into(), vpc_id: 1, region: region.clone(), ..Default::default() }];
    let rds = vec![RdsInstance { id: 8, lcuuid: lcuuid(), uid: "rds-0008".into(), name: "orders".into(), engine: "mysql".into(), version: "8.0".into(), state: 1, vpc_id: 1, region: region.clone(), ..Default::default() }];
    let redis = vec![RedisInstance { id: 9, lcuuid: lcuuid(), uid: "redis-0009".into(), name: "sessions".into(), version: "7.0".into(), state: 1, vpc_id: 1, region, ..Default::default() }];
    let backends = vec![
        PodIngressRuleBackend { id: 11, lcuuid: lcuuid(), port: 8080, pod_service_id: 21, pod_ingress_rule_id: 31, pod_ingress_id: 41, pod_cluster_id: 1, sub_domain: "default".into(), ..Default::default() },
        PodIngressRuleBackend { id: 12, lcuuid: lcuuid(), port: 9090, pod_service_id: 22, pod_ingress_rule_id: 31, pod_ingress_id: 41, pod_cluster_id: 1, sub_domain: "default".into(), ..Default::default() },
    ];

    let summary = SeedSummary {
        vpcs: store.insert_all(org, &vpcs)?,
        subnets: store.insert_all(org, &subnets)?,
        vms: store.insert_all(org, &vms)?,
        lbs: store.insert_all(org, &lbs)?,
        nat_gateways: store.insert_all(org, &nats)?,
        rds_instances: store.insert_all(org, &rds)?,
        redis_instances: store.insert_all(org, &redis)?,
        pod_ingress_rule_backends: store.insert_all(org, &backends)?,
    };
    info!(org_id = %org, ?summary, "demo data seeded");
    Ok(summary)
}
