//! Item models for every configured resource kind.
//!
//! Direct-form kinds mirror one relational table each and are keyed by
//! `lcuuid`. `deleted_at` is empty for live rows; soft deletion shows up as
//! an attribute update, never as a removal.

use serde::{Deserialize, Serialize};

use crate::schema::{Field, Record};
use crate::source::TableRecord;
use crate::ResourceKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vm {
    pub id: i64,
    pub lcuuid: String,
    pub uid: String,
    pub name: String,
    pub label: String,
    pub state: i64,
    pub region: String,
    pub az: String,
    pub vpc_id: i64,
    pub host: String,
    pub deleted_at: String,
}

impl Record for Vm {
    type Key = String;
    const KIND: ResourceKind = ResourceKind::Vm;

    fn key(&self) -> String { self.lcuuid.clone() }

    fn schema() -> &'static [Field<Self>] {
        crate::schema!(Vm;
            "id" => id: i64,
            "lcuuid" => lcuuid: String,
            "uid" => uid: String,
            "name" => name: String,
            "label" => label: String,
            "state" => state: i64,
            "region" => region: String,
            "az" => az: String,
            "vpc_id" => vpc_id: i64,
            "host" => host: String,
            "deleted_at" => deleted_at: String,
        )
    }
}

impl TableRecord for Vm {
    const TABLE: &'static str = "vm";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vpc {
    pub id: i64,
    pub lcuuid: String,
    pub uid: String,
    pub name: String,
    pub cidr: String,
    pub region: String,
    pub deleted_at: String,
}

impl Record for Vpc {
    type Key = String;
    const KIND: ResourceKind = ResourceKind::Vpc;

    fn key(&self) -> String { self.lcuuid.clone() }

    fn schema() -> &'static [Field<Self>] {
        crate::schema!(Vpc;
            "id" => id: i64,
            "lcuuid" => lcuuid: String,
            "uid" => uid: String,
            "name" => name: String,
            "cidr" => cidr: String,
            "region" => region: String,
            "deleted_at" => deleted_at: String,
        )
    }
}

impl TableRecord for Vpc {
    const TABLE: &'static str = "vpc";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: i64,
    pub lcuuid: String,
    pub name: String,
    pub vpc_id: i64,
    pub cidr: String,
    pub region: String,
    pub deleted_at: String,
}

impl Record for Subnet {
    type Key = String;
    const KIND: ResourceKind = ResourceKind::Subnet;

    fn key(&self) -> String { self.lcuuid.clone() }

    fn schema() -> &'static [Field<Self>] {
        crate::schema!(Subnet;
            "id" => id: i64,
            "lcuuid" => lcuuid: String,
            "name" => name: String,
            "vpc_id" => vpc_id: i64,
            "cidr" => cidr: String,
            "region" => region: String,
            "deleted_at" => deleted_at: String,
        )
    }
}

impl TableRecord for Subnet {
    const TABLE: &'static str = "subnet";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lb {
    pub id: i64,
    pub lcuuid: String,
    pub uid: String,
    pub name: String,
    pub model: i64,
    pub vip: String,
    pub vpc_id: i64,
    pub region: String,
    pub deleted_at: String,
}

impl Record for Lb {
    type Key = String;
    const KIND: ResourceKind = ResourceKind::Lb;

    fn key(&self) -> String { self.lcuuid.clone() }

    fn schema() -> &'static [Field<Self>] {
        crate::schema!(Lb;
            "id" => id: i64,
            "lcuuid" => lcuuid: String,
            "uid" => uid: String,
            "name" => name: String,
            "model" => model: i64,
            "vip" => vip: String,
            "vpc_id" => vpc_id: i64,
            "region" => region: String,
            "deleted_at" => deleted_at: String,
        )
    }
}

impl TableRecord for Lb {
    const TABLE: &'static str = "lb";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatGateway {
    pub id: i64,
    pub lcuuid: String,
    pub uid: String,
    pub name: String,
    pub floating_ips: String,
    pub vpc_id: i64,
    pub region: String,
    pub deleted_at: String,
}

impl Record for NatGateway {
    type Key = String;
    const KIND: ResourceKind = ResourceKind::NatGateway;

    fn key(&self) -> String { self.lcuuid.clone() }

    fn schema() -> &'static [Field<Self>] {
        crate::schema!(NatGateway;
            "id" => id: i64,
            "lcuuid" => lcuuid: String,
            "uid" => uid: String,
            "name" => name: String,
            "floating_ips" => floating_ips: String,
            "vpc_id" => vpc_id: i64,
            "region" => region: String,
            "deleted_at" => deleted_at: String,
        )
    }
}

impl TableRecord for NatGateway {
    const TABLE: &'static str = "nat_gateway";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdsInstance {
    pub id: i64,
    pub lcuuid: String,
    pub uid: String,
    pub name: String,
    pub engine: String,
    pub version: String,
    pub state: i64,
    pub vpc_id: i64,
    pub region: String,
    pub deleted_at: String,
}

impl Record for RdsInstance {
    type Key = String;
    const KIND: ResourceKind = ResourceKind::RdsInstance;

    fn key(&self) -> String { self.lcuuid.clone() }

    fn schema() -> &'static [Field<Self>] {
        crate::schema!(RdsInstance;
            "id" => id: i64,
            "lcuuid" => lcuuid: String,
            "uid" => uid: String,
            "name" => name: String,
            "engine" => engine: String,
            "version" => version: String,
            "state" => state: i64,
            "vpc_id" => vpc_id: i64,
            "region" => region: String,
            "deleted_at" => deleted_at: String,
        )
    }
}

impl TableRecord for RdsInstance {
    const TABLE: &'static str = "rds_instance";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisInstance {
    pub id: i64,
    pub lcuuid: String,
    pub uid: String,
    pub name: String,
    pub version: String,
    pub state: i64,
    pub vpc_id: i64,
    pub region: String,
    pub deleted_at: String,
}

impl Record for RedisInstance {
    type Key = String;
    const KIND: ResourceKind = ResourceKind::RedisInstance;

    fn key(&self) -> String { self.lcuuid.clone() }

    fn schema() -> &'static [Field<Self>] {
        crate::schema!(RedisInstance;
            "id" => id: i64,
            "lcuuid" => lcuuid: String,
            "uid" => uid: String,
            "name" => name: String,
            "version" => version: String,
            "state" => state: i64,
            "vpc_id" => vpc_id: i64,
            "region" => region: String,
            "deleted_at" => deleted_at: String,
        )
    }
}

impl TableRecord for RedisInstance {
    const TABLE: &'static str = "redis_instance";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodIngressRuleBackend {
    pub id: i64,
    pub lcuuid: String,
    pub port: i64,
    pub pod_service_id: i64,
    pub pod_ingress_rule_id: i64,
    pub pod_ingress_id: i64,
    pub pod_cluster_id: i64,
    pub sub_domain: String,
    pub deleted_at: String,
}

impl Record for PodIngressRuleBackend {
    type Key = String;
    const KIND: ResourceKind = ResourceKind::PodIngressRuleBackend;

    fn key(&self) -> String { self.lcuuid.clone() }

    fn schema() -> &'static [Field<Self>] {
        crate::schema!(PodIngressRuleBackend;
            "id" => id: i64,
            "lcuuid" => lcuuid: String,
            "port" => port: i64,
            "pod_service_id" => pod_service_id: i64,
            "pod_ingress_rule_id" => pod_ingress_rule_id: i64,
            "pod_ingress_id" => pod_ingress_id: i64,
            "pod_cluster_id" => pod_cluster_id: i64,
            "sub_domain" => sub_domain: String,
            "deleted_at" => deleted_at: String,
        )
    }
}

impl TableRecord for PodIngressRuleBackend {
    const TABLE: &'static str = "pod_ingress_rule_backend";
}

/// Identity of one IP-resource association: `(ip, subnet id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IpResourceKey {
    pub ip: String,
    pub subnet_id: i64,
}

/// Derived IP → resource association row (dimension table `ch_ip_resource`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpResource {
    pub ip: String,
    pub subnet_id: i64,
    pub subnet_name: String,
    pub region_id: i64,
    pub region_name: String,
    pub az_id: i64,
    pub az_name: String,
    pub host_id: i64,
    pub host_name: String,
    pub chost_id: i64,
    pub chost_name: String,
    pub l3_epc_id: i64,
    pub l3_epc_name: String,
    pub router_id: i64,
    pub router_name: String,
    pub dhcpgw_id: i64,
    pub dhcpgw_name: String,
    pub pod_service_id: i64,
    pub pod_service_name: String,
    pub pod_ingress_id: i64,
    pub pod_ingress_name: String,
    pub pod_group_id: i64,
    pub pod_group_name: String,
    pub pod_node_id: i64,
    pub pod_node_name: String,
    pub pod_ns_id: i64,
    pub pod_ns_name: String,
    pub pod_cluster_id: i64,
    pub pod_cluster_name: String,
    pub pod_id: i64,
    pub pod_name: String,
    pub lb_id: i64,
    pub lb_name: String,
    pub natgw_id: i64,
    pub natgw_name: String,
    pub rds_id: i64,
    pub rds_name: String,
    pub redis_id: i64,
    pub redis_name: String,
    pub uid: String,
}

/// Attributes filled from the association blob, in resolution order.
/// `ip` and `subnet_id` come from the entry key and are not listed.
pub const IP_RESOURCE_TAGS: &[&str] = &[
    "subnet_name",
    "region_id",
    "region_name",
    "az_id",
    "az_name",
    "host_id",
    "host_name",
    "l3_epc_id",
    "l3_epc_name",
    "router_id",
    "router_name",
    "dhcpgw_id",
    "dhcpgw_name",
    "pod_service_id",
    "pod_service_name",
    "pod_ingress_id",
    "pod_ingress_name",
    "pod_group_id",
    "pod_group_name",
    "pod_node_id",
    "pod_node_name",
    "pod_ns_id",
    "pod_ns_name",
    "pod_cluster_id",
    "pod_cluster_name",
    "pod_id",
    "pod_name",
    "chost_id",
    "chost_name",
    "lb_id",
    "lb_name",
    "natgw_id",
    "natgw_name",
    "rds_id",
    "rds_name",
    "redis_id",
    "redis_name",
];

impl Record for IpResource {
    type Key = IpResourceKey;
    const KIND: ResourceKind = ResourceKind::IpResource;

    fn key(&self) -> IpResourceKey { IpResourceKey { ip: self.ip.clone(), subnet_id: self.subnet_id } }

    fn schema() -> &'static [Field<Self>] {
        crate::schema!(IpResource;
            "ip" => ip: String,
            "subnet_id" => subnet_id: i64,
            "subnet_name" => subnet_name: String,
            "region_id" => region_id: i64,
            "region_name" => region_name: String,
            "az_id" => az_id: i64,
            "az_name" => az_name: String,
            "host_id" => host_id: i64,
            "host_name" => host_name: String,
            "chost_id" => chost_id: i64,
            "chost_name" => chost_name: String,
            "l3_epc_id" => l3_epc_id: i64,
            "l3_epc_name" => l3_epc_name: String,
            "router_id" => router_id: i64,
            "router_name" => router_name: String,
            "dhcpgw_id" => dhcpgw_id: i64,
            "dhcpgw_name" => dhcpgw_name: String,
            "pod_service_id" => pod_service_id: i64,
            "pod_service_name" => pod_service_name: String,
            "pod_ingress_id" => pod_ingress_id: i64,
            "pod_ingress_name" => pod_ingress_name: String,
            "pod_group_id" => pod_group_id: i64,
            "pod_group_name" => pod_group_name: String,
            "pod_node_id" => pod_node_id: i64,
            "pod_node_name" => pod_node_name: String,
            "pod_ns_id" => pod_ns_id: i64,
            "pod_ns_name" => pod_ns_name: String,
            "pod_cluster_id" => pod_cluster_id: i64,
            "pod_cluster_name" => pod_cluster_name: String,
            "pod_id" => pod_id: i64,
            "pod_name" => pod_name: String,
            "lb_id" => lb_id: i64,
            "lb_name" => lb_name: String,
            "natgw_id" => natgw_id: i64,
            "natgw_name" => natgw_name: String,
            "rds_id" => rds_id: i64,
            "rds_name" => rds_name: String,
            "redis_id" => redis_id: i64,
            "redis_name" => redis_name: String,
            "uid" => uid: String,
        )
    }
}

impl TableRecord for IpResource {
    const TABLE: &'static str = "ch_ip_resource";
    const KEY_COLUMNS: &'static [&'static str] = &["ip", "subnet_id"];
}
