//! cloudrec kvhub: the key-value association boundary.
//!
//! Producers publish one hash per logical namespace; each field is
//! `"<prefix>-<id>"` and each value a JSON object of association lists.
//! Derived kinds read a whole namespace per cycle.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use cloudrec_core::OrgId;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info};

pub mod derived;
pub mod ip_resource;

pub use derived::{build_row, parse_entry_key, translate, DerivedRecord, DerivedSource};
pub use ip_resource::{translate_tag, IpResourceSource, IP_RESOURCE_NAMESPACE, IP_RESOURCE_RENAMES};

#[derive(Debug, Error)]
pub enum KvError {
    /// No usable connection; derived kinds skip their cycle.
    #[error("association store unavailable: {0}")]
    Unavailable(String),
    #[error("reading {namespace}: {source}")]
    Read {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Read side of an association store. Blocking.
pub trait AssociationStore: Send + Sync {
    /// Every field/value pair of `namespace` for the tenant.
    fn hgetall(&self, org: OrgId, namespace: &str) -> Result<HashMap<String, String>, KvError>;
}

/// Process-local association store, filled from code or a JSON file.
#[derive(Default)]
pub struct MemoryKv {
    hashes: RwLock<FxHashMap<(OrgId, String), HashMap<String, String>>>,
}

impl MemoryKv {
    pub fn new() -> Self { Self::default() }

    pub fn set(&self, org: OrgId, namespace: &str, field: impl Into<String>, value: impl Into<String>) {
        let mut h = self.hashes.write().unwrap_or_else(PoisonError::into_inner);
        h.entry((org, namespace.to_string())).or_default().insert(field.into(), value.into());
    }

    pub fn remove(&self, org: OrgId, namespace: &str, field: &str) -> bool {
        let mut h = self.hashes.write().unwrap_or_else(PoisonError::into_inner);
        h.get_mut(&(org, namespace.to_string())).map(|m| m.remove(field).is_some()).unwrap_or(false)
    }

    /// Load a JSON object of `field → value` into `namespace`. Object values
    /// are stored re-encoded; string values verbatim. Returns the number of fields loaded.
    pub fn load_json(&self, org: OrgId, namespace: &str, json: &str) -> anyhow::Result<usize> {
        let doc: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let n = doc.len();
        for (field, value) in doc {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            self.set(org, namespace, field, value);
        }
        debug!(org_id = %org, namespace, fields = n, "association entries loaded");
        Ok(n)
    }

    pub fn load_file(&self, org: OrgId, namespace: &str, path: &str) -> anyhow::Result<usize> {
        let text = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {}: {}", path, e))?;
        let n = self.load_json(org, namespace, &text)?;
        info!(org_id = %org, namespace, path, fields = n, "association file loaded");
        Ok(n)
    }
}

impl AssociationStore for MemoryKv {
    fn hgetall(&self, org: OrgId, namespace: &str) -> Result<HashMap<String, String>, KvError> {
        let h = self.hashes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(h.get(&(org, namespace.to_string())).cloned().unwrap_or_default())
    }
}

#[cfg(feature = "redis")]
pub use self::redis_kv::RedisKv;

#[cfg(feature = "redis")]
mod redis_kv {
    use std::collections::HashMap;

    use cloudrec_core::OrgId;
    use redis::Commands;

    use super::{AssociationStore, KvError};

    /// Redis-backed association store. One client per tenant database; a
    /// fresh connection is taken for every read.
    pub struct RedisKv {
        client: redis::Client,
    }

    impl RedisKv {
        pub fn open(url: &str) -> Result<Self, KvError> {
            let client = redis::Client::open(url).map_err(|e| KvError::Unavailable(format!("{}: {}", url, e)))?;
            Ok(Self { client })
        }
    }

    impl AssociationStore for RedisKv {
        fn hgetall(&self, org: OrgId, namespace: &str) -> Result<HashMap<String, String>, KvError> {
            let started = std::time::Instant::now();
            let read = |e: redis::RedisError| KvError::Read { namespace: namespace.to_string(), source: e.into() };
            let mut con = self.client.get_connection().map_err(read)?;
            let out: HashMap<String, String> = con.hgetall(namespace).map_err(read)?;
            tracing::debug!(org_id = %org, namespace, fields = out.len(), "association hash read");
            metrics::histogram!("kv_hgetall_ms", started.elapsed().as_secs_f64() * 1000.0);
            Ok(out)
        }
    }
}
