//! Built-in listeners.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use cloudrec_core::models::PodIngressRuleBackend;
use rustc_hash::FxHashMap;

use crate::listener::Listener;

#[derive(Default)]
struct BackendIndex {
    by_service: FxHashMap<i64, BTreeSet<String>>,
    service_of: FxHashMap<String, i64>,
}

impl BackendIndex {
    fn insert(&mut self, lcuuid: &str, service: i64) {
        self.remove(lcuuid);
        self.by_service.entry(service).or_default().insert(lcuuid.to_string());
        self.service_of.insert(lcuuid.to_string(), service);
    }

    fn remove(&mut self, lcuuid: &str) {
        if let Some(service) = self.service_of.remove(lcuuid) {
            if let Some(set) = self.by_service.get_mut(&service) {
                set.remove(lcuuid);
                if set.is_empty() {
                    self.by_service.remove(&service);
                }
            }
        }
    }
}

/// Keeps a pod-service → ingress-rule-backend index in step with the backend cache.
#[derive(Default)]
pub struct PodIngressRuleBackendListener {
    index: RwLock<BackendIndex>,
}

impl PodIngressRuleBackendListener {
    pub fn new() -> Self { Self::default() }

    /// Backend lcuuids routed to a pod service, sorted.
    pub fn backends_of(&self, pod_service_id: i64) -> Vec<String> {
        let idx = self.index.read().unwrap_or_else(PoisonError::into_inner);
        idx.by_service.get(&pod_service_id).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn len(&self) -> usize { self.index.read().unwrap_or_else(PoisonError::into_inner).service_of.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Listener<PodIngressRuleBackend> for PodIngressRuleBackendListener {
    fn name(&self) -> &str { "pod_ingress_rule_backend_index" }

    fn on_added(&self, items: &[PodIngressRuleBackend]) -> anyhow::Result<()> {
        let mut idx = self.index.write().unwrap_or_else(PoisonError::into_inner);
        for b in items {
            idx.insert(&b.lcuuid, b.pod_service_id);
        }
        Ok(())
    }

    fn on_updated(&self, new: &PodIngressRuleBackend, old: &PodIngressRuleBackend) -> anyhow::Result<()> {
        if new.pod_service_id != old.pod_service_id {
            self.index.write().unwrap_or_else(PoisonError::into_inner).insert(&new.lcuuid, new.pod_service_id);
        }
        Ok(())
    }

    fn on_deleted(&self, keys: &[String]) -> anyhow::Result<()> {
        let mut idx = self.index.write().unwrap_or_else(PoisonError::into_inner);
        for lcuuid in keys {
            idx.remove(lcuuid);
        }
        Ok(())
    }
}
