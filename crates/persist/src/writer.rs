//! Mirrors IP-resource changes into the `ch_ip_resource` dimension table.
//!
//! The cache starts empty on every process start, so the first delivery is
//! the full set of live associations. Rows left behind by an earlier run are
//! pruned against that set before it is inserted.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use cloudrec_core::models::{IpResource, IpResourceKey};
use cloudrec_core::{field_delta, OrgId, TableRecord};
use cloudrec_store::Listener;
use rusqlite::Transaction;
use tracing::{debug, info};

use crate::SqliteStore;

pub struct DimensionTableWriter {
    store: Arc<SqliteStore>,
    org: OrgId,
    primed: AtomicBool,
}

impl DimensionTableWriter {
    pub fn new(store: Arc<SqliteStore>, org: OrgId) -> Self { Self { store, org, primed: AtomicBool::new(false) } }

    /// Delete the tenant's rows whose key is not in `live`. Returns the number removed.
    fn prune_stale(&self, live: &[IpResource]) -> anyhow::Result<usize> {
        let org = i64::from(self.org.0);
        let keep: HashSet<(&str, i64)> = live.iter().map(|i| (i.ip.as_str(), i.subnet_id)).collect();
        self.store.with_conn(|db| {
            let tx = db.transaction()?;
            let stale: Vec<IpResourceKey> = {
                let mut stmt = tx.prepare(&format!("SELECT ip, subnet_id FROM {} WHERE org_id = ?1", IpResource::TABLE))?;
                let rows = stmt.query_map(rusqlite::params![org], |r| Ok(IpResourceKey { ip: r.get(0)?, subnet_id: r.get(1)? }))?;
                let mut out = Vec::new();
                for row in rows {
                    let k = row?;
                    if !keep.contains(&(k.ip.as_str(), k.subnet_id)) {
                        out.push(k);
                    }
                }
                out
            };
            delete_keys(&tx, org, &stale)?;
            tx.commit()?;
            Ok(stale.len())
        })
    }
}

fn delete_keys(tx: &Transaction<'_>, org: i64, keys: &[IpResourceKey]) -> anyhow::Result<()> {
    let mut stmt = tx.prepare(&format!("DELETE FROM {} WHERE org_id = ?1 AND ip = ?2 AND subnet_id = ?3", IpResource::TABLE))?;
    for k in keys {
        stmt.execute(rusqlite::params![org, k.ip, k.subnet_id])?;
    }
    Ok(())
}

impl Listener<IpResource> for DimensionTableWriter {
    fn name(&self) -> &str { "ch_ip_resource_writer" }

    fn on_added(&self, items: &[IpResource]) -> anyhow::Result<()> {
        if !self.primed.swap(true, Ordering::SeqCst) {
            let pruned = self.prune_stale(items).context("pruning stale dimension rows")?;
            if pruned > 0 {
                info!(org_id = %self.org, rows = pruned, "stale dimension rows pruned");
            }
        }
        let n = self.store.insert_all(self.org, items)?;
        debug!(org_id = %self.org, rows = n, "dimension rows inserted");
        Ok(())
    }

    fn on_updated(&self, new: &IpResource, old: &IpResource) -> anyhow::Result<()> {
        let delta = field_delta(old, new);
        self.store
            .update_columns(self.org, new, &delta)
            .with_context(|| format!("updating {} {}/{}", IpResource::TABLE, new.ip, new.subnet_id))?;
        Ok(())
    }

    fn on_deleted(&self, keys: &[IpResourceKey]) -> anyhow::Result<()> {
        let org = i64::from(self.org.0);
        self.store.with_conn(|db| {
            let tx = db.transaction()?;
            delete_keys(&tx, org, keys)?;
            tx.commit()?;
            Ok(())
        })
    }
}
