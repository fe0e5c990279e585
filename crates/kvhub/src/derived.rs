//! Derived-form snapshots: items assembled from an association namespace
//! plus uid lookups against auxiliary kinds.
//!
//! Pipeline per entry: parse key → translate each tag → look it up in the
//! blob → classify the first list element → resolve uid → decode the row.

use std::marker::PhantomData;
use std::num::ParseIntError;
use std::sync::Arc;

use cloudrec_core::{
    AttrRow, AttrValue, AuxIdentities, AuxIdentityResolver, AuxKind, Fetch, OrgId, Record, RowSource, Snapshot,
    SnapshotSource, SyncError,
};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{AssociationStore, KvError};

/// A kind whose snapshot is derived from an association namespace.
pub trait DerivedRecord: Record {
    /// Logical namespace holding the kind's entries.
    const NAMESPACE: &'static str;
    /// Attributes read from the blob, in resolution order.
    const TAGS: &'static [&'static str];
    /// Substring renames applied, in order, before the plural suffix.
    const RENAMES: &'static [(&'static str, &'static str)];

    /// Attributes carried by the entry key itself.
    fn key_attrs(prefix: i64, ident: &str) -> AttrRow;
}

/// Blob lookup name for `tag`.
pub fn translate(renames: &[(&str, &str)], tag: &str) -> String {
    let mut name = renames.iter().fold(tag.to_string(), |acc, (from, to)| acc.replace(from, to));
    name.push('s');
    name
}

/// Split `"<prefix>-<ident>"`. `Ok(None)` when the key does not have exactly two parts.
pub fn parse_entry_key(key: &str) -> Result<Option<(i64, &str)>, ParseIntError> {
    let mut parts = key.split('-');
    let (Some(prefix), Some(ident), None) = (parts.next(), parts.next(), parts.next()) else {
        return Ok(None);
    };
    Ok(Some((prefix.parse::<i64>()?, ident)))
}

/// Assemble the attribute row for one entry.
pub fn build_row<R: DerivedRecord>(prefix: i64, ident: &str, blob: &str, aux: &AuxIdentities) -> Result<AttrRow, String> {
    let doc: Option<serde_json::Map<String, Value>> =
        serde_json::from_str(blob).map_err(|e| format!("decoding association blob: {}", e))?;
    let doc = doc.unwrap_or_default();
    let mut row = R::key_attrs(prefix, ident);
    for tag in R::TAGS {
        let lookup = translate(R::RENAMES, tag);
        let Some(Value::Array(list)) = doc.get(&lookup) else { continue };
        match list.first() {
            Some(Value::String(s)) => {
                row.insert(tag.to_uppercase(), AttrValue::Str(s.clone()));
            }
            Some(Value::Number(n)) => {
                let id = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or_default();
                row.insert(tag.to_uppercase(), AttrValue::Int(id));
                if let Some(kind) = lookup.strip_suffix("_ids").and_then(AuxKind::from_tag_prefix) {
                    let uid = aux.resolve(kind, id);
                    if uid.is_none() {
                        counter!("recorder_resolve_miss_total", 1u64, "aux" => kind.table());
                    }
                    row.insert("uid".to_string(), AttrValue::from(uid.unwrap_or_default()));
                }
            }
            _ => {}
        }
    }
    Ok(row)
}

/// Snapshot source for any [`DerivedRecord`]. Without an association store
/// every fetch is skipped.
pub struct DerivedSource<R> {
    rows: Arc<dyn RowSource>,
    kv: Option<Arc<dyn AssociationStore>>,
    _kind: PhantomData<fn() -> R>,
}

impl<R> DerivedSource<R> {
    pub fn new(rows: Arc<dyn RowSource>, kv: Option<Arc<dyn AssociationStore>>) -> Self {
        Self { rows, kv, _kind: PhantomData }
    }
}

impl<R: DerivedRecord> SnapshotSource<R> for DerivedSource<R> {
    fn fetch(&self, org: OrgId) -> Result<Fetch<R>, SyncError> {
        let Some(kv) = self.kv.as_ref() else {
            return Ok(Fetch::Skip(format!("no association store for {}", R::NAMESPACE)));
        };
        let entries = match kv.hgetall(org, R::NAMESPACE) {
            Ok(entries) => entries,
            Err(KvError::Unavailable(reason)) => {
                warn!(kind = %R::KIND, org_id = %org, %reason, "association store unavailable; skipping");
                return Ok(Fetch::Skip(reason));
            }
            Err(e) => return Err(SyncError::SourceFetch { kind: R::KIND, org, source: e.into() }),
        };
        let aux = AuxIdentityResolver::new(self.rows.as_ref()).build(org, &AuxKind::ALL);

        let mut snap = Snapshot::<R>::default();
        let mut malformed = 0u64;
        for (field, blob) in entries.iter() {
            let parsed = parse_entry_key(field)
                .map_err(|e| SyncError::parse(R::KIND, org, format!("entry key {:?}: {}", field, e)))?;
            let Some((prefix, ident)) = parsed else {
                malformed += 1;
                continue;
            };
            if prefix == 0 {
                continue;
            }
            let row = build_row::<R>(prefix, ident, blob, &aux)
                .map_err(|e| SyncError::parse(R::KIND, org, format!("entry {:?}: {}", field, e)))?;
            let item = R::from_row(&row).map_err(|e| SyncError::parse(R::KIND, org, format!("entry {:?}: {}", field, e)))?;
            snap.insert(item.key(), item);
        }
        if malformed > 0 {
            warn!(kind = %R::KIND, org_id = %org, malformed, "skipped association entries with malformed keys");
            counter!("recorder_malformed_keys_total", malformed, "kind" => R::KIND.as_str());
        }
        debug!(kind = %R::KIND, org_id = %org, entries = entries.len(), items = snap.len(), "derived snapshot built");
        Ok(Fetch::Ready(snap))
    }
}
