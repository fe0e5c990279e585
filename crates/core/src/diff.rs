//! Generic snapshot differencer.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::schema::{AttrValue, Record};
use crate::source::Snapshot;
use crate::{OrgId, ResourceKind};

/// Changed attributes only, keyed by lower-case attribute name, valued with the new value.
pub type FieldDelta = BTreeMap<String, AttrValue>;

/// Tenant + kind a change set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Scope {
    pub org: OrgId,
    pub kind: ResourceKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet<R: Record> {
    pub scope: Scope,
    pub added: Vec<R>,
    pub updated: Vec<(R::Key, FieldDelta)>,
    pub deleted: Vec<R::Key>,
}

impl<R: Record> ChangeSet<R> {
    pub fn empty(org: OrgId) -> Self {
        Self { scope: Scope { org, kind: R::KIND }, added: Vec::new(), updated: Vec::new(), deleted: Vec::new() }
    }

    pub fn is_empty(&self) -> bool { self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty() }
}

/// Attribute-by-attribute comparison over the kind's schema.
pub fn field_delta<R: Record>(old: &R, new: &R) -> FieldDelta {
    let mut delta = FieldDelta::new();
    for f in R::schema() {
        let after = (f.get)(new);
        if (f.get)(old) != after {
            delta.insert(f.name.to_ascii_lowercase(), after);
        }
    }
    delta
}

/// Compare the previous snapshot against the new one.
///
/// Lists come back sorted by key so logs and reports are stable; listeners
/// must still treat the order as unspecified.
pub fn diff<R: Record>(org: OrgId, old: &Snapshot<R>, new: &Snapshot<R>) -> ChangeSet<R> {
    let mut cs = ChangeSet::empty(org);
    for (key, item) in new.iter() {
        match old.get(key) {
            None => cs.added.push(item.clone()),
            Some(prev) => {
                let delta = field_delta(prev, item);
                if !delta.is_empty() {
                    cs.updated.push((key.clone(), delta));
                }
            }
        }
    }
    cs.deleted.extend(old.keys().filter(|k| !new.contains_key(*k)).cloned());

    cs.added.sort_by_key(|a| a.key());
    cs.updated.sort_by(|a, b| a.0.cmp(&b.0));
    cs.deleted.sort();
    debug!(
        kind = %R::KIND,
        org_id = %org,
        added = cs.added.len(),
        updated = cs.updated.len(),
        deleted = cs.deleted.len(),
        "diff computed"
    );
    cs
}
