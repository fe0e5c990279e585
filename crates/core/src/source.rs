//! Snapshot sources: the boundary between a cycle and its authoritative backend.

use std::marker::PhantomData;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::SyncError;
use crate::schema::{AttrRow, Record};
use crate::OrgId;

/// A full keyed snapshot of one kind.
pub type Snapshot<R> = FxHashMap<<R as Record>::Key, R>;

/// Key a list of items. A later duplicate key replaces an earlier one.
pub fn keyed<R: Record>(items: impl IntoIterator<Item = R>) -> Snapshot<R> {
    items.into_iter().map(|item| (item.key(), item)).collect()
}

/// Outcome of a fetch: a complete snapshot, or a reason the cycle should be
/// skipped without failing (backing connection not configured).
#[derive(Debug)]
pub enum Fetch<R: Record> {
    Ready(Snapshot<R>),
    Skip(String),
}

/// Fetches the complete current set of items for one kind. Blocking.
pub trait SnapshotSource<R: Record>: Send + Sync {
    fn fetch(&self, org: OrgId) -> Result<Fetch<R>, SyncError>;
}

/// Relational backend: every row of `table` for the tenant, soft-deleted rows included.
pub trait RowSource: Send + Sync {
    fn fetch_rows(&self, org: OrgId, table: &str, columns: &[&str]) -> anyhow::Result<Vec<AttrRow>>;
}

/// A kind backed by one relational table whose columns are its schema names.
pub trait TableRecord: Record {
    const TABLE: &'static str;
    /// Columns that identify a row within one tenant.
    const KEY_COLUMNS: &'static [&'static str] = &["lcuuid"];
}

/// Direct form: read the kind's table and key every row.
pub struct TableSource<R> {
    rows: Arc<dyn RowSource>,
    _kind: PhantomData<fn() -> R>,
}

impl<R> TableSource<R> {
    pub fn new(rows: Arc<dyn RowSource>) -> Self { Self { rows, _kind: PhantomData } }
}

impl<R: TableRecord> SnapshotSource<R> for TableSource<R> {
    fn fetch(&self, org: OrgId) -> Result<Fetch<R>, SyncError> {
        let columns: Vec<&str> = R::schema().iter().map(|f| f.name).collect();
        let rows = self
            .rows
            .fetch_rows(org, R::TABLE, &columns)
            .map_err(|source| SyncError::SourceFetch { kind: R::KIND, org, source })?;
        let mut snap = Snapshot::<R>::default();
        for row in rows.iter() {
            let item = R::from_row(row).map_err(|e| SyncError::parse(R::KIND, org, e))?;
            snap.insert(item.key(), item);
        }
        Ok(Fetch::Ready(snap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vm;
    use crate::schema::AttrValue;
    use std::sync::Mutex;

    struct Rows {
        rows: Vec<AttrRow>,
        fail: bool,
        seen: Mutex<Vec<(OrgId, String)>>,
    }

    impl RowSource for Rows {
        fn fetch_rows(&self, org: OrgId, table: &str, _columns: &[&str]) -> anyhow::Result<Vec<AttrRow>> {
            self.seen.lock().unwrap().push((org, table.to_string()));
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(self.rows.clone())
        }
    }

    fn row(lcuuid: &str, name: &str, deleted_at: &str) -> AttrRow {
        let mut r = AttrRow::new();
        r.insert("lcuuid".into(), AttrValue::from(lcuuid));
        r.insert("name".into(), AttrValue::from(name));
        r.insert("deleted_at".into(), AttrValue::from(deleted_at));
        r
    }

    #[test]
    fn table_source_keeps_soft_deleted_rows_and_scopes_by_org() {
        let rows = Arc::new(Rows {
            rows: vec![row("a", "web", ""), row("b", "old", "2024-01-01 00:00:00")],
            fail: false,
            seen: Mutex::new(Vec::new()),
        });
        let src = TableSource::<Vm>::new(rows.clone());
        let Fetch::Ready(snap) = src.fetch(OrgId(3)).unwrap() else { panic!("expected snapshot") };
        assert_eq!(snap.len(), 2);
        assert_eq!(snap["b"].deleted_at, "2024-01-01 00:00:00");
        assert_eq!(rows.seen.lock().unwrap().as_slice(), &[(OrgId(3), "vm".to_string())]);
    }

    #[test]
    fn table_source_fetch_failure_is_source_fetch_error() {
        let rows = Arc::new(Rows { rows: vec![], fail: true, seen: Mutex::new(Vec::new()) });
        let err = TableSource::<Vm>::new(rows).fetch(OrgId(1)).unwrap_err();
        assert!(matches!(err, SyncError::SourceFetch { .. }));
        assert_eq!(err.org(), OrgId(1));
    }

    #[test]
    fn table_source_bad_column_type_is_parse_error() {
        let mut bad = row("a", "web", "");
        bad.insert("state".into(), AttrValue::from("running"));
        let rows = Arc::new(Rows { rows: vec![bad], fail: false, seen: Mutex::new(Vec::new()) });
        let err = TableSource::<Vm>::new(rows).fetch(OrgId(1)).unwrap_err();
        assert!(matches!(err, SyncError::Parse { .. }));
    }
}
