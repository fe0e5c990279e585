//! cloudrec persistence: SQLite tables behind the direct-form kinds.
//! One table per kind, columns named after the kind's schema, every row
//! scoped by `org_id`. Rows are never filtered on `deleted_at`.

#![forbid(unsafe_code)]

use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, bail, Context, Result};
use cloudrec_core::models::{IpResource, Lb, NatGateway, PodIngressRuleBackend, RdsInstance, RedisInstance, Subnet, Vm, Vpc};
use cloudrec_core::{AttrRow, AttrType, AttrValue, FieldDelta, OrgId, RowSource, TableRecord};
use metrics::{counter, histogram};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

pub mod seed;
pub mod writer;

pub use seed::{seed_demo, SeedSummary};
pub use writer::DimensionTableWriter;

/// SQLite-backed relational store. Simple, synchronous; callers run it off the async runtime.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("CLOUDREC_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", "WAL").ok();
        db.pragma_update(None, "synchronous", "NORMAL").ok();
        let me = Self { db: Mutex::new(db) };
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(me)
    }

    /// Create every kind's table and its per-tenant unique key index.
    pub fn init_schema(&self) -> Result<()> {
        self.create_table::<Vm>()?;
        self.create_table::<Vpc>()?;
        self.create_table::<Subnet>()?;
        self.create_table::<Lb>()?;
        self.create_table::<NatGateway>()?;
        self.create_table::<RdsInstance>()?;
        self.create_table::<RedisInstance>()?;
        self.create_table::<PodIngressRuleBackend>()?;
        self.create_table::<IpResource>()?;
        Ok(())
    }

    fn create_table<R: TableRecord>(&self) -> Result<()> {
        let cols: Vec<String> = R::schema()
            .iter()
            .map(|f| match f.ty {
                AttrType::Int => format!("{} INTEGER NOT NULL DEFAULT 0", f.name),
                AttrType::Str => format!("{} TEXT NOT NULL DEFAULT ''", f.name),
            })
            .collect();
        let db = self.conn();
        db.execute(&format!("CREATE TABLE IF NOT EXISTS {} (org_id INTEGER NOT NULL, {})", R::TABLE, cols.join(", ")), [])
            .with_context(|| format!("creating {} table", R::TABLE))?;
        db.execute(
            &format!("CREATE UNIQUE INDEX IF NOT EXISTS ux_{0}_key ON {0}(org_id, {1})", R::TABLE, R::KEY_COLUMNS.join(", ")),
            [],
        )
        .with_context(|| format!("creating {} key index", R::TABLE))?;
        Ok(())
    }

    /// Insert or replace rows by key.
    pub fn insert_all<R: TableRecord>(&self, org: OrgId, items: &[R]) -> Result<usize> {
        let cols: Vec<&str> = R::schema().iter().map(|f| f.name).collect();
        let marks: Vec<String> = (0..cols.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!("INSERT OR REPLACE INTO {} (org_id, {}) VALUES (?1, {})", R::TABLE, cols.join(", "), marks.join(", "));
        let mut db = self.conn();
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare(&sql).with_context(|| format!("preparing insert into {}", R::TABLE))?;
            for item in items {
                let mut params = vec![Value::Integer(i64::from(org.0))];
                params.extend(R::schema().iter().map(|f| to_sql(&(f.get)(item))));
                stmt.execute(params_from_iter(params))?;
            }
        }
        tx.commit()?;
        counter!("persist_rows_written_total", items.len() as u64, "table" => R::TABLE);
        Ok(items.len())
    }

    /// Overwrite only the listed columns of the row identified by `item`'s key.
    pub fn update_columns<R: TableRecord>(&self, org: OrgId, item: &R, delta: &FieldDelta) -> Result<usize> {
        if delta.is_empty() {
            return Ok(0);
        }
        let mut sets = Vec::with_capacity(delta.len());
        let mut params = Vec::with_capacity(delta.len() + R::KEY_COLUMNS.len() + 1);
        for (i, (name, v)) in delta.iter().enumerate() {
            let f = R::field(name).ok_or_else(|| anyhow!("{} has no column {}", R::TABLE, name))?;
            sets.push(format!("{} = ?{}", f.name, i + 1));
            params.push(to_sql(v));
        }
        let (filter, keys) = key_filter(org, item, params.len() + 1)?;
        params.extend(keys);
        let sql = format!("UPDATE {} SET {} WHERE {}", R::TABLE, sets.join(", "), filter);
        let n = self.conn().execute(&sql, params_from_iter(params)).with_context(|| format!("updating {}", R::TABLE))?;
        Ok(n)
    }

    /// Mark a row deleted without removing it.
    pub fn soft_delete<R: TableRecord>(&self, org: OrgId, item: &R) -> Result<bool> {
        if R::field("deleted_at").is_none() {
            bail!("{} has no deleted_at column", R::TABLE);
        }
        let (filter, keys) = key_filter(org, item, 2)?;
        let mut params = vec![Value::Text(now_ts())];
        params.extend(keys);
        let sql = format!("UPDATE {} SET deleted_at = ?1 WHERE {}", R::TABLE, filter);
        let n = self.conn().execute(&sql, params_from_iter(params))?;
        Ok(n > 0)
    }

    /// Remove a row outright.
    pub fn remove<R: TableRecord>(&self, org: OrgId, item: &R) -> Result<bool> {
        let (filter, keys) = key_filter(org, item, 1)?;
        let n = self.conn().execute(&format!("DELETE FROM {} WHERE {}", R::TABLE, filter), params_from_iter(keys))?;
        Ok(n > 0)
    }

    pub fn count(&self, org: OrgId, table: &str) -> Result<usize> {
        let table = ident(table)?;
        let n: i64 = self
            .conn()
            .query_row(&format!("SELECT COUNT(*) FROM {} WHERE org_id = ?1", table), [i64::from(org.0)], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut db = self.conn();
        f(&mut db)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> { self.db.lock().unwrap_or_else(PoisonError::into_inner) }
}

impl RowSource for SqliteStore {
    fn fetch_rows(&self, org: OrgId, table: &str, columns: &[&str]) -> Result<Vec<AttrRow>> {
        let started = std::time::Instant::now();
        let table = ident(table)?;
        for c in columns {
            ident(c)?;
        }
        let sql = format!("SELECT {} FROM {} WHERE org_id = ?1", columns.join(", "), table);
        let db = self.conn();
        let mut stmt = db.prepare(&sql).with_context(|| format!("querying {}", table))?;
        let mut rows = stmt.query([i64::from(org.0)])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut r = AttrRow::new();
            for (i, c) in columns.iter().enumerate() {
                if let Some(v) = from_sql(row.get_ref(i)?).with_context(|| format!("{}.{}", table, c))? {
                    r.insert((*c).to_string(), v);
                }
            }
            out.push(r);
        }
        debug!(org_id = %org, table, rows = out.len(), "rows fetched");
        histogram!("persist_fetch_ms", started.elapsed().as_secs_f64() * 1000.0, "table" => table.to_string());
        Ok(out)
    }
}

fn key_filter<R: TableRecord>(org: OrgId, item: &R, first: usize) -> Result<(String, Vec<Value>)> {
    let mut clauses = vec![format!("org_id = ?{}", first)];
    let mut params = vec![Value::Integer(i64::from(org.0))];
    for (i, col) in R::KEY_COLUMNS.iter().enumerate() {
        let f = R::field(col).ok_or_else(|| anyhow!("{} key column {} not in schema", R::TABLE, col))?;
        clauses.push(format!("{} = ?{}", f.name, first + i + 1));
        params.push(to_sql(&(f.get)(item)));
    }
    Ok((clauses.join(" AND "), params))
}

/// Table and column names are spliced into SQL; only plain identifiers pass.
fn ident(s: &str) -> Result<&str> {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_') {
        Ok(s)
    } else {
        Err(anyhow!("invalid identifier: {:?}", s))
    }
}

fn to_sql(v: &AttrValue) -> Value {
    match v {
        AttrValue::Int(i) => Value::Integer(*i),
        AttrValue::Str(s) => Value::Text(s.clone()),
    }
}

fn from_sql(v: ValueRef<'_>) -> Result<Option<AttrValue>> {
    Ok(match v {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(AttrValue::Int(i)),
        ValueRef::Real(f) => Some(AttrValue::Int(f as i64)),
        ValueRef::Text(t) => Some(AttrValue::Str(String::from_utf8_lossy(t).into_owned())),
        ValueRef::Blob(_) => bail!("blob columns are not supported"),
    })
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".cloudrec");
        let _ = std::fs::create_dir_all(&p);
        p.push("cloudrec.db");
        return p.to_string_lossy().to_string();
    }
    // Fallback to current directory
    "cloudrec.db".to_string()
}

/// `deleted_at` timestamp format.
pub fn now_ts() -> String { chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string() }
