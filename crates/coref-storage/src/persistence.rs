//! Durable persistence on redb.
//!
//! Each declared table is a redb table of `&[u8] -> &[u8]`. redb keeps keys in
//! a copy-on-write B-tree ordered bytewise, which is exactly the order the
//! label codec relies on.
//!
//! 1. Every `put` is one write transaction, so all rows passed together
//!    (a label and its reversal) commit or fail as a unit
//! 2. Every `scan_page` opens its own read transaction and drops it before
//!    returning
//! 3. `clear_table` deletes and recreates the table in one transaction

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};

use crate::kv::{backend, KeyFieldType, KeyRange, KvError, KvRow, OrderedKv, TableSpec};

fn table_def(name: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(name)
}

/// [`OrderedKv`] backed by a single redb database file.
pub struct RedbKv {
    db: Database,
    path: PathBuf,
    /// Key layout of every table declared through this handle.
    declared: RwLock<HashMap<String, Vec<KeyFieldType>>>,
}

impl std::fmt::Debug for RedbKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbKv")
            .field("path", &self.path)
            .field("declared", &*self.declared.read())
            .finish_non_exhaustive()
    }
}

impl RedbKv {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(backend)?;
            }
        }
        let db = Database::create(path).map_err(backend)?;
        tracing::debug!(path = %path.display(), "opened redb label database");
        Ok(Self {
            db,
            path: path.to_path_buf(),
            declared: RwLock::new(HashMap::new()),
        })
    }

    fn ensure_declared(&self, table: &str) -> Result<(), KvError> {
        if self.declared.read().contains_key(table) {
            Ok(())
        } else {
            Err(KvError::UnknownTable(table.to_string()))
        }
    }
}

impl OrderedKv for RedbKv {
    fn setup_namespace(&self, tables: &[TableSpec]) -> Result<(), KvError> {
        {
            let declared = self.declared.read();
            for spec in tables {
                if declared.get(&spec.name).is_some_and(|key| *key != spec.key) {
                    return Err(KvError::SchemaMismatch(spec.name.clone()));
                }
            }
        }
        let w = self.db.begin_write().map_err(backend)?;
        for spec in tables {
            drop(w.open_table(table_def(&spec.name)).map_err(backend)?);
        }
        w.commit().map_err(backend)?;

        let mut declared = self.declared.write();
        for spec in tables {
            declared
                .entry(spec.name.clone())
                .or_insert_with(|| spec.key.clone());
        }
        Ok(())
    }

    fn put(&self, table: &str, rows: &[KvRow]) -> Result<(), KvError> {
        self.ensure_declared(table)?;
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut t = w.open_table(table_def(table)).map_err(backend)?;
            for (key, value) in rows {
                t.insert(key.as_slice(), value.as_slice())
                    .map_err(backend)?;
            }
        }
        w.commit().map_err(backend)
    }

    fn scan_page(
        &self,
        table: &str,
        range: &KeyRange,
        limit: usize,
    ) -> Result<Vec<KvRow>, KvError> {
        self.ensure_declared(table)?;
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let r = self.db.begin_read().map_err(backend)?;
        let t = r.open_table(table_def(table)).map_err(backend)?;
        let start = range.start.as_slice();
        let iter = match range.end.as_deref() {
            Some(end) => t.range::<&[u8]>(start..end),
            None => t.range::<&[u8]>(start..),
        }
        .map_err(backend)?;

        let mut rows = Vec::new();
        for entry in iter.take(limit) {
            let (k, v) = entry.map_err(backend)?;
            rows.push((k.value().to_vec(), v.value().to_vec()));
        }
        Ok(rows)
    }

    fn clear_table(&self, table: &str) -> Result<(), KvError> {
        self.ensure_declared(table)?;
        let w = self.db.begin_write().map_err(backend)?;
        w.delete_table(table_def(table)).map_err(backend)?;
        drop(w.open_table(table_def(table)).map_err(backend)?);
        w.commit().map_err(backend)
    }
}
