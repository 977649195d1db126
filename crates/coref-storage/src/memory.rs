//! In-process ordered backend: one `BTreeMap` per table.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use parking_lot::RwLock;

use crate::kv::{KeyFieldType, KeyRange, KvError, KvRow, OrderedKv, TableSpec};

#[derive(Debug)]
struct Table {
    key: Vec<KeyFieldType>,
    rows: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Non-durable [`OrderedKv`] for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryKv {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored in `table` (0 if undeclared).
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, |t| t.rows.len())
    }
}

impl OrderedKv for MemoryKv {
    fn setup_namespace(&self, tables: &[TableSpec]) -> Result<(), KvError> {
        let mut guard = self.tables.write();
        for spec in tables {
            if let Some(existing) = guard.get(&spec.name) {
                if existing.key != spec.key {
                    return Err(KvError::SchemaMismatch(spec.name.clone()));
                }
            }
        }
        for spec in tables {
            guard.entry(spec.name.clone()).or_insert_with(|| Table {
                key: spec.key.clone(),
                rows: BTreeMap::new(),
            });
        }
        Ok(())
    }

    fn put(&self, table: &str, rows: &[KvRow]) -> Result<(), KvError> {
        let mut guard = self.tables.write();
        let t = guard
            .get_mut(table)
            .ok_or_else(|| KvError::UnknownTable(table.to_string()))?;
        for (key, value) in rows {
            t.rows.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn scan_page(
        &self,
        table: &str,
        range: &KeyRange,
        limit: usize,
    ) -> Result<Vec<KvRow>, KvError> {
        let guard = self.tables.read();
        let t = guard
            .get(table)
            .ok_or_else(|| KvError::UnknownTable(table.to_string()))?;
        // BTreeMap::range panics on inverted bounds.
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let upper = match range.end.as_deref() {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        Ok(t.rows
            .range::<[u8], _>((Bound::Included(range.start.as_slice()), upper))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn clear_table(&self, table: &str) -> Result<(), KvError> {
        let mut guard = self.tables.write();
        let t = guard
            .get_mut(table)
            .ok_or_else(|| KvError::UnknownTable(table.to_string()))?;
        t.rows.clear();
        Ok(())
    }
}
