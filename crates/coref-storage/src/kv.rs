//! The ordered key-value collaborator.
//!
//! The label store needs four things from a storage engine: declare a table,
//! upsert rows, scan a half-open key range in ascending order, and clear a
//! table. Keys and values are opaque bytes; the label codec is responsible for
//! making byte order match the logical key order.
//!
//! Scans are paged. [`Scan`] asks the backend for one page at a time and
//! resumes strictly after the last key it saw, so no backend lock or read
//! transaction outlives a single `scan_page` call.

use std::collections::VecDeque;
use std::sync::Arc;

/// One stored row: `(key, value)`.
pub type KvRow = (Vec<u8>, Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KvError {
    /// A generic error from the underlying engine (e.g. redb).
    #[error("backend error: {0}")]
    Backend(String),
    /// The table was never declared with `setup_namespace`.
    #[error("unknown table: {0}")]
    UnknownTable(String),
    /// The table was already declared with a different key layout.
    #[error("table {0} is already declared with a different key layout")]
    SchemaMismatch(String),
}

pub(crate) fn backend<E: std::fmt::Display>(e: E) -> KvError {
    KvError::Backend(e.to_string())
}

/// Logical type of one key field, as declared to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFieldType {
    Str,
    U64,
}

/// Declaration of one table: its name and composite key layout. Values are
/// always opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub key: Vec<KeyFieldType>,
}

/// Half-open byte range `start <= key < end`. A missing `end` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Option<Vec<u8>>,
}

impl KeyRange {
    pub fn all() -> Self {
        Self {
            start: Vec::new(),
            end: None,
        }
    }

    /// Every key starting with `prefix`.
    pub fn prefix(prefix: Vec<u8>) -> Self {
        let end = coref_label::codec::prefix_end(&prefix);
        Self { start: prefix, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end
            .as_deref()
            .is_some_and(|end| end <= self.start.as_slice())
    }

    /// The rest of this range after `last_key`. Appending a zero byte gives
    /// the smallest key strictly greater than `last_key`.
    pub fn resume_after(&self, last_key: &[u8]) -> Self {
        let mut start = Vec::with_capacity(last_key.len() + 1);
        start.extend_from_slice(last_key);
        start.push(0);
        Self {
            start,
            end: self.end.clone(),
        }
    }
}

/// A sorted key-value engine.
///
/// Implementations must return `scan_page` rows in ascending byte order of
/// key, and `put` of an existing key replaces its value.
pub trait OrderedKv: Send + Sync {
    /// Declare tables. Declaring a table again with the same key layout is a
    /// no-op; a different layout is [`KvError::SchemaMismatch`].
    fn setup_namespace(&self, tables: &[TableSpec]) -> Result<(), KvError>;

    fn put(&self, table: &str, rows: &[KvRow]) -> Result<(), KvError>;

    /// Up to `limit` rows of `range`, ascending.
    fn scan_page(&self, table: &str, range: &KeyRange, limit: usize)
        -> Result<Vec<KvRow>, KvError>;

    fn clear_table(&self, table: &str) -> Result<(), KvError>;
}

macro_rules! forward_ordered_kv {
    ($($ptr:ty),*) => {
        $(
            impl<T: OrderedKv + ?Sized> OrderedKv for $ptr {
                fn setup_namespace(&self, tables: &[TableSpec]) -> Result<(), KvError> {
                    (**self).setup_namespace(tables)
                }

                fn put(&self, table: &str, rows: &[KvRow]) -> Result<(), KvError> {
                    (**self).put(table, rows)
                }

                fn scan_page(
                    &self,
                    table: &str,
                    range: &KeyRange,
                    limit: usize,
                ) -> Result<Vec<KvRow>, KvError> {
                    (**self).scan_page(table, range, limit)
                }

                fn clear_table(&self, table: &str) -> Result<(), KvError> {
                    (**self).clear_table(table)
                }
            }
        )*
    };
}

forward_ordered_kv!(&T, Box<T>, Arc<T>);

/// Lazy ascending scan over one key range.
///
/// Pulls `page_size` rows at a time. Fused: after the range is exhausted or
/// an error has been returned, `next` yields `None`.
pub struct Scan<'a, K: OrderedKv + ?Sized> {
    kv: &'a K,
    table: String,
    remaining: Option<KeyRange>,
    page_size: usize,
    buffer: VecDeque<KvRow>,
}

impl<'a, K: OrderedKv + ?Sized> Scan<'a, K> {
    pub fn new(kv: &'a K, table: impl Into<String>, range: KeyRange, page_size: usize) -> Self {
        let remaining = if range.is_empty() { None } else { Some(range) };
        Self {
            kv,
            table: table.into(),
            remaining,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
        }
    }
}

impl<K: OrderedKv + ?Sized> Iterator for Scan<'_, K> {
    type Item = Result<KvRow, KvError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Some(Ok(row));
            }
            let range = self.remaining.take()?;
            let rows = match self.kv.scan_page(&self.table, &range, self.page_size) {
                Ok(rows) => rows,
                Err(e) => return Some(Err(e)),
            };
            tracing::trace!(table = %self.table, rows = rows.len(), "fetched scan page");
            // A short page means the range is exhausted.
            if rows.len() >= self.page_size {
                if let Some((last, _)) = rows.last() {
                    self.remaining = Some(range.resume_after(last));
                }
            }
            if rows.is_empty() {
                return None;
            }
            self.buffer.extend(rows);
        }
    }
}
