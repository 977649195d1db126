//! `LabelStore`: the only component that talks to the key-value collaborator.
//!
//! Every label is written twice, once per orientation, so a prefix scan on
//! either content id finds it. Rows for one judgment differ only in their
//! trailing time complement and therefore sit next to each other, newest
//! first; deduplication just keeps the first of each run of equal labels.

use coref_label::codec::{encode_prefix, label_from_key};
use coref_label::{from_storage, to_storage, Ident, Label, StorageKey};

use crate::error::{Result, StoreError};
use crate::kv::{KeyFieldType, KeyRange, KvRow, OrderedKv, Scan, TableSpec};
use crate::StoreConfig;

/// Default name of the label table.
pub const LABEL_TABLE: &str = "label";

/// `(cid1, cid2, subid1, subid2, annotator_id, time_complement)`.
pub fn label_table_spec(name: &str) -> TableSpec {
    TableSpec {
        name: name.to_string(),
        key: vec![
            KeyFieldType::Str,
            KeyFieldType::Str,
            KeyFieldType::Str,
            KeyFieldType::Str,
            KeyFieldType::Str,
            KeyFieldType::U64,
        ],
    }
}

/// Durable store of coreference labels over an injected [`OrderedKv`].
pub struct LabelStore<K> {
    kv: K,
    table: String,
    scan_page_size: usize,
}

impl<K: OrderedKv> LabelStore<K> {
    /// Store with default settings; declares the label table.
    pub fn new(kv: K) -> Result<Self> {
        Self::with_config(kv, &StoreConfig::default())
    }

    /// Only `table` and `scan_page_size` are read from `config`; the backend
    /// has already been chosen by the caller.
    pub fn with_config(kv: K, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        kv.setup_namespace(&[label_table_spec(&config.table)])?;
        tracing::debug!(table = %config.table, "declared label table");
        Ok(Self {
            kv,
            table: config.table.clone(),
            scan_page_size: config.scan_page_size,
        })
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Write `label` and its reversal.
    pub fn put(&self, label: &Label) -> Result<()> {
        self.put_all(std::iter::once(label))
    }

    /// Write every label and its reversal in a single collaborator call.
    pub fn put_all<'l>(&self, labels: impl IntoIterator<Item = &'l Label>) -> Result<()> {
        let rows: Vec<KvRow> = labels
            .into_iter()
            .flat_map(|label| [to_storage(label), to_storage(&label.reversed())])
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        self.kv.put(&self.table, &rows)?;
        tracing::debug!(table = %self.table, rows = rows.len(), "stored labels");
        Ok(())
    }

    /// Remove every label.
    pub fn delete_all(&self) -> Result<()> {
        self.kv.clear_table(&self.table)?;
        tracing::debug!(table = %self.table, "cleared label table");
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Most recent whole-item label between two content ids by one annotator.
    pub fn get(&self, content_id1: &str, content_id2: &str, annotator_id: &str) -> Result<Label> {
        self.get_with_subtopics(content_id1, content_id2, annotator_id, "", "")
    }

    pub fn get_with_subtopics(
        &self,
        content_id1: &str,
        content_id2: &str,
        annotator_id: &str,
        subtopic_id1: &str,
        subtopic_id2: &str,
    ) -> Result<Label> {
        let prefix = encode_prefix(&[
            content_id1,
            content_id2,
            subtopic_id1,
            subtopic_id2,
            annotator_id,
        ]);
        // Only the newest row is needed.
        let mut rows = Scan::new(&self.kv, self.table.as_str(), KeyRange::prefix(prefix), 1);
        match rows.next() {
            Some(row) => {
                let (key, value) = row?;
                Ok(from_storage(&key, &value)?)
            }
            None => Err(StoreError::NotFound {
                content_id1: content_id1.to_string(),
                content_id2: content_id2.to_string(),
                subtopic_id1: subtopic_id1.to_string(),
                subtopic_id2: subtopic_id2.to_string(),
                annotator_id: annotator_id.to_string(),
            }),
        }
    }

    /// Latest labels touching `ident`, oriented so `content_id1` is the
    /// ident's content id. A subtopic ident keeps only labels with that exact
    /// `(content_id, subtopic_id)` side.
    pub fn directly_connected(&self, ident: impl Into<Ident>) -> DirectlyConnected<'_, K> {
        let ident = ident.into();
        let range = KeyRange::prefix(encode_prefix(&[ident.content_id()]));
        let rows = DecodedRows::new(self.scan(range), RowFilter::SkipReversedSelfPairs);
        DirectlyConnected {
            labels: LatestLabels::new(rows),
            subtopic: ident.has_subtopic().then_some(ident),
        }
    }

    /// Every label, once each. With `include_deleted` every stored version is
    /// returned instead of only the latest.
    pub fn everything(&self, include_deleted: bool) -> Everything<'_, K> {
        let rows = DecodedRows::new(self.scan(KeyRange::all()), RowFilter::Canonical);
        if include_deleted {
            Everything::History(rows)
        } else {
            Everything::Latest(LatestLabels::new(rows))
        }
    }

    fn scan(&self, range: KeyRange) -> Scan<'_, K> {
        Scan::new(&self.kv, self.table.as_str(), range, self.scan_page_size)
    }
}

// ============================================================================
// Row decoding and deduplication
// ============================================================================

/// Which rows of a scan represent a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowFilter {
    /// Only the smaller-side-first row of each label.
    Canonical,
    /// Drop the second row of a label whose sides share a content id; both
    /// of its rows fall inside the same content-id prefix.
    SkipReversedSelfPairs,
}

impl RowFilter {
    fn admits(self, key: &StorageKey) -> bool {
        match self {
            RowFilter::Canonical => key.is_canonical(),
            RowFilter::SkipReversedSelfPairs => {
                key.content_id1 != key.content_id2 || key.is_canonical()
            }
        }
    }
}

/// Scan rows decoded into labels.
pub struct DecodedRows<'a, K: OrderedKv + ?Sized> {
    scan: Scan<'a, K>,
    filter: RowFilter,
}

impl<'a, K: OrderedKv + ?Sized> DecodedRows<'a, K> {
    fn new(scan: Scan<'a, K>, filter: RowFilter) -> Self {
        Self { scan, filter }
    }
}

impl<K: OrderedKv + ?Sized> Iterator for DecodedRows<'_, K> {
    type Item = Result<Label>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, value) = match self.scan.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e.into())),
            };
            let key = match StorageKey::decode(&key) {
                Ok(key) => key,
                Err(e) => return Some(Err(e.into())),
            };
            if !self.filter.admits(&key) {
                continue;
            }
            return Some(label_from_key(key, &value).map_err(StoreError::from));
        }
    }
}

/// Collapse runs of equal labels to their first element.
///
/// Over a storage-ordered scan the first element of a run is the most recent
/// version of that judgment.
pub struct LatestLabels<I> {
    inner: I,
    last: Option<Label>,
}

impl<I> LatestLabels<I> {
    pub fn new(inner: I) -> Self {
        Self { inner, last: None }
    }
}

impl<I, E> Iterator for LatestLabels<I>
where
    I: Iterator<Item = std::result::Result<Label, E>>,
{
    type Item = std::result::Result<Label, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(label) => {
                    if self.last.as_ref() == Some(&label) {
                        continue;
                    }
                    self.last = Some(label.clone());
                    return Some(Ok(label));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Iterator returned by [`LabelStore::directly_connected`].
pub struct DirectlyConnected<'a, K: OrderedKv + ?Sized> {
    labels: LatestLabels<DecodedRows<'a, K>>,
    subtopic: Option<Ident>,
}

impl<K: OrderedKv + ?Sized> Iterator for DirectlyConnected<'_, K> {
    type Item = Result<Label>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let label = match self.labels.next()? {
                Ok(label) => label,
                Err(e) => return Some(Err(e)),
            };
            match &self.subtopic {
                Some(ident) if !label.contains_ident(ident) => continue,
                _ => return Some(Ok(label)),
            }
        }
    }
}

/// Iterator returned by [`LabelStore::everything`].
pub enum Everything<'a, K: OrderedKv + ?Sized> {
    Latest(LatestLabels<DecodedRows<'a, K>>),
    History(DecodedRows<'a, K>),
}

impl<K: OrderedKv + ?Sized> Iterator for Everything<'_, K> {
    type Item = Result<Label>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Everything::Latest(labels) => labels.next(),
            Everything::History(rows) => rows.next(),
        }
    }
}
