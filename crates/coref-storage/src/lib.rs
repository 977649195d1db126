//! Coreference Label Store
//!
//! Durable storage for pairwise coreference judgments plus the graph
//! inference built on them:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         LABEL STORE                           │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  ┌──────────────┐   directly_connected   ┌────────────────┐   │
//! │  │  Inference   │───────────────────────►│   LabelStore   │   │
//! │  │ (components, │                        │ put/get/scan/  │   │
//! │  │  negatives)  │◄───────────────────────│  delete_all    │   │
//! │  └──────────────┘        labels          └───────┬────────┘   │
//! │                                                  │ codec      │
//! │                                                  ▼            │
//! │                                          ┌────────────────┐   │
//! │                                          │   OrderedKv    │   │
//! │                                          │ (memory, redb) │   │
//! │                                          └────────────────┘   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Newest first**: keys carry a time complement, so an ascending scan
//!   returns the latest version of each judgment first
//! - **Both directions**: every label is stored once per orientation
//! - **Lazy**: scans and component walks pull rows page by page
//! - **Injected backend**: the store owns nothing but its [`OrderedKv`] handle
//!
//! The store is not internally concurrent. A traversal racing with writers
//! may observe some of their labels and not others.

pub mod error;
pub mod inference;
pub mod kv;
pub mod memory;
pub mod persistence;
pub mod store;


use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use coref_label::{CorefValue, Ident, Label, LabelError};
pub use error::{Result, StoreError};
pub use inference::{
    ConnectedComponent, NegativeInference, NegativeLabelInference, AUTO_ANNOTATOR,
};
pub use kv::{KeyFieldType, KeyRange, KvError, KvRow, OrderedKv, Scan, TableSpec};
pub use memory::MemoryKv;
pub use persistence::RedbKv;
pub use store::{
    label_table_spec, DirectlyConnected, Everything, LabelStore, LatestLabels, LABEL_TABLE,
};

// ============================================================================
// Storage Configuration
// ============================================================================

/// Which [`OrderedKv`] implementation to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Process-local, lost on drop.
    Memory,
    /// A redb database file.
    Redb { path: PathBuf },
}

/// Configuration for a label store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    /// Name of the label table
    pub table: String,
    /// Rows fetched from the backend per scan page
    pub scan_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Memory,
            table: LABEL_TABLE.to_string(),
            scan_page_size: 256,
        }
    }
}

impl StoreConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.table.is_empty() {
            return Err(StoreError::Config("table name is empty".to_string()));
        }
        if self.scan_page_size == 0 {
            return Err(StoreError::Config(
                "scan_page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Convenience Functions
// ============================================================================

/// Open the backend named by `config`.
pub fn open_kv(config: &StoreConfig) -> Result<Box<dyn OrderedKv>> {
    let kv: Box<dyn OrderedKv> = match &config.backend {
        BackendConfig::Memory => Box::new(MemoryKv::new()),
        BackendConfig::Redb { path } => Box::new(RedbKv::open(path)?),
    };
    Ok(kv)
}

/// Open the backend named by `config` and a store over it.
pub fn open_store(config: &StoreConfig) -> Result<LabelStore<Box<dyn OrderedKv>>> {
    LabelStore::with_config(open_kv(config)?, config)
}
