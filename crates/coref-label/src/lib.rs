//! Coreference labels
//!
//! A label is a pairwise judgment "these two content items are / are not the
//! same entity", made by one annotator at one point in time. This crate holds
//! the value type and the codec that lays labels out in an ordered key-value
//! table:
//!
//! - [`Label`], [`CorefValue`], [`Ident`]: the data model and its equality,
//!   hashing and storage-order laws
//! - [`codec`]: order-preserving key bytes and the packed value byte
//!
//! Storage and graph inference live in `coref-storage`.

pub mod codec;
mod error;
mod label;

pub use codec::{from_storage, to_storage, StorageKey, MAX_TICKS};
pub use error::{LabelError, Result};
pub use label::{
    normalize_pair, CorefValue, Ident, Label, LabelRecord, OrderKey, DEFAULT_POSITIVE_RATING,
    MAX_RATING,
};
