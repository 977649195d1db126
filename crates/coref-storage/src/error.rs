use coref_label::LabelError;

use crate::kv::KvError;

/// Errors surfaced by [`crate::LabelStore`].
///
/// Collaborator failures are wrapped but otherwise passed through untouched;
/// the store never retries.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `get` found no row for the exact key.
    #[error(
        "no label for ({content_id1}|{subtopic_id1}, {content_id2}|{subtopic_id2}) by `{annotator_id}`"
    )]
    NotFound {
        content_id1: String,
        content_id2: String,
        subtopic_id1: String,
        subtopic_id2: String,
        annotator_id: String,
    },
    #[error(transparent)]
    Label(#[from] LabelError),
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error("invalid store configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, StoreError::Label(LabelError::MalformedLabel(_)))
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, StoreError::Label(LabelError::InvariantViolation(_)))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
