//! Errors raised while building or decoding labels.

/// A label could not be built or decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    /// Stored bytes do not decode to a label. Indicates storage corruption or
    /// a schema mismatch; never coerced.
    #[error("malformed label: {0}")]
    MalformedLabel(String),
    /// A precondition on a label or operation does not hold.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, LabelError>;
