//! The `Label` value type.
//!
//! A label records one annotator's judgment about whether two content items
//! (optionally narrowed to a subtopic on either side) refer to the same
//! entity. Three relations are defined on labels and they are deliberately
//! different:
//!
//! - **equality** (`PartialEq`/`Eq`): same annotator and the same unordered
//!   pair of `(content_id, subtopic_id)` sides. Value, rating and timestamp
//!   are ignored, so every version of a judgment compares equal.
//! - **hashing** (`Hash`): consistent with equality; the two sides are hashed
//!   in canonical (smaller-first) order.
//! - **storage order** ([`Label::storage_order`]): a total order over the
//!   normalized pair, annotator and time complement. It places rows on disk
//!   and is *not* exposed as `Ord`, since Rust requires `Ord` to agree with
//!   `Eq`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::codec::{time_complement, MAX_TICKS};
use crate::error::{LabelError, Result};

/// Highest rating a positive label can carry (4 bits on disk).
pub const MAX_RATING: u8 = 15;

/// Rating given to a positive label when none is supplied.
pub const DEFAULT_POSITIVE_RATING: u8 = 1;

// ============================================================================
// CorefValue
// ============================================================================

/// The judgment carried by a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
#[repr(i8)]
pub enum CorefValue {
    Negative = -1,
    Unknown = 0,
    Positive = 1,
}

impl CorefValue {
    pub const fn as_i8(self) -> i8 {
        self as i8
    }
}

impl TryFrom<i8> for CorefValue {
    type Error = LabelError;

    fn try_from(raw: i8) -> Result<Self> {
        match raw {
            -1 => Ok(CorefValue::Negative),
            0 => Ok(CorefValue::Unknown),
            1 => Ok(CorefValue::Positive),
            other => Err(LabelError::InvariantViolation(format!(
                "{other} is not a coreference value (expected -1, 0 or 1)"
            ))),
        }
    }
}

impl From<CorefValue> for i8 {
    fn from(value: CorefValue) -> Self {
        value.as_i8()
    }
}

impl fmt::Display for CorefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CorefValue::Negative => "negative",
            CorefValue::Unknown => "unknown",
            CorefValue::Positive => "positive",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Ident
// ============================================================================

/// A graph vertex: a whole content item, or one subtopic within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ident {
    Content(String),
    Subtopic(String, String),
}

impl Ident {
    pub fn content_id(&self) -> &str {
        match self {
            Ident::Content(cid) | Ident::Subtopic(cid, _) => cid,
        }
    }

    pub fn subtopic_id(&self) -> Option<&str> {
        match self {
            Ident::Content(_) => None,
            Ident::Subtopic(_, sub) => Some(sub),
        }
    }

    pub fn has_subtopic(&self) -> bool {
        matches!(self, Ident::Subtopic(..))
    }
}

impl From<&str> for Ident {
    fn from(cid: &str) -> Self {
        Ident::Content(cid.to_string())
    }
}

impl From<String> for Ident {
    fn from(cid: String) -> Self {
        Ident::Content(cid)
    }
}

impl From<(&str, &str)> for Ident {
    fn from((cid, sub): (&str, &str)) -> Self {
        Ident::Subtopic(cid.to_string(), sub.to_string())
    }
}

impl From<(String, String)> for Ident {
    fn from((cid, sub): (String, String)) -> Self {
        Ident::Subtopic(cid, sub)
    }
}

impl From<&Ident> for Ident {
    fn from(ident: &Ident) -> Self {
        ident.clone()
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ident::Content(cid) => f.write_str(cid),
            Ident::Subtopic(cid, sub) => write!(f, "{cid}|{sub}"),
        }
    }
}

/// Order two values smaller-first.
pub fn normalize_pair<T: Ord>(a: T, b: T) -> (T, T) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// ============================================================================
// Label
// ============================================================================

/// One coreference judgment. Immutable; an update is a newer label with the
/// same sides and annotator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "LabelRecord", into = "LabelRecord")]
pub struct Label {
    content_id1: String,
    content_id2: String,
    subtopic_id1: String,
    subtopic_id2: String,
    annotator_id: String,
    epoch_ticks: u64,
    value: CorefValue,
    rating: u8,
}

/// Storage-order key of a label. Field order is the comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey<'a> {
    pub content_ids: (&'a str, &'a str),
    pub subtopic_ids: (&'a str, &'a str),
    pub annotator_id: &'a str,
    pub time_complement: u64,
}

fn now_ticks() -> u64 {
    u64::try_from(Utc::now().timestamp())
        .unwrap_or(0)
        .min(MAX_TICKS)
}

fn default_rating(value: CorefValue) -> u8 {
    if value == CorefValue::Positive {
        DEFAULT_POSITIVE_RATING
    } else {
        0
    }
}

impl Label {
    /// A whole-item label stamped with the current time.
    pub fn new(
        content_id1: impl Into<String>,
        content_id2: impl Into<String>,
        annotator_id: impl Into<String>,
        value: CorefValue,
    ) -> Self {
        Self {
            content_id1: content_id1.into(),
            content_id2: content_id2.into(),
            subtopic_id1: String::new(),
            subtopic_id2: String::new(),
            annotator_id: annotator_id.into(),
            epoch_ticks: now_ticks(),
            value,
            rating: default_rating(value),
        }
    }

    /// Assemble a label from already-validated parts (used by the codec).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        content_id1: String,
        content_id2: String,
        subtopic_id1: String,
        subtopic_id2: String,
        annotator_id: String,
        epoch_ticks: u64,
        value: CorefValue,
        rating: u8,
    ) -> Self {
        Self {
            content_id1,
            content_id2,
            subtopic_id1,
            subtopic_id2,
            annotator_id,
            epoch_ticks,
            value,
            rating,
        }
    }

    pub fn with_subtopics(
        mut self,
        subtopic_id1: impl Into<String>,
        subtopic_id2: impl Into<String>,
    ) -> Self {
        self.subtopic_id1 = subtopic_id1.into();
        self.subtopic_id2 = subtopic_id2.into();
        self
    }

    /// Fails if `epoch_ticks` is beyond [`MAX_TICKS`].
    pub fn with_epoch_ticks(mut self, epoch_ticks: u64) -> Result<Self> {
        if epoch_ticks > MAX_TICKS {
            return Err(LabelError::InvariantViolation(format!(
                "epoch_ticks {epoch_ticks} exceeds the maximum of {MAX_TICKS}"
            )));
        }
        self.epoch_ticks = epoch_ticks;
        Ok(self)
    }

    /// Ratings only apply to positive labels; other values keep a rating of 0.
    pub fn with_rating(mut self, rating: u8) -> Result<Self> {
        if rating > MAX_RATING {
            return Err(LabelError::InvariantViolation(format!(
                "rating {rating} is outside 0..={MAX_RATING}"
            )));
        }
        self.rating = if self.value == CorefValue::Positive {
            rating
        } else {
            0
        };
        Ok(self)
    }

    pub fn content_id1(&self) -> &str {
        &self.content_id1
    }

    pub fn content_id2(&self) -> &str {
        &self.content_id2
    }

    pub fn subtopic_id1(&self) -> &str {
        &self.subtopic_id1
    }

    pub fn subtopic_id2(&self) -> &str {
        &self.subtopic_id2
    }

    pub fn annotator_id(&self) -> &str {
        &self.annotator_id
    }

    pub fn epoch_ticks(&self) -> u64 {
        self.epoch_ticks
    }

    pub fn value(&self) -> CorefValue {
        self.value
    }

    pub fn rating(&self) -> u8 {
        self.rating
    }

    pub fn is_positive(&self) -> bool {
        self.value == CorefValue::Positive
    }

    pub fn is_negative(&self) -> bool {
        self.value == CorefValue::Negative
    }

    /// The same judgment seen from the other side.
    pub fn reversed(&self) -> Self {
        Self {
            content_id1: self.content_id2.clone(),
            content_id2: self.content_id1.clone(),
            subtopic_id1: self.subtopic_id2.clone(),
            subtopic_id2: self.subtopic_id1.clone(),
            annotator_id: self.annotator_id.clone(),
            epoch_ticks: self.epoch_ticks,
            value: self.value,
            rating: self.rating,
        }
    }

    /// The content id opposite `content_id`. For a label that does not
    /// touch `content_id` this is `content_id1`.
    pub fn other(&self, content_id: &str) -> &str {
        if self.content_id1 == content_id {
            &self.content_id2
        } else {
            &self.content_id1
        }
    }

    /// The subtopic paired with `content_id`, if the label touches it.
    pub fn subtopic_for(&self, content_id: &str) -> Option<&str> {
        if self.content_id1 == content_id {
            Some(&self.subtopic_id1)
        } else if self.content_id2 == content_id {
            Some(&self.subtopic_id2)
        } else {
            None
        }
    }

    pub fn contains(&self, content_id: &str) -> bool {
        self.content_id1 == content_id || self.content_id2 == content_id
    }

    /// Whether `ident` is one of the label's sides. A bare content id
    /// matches either side regardless of subtopic.
    pub fn contains_ident(&self, ident: &Ident) -> bool {
        match ident {
            Ident::Content(cid) => self.contains(cid),
            Ident::Subtopic(cid, sub) => {
                (self.content_id1 == *cid && self.subtopic_id1 == *sub)
                    || (self.content_id2 == *cid && self.subtopic_id2 == *sub)
            }
        }
    }

    /// Same unordered pair of sides, whoever the annotator is.
    pub fn same_subject_as(&self, other: &Label) -> bool {
        self.canonical_sides() == other.canonical_sides()
    }

    /// The two vertices this label joins.
    pub fn endpoints(&self, subtopic_aware: bool) -> (Ident, Ident) {
        if subtopic_aware {
            (
                Ident::Subtopic(self.content_id1.clone(), self.subtopic_id1.clone()),
                Ident::Subtopic(self.content_id2.clone(), self.subtopic_id2.clone()),
            )
        } else {
            (
                Ident::Content(self.content_id1.clone()),
                Ident::Content(self.content_id2.clone()),
            )
        }
    }

    /// Both `(content_id, subtopic_id)` sides, smaller first.
    fn canonical_sides(&self) -> ((&str, &str), (&str, &str)) {
        normalize_pair(
            (self.content_id1.as_str(), self.subtopic_id1.as_str()),
            (self.content_id2.as_str(), self.subtopic_id2.as_str()),
        )
    }

    pub fn storage_order(&self) -> OrderKey<'_> {
        OrderKey {
            content_ids: normalize_pair(self.content_id1.as_str(), self.content_id2.as_str()),
            subtopic_ids: normalize_pair(self.subtopic_id1.as_str(), self.subtopic_id2.as_str()),
            annotator_id: &self.annotator_id,
            time_complement: time_complement(self.epoch_ticks),
        }
    }

    /// Compare by storage order. More recent labels sort first among labels
    /// for the same pair and annotator.
    pub fn cmp_storage(&self, other: &Label) -> Ordering {
        self.storage_order().cmp(&other.storage_order())
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.annotator_id == other.annotator_id && self.same_subject_as(other)
    }
}

impl Eq for Label {}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.annotator_id.hash(state);
        self.canonical_sides().hash(state);
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.content_id1)?;
        if !self.subtopic_id1.is_empty() {
            write!(f, "|{}", self.subtopic_id1)?;
        }
        write!(f, " ~ {}", self.content_id2)?;
        if !self.subtopic_id2.is_empty() {
            write!(f, "|{}", self.subtopic_id2)?;
        }
        write!(f, " = {} (by {}", self.value, self.annotator_id)?;
        if self.rating > 0 {
            write!(f, ", rating {}", self.rating)?;
        }
        write!(f, ", t={})", self.epoch_ticks)
    }
}

// ============================================================================
// Serialized form
// ============================================================================

/// The exchange form of a label. Missing timestamps and ratings take the same
/// defaults as [`Label::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRecord {
    pub content_id1: String,
    pub content_id2: String,
    #[serde(default)]
    pub subtopic_id1: String,
    #[serde(default)]
    pub subtopic_id2: String,
    pub annotator_id: String,
    #[serde(default)]
    pub epoch_ticks: Option<u64>,
    pub value: CorefValue,
    #[serde(default)]
    pub rating: Option<u8>,
}

impl TryFrom<LabelRecord> for Label {
    type Error = LabelError;

    fn try_from(record: LabelRecord) -> Result<Self> {
        let mut label = Label::new(
            record.content_id1,
            record.content_id2,
            record.annotator_id,
            record.value,
        )
        .with_subtopics(record.subtopic_id1, record.subtopic_id2);
        if let Some(ticks) = record.epoch_ticks {
            label = label.with_epoch_ticks(ticks)?;
        }
        if let Some(rating) = record.rating {
            label = label.with_rating(rating)?;
        }
        Ok(label)
    }
}

impl From<Label> for LabelRecord {
    fn from(label: Label) -> Self {
        Self {
            content_id1: label.content_id1,
            content_id2: label.content_id2,
            subtopic_id1: label.subtopic_id1,
            subtopic_id2: label.subtopic_id2,
            annotator_id: label.annotator_id,
            epoch_ticks: Some(label.epoch_ticks),
            value: label.value,
            rating: Some(label.rating),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(label: &Label) -> u64 {
        let mut h = DefaultHasher::new();
        label.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_equality_ignores_orientation_value_and_time() {
        let a = Label::new("a", "b", "ann", CorefValue::Positive)
            .with_epoch_ticks(10)
            .unwrap();
        let b = Label::new("b", "a", "ann", CorefValue::Negative)
            .with_epoch_ticks(20)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_equality_respects_annotator_and_subtopics() {
        let base = Label::new("a", "b", "ann", CorefValue::Positive);
        assert_ne!(base, Label::new("a", "b", "other", CorefValue::Positive));
        assert_ne!(
            base,
            Label::new("a", "b", "ann", CorefValue::Positive).with_subtopics("s", "")
        );
        // Swapping subtopics without swapping content ids is a different pair.
        let crossed = Label::new("a", "b", "ann", CorefValue::Positive).with_subtopics("x", "y");
        let swapped = Label::new("a", "b", "ann", CorefValue::Positive).with_subtopics("y", "x");
        assert_ne!(crossed, swapped);
    }

    #[test]
    fn test_reversed_is_equal_with_same_hash() {
        let label = Label::new("a", "b", "ann", CorefValue::Positive).with_subtopics("s1", "s2");
        let rev = label.reversed();
        assert_eq!(rev.content_id1(), "b");
        assert_eq!(rev.subtopic_id1(), "s2");
        assert_eq!(label, rev);
        assert_eq!(hash_of(&label), hash_of(&rev));
    }

    #[test]
    fn test_rating_is_forced_to_zero_unless_positive() {
        let pos = Label::new("a", "b", "ann", CorefValue::Positive);
        assert_eq!(pos.rating(), DEFAULT_POSITIVE_RATING);
        assert_eq!(pos.with_rating(7).unwrap().rating(), 7);

        let neg = Label::new("a", "b", "ann", CorefValue::Negative);
        assert_eq!(neg.rating(), 0);
        assert_eq!(neg.with_rating(7).unwrap().rating(), 0);
    }

    #[test]
    fn test_out_of_range_inputs_are_invariant_violations() {
        let label = Label::new("a", "b", "ann", CorefValue::Positive);
        assert!(matches!(
            label.clone().with_rating(16),
            Err(LabelError::InvariantViolation(_))
        ));
        assert!(matches!(
            label.with_epoch_ticks(MAX_TICKS + 1),
            Err(LabelError::InvariantViolation(_))
        ));
        assert!(matches!(
            CorefValue::try_from(2),
            Err(LabelError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_storage_order_puts_newer_first() {
        let old = Label::new("b", "a", "ann", CorefValue::Positive)
            .with_epoch_ticks(100)
            .unwrap();
        let new = Label::new("a", "b", "ann", CorefValue::Negative)
            .with_epoch_ticks(200)
            .unwrap();
        assert_eq!(new.cmp_storage(&old), Ordering::Less);
        // Equal as judgments, still distinct in storage order.
        assert_eq!(new, old);
    }

    #[test]
    fn test_storage_order_compares_normalized_pairs_first() {
        let ab = Label::new("b", "a", "zzz", CorefValue::Positive);
        let ac = Label::new("a", "c", "aaa", CorefValue::Positive);
        assert_eq!(ab.cmp_storage(&ac), Ordering::Less);
    }

    #[test]
    fn test_side_helpers() {
        let label = Label::new("a", "b", "ann", CorefValue::Positive).with_subtopics("s1", "s2");
        assert_eq!(label.other("a"), "b");
        assert_eq!(label.other("b"), "a");
        assert_eq!(label.subtopic_for("b"), Some("s2"));
        assert_eq!(label.subtopic_for("c"), None);
        assert!(label.contains_ident(&Ident::from("a")));
        assert!(label.contains_ident(&Ident::from(("a", "s1"))));
        assert!(!label.contains_ident(&Ident::from(("a", "s2"))));
        let flipped = Label::new("b", "a", "x", CorefValue::Unknown).with_subtopics("s2", "s1");
        assert!(label.same_subject_as(&flipped));
    }

    #[test]
    fn test_json_round_trip_fills_defaults() {
        let json = r#"{"content_id1":"a","content_id2":"b","annotator_id":"ann","value":1}"#;
        let label: Label = serde_json::from_str(json).unwrap();
        assert_eq!(label.rating(), DEFAULT_POSITIVE_RATING);
        assert_eq!(label.subtopic_id1(), "");

        let text = serde_json::to_string(&label).unwrap();
        let back: Label = serde_json::from_str(&text).unwrap();
        assert_eq!(back.epoch_ticks(), label.epoch_ticks());
        assert_eq!(back.value(), CorefValue::Positive);

        let bad = r#"{"content_id1":"a","content_id2":"b","annotator_id":"ann","value":3}"#;
        assert!(serde_json::from_str::<Label>(bad).is_err());
    }
}
