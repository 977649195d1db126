//! Storage codec for labels.
//!
//! A label is persisted as one `(key, value)` row:
//!
//! ```text
//! key   = str(cid1) str(cid2) str(sub1) str(sub2) str(annotator) be64(MAX_TICKS - epoch_ticks)
//! value = (value + 1) | (rating << 4)          // one byte
//! str   = bytes with 0x00 escaped as 0x00 0xFF, terminated by 0x00 0x01
//! ```
//!
//! The string encoding preserves order, so comparing encoded keys bytewise
//! gives the same answer as comparing the key tuples field by field. A backend
//! that only scans ascending therefore returns the newest version of a
//! judgment first.

use crate::error::{LabelError, Result};
use crate::label::{CorefValue, Label, MAX_RATING};

/// Timestamps are seconds; labels older than 100 years after the epoch are
/// not representable.
pub const MAX_TICKS: u64 = 100 * 365 * 24 * 60 * 60;

const ESCAPE: u8 = 0x00;
const ESCAPED_NUL: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// `MAX_TICKS - t`. Applying it twice gives back `t` for any valid timestamp.
pub const fn time_complement(epoch_ticks: u64) -> u64 {
    MAX_TICKS.saturating_sub(epoch_ticks)
}

// ============================================================================
// Value byte
// ============================================================================

pub fn pack_value(value: CorefValue, rating: u8) -> u8 {
    let ordinal = (value.as_i8() + 1) as u8;
    ordinal | (rating.min(MAX_RATING) << 4)
}

pub fn unpack_value(byte: u8) -> Result<(CorefValue, u8)> {
    let ordinal = byte & 0x0F;
    let rating = byte >> 4;
    let value = match ordinal {
        0 => CorefValue::Negative,
        1 => CorefValue::Unknown,
        2 => CorefValue::Positive,
        other => {
            return Err(LabelError::MalformedLabel(format!(
                "value byte {byte:#04x} has invalid ordinal {other}"
            )))
        }
    };
    if rating != 0 && value != CorefValue::Positive {
        return Err(LabelError::MalformedLabel(format!(
            "value byte {byte:#04x} carries rating {rating} on a {value} label"
        )));
    }
    Ok((value, rating))
}

// ============================================================================
// Key tuple
// ============================================================================

/// The decoded key of one stored row, in the row's own orientation.
///
/// Derived ordering matches the byte order of [`StorageKey::encode`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StorageKey {
    pub content_id1: String,
    pub content_id2: String,
    pub subtopic_id1: String,
    pub subtopic_id2: String,
    pub annotator_id: String,
    pub time_complement: u64,
}

impl StorageKey {
    pub fn for_label(label: &Label) -> Self {
        Self {
            content_id1: label.content_id1().to_string(),
            content_id2: label.content_id2().to_string(),
            subtopic_id1: label.subtopic_id1().to_string(),
            subtopic_id2: label.subtopic_id2().to_string(),
            annotator_id: label.annotator_id().to_string(),
            time_complement: time_complement(label.epoch_ticks()),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = encode_prefix(&[
            &self.content_id1,
            &self.content_id2,
            &self.subtopic_id1,
            &self.subtopic_id2,
            &self.annotator_id,
        ]);
        out.extend_from_slice(&self.time_complement.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut rest = bytes;
        let content_id1 = take_str(&mut rest)?;
        let content_id2 = take_str(&mut rest)?;
        let subtopic_id1 = take_str(&mut rest)?;
        let subtopic_id2 = take_str(&mut rest)?;
        let annotator_id = take_str(&mut rest)?;
        let tc: [u8; 8] = rest.try_into().map_err(|_| {
            LabelError::MalformedLabel(format!(
                "key ends with {} bytes, expected an 8-byte time complement",
                rest.len()
            ))
        })?;
        let time_complement = u64::from_be_bytes(tc);
        if time_complement > MAX_TICKS {
            return Err(LabelError::MalformedLabel(format!(
                "time complement {time_complement} exceeds {MAX_TICKS}"
            )));
        }
        Ok(Self {
            content_id1,
            content_id2,
            subtopic_id1,
            subtopic_id2,
            annotator_id,
            time_complement,
        })
    }

    /// Whether this row stores the label with its smaller side first. Every
    /// label has exactly one canonical row per version.
    pub fn is_canonical(&self) -> bool {
        (&self.content_id1, &self.subtopic_id1) <= (&self.content_id2, &self.subtopic_id2)
    }
}

/// Encode the leading string fields of a key. Every key that starts with
/// these fields (and only those keys) starts with the returned bytes.
pub fn encode_prefix(fields: &[&str]) -> Vec<u8> {
    let mut out = Vec::with_capacity(fields.iter().map(|f| f.len() + 2).sum());
    for field in fields {
        for &b in field.as_bytes() {
            out.push(b);
            if b == ESCAPE {
                out.push(ESCAPED_NUL);
            }
        }
        out.push(ESCAPE);
        out.push(TERMINATOR);
    }
    out
}

/// The smallest byte string greater than every string starting with
/// `prefix`, or `None` if no such bound exists (empty or all-0xFF prefix).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xFF {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

fn take_str(rest: &mut &[u8]) -> Result<String> {
    let mut raw = Vec::new();
    let mut i = 0;
    loop {
        let Some(&b) = rest.get(i) else {
            return Err(LabelError::MalformedLabel(
                "key ends inside a string field".to_string(),
            ));
        };
        if b != ESCAPE {
            raw.push(b);
            i += 1;
            continue;
        }
        match rest.get(i + 1) {
            Some(&ESCAPED_NUL) => {
                raw.push(ESCAPE);
                i += 2;
            }
            Some(&TERMINATOR) => {
                i += 2;
                break;
            }
            other => {
                return Err(LabelError::MalformedLabel(format!(
                    "bad escape sequence 0x00 {other:?} in key"
                )))
            }
        }
    }
    *rest = rest.get(i..).unwrap_or_default();
    String::from_utf8(raw)
        .map_err(|e| LabelError::MalformedLabel(format!("key field is not UTF-8: {e}")))
}

// ============================================================================
// Rows
// ============================================================================

/// Key bytes and value bytes for `label` in its own orientation.
pub fn to_storage(label: &Label) -> (Vec<u8>, Vec<u8>) {
    let key = StorageKey::for_label(label).encode();
    (key, vec![pack_value(label.value(), label.rating())])
}

pub fn from_storage(key: &[u8], value: &[u8]) -> Result<Label> {
    let key = StorageKey::decode(key)?;
    label_from_key(key, value)
}

pub fn label_from_key(key: StorageKey, value: &[u8]) -> Result<Label> {
    let [byte] = value else {
        return Err(LabelError::MalformedLabel(format!(
            "label value is {} bytes, expected 1",
            value.len()
        )));
    };
    let (coref, rating) = unpack_value(*byte)?;
    Ok(Label::from_parts(
        key.content_id1,
        key.content_id2,
        key.subtopic_id1,
        key.subtopic_id2,
        key.annotator_id,
        time_complement(key.time_complement),
        coref,
        rating,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_byte_layout() {
        assert_eq!(pack_value(CorefValue::Negative, 0), 0x00);
        assert_eq!(pack_value(CorefValue::Unknown, 0), 0x01);
        assert_eq!(pack_value(CorefValue::Positive, 1), 0x12);
        assert_eq!(pack_value(CorefValue::Positive, 15), 0xF2);
    }

    #[test]
    fn test_invalid_ordinals_are_malformed() {
        for byte in [0x03u8, 0x0F, 0x13] {
            assert!(matches!(
                unpack_value(byte),
                Err(LabelError::MalformedLabel(_))
            ));
        }
        // A rating on a negative label cannot have been written by the codec.
        assert!(matches!(
            unpack_value(0x10),
            Err(LabelError::MalformedLabel(_))
        ));
    }

    #[test]
    fn test_key_round_trip_with_embedded_nul() {
        let key = StorageKey {
            content_id1: "a\0b".to_string(),
            content_id2: String::new(),
            subtopic_id1: "s".to_string(),
            subtopic_id2: "\0".to_string(),
            annotator_id: "ann".to_string(),
            time_complement: 42,
        };
        assert_eq!(StorageKey::decode(&key.encode()).unwrap(), key);
    }

    #[test]
    fn test_truncated_keys_are_malformed() {
        let label = Label::new("a", "b", "ann", CorefValue::Positive);
        let key = StorageKey::for_label(&label).encode();
        for cut in [0, 3, key.len() - 1] {
            assert!(matches!(
                StorageKey::decode(&key[..cut]),
                Err(LabelError::MalformedLabel(_))
            ));
        }
    }

    #[test]
    fn test_prefix_bounds_every_key_with_that_prefix() {
        let prefix = encode_prefix(&["x"]);
        let end = prefix_end(&prefix).unwrap();
        let key_for = |c1: &str, c2: &str| {
            StorageKey::for_label(&Label::new(c1, c2, "ann", CorefValue::Positive)).encode()
        };
        let inside = key_for("x", "\u{10FFFF}");
        let longer = key_for("xa", "b");
        assert!(inside.as_slice() >= prefix.as_slice() && inside < end);
        assert!(longer >= end);
        assert_eq!(prefix_end(&[0xFF, 0xFF]), None);
    }

    #[test]
    fn test_storage_row_round_trip() {
        let label = Label::new("a", "b", "ann", CorefValue::Positive)
            .with_subtopics("s1", "")
            .with_epoch_ticks(1_700_000_000)
            .unwrap()
            .with_rating(9)
            .unwrap();
        let (key, value) = to_storage(&label);
        let back = from_storage(&key, &value).unwrap();
        assert_eq!(back, label);
        assert_eq!(back.content_id1(), "a");
        assert_eq!(back.subtopic_id1(), "s1");
        assert_eq!(back.epoch_ticks(), 1_700_000_000);
        assert_eq!(back.rating(), 9);
        assert!(matches!(
            from_storage(&key, &[]),
            Err(LabelError::MalformedLabel(_))
        ));
    }
}
