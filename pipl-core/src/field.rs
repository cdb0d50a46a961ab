use serde::Serialize;
use std::fmt;

use crate::tables::{
    lookup_kind, FIELD_KIND, FIELD_OUT_FLAGS, FIELD_OUT_FLAGS_2, FIELD_RESERVED_INFO,
    FIELD_SPEC_VERSION, INT_FIELDS, TEXT_FIELDS,
};
use crate::PatchError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Kind(&'static str),
    Text(String),
    Int(i32),
    SpecVersion { major: u16, minor: u16 },
    Flags(i32),
    /// Present in the key table but not interpreted.
    Opaque,
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Kind(kind) => write!(f, "{kind}"),
            FieldValue::Text(text) => write!(f, "{text}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::SpecVersion { major, minor } => write!(f, "{major}, {minor}"),
            FieldValue::Flags(v) => write!(f, "{v} (0x{:08X})", *v as u32),
            FieldValue::Opaque => write!(f, "-"),
        }
    }
}

/// One line of the decode report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedRecord {
    pub field: String,
    pub payload_offset: usize,
    pub value: FieldValue,
}

impl fmt::Display for DecodedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[0x{:08X}] {}: {}",
            self.payload_offset, self.field, self.value
        )
    }
}

pub(crate) fn le_word(payload: &[u8], field: &str, at: usize) -> Result<[u8; 4], PatchError> {
    if payload.len() < 4 {
        return Err(PatchError::malformed(
            at,
            format!("{field} needs 4 payload bytes, record holds {}", payload.len()),
        ));
    }
    Ok([payload[0], payload[1], payload[2], payload[3]])
}

pub fn decode_spec_version(word: [u8; 4]) -> (u16, u16) {
    (
        u16::from_le_bytes([word[0], word[1]]),
        u16::from_le_bytes([word[2], word[3]]),
    )
}

pub fn encode_spec_version(major: u16, minor: u16) -> [u8; 4] {
    let [a, b] = major.to_le_bytes();
    let [c, d] = minor.to_le_bytes();
    [a, b, c, d]
}

/// Strings are stored as Pascal strings in a padded record. When the first
/// byte is a length that fits the record, only those bytes are decoded.
/// Leading and trailing whitespace and control bytes are trimmed; non-ASCII
/// bytes are replaced rather than rejected.
pub fn decode_text(payload: &[u8]) -> String {
    let text = match payload.split_first() {
        Some((&len, rest)) if (len as usize) <= rest.len() => &rest[..len as usize],
        _ => payload,
    };
    String::from_utf8_lossy(text)
        .trim_matches(|c: char| c.is_whitespace() || c.is_control())
        .to_string()
}

/// Interprets a payload by field name. `at` is the payload's offset in the
/// buffer and is only used for error reporting.
pub fn decode_field(field: &str, payload: &[u8], at: usize) -> Result<FieldValue, PatchError> {
    let value = match field {
        FIELD_KIND => FieldValue::Kind(lookup_kind(le_word(payload, field, at)?)),
        FIELD_SPEC_VERSION => {
            let (major, minor) = decode_spec_version(le_word(payload, field, at)?);
            FieldValue::SpecVersion { major, minor }
        }
        FIELD_OUT_FLAGS | FIELD_OUT_FLAGS_2 => {
            FieldValue::Flags(i32::from_le_bytes(le_word(payload, field, at)?))
        }
        FIELD_RESERVED_INFO => FieldValue::Int(i32::from_le_bytes(le_word(payload, field, at)?)),
        f if TEXT_FIELDS.contains(&f) => FieldValue::Text(decode_text(payload)),
        f if INT_FIELDS.contains(&f) => {
            FieldValue::Int(i32::from_le_bytes(le_word(payload, field, at)?))
        }
        _ => FieldValue::Opaque,
    };
    Ok(value)
}
