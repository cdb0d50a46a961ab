use log::{debug, info, warn};
use serde::Serialize;

use crate::field::{decode_field, encode_spec_version, DecodedRecord, FieldValue};
use crate::scan::RecordWalker;
use crate::tables::{
    FIELD_OUT_FLAGS, FIELD_OUT_FLAGS_2, FIELD_RESERVED_INFO, FIELD_SPEC_VERSION, MFR_FLAG,
    MIN_SPEC_VERSION, PIPL_OVERRIDE_FLAG,
};
use crate::PatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FlagsField {
    offset: usize,
    value: i32,
}

/// Rewrites waiting for the next AE_Reserved_Info record. A fresh value is
/// used for every sub-entry.
#[derive(Debug, Default)]
struct PendingPatches {
    spec_version_at: Option<usize>,
    out_flags: Option<FlagsField>,
    out_flags_2: Option<FlagsField>,
}

impl PendingPatches {
    fn is_armed(&self) -> bool {
        self.spec_version_at.is_some() || self.out_flags_2.is_some()
    }
}

/// A single 4-byte rewrite that was written into the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedPatch {
    pub field: &'static str,
    pub offset: usize,
    pub before: [u8; 4],
    pub after: [u8; 4],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    pub modified: bool,
    /// Number of AE_Reserved_Info records reached.
    pub sub_entries: usize,
    pub records: Vec<DecodedRecord>,
    pub applied: Vec<AppliedPatch>,
}

fn spec_version_is_stale(major: u16, minor: u16) -> bool {
    let (min_major, min_minor) = MIN_SPEC_VERSION;
    major < min_major || (major == min_major && minor < min_minor)
}

fn write_word(buf: &mut [u8], field: &'static str, offset: usize, after: [u8; 4]) -> AppliedPatch {
    let mut before = [0u8; 4];
    before.copy_from_slice(&buf[offset..offset + 4]);
    buf[offset..offset + 4].copy_from_slice(&after);
    info!(
        "patched {field} at 0x{offset:08X}: {:02X?} -> {:02X?}",
        before, after
    );
    AppliedPatch {
        field,
        offset,
        before,
        after,
    }
}

fn flush(buf: &mut [u8], pending: &PendingPatches, applied: &mut Vec<AppliedPatch>) {
    if let Some(offset) = pending.spec_version_at {
        let (major, minor) = MIN_SPEC_VERSION;
        applied.push(write_word(
            buf,
            FIELD_SPEC_VERSION,
            offset,
            encode_spec_version(major, minor),
        ));
    }

    if let Some(flags2) = pending.out_flags_2 {
        match pending.out_flags {
            Some(flags) => {
                applied.push(write_word(
                    buf,
                    FIELD_OUT_FLAGS,
                    flags.offset,
                    (flags.value | PIPL_OVERRIDE_FLAG).to_le_bytes(),
                ));
                applied.push(write_word(
                    buf,
                    FIELD_OUT_FLAGS_2,
                    flags2.offset,
                    (flags2.value | MFR_FLAG).to_le_bytes(),
                ));
            }
            None => warn!(
                "{FIELD_OUT_FLAGS_2} at 0x{:08X} lacks the MFR flag but no {FIELD_OUT_FLAGS} \
                 precedes it; leaving both untouched",
                flags2.offset
            ),
        }
    }
}

/// Decodes the property list without changing anything.
pub fn dump(buf: &[u8]) -> Result<Vec<DecodedRecord>, PatchError> {
    let walker = RecordWalker::after_marker(buf).ok_or(PatchError::MarkerNotFound)?;
    let mut records = Vec::new();
    for header in walker {
        let header = header?;
        let at = header.payload_offset;
        let value = decode_field(&header.field, header.payload(buf), at)?;
        let record = DecodedRecord {
            field: header.field.into_owned(),
            payload_offset: at,
            value,
        };
        debug!("{record}");
        records.push(record);
    }
    Ok(records)
}

/// Walks the property list in `buf`, decoding every record, and upgrades
/// each sub-entry that declares an old spec version or lacks the
/// multi-frame-rendering flag. Rewrites happen in place when the entry's
/// AE_Reserved_Info record is reached.
///
/// The whole list is decoded before anything is written, so an error leaves
/// `buf` untouched.
pub fn patch(buf: &mut [u8]) -> Result<PatchReport, PatchError> {
    let records = dump(buf)?;

    let mut report = PatchReport::default();
    let mut pending = PendingPatches::default();

    for record in &records {
        let at = record.payload_offset;
        match (record.field.as_str(), &record.value) {
            (FIELD_SPEC_VERSION, FieldValue::SpecVersion { major, minor }) => {
                if spec_version_is_stale(*major, *minor) {
                    debug!("spec version {major}.{minor} at 0x{at:08X} is below minimum");
                    pending.spec_version_at = Some(at);
                }
            }
            (FIELD_OUT_FLAGS, FieldValue::Flags(v)) => {
                pending.out_flags = Some(FlagsField { offset: at, value: *v });
            }
            (FIELD_OUT_FLAGS_2, FieldValue::Flags(v)) => {
                if v & MFR_FLAG == 0 {
                    debug!("out flags 2 at 0x{at:08X} lacks the MFR flag");
                    pending.out_flags_2 = Some(FlagsField { offset: at, value: *v });
                }
            }
            (FIELD_RESERVED_INFO, _) => {
                report.sub_entries += 1;
                let before = report.applied.len();
                flush(buf, &pending, &mut report.applied);
                if report.applied.len() > before {
                    report.modified = true;
                }
                pending = PendingPatches::default();
            }
            _ => {}
        }
    }

    if pending.is_armed() {
        debug!("property list ended with pending rewrites and no {FIELD_RESERVED_INFO}; skipped");
    }

    report.records = records;
    Ok(report)
}
