use std::borrow::Cow;

use crate::tables::{decode_key, PIPL_MARKER, RECORD_SENTINEL};
use crate::PatchError;

// vendor + key + property id + length
const RECORD_HEADER_LEN: usize = 16;

fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

pub fn find_marker(buf: &[u8]) -> Option<usize> {
    find_bytes(buf, PIPL_MARKER, 0)
}

/// Offset of the next record sentinel at or after `from`. `None` is the
/// ordinary end of the property list.
pub fn find_sentinel(buf: &[u8], from: usize) -> Option<usize> {
    find_bytes(buf, RECORD_SENTINEL, from)
}

fn read_i32_le(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Header of one property record. The payload itself stays in the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub sentinel_offset: usize,
    pub raw_key: [u8; 4],
    pub field: Cow<'static, str>,
    pub payload_offset: usize,
    pub length: usize,
    pub padded_length: usize,
}

impl RecordHeader {
    pub fn payload<'b>(&self, buf: &'b [u8]) -> &'b [u8] {
        &buf[self.payload_offset..self.payload_offset + self.length]
    }
}

/// Walks property records from a starting offset. Every yielded header has
/// been bounds-checked against the buffer; after the first error the walker
/// yields nothing more.
pub struct RecordWalker<'a> {
    buf: &'a [u8],
    cursor: usize,
    done: bool,
}

impl<'a> RecordWalker<'a> {
    pub fn new(buf: &'a [u8], start: usize) -> Self {
        Self {
            buf,
            cursor: start,
            done: false,
        }
    }

    /// Starts just past the PiPL marker, or `None` if the buffer has none.
    pub fn after_marker(buf: &'a [u8]) -> Option<Self> {
        find_marker(buf).map(|pos| Self::new(buf, pos + PIPL_MARKER.len()))
    }

    fn read_header(&self, sentinel_offset: usize) -> Result<RecordHeader, PatchError> {
        let buf = self.buf;
        let header_end = sentinel_offset
            .checked_add(RECORD_HEADER_LEN)
            .filter(|&end| end <= buf.len())
            .ok_or_else(|| {
                PatchError::malformed(sentinel_offset, "record header runs past end of buffer")
            })?;

        let key_at = sentinel_offset + RECORD_SENTINEL.len();
        let raw_key = [buf[key_at], buf[key_at + 1], buf[key_at + 2], buf[key_at + 3]];
        let field = decode_key(raw_key);

        // The slot before the length is the property id, which nothing here uses.
        let declared = read_i32_le(buf, key_at + 8);
        if declared < 0 {
            return Err(PatchError::malformed(
                sentinel_offset,
                format!("{field} declares negative length {declared}"),
            ));
        }

        let length = declared as usize;
        let padded_length = length + (4 - length % 4) % 4;
        let payload_offset = header_end;

        if payload_offset + length > buf.len() {
            return Err(PatchError::malformed(
                payload_offset,
                format!(
                    "{field} declares {length} payload bytes but only {} remain",
                    buf.len() - payload_offset
                ),
            ));
        }

        Ok(RecordHeader {
            sentinel_offset,
            raw_key,
            field,
            payload_offset,
            length,
            padded_length,
        })
    }
}

impl<'a> Iterator for RecordWalker<'a> {
    type Item = Result<RecordHeader, PatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let Some(sentinel_offset) = find_sentinel(self.buf, self.cursor) else {
            self.done = true;
            return None;
        };

        match self.read_header(sentinel_offset) {
            Ok(header) => {
                // The final record may omit its trailing padding.
                self.cursor = (header.payload_offset + header.padded_length).min(self.buf.len());
                Some(Ok(header))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(RECORD_SENTINEL);
        out.extend_from_slice(key);
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        out.extend_from_slice(payload);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out
    }

    #[test]
    fn marker_is_found_at_first_occurrence() {
        let mut buf = vec![0xAA; 6];
        buf.extend_from_slice(PIPL_MARKER);
        buf.extend_from_slice(PIPL_MARKER);
        assert_eq!(find_marker(&buf), Some(6));
    }

    #[test]
    fn narrow_marker_is_not_accepted() {
        assert_eq!(find_marker(b"....PIPL...."), None);
    }

    #[test]
    fn sentinel_search_past_end_is_none() {
        let buf = record(b"dnik", b"TKFe");
        assert_eq!(find_sentinel(&buf, 0), Some(0));
        assert_eq!(find_sentinel(&buf, 1), None);
        assert_eq!(find_sentinel(&buf, buf.len() + 10), None);
    }

    #[test]
    fn walker_rounds_length_up_to_four() {
        let mut buf = PIPL_MARKER.to_vec();
        buf.extend(record(b"eman", b"\x05Hello"));
        buf.extend(record(b"dnik", b"TKFe"));

        let headers: Vec<_> = RecordWalker::after_marker(&buf)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].field, "Name");
        assert_eq!(headers[0].length, 6);
        assert_eq!(headers[0].padded_length, 8);
        assert_eq!(headers[0].payload(&buf), b"\x05Hello");
        assert_eq!(headers[1].field, "Kind");
        assert_eq!(headers[1].sentinel_offset, PIPL_MARKER.len() + 16 + 8);
    }

    #[test]
    fn sentinel_bytes_inside_payload_are_skipped() {
        let mut buf = PIPL_MARKER.to_vec();
        buf.extend(record(b"eman", b"MIB8MIB8"));
        buf.extend(record(b"dnik", b"TKFe"));

        let fields: Vec<_> = RecordWalker::after_marker(&buf)
            .unwrap()
            .map(|h| h.unwrap().field.into_owned())
            .collect();
        assert_eq!(fields, vec!["Name", "Kind"]);
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let mut buf = PIPL_MARKER.to_vec();
        let mut rec = record(b"eman", b"abcdefgh");
        rec.truncate(rec.len() - 4);
        buf.extend(rec);

        let mut walker = RecordWalker::after_marker(&buf).unwrap();
        let err = walker.next().unwrap().unwrap_err();
        assert!(matches!(err, PatchError::MalformedRecord { .. }));
        assert!(walker.next().is_none());
    }

    #[test]
    fn truncated_header_is_malformed() {
        let mut buf = PIPL_MARKER.to_vec();
        buf.extend_from_slice(RECORD_SENTINEL);
        buf.extend_from_slice(b"dnik");

        let mut walker = RecordWalker::after_marker(&buf).unwrap();
        assert!(matches!(
            walker.next(),
            Some(Err(PatchError::MalformedRecord { .. }))
        ));
    }

    #[test]
    fn negative_length_is_malformed() {
        let mut buf = PIPL_MARKER.to_vec();
        buf.extend_from_slice(RECORD_SENTINEL);
        buf.extend_from_slice(b"dnik");
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(&(-4i32).to_le_bytes());
        buf.extend_from_slice(b"TKFe");

        let mut walker = RecordWalker::after_marker(&buf).unwrap();
        assert!(matches!(
            walker.next(),
            Some(Err(PatchError::MalformedRecord { .. }))
        ));
    }

    #[test]
    fn no_sentinel_ends_cleanly() {
        let mut buf = PIPL_MARKER.to_vec();
        buf.extend_from_slice(&[0u8; 32]);
        assert_eq!(RecordWalker::after_marker(&buf).unwrap().count(), 0);
    }
}
