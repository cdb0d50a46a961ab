//! Synthetic PiPL buffers for unit tests.

use crate::field::encode_spec_version;
use crate::tables::{PIPL_MARKER, RECORD_SENTINEL};

pub(crate) struct PiplBuilder {
    buf: Vec<u8>,
}

impl PiplBuilder {
    /// Some leading junk, then the marker and an arbitrary resource header.
    pub(crate) fn new() -> Self {
        let mut buf = b"MZ\x90\x00resource-section".to_vec();
        buf.extend_from_slice(PIPL_MARKER);
        buf.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);
        Self { buf }
    }

    pub(crate) fn record(mut self, code: &[u8; 4], payload: &[u8]) -> Self {
        let mut key = *code;
        key.reverse();
        self.buf.extend_from_slice(RECORD_SENTINEL);
        self.buf.extend_from_slice(&key);
        self.buf.extend_from_slice(&0i32.to_le_bytes());
        self.buf.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        self.buf.extend_from_slice(payload);
        let pad = (4 - payload.len() % 4) % 4;
        self.buf.extend(std::iter::repeat(0u8).take(pad));
        self
    }

    /// One AE effect sub-entry, in the order effects are laid out on disk.
    pub(crate) fn effect(
        self,
        name: &str,
        spec_version: (u16, u16),
        out_flags: i32,
        out_flags_2: i32,
    ) -> Self {
        let mut pascal = vec![name.len() as u8];
        pascal.extend_from_slice(name.as_bytes());
        let full = format!("ADBE {name}");
        let mut match_name = vec![full.len() as u8];
        match_name.extend_from_slice(full.as_bytes());
        self.record(b"kind", b"TKFe")
            .record(b"name", &pascal)
            .record(b"catg", b"\x04Blur")
            .record(b"8664", b"\x0aEffectMain")
            .record(b"ePVR", &0i32.to_le_bytes())
            .record(b"eSVR", &encode_spec_version(spec_version.0, spec_version.1))
            .record(b"eVER", &524289i32.to_le_bytes())
            .record(b"eINF", &0i32.to_le_bytes())
            .record(b"eGLO", &out_flags.to_le_bytes())
            .record(b"eGL2", &out_flags_2.to_le_bytes())
            .record(b"eMNA", &match_name)
            .record(b"aeFL", &0i32.to_le_bytes())
    }

    pub(crate) fn trailer(mut self) -> Self {
        self.buf.extend_from_slice(b"\x00\x00\x00\x00END-OF-RESOURCES");
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// Offset of the payload of the `nth` record with `code`.
pub(crate) fn payload_offset(buf: &[u8], code: &[u8; 4], nth: usize) -> usize {
    let mut key = *code;
    key.reverse();
    let mut needle = RECORD_SENTINEL.to_vec();
    needle.extend_from_slice(&key);
    buf.windows(8)
        .enumerate()
        .filter(|(_, w)| *w == needle.as_slice())
        .map(|(i, _)| i + 16)
        .nth(nth)
        .expect("record not present")
}

pub(crate) fn word_at(buf: &[u8], offset: usize) -> [u8; 4] {
    [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]]
}
