//! String codec
//!
//! Two conventions coexist on the wire. Plain `WCHAR*` parameters are
//! conformant varying arrays written in place, with a trailing NUL
//! counted in both sizes. Length-prefixed strings carry an inline
//! length/capacity pair plus a referent, with the character payload
//! deferred.

use crate::error::{Error, Result};
use crate::ndr::{check_conformance, NdrDecoder, NdrEncoder};

impl NdrEncoder {
    /// Encode a wide string in place: max_count, offset, actual_count,
    /// then UTF-16LE units including the terminator
    pub fn encode_wstring(&mut self, value: &str) -> Result<()> {
        let units: Vec<u16> = value.encode_utf16().chain(std::iter::once(0)).collect();
        let count = check_conformance(units.len() as u32)?;
        self.encode_u32(count)?;
        self.encode_u32(0)?;
        self.encode_u32(count)?;
        for unit in units {
            self.encode_u16(unit)?;
        }
        Ok(())
    }
}

impl<'a> NdrDecoder<'a> {
    /// Decode an in-place wide string, validating the varying bounds
    /// against the conformant count and stripping the terminator
    pub fn decode_wstring(&mut self) -> Result<String> {
        let max_count = check_conformance(self.decode_u32()?)?;
        let offset = self.decode_u32()?;
        let actual = self.decode_u32()?;
        if u64::from(offset) + u64::from(actual) > u64::from(max_count) {
            return Err(Error::Conformance {
                count: offset.saturating_add(actual),
                limit: max_count,
            });
        }
        let actual = actual as usize;
        if self.remaining() < actual * 2 {
            return Err(Error::BufferTooSmall {
                need: actual * 2,
                have: self.remaining(),
            });
        }
        let mut units = Vec::with_capacity(actual);
        for _ in 0..actual {
            units.push(self.decode_u16()?);
        }
        if units.last() == Some(&0) {
            units.pop();
        }
        String::from_utf16(&units).map_err(|e| Error::ParseError(format!("invalid UTF-16 string: {}", e)))
    }
}

/// Length-prefixed UTF-16 string
///
/// The inline portion is `length` (characters), `max_length` (capacity
/// in characters) and a referent token. The payload, deferred past the
/// enclosing fixed portion, carries the full capacity; decode truncates
/// back to `length`. A null referent is distinct from a present empty
/// string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnicodeString {
    pub length: u16,
    pub max_length: u16,
    pub value: Option<String>,
}

impl UnicodeString {
    /// Build a present string with capacity equal to its length. Fails
    /// when the content does not fit the u16 length field.
    pub fn new(value: &str) -> Result<Self> {
        let count = value.encode_utf16().count();
        if count > usize::from(u16::MAX) {
            return Err(Error::Conformance {
                count: count as u32,
                limit: u32::from(u16::MAX),
            });
        }
        let length = count as u16;
        Ok(Self {
            length,
            max_length: length,
            value: Some(value.to_owned()),
        })
    }

    pub fn null() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Encode the inline portion: length, capacity, referent
    pub fn encode_inline(&self, enc: &mut NdrEncoder) -> Result<()> {
        enc.align(4);
        enc.encode_u16(self.length)?;
        enc.encode_u16(self.max_length)?;
        enc.encode_referent(self.value.is_some())
    }

    /// Encode the deferred payload: capacity characters, content
    /// zero-padded. No-op when the string is null.
    pub fn encode_deferred(&self, enc: &mut NdrEncoder) -> Result<()> {
        let Some(value) = &self.value else {
            return Ok(());
        };
        let units: Vec<u16> = value.encode_utf16().collect();
        enc.with_deferred(|e| {
            e.encode_u32(u32::from(self.max_length))?;
            e.encode_u32(0)?;
            e.encode_u32(u32::from(self.length))?;
            for i in 0..usize::from(self.max_length) {
                e.encode_u16(units.get(i).copied().unwrap_or(0))?;
            }
            Ok(())
        })
    }

    /// Decode the inline portion. A present referent leaves an empty
    /// value to be filled by [`decode_deferred`].
    ///
    /// [`decode_deferred`]: UnicodeString::decode_deferred
    pub fn decode_inline(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        dec.align(4)?;
        self.length = dec.decode_u16()?;
        self.max_length = dec.decode_u16()?;
        self.value = if dec.decode_referent()? {
            Some(String::new())
        } else {
            None
        };
        Ok(())
    }

    /// Decode the deferred payload: read the full conformant capacity,
    /// then truncate to the inline length
    pub fn decode_deferred(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        if self.value.is_none() {
            return Ok(());
        }
        let length = usize::from(self.length);
        let decoded = dec.with_deferred(|d| {
            let max_count = check_conformance(d.decode_u32()?)? as usize;
            let _offset = d.decode_u32()?;
            let actual = d.decode_u32()? as usize;
            if actual > max_count {
                return Err(Error::Conformance {
                    count: actual as u32,
                    limit: max_count as u32,
                });
            }
            if d.remaining() < max_count * 2 {
                return Err(Error::BufferTooSmall {
                    need: max_count * 2,
                    have: d.remaining(),
                });
            }
            let mut units = Vec::with_capacity(max_count);
            for _ in 0..max_count {
                units.push(d.decode_u16()?);
            }
            units.truncate(length.min(units.len()));
            String::from_utf16(&units).map_err(|e| Error::ParseError(format!("invalid UTF-16 string: {}", e)))
        })?;
        self.value = Some(decoded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wstring_round_trip() {
        let mut enc = NdrEncoder::new();
        enc.encode_wstring("IPC$").unwrap();

        let bytes = enc.into_bytes();
        // max_count and actual_count include the terminator
        assert_eq!(&bytes[0..4], &[5, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[5, 0, 0, 0]);

        let mut dec = NdrDecoder::new(&bytes);
        assert_eq!(dec.decode_wstring().unwrap(), "IPC$");
    }

    #[test]
    fn test_wstring_varying_bounds_checked() {
        let mut enc = NdrEncoder::new();
        enc.encode_u32(2).unwrap(); // max_count
        enc.encode_u32(0).unwrap();
        enc.encode_u32(5).unwrap(); // actual_count beyond max
        enc.encode_u16(0).unwrap();
        let bytes = enc.into_bytes();

        let mut dec = NdrDecoder::new(&bytes);
        assert!(matches!(dec.decode_wstring(), Err(Error::Conformance { .. })));
    }

    #[test]
    fn test_unicode_string_wire_layout() {
        // A string member followed by an ordinary field: the payload
        // lands after the whole fixed portion.
        let name = UnicodeString::new("abc").unwrap();
        let mut enc = NdrEncoder::new();
        name.encode_inline(&mut enc).unwrap();
        enc.encode_u32(0x1234).unwrap();
        name.encode_deferred(&mut enc).unwrap();

        let bytes = enc.into_bytes();
        assert_eq!(&bytes[0..2], &[3, 0]); // length
        assert_eq!(&bytes[2..4], &[3, 0]); // max_length
        assert_ne!(&bytes[4..8], &[0, 0, 0, 0]); // referent
        assert_eq!(&bytes[8..12], &[0x34, 0x12, 0, 0]); // tag
        assert_eq!(&bytes[12..16], &[3, 0, 0, 0]); // max_count
        assert_eq!(&bytes[16..20], &[0, 0, 0, 0]); // offset
        assert_eq!(&bytes[20..24], &[3, 0, 0, 0]); // actual_count
        assert_eq!(&bytes[24..30], &[0x61, 0, 0x62, 0, 0x63, 0]); // "abc"
        assert_eq!(bytes.len(), 30);
    }

    #[test]
    fn test_unicode_string_round_trip_with_trailing_field() {
        let name = UnicodeString::new("share").unwrap();
        let mut enc = NdrEncoder::new();
        name.encode_inline(&mut enc).unwrap();
        enc.encode_u32(7).unwrap();
        name.encode_deferred(&mut enc).unwrap();

        let bytes = enc.into_bytes();
        let mut dec = NdrDecoder::new(&bytes);
        let mut decoded = UnicodeString::default();
        decoded.decode_inline(&mut dec).unwrap();
        assert_eq!(dec.decode_u32().unwrap(), 7);
        decoded.decode_deferred(&mut dec).unwrap();
        assert_eq!(decoded.as_str(), Some("share"));
    }

    #[test]
    fn test_null_and_empty_are_distinct() {
        let null = UnicodeString::null();
        let empty = UnicodeString::new("").unwrap();

        let mut enc = NdrEncoder::new();
        null.encode_inline(&mut enc).unwrap();
        null.encode_deferred(&mut enc).unwrap();
        empty.encode_inline(&mut enc).unwrap();
        empty.encode_deferred(&mut enc).unwrap();

        let bytes = enc.into_bytes();
        let mut dec = NdrDecoder::new(&bytes);

        let mut a = UnicodeString::default();
        a.decode_inline(&mut dec).unwrap();
        a.decode_deferred(&mut dec).unwrap();
        assert_eq!(a.as_str(), None);

        let mut b = UnicodeString::default();
        b.decode_inline(&mut dec).unwrap();
        b.decode_deferred(&mut dec).unwrap();
        assert_eq!(b.as_str(), Some(""));
    }

    #[test]
    fn test_decode_truncates_capacity_to_length() {
        // Capacity 5, declared length 3: the trailing two characters
        // are storage, not content.
        let mut enc = NdrEncoder::new();
        enc.encode_u16(3).unwrap(); // length
        enc.encode_u16(5).unwrap(); // max_length
        enc.encode_referent(true).unwrap();
        enc.encode_u32(5).unwrap(); // max_count
        enc.encode_u32(0).unwrap();
        enc.encode_u32(3).unwrap();
        for unit in "abcXY".encode_utf16() {
            enc.encode_u16(unit).unwrap();
        }

        let bytes = enc.into_bytes();
        let mut dec = NdrDecoder::new(&bytes);
        let mut decoded = UnicodeString::default();
        decoded.decode_inline(&mut dec).unwrap();
        decoded.decode_deferred(&mut dec).unwrap();
        assert_eq!(decoded.as_str(), Some("abc"));
    }

    #[test]
    fn test_oversized_content_rejected_not_truncated() {
        // 70000 UTF-16 units cannot be represented in the u16 length
        // field; the count must fail outright, never wrap
        let big = "a".repeat(70000);
        match UnicodeString::new(&big) {
            Err(Error::Conformance { count: 70000, limit }) => {
                assert_eq!(limit, u32::from(u16::MAX));
            }
            other => panic!("expected Conformance, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_decode_wstring_capacity_cap() {
        // Declared conformance of 65537 with no data behind it
        let mut enc = NdrEncoder::new();
        enc.encode_u32(65537).unwrap();
        let bytes = enc.into_bytes();

        let mut dec = NdrDecoder::new(&bytes);
        match dec.decode_wstring() {
            Err(Error::Conformance { count: 65537, .. }) => {}
            other => panic!("expected Conformance, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_deferred_payload_capacity_cap() {
        let mut enc = NdrEncoder::new();
        enc.encode_u16(3).unwrap(); // length
        enc.encode_u16(3).unwrap(); // max_length
        enc.encode_referent(true).unwrap();
        enc.encode_u32(65537).unwrap(); // payload claims a huge capacity
        let bytes = enc.into_bytes();

        let mut dec = NdrDecoder::new(&bytes);
        let mut decoded = UnicodeString::default();
        decoded.decode_inline(&mut dec).unwrap();
        match decoded.decode_deferred(&mut dec) {
            Err(Error::Conformance { count: 65537, .. }) => {}
            other => panic!("expected Conformance, got {:?}", other),
        }
    }

    #[test]
    fn test_absent_string_never_touches_the_chain() {
        let null = UnicodeString::null();
        let mut enc = NdrEncoder::new();
        null.encode_inline(&mut enc).unwrap();
        null.encode_deferred(&mut enc).unwrap();
        // Only the inline portion was written
        assert_eq!(enc.into_bytes().len(), 8);
    }
}
