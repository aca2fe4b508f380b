//! NDR cursor and primitive codec
//!
//! Both the encoder and the decoder track two positions over a single
//! buffer: `index`, where fixed fields are read or written, and
//! `deferred`, the tail of the out-of-line chain where pointer payloads
//! accumulate. Every advance pushes the chain tail forward, so payloads
//! always land after the furthest point the fixed portion has reached.

use byteorder::{ByteOrder, LittleEndian};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Referent ID written for present pointers. Receivers only distinguish
/// zero from non-zero.
const REFERENT_ID: u32 = 0x0002_0000;

/// NDR encoder over an owned, growable buffer
pub struct NdrEncoder {
    buf: Vec<u8>,
    index: usize,
    deferred: usize,
}

impl NdrEncoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            index: 0,
            deferred: 0,
        }
    }

    /// Current write position
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn ensure(&mut self, end: usize) {
        if self.buf.len() < end {
            self.buf.resize(end, 0);
        }
    }

    /// Pad the write position to a natural-size boundary
    pub fn align(&mut self, alignment: usize) {
        let pad = (alignment - self.index % alignment) % alignment;
        self.advance(pad);
    }

    /// Advance the write position, growing the buffer and pushing the
    /// deferred chain tail forward
    pub fn advance(&mut self, n: usize) {
        self.index += n;
        self.ensure(self.index);
        if self.index > self.deferred {
            self.deferred = self.index;
        }
    }

    /// Reserve `n` zeroed bytes at the current position and return the
    /// region start. Fill it later through [`with_region`].
    ///
    /// [`with_region`]: NdrEncoder::with_region
    pub fn reserve(&mut self, n: usize) -> usize {
        let start = self.index;
        self.advance(n);
        start
    }

    /// Run `f` with the write position moved back to `start`, restoring
    /// it afterwards. Used to fill regions reserved for fixed-size
    /// element runs.
    pub fn with_region<T>(&mut self, start: usize, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.index;
        self.index = start;
        let value = f(self)?;
        self.index = saved;
        Ok(value)
    }

    /// Run `f` at the tail of the deferred chain.
    ///
    /// Inside a reserved region the caller's position is restored
    /// afterwards; at top level (position and chain tail coincide)
    /// encoding continues after the payload, so subsequent inline
    /// fields follow it on the wire.
    pub fn with_deferred<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.index;
        let chained = self.deferred > saved;
        self.index = self.deferred;
        let value = f(self)?;
        if self.index > self.deferred {
            self.deferred = self.index;
        }
        self.index = if chained { saved } else { self.deferred };
        Ok(value)
    }

    fn put(&mut self, len: usize) -> &mut [u8] {
        let at = self.index;
        self.ensure(at + len);
        self.advance(len);
        &mut self.buf[at..at + len]
    }

    /// Encode a u8
    pub fn encode_u8(&mut self, value: u8) -> Result<()> {
        self.put(1)[0] = value;
        Ok(())
    }

    /// Encode a u16
    pub fn encode_u16(&mut self, value: u16) -> Result<()> {
        self.align(2);
        LittleEndian::write_u16(self.put(2), value);
        Ok(())
    }

    /// Encode a u32
    pub fn encode_u32(&mut self, value: u32) -> Result<()> {
        self.align(4);
        LittleEndian::write_u32(self.put(4), value);
        Ok(())
    }

    /// Encode a u64
    pub fn encode_u64(&mut self, value: u64) -> Result<()> {
        self.align(8);
        LittleEndian::write_u64(self.put(8), value);
        Ok(())
    }

    /// Encode raw bytes without alignment
    pub fn encode_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put(bytes.len()).copy_from_slice(bytes);
        Ok(())
    }

    /// Encode a referent token: zero for absent, a fixed non-zero ID
    /// for present
    pub fn encode_referent(&mut self, present: bool) -> Result<()> {
        self.encode_u32(if present { REFERENT_ID } else { 0 })
    }

    /// Encode a UUID in NDR field order (little-endian time fields)
    pub fn encode_uuid(&mut self, value: &Uuid) -> Result<()> {
        let (time_low, time_mid, time_hi_and_version, rest) = value.as_fields();
        self.encode_u32(time_low)?;
        self.encode_u16(time_mid)?;
        self.encode_u16(time_hi_and_version)?;
        self.encode_bytes(rest)
    }
}

impl Default for NdrEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// NDR decoder over a borrowed buffer, bounds-checked throughout
pub struct NdrDecoder<'a> {
    data: &'a [u8],
    index: usize,
    deferred: usize,
}

impl<'a> NdrDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            index: 0,
            deferred: 0,
        }
    }

    /// Current read position
    pub fn index(&self) -> usize {
        self.index
    }

    /// Bytes left between the read position and the end of the buffer
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.index)
    }

    /// Skip `n` bytes
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(Error::BufferTooSmall {
                need: n,
                have: self.remaining(),
            });
        }
        self.index += n;
        if self.index > self.deferred {
            self.deferred = self.index;
        }
        Ok(())
    }

    /// Skip alignment padding
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let pad = (alignment - self.index % alignment) % alignment;
        self.skip(pad)
    }

    /// Mark off an `n`-byte region at the current position and return
    /// its start, leaving the read position past it
    pub fn reserve(&mut self, n: usize) -> Result<usize> {
        let start = self.index;
        self.skip(n)?;
        Ok(start)
    }

    /// Run `f` with the read position moved back to `start`, restoring
    /// it afterwards
    pub fn with_region<T>(&mut self, start: usize, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.index;
        self.index = start;
        let value = f(self)?;
        self.index = saved;
        Ok(value)
    }

    /// Run `f` at the tail of the deferred chain. Mirror of the encoder
    /// side: restores the caller's position inside a region, continues
    /// past the payload at top level.
    pub fn with_deferred<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.index;
        let chained = self.deferred > saved;
        self.index = self.deferred;
        let value = f(self)?;
        if self.index > self.deferred {
            self.deferred = self.index;
        }
        self.index = if chained { saved } else { self.deferred };
        Ok(value)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::BufferTooSmall {
                need: len,
                have: self.remaining(),
            });
        }
        let at = self.index;
        self.index += len;
        if self.index > self.deferred {
            self.deferred = self.index;
        }
        Ok(&self.data[at..at + len])
    }

    /// Decode a u8
    pub fn decode_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Decode a u16
    pub fn decode_u16(&mut self) -> Result<u16> {
        self.align(2)?;
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    /// Decode a u32
    pub fn decode_u32(&mut self) -> Result<u32> {
        self.align(4)?;
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Decode a u64
    pub fn decode_u64(&mut self) -> Result<u64> {
        self.align(8)?;
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Decode raw bytes without alignment
    pub fn decode_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// Decode a referent token, reporting presence
    pub fn decode_referent(&mut self) -> Result<bool> {
        Ok(self.decode_u32()? != 0)
    }

    /// Decode a UUID in NDR field order
    pub fn decode_uuid(&mut self) -> Result<Uuid> {
        let time_low = self.decode_u32()?;
        let time_mid = self.decode_u16()?;
        let time_hi_and_version = self.decode_u16()?;
        let mut rest = [0u8; 8];
        rest.copy_from_slice(self.decode_bytes(8)?);
        Ok(Uuid::from_fields(time_low, time_mid, time_hi_and_version, &rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_round_trip() {
        let mut enc = NdrEncoder::new();
        enc.encode_u8(0x42).unwrap();
        enc.encode_u16(0x1234).unwrap();
        enc.encode_u32(0xDEADBEEF).unwrap();
        enc.encode_u64(0x123456789ABCDEF0).unwrap();

        let bytes = enc.into_bytes();
        let mut dec = NdrDecoder::new(&bytes);

        assert_eq!(dec.decode_u8().unwrap(), 0x42);
        assert_eq!(dec.decode_u16().unwrap(), 0x1234);
        assert_eq!(dec.decode_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(dec.decode_u64().unwrap(), 0x123456789ABCDEF0);
    }

    #[test]
    fn test_alignment_padding() {
        let mut enc = NdrEncoder::new();
        enc.encode_u8(0xFF).unwrap();
        enc.encode_u32(0x01020304).unwrap();

        let bytes = enc.into_bytes();
        // Three zero pad bytes between the u8 and the u32
        assert_eq!(bytes, [0xFF, 0, 0, 0, 0x04, 0x03, 0x02, 0x01]);

        let mut dec = NdrDecoder::new(&bytes);
        assert_eq!(dec.decode_u8().unwrap(), 0xFF);
        assert_eq!(dec.decode_u32().unwrap(), 0x01020304);
    }

    #[test]
    fn test_decode_past_end_fails() {
        let bytes = [0x01, 0x02];
        let mut dec = NdrDecoder::new(&bytes);
        assert_eq!(dec.decode_u16().unwrap(), 0x0201);
        match dec.decode_u32() {
            Err(Error::BufferTooSmall { need: 4, have: 0 }) => {}
            other => panic!("expected BufferTooSmall, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_referent_tokens() {
        let mut enc = NdrEncoder::new();
        enc.encode_referent(true).unwrap();
        enc.encode_referent(false).unwrap();

        let bytes = enc.into_bytes();
        assert_ne!(&bytes[0..4], &[0, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);

        let mut dec = NdrDecoder::new(&bytes);
        assert!(dec.decode_referent().unwrap());
        assert!(!dec.decode_referent().unwrap());
    }

    #[test]
    fn test_uuid_round_trip() {
        let value = Uuid::new_v4();
        let mut enc = NdrEncoder::new();
        enc.encode_uuid(&value).unwrap();

        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 16);
        let mut dec = NdrDecoder::new(&bytes);
        assert_eq!(dec.decode_uuid().unwrap(), value);
    }

    #[test]
    fn test_uuid_time_low_is_little_endian() {
        let value = Uuid::from_fields(0x12345678, 0xABCD, 0xEF01, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut enc = NdrEncoder::new();
        enc.encode_uuid(&value).unwrap();
        let bytes = enc.into_bytes();
        assert_eq!(&bytes[0..4], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(&bytes[4..6], &[0xCD, 0xAB]);
    }

    #[test]
    fn test_deferred_payload_lands_after_region() {
        let mut enc = NdrEncoder::new();
        let start = enc.reserve(8);
        enc.with_region(start, |e| {
            e.encode_u32(0xAAAAAAAA)?;
            e.with_deferred(|e| e.encode_u32(0xCCCCCCCC))?;
            e.encode_u32(0xBBBBBBBB)
        })
        .unwrap();

        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 12);
        let mut dec = NdrDecoder::new(&bytes);
        assert_eq!(dec.decode_u32().unwrap(), 0xAAAAAAAA);
        assert_eq!(dec.decode_u32().unwrap(), 0xBBBBBBBB);
        assert_eq!(dec.decode_u32().unwrap(), 0xCCCCCCCC);
    }

    #[test]
    fn test_top_level_deferred_continues_inline() {
        // With no enclosing region the payload is written in place and
        // later fields follow it.
        let mut enc = NdrEncoder::new();
        enc.encode_u32(1).unwrap();
        enc.with_deferred(|e| e.encode_u32(2)).unwrap();
        enc.encode_u32(3).unwrap();

        let bytes = enc.into_bytes();
        let mut dec = NdrDecoder::new(&bytes);
        assert_eq!(dec.decode_u32().unwrap(), 1);
        assert_eq!(dec.decode_u32().unwrap(), 2);
        assert_eq!(dec.decode_u32().unwrap(), 3);
    }

    #[test]
    fn test_deferred_order_follows_call_order() {
        let mut enc = NdrEncoder::new();
        let start = enc.reserve(8);
        enc.with_region(start, |e| {
            e.encode_u32(0)?;
            e.with_deferred(|e| e.encode_u32(0x0000_000A))?;
            e.encode_u32(0)?;
            e.with_deferred(|e| e.encode_u32(0x0000_000B))
        })
        .unwrap();

        let bytes = enc.into_bytes();
        assert_eq!(&bytes[8..12], &[0x0A, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &[0x0B, 0, 0, 0]);
    }
}
