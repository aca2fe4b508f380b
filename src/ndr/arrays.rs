//! Conformant array codec
//!
//! A conformant array is a `max_count` header followed by a run of
//! fixed-size element slots. Element pointer payloads are deferred past
//! the whole run, so the slots stay uniformly sized.

use crate::error::{Error, Result};
use crate::ndr::{NdrDecoder, NdrEncoder};

/// Upper bound on conformant counts. Anything above this is rejected
/// before allocation.
pub const MAX_CONFORMANCE: u32 = 65536;

/// A structure that can marshal itself through the NDR codec
pub trait NdrObject: Default {
    fn encode(&self, enc: &mut NdrEncoder) -> Result<()>;
    fn decode(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()>;
}

/// An [`NdrObject`] with a fixed inline footprint, usable as a
/// conformant array element
pub trait NdrElement: NdrObject {
    /// Inline bytes each element occupies in the array region
    const FIXED_SIZE: usize;
    const ALIGNMENT: usize = 4;
}

/// Validate a conformant count against [`MAX_CONFORMANCE`]
pub fn check_conformance(count: u32) -> Result<u32> {
    if count > MAX_CONFORMANCE {
        return Err(Error::Conformance {
            count,
            limit: MAX_CONFORMANCE,
        });
    }
    Ok(count)
}

/// Encode a conformant array: `max_count`, then the element region,
/// with element payloads deferred past it
pub fn encode_conformant_array<T: NdrElement>(enc: &mut NdrEncoder, items: &[T]) -> Result<()> {
    let count = check_conformance(items.len() as u32)?;
    enc.encode_u32(count)?;
    enc.align(T::ALIGNMENT);
    let start = enc.reserve(T::FIXED_SIZE * items.len());
    enc.with_region(start, |e| {
        for item in items {
            item.encode(e)?;
        }
        Ok(())
    })
}

/// Decode a conformant array. The count is capped and the element
/// region bounds-checked before any allocation happens.
pub fn decode_conformant_array<T: NdrElement>(dec: &mut NdrDecoder<'_>) -> Result<Vec<T>> {
    let count = check_conformance(dec.decode_u32()?)? as usize;
    dec.align(T::ALIGNMENT)?;
    let start = dec.reserve(T::FIXED_SIZE * count)?;
    dec.with_region(start, |d| {
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let mut item = T::default();
            item.decode(d)?;
            items.push(item);
        }
        Ok(items)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    struct Pair {
        left: u32,
        right: u32,
    }

    impl NdrObject for Pair {
        fn encode(&self, enc: &mut NdrEncoder) -> Result<()> {
            enc.encode_u32(self.left)?;
            enc.encode_u32(self.right)
        }

        fn decode(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
            self.left = dec.decode_u32()?;
            self.right = dec.decode_u32()?;
            Ok(())
        }
    }

    impl NdrElement for Pair {
        const FIXED_SIZE: usize = 8;
    }

    #[test]
    fn test_array_round_trip() {
        let items = vec![
            Pair { left: 1, right: 2 },
            Pair { left: 3, right: 4 },
        ];

        let mut enc = NdrEncoder::new();
        encode_conformant_array(&mut enc, &items).unwrap();

        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 4 + 16);
        assert_eq!(&bytes[0..4], &[2, 0, 0, 0]);

        let mut dec = NdrDecoder::new(&bytes);
        let decoded: Vec<Pair> = decode_conformant_array(&mut dec).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn test_empty_array_round_trip() {
        let items: Vec<Pair> = Vec::new();
        let mut enc = NdrEncoder::new();
        encode_conformant_array(&mut enc, &items).unwrap();

        let bytes = enc.into_bytes();
        assert_eq!(bytes, [0, 0, 0, 0]);

        let mut dec = NdrDecoder::new(&bytes);
        let decoded: Vec<Pair> = decode_conformant_array(&mut dec).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_conformance_cap_rejected_before_allocation() {
        // max_count of 65537 with no element data behind it
        let bytes = [0x01, 0x00, 0x01, 0x00];
        let mut dec = NdrDecoder::new(&bytes);
        match decode_conformant_array::<Pair>(&mut dec) {
            Err(Error::Conformance { count: 65537, limit: MAX_CONFORMANCE }) => {}
            other => panic!("expected Conformance, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_truncated_element_region_rejected() {
        // Claims two elements but carries bytes for one
        let mut bytes = vec![2, 0, 0, 0];
        bytes.extend_from_slice(&[0; 8]);
        let mut dec = NdrDecoder::new(&bytes);
        assert!(matches!(
            decode_conformant_array::<Pair>(&mut dec),
            Err(Error::BufferTooSmall { .. })
        ));
    }
}
