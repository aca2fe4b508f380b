//! Base wire structures shared by MSRPC interfaces

use std::fmt;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ndr::{NdrDecoder, NdrEncoder, NdrObject};

/// Opaque server-side handle returned by open-style operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyHandle {
    pub handle_type: u32,
    pub uuid: Uuid,
}

impl PolicyHandle {
    pub fn is_null(&self) -> bool {
        self.handle_type == 0 && self.uuid.is_nil()
    }
}

impl NdrObject for PolicyHandle {
    fn encode(&self, enc: &mut NdrEncoder) -> Result<()> {
        enc.align(4);
        enc.encode_u32(self.handle_type)?;
        enc.encode_uuid(&self.uuid)
    }

    fn decode(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        dec.align(4)?;
        self.handle_type = dec.decode_u32()?;
        self.uuid = dec.decode_uuid()?;
        Ok(())
    }
}

/// Windows SIDs carry at most 15 sub-authorities
const MAX_SUB_AUTHORITIES: u32 = 15;

/// Security identifier, a conformant structure keyed by its
/// sub-authority count
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sid {
    pub revision: u8,
    pub identifier_authority: [u8; 6],
    pub sub_authority: Vec<u32>,
}

impl Sid {
    pub fn new(revision: u8, identifier_authority: [u8; 6], sub_authority: Vec<u32>) -> Self {
        Self {
            revision,
            identifier_authority,
            sub_authority,
        }
    }
}

impl NdrObject for Sid {
    fn encode(&self, enc: &mut NdrEncoder) -> Result<()> {
        let count = self.sub_authority.len() as u32;
        if count > MAX_SUB_AUTHORITIES {
            return Err(Error::Conformance {
                count,
                limit: MAX_SUB_AUTHORITIES,
            });
        }
        enc.align(4);
        enc.encode_u32(count)?;
        enc.encode_u8(self.revision)?;
        enc.encode_u8(count as u8)?;
        enc.encode_bytes(&self.identifier_authority)?;
        for sub in &self.sub_authority {
            enc.encode_u32(*sub)?;
        }
        Ok(())
    }

    fn decode(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        dec.align(4)?;
        let max_count = dec.decode_u32()?;
        if max_count > MAX_SUB_AUTHORITIES {
            return Err(Error::Conformance {
                count: max_count,
                limit: MAX_SUB_AUTHORITIES,
            });
        }
        self.revision = dec.decode_u8()?;
        let count = u32::from(dec.decode_u8()?);
        if count != max_count {
            return Err(Error::Conformance {
                count,
                limit: max_count,
            });
        }
        self.identifier_authority
            .copy_from_slice(dec.decode_bytes(6)?);
        self.sub_authority.clear();
        for _ in 0..count {
            self.sub_authority.push(dec.decode_u32()?);
        }
        Ok(())
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut authority: u64 = 0;
        for byte in self.identifier_authority {
            authority = authority << 8 | u64::from(byte);
        }
        write!(f, "S-{}-{}", self.revision, authority)?;
        for sub in &self.sub_authority {
            write!(f, "-{}", sub)?;
        }
        Ok(())
    }
}
