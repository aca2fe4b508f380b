//! SAMR (Security Account Manager Remote) calls
//!
//! Covers the connect family, handle close, and domain open. Connect4
//! is preferred; servers predating it fault with an out-of-range
//! opnum, and [`SamrPolicyHandle::open`] falls back to Connect2.

use uuid::uuid;

use crate::error::Result;
use crate::handle::RpcHandle;
use crate::message::{RpcInterface, RpcMessage};
use crate::ndr::{NdrDecoder, NdrEncoder, NdrObject};
use crate::rpc::{PolicyHandle, Sid};

pub fn interface() -> RpcInterface {
    RpcInterface {
        uuid: uuid!("12345778-1234-abcd-ef00-0123456789ac"),
        version_major: 1,
        version_minor: 0,
        name: "samr",
    }
}

pub const MAXIMUM_ALLOWED: u32 = 0x0200_0000;

pub const OPNUM_CLOSE_HANDLE: u16 = 0x01;
pub const OPNUM_OPEN_DOMAIN: u16 = 0x07;
pub const OPNUM_CONNECT2: u16 = 0x39;
pub const OPNUM_CONNECT4: u16 = 0x3E;

/// SamrConnect2: the original connect, taking the server name and an
/// access mask
#[derive(Debug, Default)]
pub struct SamrConnect2 {
    pub system_name: Option<String>,
    pub access_mask: u32,
    pub handle: PolicyHandle,
    pub retval: u32,
}

impl SamrConnect2 {
    pub fn new(system_name: &str, access_mask: u32) -> Self {
        Self {
            system_name: Some(system_name.to_owned()),
            access_mask,
            ..Self::default()
        }
    }
}

impl RpcMessage for SamrConnect2 {
    fn opnum(&self) -> u16 {
        OPNUM_CONNECT2
    }

    fn encode_in(&self, enc: &mut NdrEncoder) -> Result<()> {
        enc.encode_referent(self.system_name.is_some())?;
        if let Some(name) = &self.system_name {
            enc.encode_wstring(name)?;
        }
        enc.encode_u32(self.access_mask)
    }

    fn decode_out(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        self.handle.decode(dec)?;
        self.retval = dec.decode_u32()?;
        Ok(())
    }

    fn retval(&self) -> u32 {
        self.retval
    }
}

/// SamrConnect4: the revised connect, with a client revision field
#[derive(Debug, Default)]
pub struct SamrConnect4 {
    pub system_name: Option<String>,
    pub client_revision: u32,
    pub access_mask: u32,
    pub handle: PolicyHandle,
    pub retval: u32,
}

impl SamrConnect4 {
    pub fn new(system_name: &str, access_mask: u32) -> Self {
        Self {
            system_name: Some(system_name.to_owned()),
            client_revision: 2,
            access_mask,
            ..Self::default()
        }
    }
}

impl RpcMessage for SamrConnect4 {
    fn opnum(&self) -> u16 {
        OPNUM_CONNECT4
    }

    fn encode_in(&self, enc: &mut NdrEncoder) -> Result<()> {
        enc.encode_referent(self.system_name.is_some())?;
        if let Some(name) = &self.system_name {
            enc.encode_wstring(name)?;
        }
        enc.encode_u32(self.client_revision)?;
        enc.encode_u32(self.access_mask)
    }

    fn decode_out(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        self.handle.decode(dec)?;
        self.retval = dec.decode_u32()?;
        Ok(())
    }

    fn retval(&self) -> u32 {
        self.retval
    }
}

/// SamrCloseHandle: release a server-side handle
#[derive(Debug, Default)]
pub struct SamrCloseHandle {
    pub handle: PolicyHandle,
    pub retval: u32,
}

impl SamrCloseHandle {
    pub fn new(handle: PolicyHandle) -> Self {
        Self { handle, retval: 0 }
    }
}

impl RpcMessage for SamrCloseHandle {
    fn opnum(&self) -> u16 {
        OPNUM_CLOSE_HANDLE
    }

    fn encode_in(&self, enc: &mut NdrEncoder) -> Result<()> {
        self.handle.encode(enc)
    }

    fn decode_out(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        self.handle.decode(dec)?;
        self.retval = dec.decode_u32()?;
        Ok(())
    }

    fn retval(&self) -> u32 {
        self.retval
    }
}

/// SamrOpenDomain: open a domain by SID under a connect handle
#[derive(Debug, Default)]
pub struct SamrOpenDomain {
    pub handle: PolicyHandle,
    pub access_mask: u32,
    pub sid: Sid,
    pub domain_handle: PolicyHandle,
    pub retval: u32,
}

impl SamrOpenDomain {
    pub fn new(handle: PolicyHandle, access_mask: u32, sid: Sid) -> Self {
        Self {
            handle,
            access_mask,
            sid,
            ..Self::default()
        }
    }
}

impl RpcMessage for SamrOpenDomain {
    fn opnum(&self) -> u16 {
        OPNUM_OPEN_DOMAIN
    }

    fn encode_in(&self, enc: &mut NdrEncoder) -> Result<()> {
        self.handle.encode(enc)?;
        enc.encode_u32(self.access_mask)?;
        self.sid.encode(enc)
    }

    fn decode_out(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        self.domain_handle.decode(dec)?;
        self.retval = dec.decode_u32()?;
        Ok(())
    }

    fn retval(&self) -> u32 {
        self.retval
    }
}

/// An open SAMR connect handle
#[derive(Debug)]
pub struct SamrPolicyHandle {
    handle: PolicyHandle,
}

impl SamrPolicyHandle {
    /// Connect to the SAM on `server`, preferring Connect4 and falling
    /// back to Connect2 when the server does not implement it
    pub async fn open(rpc: &mut RpcHandle, server: &str, access_mask: u32) -> Result<Self> {
        let mut newer = SamrConnect4::new(server, access_mask);
        let mut older = SamrConnect2::new(server, access_mask);
        let used_fallback = rpc.sendrecv_fallback(&mut newer, &mut older).await?;
        let handle = if used_fallback {
            older.handle
        } else {
            newer.handle
        };
        Ok(Self { handle })
    }

    pub fn policy_handle(&self) -> &PolicyHandle {
        &self.handle
    }

    /// Open a domain under this connect handle
    pub async fn open_domain(
        &self,
        rpc: &mut RpcHandle,
        access_mask: u32,
        sid: Sid,
    ) -> Result<PolicyHandle> {
        let mut msg = SamrOpenDomain::new(self.handle.clone(), access_mask, sid);
        rpc.sendrecv(&mut msg).await?;
        Ok(msg.domain_handle)
    }

    /// Release the connect handle on the server
    pub async fn close(self, rpc: &mut RpcHandle) -> Result<()> {
        let mut msg = SamrCloseHandle::new(self.handle);
        rpc.sendrecv(&mut msg).await?;
        Ok(())
    }
}
