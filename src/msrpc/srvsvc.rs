//! SRVSVC (Server Service) calls
//!
//! Share enumeration with the level 0 and level 1 info containers. The
//! request and response both carry the level twice: once as the
//! parameter and once as the discriminant of the info union.

use uuid::uuid;

use crate::error::{Error, Result};
use crate::handle::RpcHandle;
use crate::message::{RpcInterface, RpcMessage};
use crate::ndr::{
    decode_conformant_array, encode_conformant_array, NdrDecoder, NdrElement, NdrEncoder, NdrObject,
};

pub fn interface() -> RpcInterface {
    RpcInterface {
        uuid: uuid!("4b324fc8-1670-01d3-1278-5a47bf6ee188"),
        version_major: 3,
        version_minor: 0,
        name: "srvsvc",
    }
}

pub const OPNUM_SHARE_ENUM_ALL: u16 = 0x0F;

pub const STYPE_DISKTREE: u32 = 0;
pub const STYPE_PRINTQ: u32 = 1;
pub const STYPE_DEVICE: u32 = 2;
pub const STYPE_IPC: u32 = 3;
pub const STYPE_SPECIAL: u32 = 0x8000_0000;

/// Share name only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareInfo0 {
    pub netname: Option<String>,
}

impl NdrObject for ShareInfo0 {
    fn encode(&self, enc: &mut NdrEncoder) -> Result<()> {
        enc.encode_referent(self.netname.is_some())?;
        if let Some(netname) = &self.netname {
            enc.with_deferred(|e| e.encode_wstring(netname))?;
        }
        Ok(())
    }

    fn decode(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        self.netname = if dec.decode_referent()? {
            Some(dec.with_deferred(|d| d.decode_wstring())?)
        } else {
            None
        };
        Ok(())
    }
}

impl NdrElement for ShareInfo0 {
    const FIXED_SIZE: usize = 4;
}

/// Share name, type and remark
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareInfo1 {
    pub netname: Option<String>,
    pub stype: u32,
    pub remark: Option<String>,
}

impl ShareInfo1 {
    pub fn new(netname: &str, stype: u32, remark: &str) -> Self {
        Self {
            netname: Some(netname.to_owned()),
            stype,
            remark: Some(remark.to_owned()),
        }
    }
}

impl NdrObject for ShareInfo1 {
    fn encode(&self, enc: &mut NdrEncoder) -> Result<()> {
        enc.encode_referent(self.netname.is_some())?;
        enc.encode_u32(self.stype)?;
        enc.encode_referent(self.remark.is_some())?;
        if let Some(netname) = &self.netname {
            enc.with_deferred(|e| e.encode_wstring(netname))?;
        }
        if let Some(remark) = &self.remark {
            enc.with_deferred(|e| e.encode_wstring(remark))?;
        }
        Ok(())
    }

    fn decode(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        let has_netname = dec.decode_referent()?;
        self.stype = dec.decode_u32()?;
        let has_remark = dec.decode_referent()?;
        self.netname = if has_netname {
            Some(dec.with_deferred(|d| d.decode_wstring())?)
        } else {
            None
        };
        self.remark = if has_remark {
            Some(dec.with_deferred(|d| d.decode_wstring())?)
        } else {
            None
        };
        Ok(())
    }
}

impl NdrElement for ShareInfo1 {
    const FIXED_SIZE: usize = 12;
}

/// Level 0 share container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareInfoCtr0 {
    pub count: u32,
    pub array: Option<Vec<ShareInfo0>>,
}

impl NdrObject for ShareInfoCtr0 {
    fn encode(&self, enc: &mut NdrEncoder) -> Result<()> {
        enc.align(4);
        enc.encode_u32(self.count)?;
        enc.encode_referent(self.array.is_some())?;
        if let Some(items) = &self.array {
            enc.with_deferred(|e| encode_conformant_array(e, items))?;
        }
        Ok(())
    }

    fn decode(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        dec.align(4)?;
        self.count = dec.decode_u32()?;
        self.array = if dec.decode_referent()? {
            Some(dec.with_deferred(decode_conformant_array::<ShareInfo0>)?)
        } else {
            None
        };
        Ok(())
    }
}

/// Level 1 share container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareInfoCtr1 {
    pub count: u32,
    pub array: Option<Vec<ShareInfo1>>,
}

impl NdrObject for ShareInfoCtr1 {
    fn encode(&self, enc: &mut NdrEncoder) -> Result<()> {
        enc.align(4);
        enc.encode_u32(self.count)?;
        enc.encode_referent(self.array.is_some())?;
        if let Some(items) = &self.array {
            enc.with_deferred(|e| encode_conformant_array(e, items))?;
        }
        Ok(())
    }

    fn decode(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        dec.align(4)?;
        self.count = dec.decode_u32()?;
        self.array = if dec.decode_referent()? {
            Some(dec.with_deferred(decode_conformant_array::<ShareInfo1>)?)
        } else {
            None
        };
        Ok(())
    }
}

/// Info union, discriminated by the enumeration level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareInfoCtr {
    Ctr0(ShareInfoCtr0),
    Ctr1(ShareInfoCtr1),
}

impl ShareInfoCtr {
    pub fn level(&self) -> u32 {
        match self {
            ShareInfoCtr::Ctr0(_) => 0,
            ShareInfoCtr::Ctr1(_) => 1,
        }
    }

    fn encode(&self, enc: &mut NdrEncoder) -> Result<()> {
        match self {
            ShareInfoCtr::Ctr0(ctr) => ctr.encode(enc),
            ShareInfoCtr::Ctr1(ctr) => ctr.encode(enc),
        }
    }

    fn decode(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        match self {
            ShareInfoCtr::Ctr0(ctr) => ctr.decode(dec),
            ShareInfoCtr::Ctr1(ctr) => ctr.decode(dec),
        }
    }
}

/// NetShareEnumAll: enumerate every share on a server
#[derive(Debug)]
pub struct NetShareEnumAll {
    pub servername: Option<String>,
    pub level: u32,
    pub info: Option<ShareInfoCtr>,
    pub prefmaxlen: u32,
    pub totalentries: u32,
    pub resume_handle: u32,
    pub retval: u32,
}

impl NetShareEnumAll {
    /// Level 1 enumeration with an empty container and no size cap
    pub fn new(servername: &str) -> Self {
        Self {
            servername: Some(servername.to_owned()),
            level: 1,
            info: Some(ShareInfoCtr::Ctr1(ShareInfoCtr1::default())),
            prefmaxlen: 0xFFFF_FFFF,
            totalentries: 0,
            resume_handle: 0,
            retval: 0,
        }
    }

    /// Decoded share entries, if the response carried a level 1 array
    pub fn shares(&self) -> &[ShareInfo1] {
        match &self.info {
            Some(ShareInfoCtr::Ctr1(ctr)) => ctr.array.as_deref().unwrap_or(&[]),
            _ => &[],
        }
    }
}

impl RpcMessage for NetShareEnumAll {
    fn opnum(&self) -> u16 {
        OPNUM_SHARE_ENUM_ALL
    }

    fn encode_in(&self, enc: &mut NdrEncoder) -> Result<()> {
        enc.encode_referent(self.servername.is_some())?;
        if let Some(servername) = &self.servername {
            enc.encode_wstring(servername)?;
        }
        enc.encode_u32(self.level)?;
        enc.encode_u32(self.level)?; // union discriminant
        enc.encode_referent(self.info.is_some())?;
        if let Some(info) = &self.info {
            info.encode(enc)?;
        }
        enc.encode_u32(self.prefmaxlen)?;
        enc.encode_u32(self.resume_handle)
    }

    fn decode_out(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        self.level = dec.decode_u32()?;
        let tag = dec.decode_u32()?;
        self.info = if dec.decode_referent()? {
            let mut info = match tag {
                0 => ShareInfoCtr::Ctr0(ShareInfoCtr0::default()),
                1 => ShareInfoCtr::Ctr1(ShareInfoCtr1::default()),
                other => {
                    return Err(Error::ParseError(format!(
                        "unsupported share info level {}",
                        other
                    )))
                }
            };
            info.decode(dec)?;
            Some(info)
        } else {
            None
        };
        self.totalentries = dec.decode_u32()?;
        self.resume_handle = dec.decode_u32()?;
        self.retval = dec.decode_u32()?;
        Ok(())
    }

    fn retval(&self) -> u32 {
        self.retval
    }
}

/// Enumerate all shares on `server` through a bound SRVSVC handle
pub async fn share_enum_all(rpc: &mut RpcHandle, server: &str) -> Result<Vec<ShareInfo1>> {
    let mut msg = NetShareEnumAll::new(server);
    rpc.sendrecv(&mut msg).await?;
    Ok(msg.shares().to_vec())
}
