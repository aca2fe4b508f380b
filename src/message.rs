//! DCE/RPC connection-oriented PDU envelope
//!
//! Common 16-byte header, request/response/fault body framing, and the
//! bind handshake. Stub payloads are marshalled by the message types
//! themselves through [`RpcMessage`].

use std::convert::TryFrom;
use std::fmt;

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use uuid::{uuid, Uuid};

use crate::error::{Error, Result};
use crate::ndr::{NdrDecoder, NdrEncoder};

pub const RPC_VERSION_MAJOR: u8 = 5;
pub const RPC_VERSION_MINOR: u8 = 0;

/// Size of the common PDU header
pub const HEADER_LENGTH: usize = 16;

/// Offset of the stub data in a request PDU (header plus alloc_hint,
/// context_id and opnum)
pub const REQUEST_STUB_OFFSET: usize = 24;

/// Little-endian integers, ASCII characters, IEEE floats
const DATA_REPRESENTATION: [u8; 4] = [0x10, 0x00, 0x00, 0x00];

pub const DEFAULT_MAX_XMIT: u16 = 4280;
pub const DEFAULT_MAX_RECV: u16 = 4280;

/// PDU types for connection-oriented RPC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Request = 0,
    Response = 2,
    Fault = 3,
    Bind = 11,
    BindAck = 12,
    BindNak = 13,
    AlterContext = 14,
    AlterContextResponse = 15,
    Shutdown = 17,
}

impl TryFrom<u8> for PacketType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0 => Ok(PacketType::Request),
            2 => Ok(PacketType::Response),
            3 => Ok(PacketType::Fault),
            11 => Ok(PacketType::Bind),
            12 => Ok(PacketType::BindAck),
            13 => Ok(PacketType::BindNak),
            14 => Ok(PacketType::AlterContext),
            15 => Ok(PacketType::AlterContextResponse),
            17 => Ok(PacketType::Shutdown),
            other => Err(other),
        }
    }
}

bitflags! {
    /// Fragmentation and delivery flags in the PDU header
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PacketFlags: u8 {
        const FIRST_FRAG = 0x01;
        const LAST_FRAG = 0x02;
        const PENDING_CANCEL = 0x04;
        const CONC_MPX = 0x10;
        const DID_NOT_EXECUTE = 0x20;
        const MAYBE = 0x40;
        const OBJECT_UUID = 0x80;
    }
}

impl PacketFlags {
    /// Whether the PDU is a complete, unfragmented message
    pub fn single_fragment(self) -> bool {
        self.contains(PacketFlags::FIRST_FRAG | PacketFlags::LAST_FRAG)
    }
}

/// Fault status codes carried in fault PDUs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FaultCode {
    Other = 0x0000_0001,
    AccessDenied = 0x0000_0005,
    CannotPerform = 0x0000_06D8,
    NdrError = 0x0000_06F7,
    InvalidTag = 0x1C00_0006,
    ContextMismatch = 0x1C00_001A,
    OperationRangeError = 0x1C01_0002,
    UnknownInterface = 0x1C01_0003,
    ProtocolError = 0x1C01_000B,
}

impl FaultCode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x0000_0001 => Some(FaultCode::Other),
            0x0000_0005 => Some(FaultCode::AccessDenied),
            0x0000_06D8 => Some(FaultCode::CannotPerform),
            0x0000_06F7 => Some(FaultCode::NdrError),
            0x1C00_0006 => Some(FaultCode::InvalidTag),
            0x1C00_001A => Some(FaultCode::ContextMismatch),
            0x1C01_0002 => Some(FaultCode::OperationRangeError),
            0x1C01_0003 => Some(FaultCode::UnknownInterface),
            0x1C01_000B => Some(FaultCode::ProtocolError),
            _ => None,
        }
    }

    /// Human-readable text for a raw fault status
    pub fn message(value: u32) -> &'static str {
        match FaultCode::from_u32(value) {
            Some(FaultCode::Other) => "unspecified fault",
            Some(FaultCode::AccessDenied) => "access denied",
            Some(FaultCode::CannotPerform) => "cannot perform operation",
            Some(FaultCode::NdrError) => "NDR marshalling error",
            Some(FaultCode::InvalidTag) => "invalid union tag",
            Some(FaultCode::ContextMismatch) => "presentation context mismatch",
            Some(FaultCode::OperationRangeError) => "operation number out of range",
            Some(FaultCode::UnknownInterface) => "unknown interface",
            Some(FaultCode::ProtocolError) => "protocol error",
            None => "unknown fault",
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", FaultCode::message(*self as u32), *self as u32)
    }
}

/// Identity of a remote RPC interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcInterface {
    pub uuid: Uuid,
    pub version_major: u16,
    pub version_minor: u16,
    pub name: &'static str,
}

impl RpcInterface {
    /// NDR transfer syntax negotiated at bind time
    pub const NDR_SYNTAX: RpcInterface = RpcInterface {
        uuid: uuid!("8a885d04-1ceb-11c9-9fe8-08002b104860"),
        version_major: 2,
        version_minor: 0,
        name: "ndr",
    };
}

impl fmt::Display for RpcInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} v{}.{})",
            self.name, self.uuid, self.version_major, self.version_minor
        )
    }
}

/// Common PDU header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcHeader {
    pub ptype: PacketType,
    pub flags: PacketFlags,
    pub call_id: u32,
    pub frag_length: u16,
    pub auth_length: u16,
}

impl RpcHeader {
    pub fn new(ptype: PacketType, call_id: u32) -> Self {
        Self {
            ptype,
            flags: PacketFlags::FIRST_FRAG | PacketFlags::LAST_FRAG,
            call_id,
            frag_length: 0,
            auth_length: 0,
        }
    }

    pub fn encode(&self, enc: &mut NdrEncoder) -> Result<()> {
        enc.encode_u8(RPC_VERSION_MAJOR)?;
        enc.encode_u8(RPC_VERSION_MINOR)?;
        enc.encode_u8(self.ptype as u8)?;
        enc.encode_u8(self.flags.bits())?;
        enc.encode_bytes(&DATA_REPRESENTATION)?;
        enc.encode_u16(self.frag_length)?;
        enc.encode_u16(self.auth_length)?;
        enc.encode_u32(self.call_id)
    }

    pub fn decode(dec: &mut NdrDecoder<'_>) -> Result<Self> {
        let major = dec.decode_u8()?;
        let minor = dec.decode_u8()?;
        if major != RPC_VERSION_MAJOR || minor != RPC_VERSION_MINOR {
            return Err(Error::InvalidHeader(format!(
                "unsupported RPC version {}.{}",
                major, minor
            )));
        }
        let ptype = PacketType::try_from(dec.decode_u8()?)
            .map_err(|t| Error::InvalidHeader(format!("unknown packet type 0x{:02X}", t)))?;
        let flags = PacketFlags::from_bits_retain(dec.decode_u8()?);
        let drep = dec.decode_bytes(4)?;
        if drep[0] & 0xF0 != 0x10 {
            return Err(Error::InvalidHeader(
                "big-endian data representation is not supported".into(),
            ));
        }
        let frag_length = dec.decode_u16()?;
        let auth_length = dec.decode_u16()?;
        let call_id = dec.decode_u32()?;
        Ok(Self {
            ptype,
            flags,
            call_id,
            frag_length,
            auth_length,
        })
    }

    /// Read the fragment length out of a raw header, for transport
    /// framing
    pub fn frag_length_of(data: &[u8]) -> Result<u16> {
        if data.len() < HEADER_LENGTH {
            return Err(Error::BufferTooSmall {
                need: HEADER_LENGTH,
                have: data.len(),
            });
        }
        Ok(LittleEndian::read_u16(&data[8..10]))
    }
}

/// A single RPC call: one instance carries the input parameters in and
/// receives the output parameters and return status back
pub trait RpcMessage {
    fn opnum(&self) -> u16;

    fn ptype(&self) -> PacketType {
        PacketType::Request
    }

    /// Marshal the input parameters into the stub
    fn encode_in(&self, enc: &mut NdrEncoder) -> Result<()>;

    /// Unmarshal the output parameters from the stub
    fn decode_out(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()>;

    /// Return status decoded from the stub, zero on success
    fn retval(&self) -> u32;
}

/// Build a complete single-fragment PDU for a message, patching the
/// fragment length and allocation hint after encoding
pub fn encode_pdu<M: RpcMessage + ?Sized>(msg: &M, call_id: u32, context_id: u16) -> Result<Vec<u8>> {
    let mut enc = NdrEncoder::new();
    let header = RpcHeader::new(msg.ptype(), call_id);
    header.encode(&mut enc)?;
    if msg.ptype() == PacketType::Request {
        enc.encode_u32(0)?; // alloc_hint, patched below
        enc.encode_u16(context_id)?;
        enc.encode_u16(msg.opnum())?;
    }
    msg.encode_in(&mut enc)?;

    let mut buf = enc.into_bytes();
    let frag_length =
        u16::try_from(buf.len()).map_err(|_| Error::Protocol("PDU exceeds fragment limit".into()))?;
    LittleEndian::write_u16(&mut buf[8..10], frag_length);
    if msg.ptype() == PacketType::Request {
        let hint = (buf.len() - REQUEST_STUB_OFFSET) as u32;
        LittleEndian::write_u32(&mut buf[16..20], hint);
    }
    Ok(buf)
}

/// Parse a received PDU into `msg`, surfacing faults as errors
pub fn decode_pdu<M: RpcMessage + ?Sized>(msg: &mut M, data: &[u8], expected_call_id: u32) -> Result<()> {
    let mut dec = NdrDecoder::new(data);
    let header = RpcHeader::decode(&mut dec)?;
    if !header.flags.single_fragment() {
        return Err(Error::Protocol("fragmented responses are not supported".into()));
    }
    if header.call_id != expected_call_id {
        return Err(Error::Protocol(format!(
            "call id mismatch: sent {}, received {}",
            expected_call_id, header.call_id
        )));
    }
    match header.ptype {
        PacketType::Response => {
            let _alloc_hint = dec.decode_u32()?;
            let _context_id = dec.decode_u16()?;
            let _cancel_count = dec.decode_u8()?;
            dec.skip(1)?;
            msg.decode_out(&mut dec)
        }
        PacketType::Fault => {
            let _alloc_hint = dec.decode_u32()?;
            let _context_id = dec.decode_u16()?;
            let _cancel_count = dec.decode_u8()?;
            dec.skip(1)?;
            let code = dec.decode_u32()?;
            Err(Error::Fault { code })
        }
        PacketType::BindAck | PacketType::AlterContextResponse => msg.decode_out(&mut dec),
        PacketType::BindNak => Err(Error::ConnectionError("bind rejected by server".into())),
        other => Err(Error::Protocol(format!("unexpected packet type {:?}", other))),
    }
}

/// Bind request for one presentation context, negotiating the NDR
/// transfer syntax
#[derive(Debug, Clone)]
pub struct RpcBind {
    pub interface: RpcInterface,
    pub max_xmit: u16,
    pub max_recv: u16,
    /// Presentation result from the bind ack, zero for acceptance
    pub result: u16,
}

impl RpcBind {
    pub fn new(interface: RpcInterface) -> Self {
        Self {
            interface,
            max_xmit: DEFAULT_MAX_XMIT,
            max_recv: DEFAULT_MAX_RECV,
            result: 0,
        }
    }
}

impl RpcMessage for RpcBind {
    fn opnum(&self) -> u16 {
        0
    }

    fn ptype(&self) -> PacketType {
        PacketType::Bind
    }

    fn encode_in(&self, enc: &mut NdrEncoder) -> Result<()> {
        enc.encode_u16(self.max_xmit)?;
        enc.encode_u16(self.max_recv)?;
        enc.encode_u32(0)?; // assoc group
        enc.encode_u8(1)?; // context element count
        enc.encode_u8(0)?;
        enc.encode_u16(0)?;
        enc.encode_u16(0)?; // context id
        enc.encode_u8(1)?; // transfer syntax count
        enc.encode_u8(0)?;
        enc.encode_uuid(&self.interface.uuid)?;
        enc.encode_u16(self.interface.version_major)?;
        enc.encode_u16(self.interface.version_minor)?;
        let ndr = RpcInterface::NDR_SYNTAX;
        enc.encode_uuid(&ndr.uuid)?;
        enc.encode_u16(ndr.version_major)?;
        enc.encode_u16(ndr.version_minor)
    }

    fn decode_out(&mut self, dec: &mut NdrDecoder<'_>) -> Result<()> {
        self.max_xmit = dec.decode_u16()?;
        self.max_recv = dec.decode_u16()?;
        let _assoc_group = dec.decode_u32()?;
        let addr_len = usize::from(dec.decode_u16()?);
        dec.skip(addr_len)?;
        dec.align(4)?;
        let _n_results = dec.decode_u8()?;
        dec.align(4)?;
        self.result = dec.decode_u16()?;
        let _reason = dec.decode_u16()?;
        let _syntax = dec.decode_uuid()?;
        let _syntax_version = dec.decode_u32()?;
        Ok(())
    }

    fn retval(&self) -> u32 {
        u32::from(self.result)
    }
}
