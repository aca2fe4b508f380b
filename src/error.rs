//! Error types for the MSRPC client core

use std::io;
use thiserror::Error;

use crate::message::FaultCode;

/// Result type for MSRPC operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for MSRPC operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Decode ran past the end of the buffer
    #[error("buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    /// Conformant count exceeds the allowed limit
    #[error("conformance violation: count {count} exceeds limit {limit}")]
    Conformance { count: u32, limit: u32 },

    /// Wire data could not be parsed
    #[error("parse error: {0}")]
    ParseError(String),

    /// Invalid PDU header
    #[error("invalid PDU header: {0}")]
    InvalidHeader(String),

    /// Protocol violation
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server returned a fault PDU
    #[error("RPC fault 0x{:08X}: {}", .code, FaultCode::message(*.code))]
    Fault { code: u32 },

    /// Call completed but returned a non-zero status
    #[error("RPC call failed with status 0x{0:08X}")]
    Status(u32),

    /// Connection error
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// Connection closed
    #[error("connection closed")]
    ConnectionClosed,
}
