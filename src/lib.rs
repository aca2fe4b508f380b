//! MSRPC client marshalling core
//!
//! Implements the NDR transfer syntax (little-endian, naturally
//! aligned), the connection-oriented DCE/RPC PDU envelope, and a call
//! dispatcher that drives request/response exchanges over a pluggable
//! transport. Interface bindings for SAMR and SRVSVC sit on top.

#![forbid(unsafe_code)]

pub mod error;
pub mod handle;
pub mod message;
pub mod msrpc;
pub mod ndr;
pub mod rpc;
pub mod transport;


pub use error::{Error, Result};
pub use handle::RpcHandle;
pub use transport::{RpcTransport, TcpTransport};
