//! NDR (Network Data Representation) marshalling core
//!
//! Little-endian transfer syntax as used by connection-oriented
//! DCE/RPC: naturally aligned primitives, conformant arrays, varying
//! strings, and unique pointers with deferred payloads.

mod arrays;
mod buffer;
mod strings;

pub use arrays::{
    check_conformance, decode_conformant_array, encode_conformant_array, NdrElement, NdrObject,
    MAX_CONFORMANCE,
};
pub use buffer::{NdrDecoder, NdrEncoder};
pub use strings::UnicodeString;
