//! MSRPC interface bindings built on the NDR core

pub mod samr;
pub mod srvsvc;
