//! Call dispatcher
//!
//! An [`RpcHandle`] pairs a connected transport with one interface
//! identity. It binds lazily on the first call, then drives each call
//! as one request PDU out and one response PDU in, decoding the reply
//! into the same message that carried the inputs.

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::message::{
    self, FaultCode, RpcBind, RpcInterface, RpcMessage, DEFAULT_MAX_RECV, DEFAULT_MAX_XMIT,
};
use crate::transport::RpcTransport;

pub struct RpcHandle {
    transport: Box<dyn RpcTransport>,
    interface: RpcInterface,
    call_id: u32,
    bound: bool,
    max_xmit: u16,
    max_recv: u16,
}

impl RpcHandle {
    pub fn new(transport: Box<dyn RpcTransport>, interface: RpcInterface) -> Self {
        Self {
            transport,
            interface,
            call_id: 0,
            bound: false,
            max_xmit: DEFAULT_MAX_XMIT,
            max_recv: DEFAULT_MAX_RECV,
        }
    }

    pub fn interface(&self) -> &RpcInterface {
        &self.interface
    }

    async fn bind(&mut self) -> Result<()> {
        let mut bind = RpcBind::new(self.interface);
        self.call_id += 1;
        let call_id = self.call_id;
        let pdu = message::encode_pdu(&bind, call_id, 0)?;
        self.transport.send(&pdu).await?;
        let reply = self.transport.receive().await?;
        message::decode_pdu(&mut bind, &reply, call_id)?;
        if bind.result != 0 {
            return Err(Error::ConnectionError(format!(
                "bind to {} rejected: presentation result {}",
                self.interface, bind.result
            )));
        }
        self.max_xmit = bind.max_xmit;
        self.max_recv = bind.max_recv;
        self.bound = true;
        debug!(interface = %self.interface, max_xmit = self.max_xmit, "bound");
        Ok(())
    }

    /// Run one call: encode the inputs, exchange one PDU pair, decode
    /// the outputs back into `msg`. Faults and non-zero return statuses
    /// come back as errors.
    pub async fn sendrecv<M: RpcMessage + Send>(&mut self, msg: &mut M) -> Result<()> {
        if !self.bound {
            self.bind().await?;
        }
        self.call_id += 1;
        let call_id = self.call_id;
        let pdu = message::encode_pdu(msg, call_id, 0)?;
        if pdu.len() > usize::from(self.max_xmit) {
            return Err(Error::Protocol(format!(
                "request of {} bytes exceeds negotiated fragment size {}",
                pdu.len(),
                self.max_xmit
            )));
        }
        trace!(opnum = msg.opnum(), call_id, len = pdu.len(), "sending request");
        self.transport.send(&pdu).await?;
        let reply = self.transport.receive().await?;
        message::decode_pdu(msg, &reply, call_id)?;
        let status = msg.retval();
        if status != 0 {
            return Err(Error::Status(status));
        }
        Ok(())
    }

    /// Run `newer`, retrying exactly once with `older` when the server
    /// faults with "operation number out of range". Every other outcome
    /// passes through unchanged. Returns whether the fallback ran.
    pub async fn sendrecv_fallback<N, O>(&mut self, newer: &mut N, older: &mut O) -> Result<bool>
    where
        N: RpcMessage + Send,
        O: RpcMessage + Send,
    {
        match self.sendrecv(newer).await {
            Err(Error::Fault { code }) if code == FaultCode::OperationRangeError as u32 => {
                debug!(
                    opnum = newer.opnum(),
                    fallback = older.opnum(),
                    "operation not supported, retrying with older variant"
                );
                self.sendrecv(older).await?;
                Ok(true)
            }
            Err(e) => Err(e),
            Ok(()) => Ok(false),
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }
}
