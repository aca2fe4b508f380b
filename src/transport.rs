//! Transport boundary for DCE/RPC
//!
//! The dispatcher only needs a paired send/receive over some byte
//! stream; framing is driven by the fragment length in the PDU header.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::{Error, Result};
use crate::message::{RpcHeader, HEADER_LENGTH};

/// Abstract transport carrying whole PDUs
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Send one complete PDU
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive one complete PDU
    async fn receive(&mut self) -> Result<Vec<u8>>;

    fn is_connected(&self) -> bool;

    async fn close(&mut self) -> Result<()>;
}

/// TCP transport (ncacn_ip_tcp)
pub struct TcpTransport {
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::ConnectionError(format!("connect to {} failed: {}", addr, e)))?;
        trace!(addr, "TCP transport connected");
        Ok(Self {
            stream: Some(stream),
        })
    }
}

#[async_trait]
impl RpcTransport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        stream.write_all(data).await?;
        stream.flush().await?;
        trace!(len = data.len(), "sent PDU");
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        let mut header = [0u8; HEADER_LENGTH];
        stream.read_exact(&mut header).await?;
        let frag_length = usize::from(RpcHeader::frag_length_of(&header)?);
        if frag_length < HEADER_LENGTH {
            return Err(Error::InvalidHeader(format!(
                "fragment length {} below header size",
                frag_length
            )));
        }
        let mut pdu = vec![0u8; frag_length];
        pdu[..HEADER_LENGTH].copy_from_slice(&header);
        stream.read_exact(&mut pdu[HEADER_LENGTH..]).await?;
        trace!(len = frag_length, "received PDU");
        Ok(pdu)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}
