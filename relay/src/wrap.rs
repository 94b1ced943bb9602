//! The peer-to-peer leg of a chained relay.
//!
//! The first frame on a wrapped connection carries a [`ConnectRequest`]
//! naming the destination the far relay must dial; every later frame is
//! payload.

use crate::pipeline;
use hopwire_core::{Backend, Error, Frontend, IoVec, Port, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Out-of-band record at the head of a wrapped connection.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub addr: String,
}

/// Accepts wrapped connections from a peer relay.
pub struct WrapFrontend {
    listener: TcpListener,
}

impl WrapFrontend {
    pub fn new(listener: TcpListener) -> Self {
        Self { listener }
    }
}

#[async_trait::async_trait]
impl Frontend for WrapFrontend {
    async fn accept(&self) -> Result<(Arc<dyn Port>, String)> {
        let (stream, peer) = self.listener.accept().await?;
        tracing::debug!(%peer, "peer relay connected");

        receive_handshake(stream).await
    }
}

async fn receive_handshake(stream: TcpStream) -> Result<(Arc<dyn Port>, String)> {
    let port = pipeline::wrap_port(stream)?;

    let mut buf = IoVec::new();
    port.unpack(&mut buf).await?;
    let bytes = buf.consume();

    let request: ConnectRequest = bincode::deserialize(&bytes)
        .map_err(|e| Error::handshake(format!("bad connect request: {e}")))?;

    Ok((Arc::new(port), request.addr))
}

/// Dials the next-hop relay and opens a wrapped session through it.
#[derive(Clone)]
pub struct WrapBackend {
    next_hop: String,
}

impl WrapBackend {
    pub fn new(next_hop: impl Into<String>) -> Self {
        Self {
            next_hop: next_hop.into(),
        }
    }
}

#[async_trait::async_trait]
impl Backend for WrapBackend {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn Port>> {
        let stream = TcpStream::connect(&self.next_hop).await?;
        let port = pipeline::wrap_port(stream)?;

        let request = bincode::serialize(&ConnectRequest {
            addr: addr.to_string(),
        })
        .map_err(|e| Error::handshake(format!("encoding connect request: {e}")))?;

        let mut buf = IoVec::new();
        buf.take(request);
        port.pack(&mut buf).await?;

        Ok(Arc::new(port))
    }
}
