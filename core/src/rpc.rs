//! Request/response exchanges over a [`Port`].
//!
//! One message occupies exactly one port-level frame, so exchanges over a
//! framed port are self-delimiting. Over a raw port a message must fit into
//! a single socket read, which holds for the small control records this is
//! meant for.

use crate::{Error, IoVec, Port, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// JSON-encoded exchanges, for interoperability with non-Rust peers.
pub struct JsonRpc<P> {
    port: P,
}

impl<P: Port> JsonRpc<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Client side: sends `request` and awaits the matching response.
    pub async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        self.send(request).await?;
        self.receive().await
    }

    /// Server side: reads the next request.
    pub async fn read_request<Req: DeserializeOwned>(&self) -> Result<Req> {
        self.receive().await
    }

    /// Server side: answers the request read last.
    pub async fn send_response<Resp: Serialize + Sync>(&self, response: &Resp) -> Result<()> {
        self.send(response).await
    }

    async fn send<T: Serialize + Sync>(&self, message: &T) -> Result<()> {
        let encoded = serde_json::to_vec(message)
            .map_err(|e| Error::framing(format!("encoding rpc message: {e}")))?;

        let mut buf = IoVec::new();
        buf.take(encoded);

        self.port.pack(&mut buf).await
    }

    async fn receive<T: DeserializeOwned>(&self) -> Result<T> {
        let mut buf = IoVec::new();
        self.port.unpack(&mut buf).await?;

        let bytes = buf.consume();
        serde_json::from_slice(&bytes).map_err(|e| Error::framing(format!("decoding rpc message: {e}")))
    }
}

/// Binary-encoded exchanges for Rust-to-Rust control channels.
pub struct BinRpc<P> {
    port: P,
}

impl<P: Port> BinRpc<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        self.send(request).await?;
        self.receive().await
    }

    pub async fn read_request<Req: DeserializeOwned>(&self) -> Result<Req> {
        self.receive().await
    }

    pub async fn send_response<Resp: Serialize + Sync>(&self, response: &Resp) -> Result<()> {
        self.send(response).await
    }

    async fn send<T: Serialize + Sync>(&self, message: &T) -> Result<()> {
        let encoded = bincode::serialize(message)
            .map_err(|e| Error::framing(format!("encoding rpc message: {e}")))?;

        let mut buf = IoVec::new();
        buf.take(encoded);

        self.port.pack(&mut buf).await
    }

    async fn receive<T: DeserializeOwned>(&self) -> Result<T> {
        let mut buf = IoVec::new();
        self.port.unpack(&mut buf).await?;

        let bytes = buf.consume();
        bincode::deserialize(&bytes).map_err(|e| Error::framing(format!("decoding rpc message: {e}")))
    }
}
