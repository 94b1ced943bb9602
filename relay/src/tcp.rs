use hopwire_core::{Backend, Port, RawPort, Result};
use std::sync::Arc;
use tokio::net::TcpStream;

/// Terminal egress: dials destinations directly.
pub struct TcpBackend;

#[async_trait::async_trait]
impl Backend for TcpBackend {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn Port>> {
        let stream = TcpStream::connect(addr).await?;
        tracing::debug!(%addr, "dialed destination");

        Ok(Arc::new(RawPort::new(stream)?))
    }
}
