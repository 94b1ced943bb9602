use hopwire_core::{Error, Frontend, Port, RawPort, Result};
use hopwire_proxy::socks5;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// SOCKS5 ingress: runs the handshake and yields a raw port together with
/// the destination the client named.
pub struct Socks5Frontend {
    listener: TcpListener,
}

impl Socks5Frontend {
    pub fn new(listener: TcpListener) -> Self {
        Self { listener }
    }
}

#[async_trait::async_trait]
impl Frontend for Socks5Frontend {
    async fn accept(&self) -> Result<(Arc<dyn Port>, String)> {
        let (mut stream, peer) = self.listener.accept().await?;

        let destination = handshake(&mut stream).await?;
        tracing::debug!(%peer, %destination, "accepted client");

        Ok((Arc::new(RawPort::new(stream)?), destination))
    }
}

async fn handshake(stream: &mut TcpStream) -> Result<String> {
    let request = socks5::handshake(stream).await?;

    if request.command != socks5::CMD_CONNECT {
        socks5::send_reply(stream, socks5::REP_COMMAND_NOT_SUPPORTED).await?;

        return Err(Error::handshake(format!(
            "unsupported command {}",
            request.command
        )));
    }

    socks5::send_reply(stream, socks5::REP_SUCCEEDED).await?;

    Ok(request.destination)
}
