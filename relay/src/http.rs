//! Local HTTP proxy ingress feeding the relay's backend.
//!
//! CONNECT opens a plain tunnel. Absolute-form requests are rewritten
//! (hop-by-hop fields stripped, close-delimited) and replayed through the
//! tunnel as the first bytes of the session, so the response streams back
//! over the ordinary switch path.

use hopwire_core::{Error, Frontend, IoVec, Port, RawPort, Result, read_head};
use hopwire_proxy::http::{CONNECT_ESTABLISHED, ProxyRequest, parse_request_head};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};

const MAX_HEAD_BYTES: usize = 64 << 10;

/// HTTP proxy ingress. Client connections are parsed by a background accept
/// loop; fully captured sessions are handed out through [`Frontend::accept`].
pub struct HttpProxyFrontend {
    sessions: Mutex<mpsc::Receiver<(Arc<dyn Port>, String)>>,
}

impl HttpProxyFrontend {
    pub fn new(listener: TcpListener) -> Self {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(serve(listener, tx));

        Self {
            sessions: Mutex::new(rx),
        }
    }
}

#[async_trait::async_trait]
impl Frontend for HttpProxyFrontend {
    async fn accept(&self) -> Result<(Arc<dyn Port>, String)> {
        self.sessions
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| Error::handshake("http proxy listener is gone"))
    }
}

async fn serve(listener: TcpListener, sessions: mpsc::Sender<(Arc<dyn Port>, String)>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("failed to accept proxy client: {e}");
                continue;
            }
        };

        let sessions = sessions.clone();
        tokio::spawn(async move {
            if let Err(e) = capture(stream, sessions).await {
                tracing::debug!(%peer, "proxy client rejected: {e}");
            }
        });
    }
}

/// Reads one request head and turns the connection into a relay session.
async fn capture(
    stream: TcpStream,
    sessions: mpsc::Sender<(Arc<dyn Port>, String)>,
) -> Result<()> {
    let mut reader = BufReader::new(stream);

    let Some(head) = read_head(&mut reader, MAX_HEAD_BYTES).await? else {
        return Ok(());
    };

    let (port, authority) = match parse_request_head(&head)? {
        ProxyRequest::Connect { authority } => {
            // Bytes the client pipelined after CONNECT belong to the tunnel.
            let early = reader.buffer().to_vec();
            let mut stream = reader.into_inner();
            stream.write_all(CONNECT_ESTABLISHED).await?;

            (PrefixedPort::new(RawPort::new(stream)?, early), authority)
        }
        ProxyRequest::Forward { authority, head } => {
            let mut replay = head;
            replay.extend_from_slice(reader.buffer());
            let stream = reader.into_inner();

            (PrefixedPort::new(RawPort::new(stream)?, replay), authority)
        }
    };

    let port: Arc<dyn Port> = Arc::new(port);
    sessions
        .send((port, authority))
        .await
        .map_err(|_| Error::handshake("relayer is gone"))
}

/// A port that delivers a prepared chunk before reading from the socket.
struct PrefixedPort {
    prefix: Mutex<Option<Vec<u8>>>,
    inner: RawPort,
}

impl PrefixedPort {
    fn new(inner: RawPort, prefix: Vec<u8>) -> Self {
        Self {
            prefix: Mutex::new((!prefix.is_empty()).then_some(prefix)),
            inner,
        }
    }
}

#[async_trait::async_trait]
impl Port for PrefixedPort {
    async fn pack(&self, buf: &mut IoVec) -> Result<()> {
        self.inner.pack(buf).await
    }

    async fn unpack(&self, buf: &mut IoVec) -> Result<()> {
        if let Some(prefix) = self.prefix.lock().await.take() {
            buf.take(prefix);
            return Ok(());
        }

        self.inner.unpack(buf).await
    }

    fn close_read(&self) -> Result<()> {
        self.inner.close_read()
    }

    fn close_write(&self) -> Result<()> {
        self.inner.close_write()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr()
    }
}
