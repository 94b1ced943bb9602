use crate::protocol::{FrameReader, FrameWriter, INTERNAL_ERROR_RESPONSE, Protocol};
use crate::{BUFFER_LIMIT, Error, IoVec, Result};
use bytes::BytesMut;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Per-operation deadline for established sessions.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);
/// Per-operation deadline for datagram-style relaying.
pub const UDP_TIMEOUT: Duration = Duration::from_secs(60);

/// First allocation of a raw port's read buffer. Too small a value makes
/// buffer allocation dominate large transfers.
pub const INITIAL_BUFFER_SIZE: usize = 256 << 10;
/// Floor of the read buffer, sized to hold a datagram-sized read.
pub const MIN_BUFFER_SIZE: usize = 2 << 10;

/// A connection-level object carrying framed or raw messages.
///
/// Ports are shared by the two directions of a session; the pack and unpack
/// sides are guarded by independent locks so the directions never serialize
/// against each other.
#[async_trait::async_trait]
pub trait Port: Send + Sync {
    /// Emits the buffer as one message toward the peer.
    async fn pack(&self, buf: &mut IoVec) -> Result<()>;
    /// Fills the buffer with one received message.
    async fn unpack(&self, buf: &mut IoVec) -> Result<()>;
    /// Half-closes the receive side of the underlying socket.
    fn close_read(&self) -> Result<()>;
    /// Half-closes the send side of the underlying socket, signalling FIN.
    fn close_write(&self) -> Result<()>;
    /// Shuts the connection down in both directions.
    fn close(&self) -> Result<()>;
    fn local_addr(&self) -> SocketAddr;
    fn peer_addr(&self) -> SocketAddr;
}

/// The socket halves plus a duplicated handle used for half-shutdown, which
/// tokio's owned halves do not expose.
struct SplitStream {
    read: OwnedReadHalf,
    write: OwnedWriteHalf,
    shutdown: std::net::TcpStream,
    local: SocketAddr,
    peer: SocketAddr,
}

fn split_stream(stream: TcpStream) -> Result<SplitStream> {
    let local = stream.local_addr()?;
    let peer = stream.peer_addr()?;

    let std_stream = stream.into_std()?;
    let shutdown = std_stream.try_clone()?;
    let (read, write) = TcpStream::from_std(std_stream)?.into_split();

    Ok(SplitStream {
        read,
        write,
        shutdown,
        local,
        peer,
    })
}

/// `shutdown(2)` on a dead socket reports `ENOTCONN`; at that point the
/// requested half-close has already happened.
fn half_close(socket: &std::net::TcpStream, how: Shutdown) -> Result<()> {
    match socket.shutdown(how) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// A [`Port`] that applies a [`Protocol`] to a TCP connection.
///
/// Each `pack` produces exactly one frame on the wire and each `unpack`
/// consumes exactly one. The buffered reader and writer are owned by the
/// port and reused across calls; deadlines are installed per call.
pub struct FramedPort {
    protocol: Arc<dyn Protocol>,
    reader: Mutex<FrameReader>,
    writer: Mutex<FrameWriter>,
    shutdown: std::net::TcpStream,
    local: SocketAddr,
    peer: SocketAddr,
    timeout: Duration,
}

impl FramedPort {
    pub fn new(stream: TcpStream, protocol: impl Protocol + 'static) -> Result<Self> {
        Self::with_timeout(stream, protocol, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        stream: TcpStream,
        protocol: impl Protocol + 'static,
        timeout: Duration,
    ) -> Result<Self> {
        let split = split_stream(stream)?;

        Ok(Self {
            protocol: Arc::new(protocol),
            reader: Mutex::new(BufReader::new(Box::new(split.read))),
            writer: Mutex::new(BufWriter::new(Box::new(split.write))),
            shutdown: split.shutdown,
            local: split.local,
            peer: split.peer,
            timeout,
        })
    }

    /// Cover behavior: on a framing error, pretend to be a confused HTTP
    /// server before the session is torn down. Best effort only.
    async fn send_cover_response(&self) {
        let mut writer = self.writer.lock().await;
        let send = async {
            writer.write_all(INTERNAL_ERROR_RESPONSE).await?;
            writer.flush().await
        };

        match timeout(self.timeout, send).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::trace!("failed to send cover response: {e}"),
            Err(_) => tracing::trace!("timed out sending cover response"),
        }
    }
}

#[async_trait::async_trait]
impl Port for FramedPort {
    async fn pack(&self, buf: &mut IoVec) -> Result<()> {
        let mut writer = self.writer.lock().await;

        match timeout(self.timeout, self.protocol.pack(buf, &mut writer)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn unpack(&self, buf: &mut IoVec) -> Result<()> {
        let result = {
            let mut reader = self.reader.lock().await;

            match timeout(self.timeout, self.protocol.unpack(&mut reader, buf)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout),
            }
        };

        match &result {
            Err(Error::EndOfStream) => {
                tracing::debug!(peer = %self.peer, local = %self.local, "stream closed by peer");
            }
            Err(Error::Framing(_)) => self.send_cover_response().await,
            _ => {}
        }

        result
    }

    fn close_read(&self) -> Result<()> {
        half_close(&self.shutdown, Shutdown::Read)
    }

    fn close_write(&self) -> Result<()> {
        half_close(&self.shutdown, Shutdown::Write)
    }

    fn close(&self) -> Result<()> {
        half_close(&self.shutdown, Shutdown::Both)
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

/// A [`Port`] that treats the socket as an unframed byte stream.
///
/// One `unpack` yields at most one socket-read's worth of bytes; one `pack`
/// writes the whole buffer in order.
pub struct RawPort {
    reader: Mutex<RawReader>,
    writer: Mutex<OwnedWriteHalf>,
    shutdown: std::net::TcpStream,
    local: SocketAddr,
    peer: SocketAddr,
    timeout: Duration,
}

struct RawReader {
    half: OwnedReadHalf,
    buf: BytesMut,
    last_read: usize,
}

impl RawReader {
    /// Doubles the read buffer whenever the previous read filled it, between
    /// [`MIN_BUFFER_SIZE`] and [`BUFFER_LIMIT`]. Read prefixes are split off
    /// and handed to the caller, so the buffer shrinks as it is consumed.
    fn grow_buffer(&mut self) {
        let len = self.buf.len();

        let mut target = len;
        if target <= self.last_read {
            target = if self.last_read == 0 {
                INITIAL_BUFFER_SIZE
            } else {
                self.last_read * 2
            };
        }
        target = target.clamp(MIN_BUFFER_SIZE, BUFFER_LIMIT);

        if target <= len {
            return;
        }

        self.buf = BytesMut::zeroed(target);
    }
}

impl RawPort {
    pub fn new(stream: TcpStream) -> Result<Self> {
        Self::with_timeout(stream, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(stream: TcpStream, timeout: Duration) -> Result<Self> {
        let split = split_stream(stream)?;

        Ok(Self {
            reader: Mutex::new(RawReader {
                half: split.read,
                buf: BytesMut::new(),
                last_read: 0,
            }),
            writer: Mutex::new(split.write),
            shutdown: split.shutdown,
            local: split.local,
            peer: split.peer,
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl Port for RawPort {
    async fn pack(&self, buf: &mut IoVec) -> Result<()> {
        let mut writer = self.writer.lock().await;

        match timeout(self.timeout, buf.write_to(&mut *writer)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn unpack(&self, buf: &mut IoVec) -> Result<()> {
        let mut guard = self.reader.lock().await;
        let reader = &mut *guard;

        reader.grow_buffer();

        let read = match timeout(self.timeout, reader.half.read(&mut reader.buf[..])).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::Timeout),
        };

        if read == 0 {
            reader.last_read = 0;
            tracing::debug!(peer = %self.peer, local = %self.local, "stream closed by peer");
            return Err(Error::EndOfStream);
        }

        reader.last_read = read;
        buf.take(reader.buf.split_to(read));

        Ok(())
    }

    fn close_read(&self) -> Result<()> {
        half_close(&self.shutdown, Shutdown::Read)
    }

    fn close_write(&self) -> Result<()> {
        half_close(&self.shutdown, Shutdown::Write)
    }

    fn close(&self) -> Result<()> {
        half_close(&self.shutdown, Shutdown::Both)
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
