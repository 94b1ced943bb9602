//! The envelope carried between peer relays.
//!
//! Each frame is shaped as an HTTP/1.1 POST with an opaque body; frame
//! boundaries are defined solely by `Content-Length`. A [`Protocol`] may be
//! wrapped with a transform pass per side to produce the obfuscated composite
//! that actually goes on the wire.

use crate::{Error, IoVec, Pass, Result};
use bytes::BytesMut;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    BufWriter,
};

/// Upper bound for a single frame body.
pub const BUFFER_LIMIT: usize = 64 << 20;

/// Upper bound for the header section of a frame.
const MAX_HEAD_BYTES: usize = 8 << 10;
const MAX_HEADERS: usize = 64;

const USER_AGENT: &str = "Mozilla/5.0";

/// Cover reply emitted on framing errors. Not a protocol element; peers must
/// never interpret it as data.
pub(crate) const INTERNAL_ERROR_RESPONSE: &[u8] =
    b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n";

pub type FrameReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
pub type FrameWriter = BufWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// A bound pack/unpack pair over a buffered byte stream.
///
/// `pack` emits exactly one framed message, `unpack` consumes exactly one.
#[async_trait::async_trait]
pub trait Protocol: Send + Sync {
    async fn pack(&self, buf: &mut IoVec, out: &mut FrameWriter) -> Result<()>;
    async fn unpack(&self, input: &mut FrameReader, buf: &mut IoVec) -> Result<()>;
}

/// The HTTP framing itself.
pub struct HttpProtocol;

#[async_trait::async_trait]
impl Protocol for HttpProtocol {
    async fn pack(&self, buf: &mut IoVec, out: &mut FrameWriter) -> Result<()> {
        let len = buf.len();
        if len == 0 {
            return Err(Error::framing("refusing to emit an empty frame"));
        }

        let head =
            format!("POST / HTTP/1.1\r\nUser-Agent: {USER_AGENT}\r\nContent-Length: {len}\r\n\r\n");
        out.write_all(head.as_bytes()).await?;
        buf.write_to(out).await?;
        out.flush().await?;

        Ok(())
    }

    async fn unpack(&self, input: &mut FrameReader, buf: &mut IoVec) -> Result<()> {
        let head = read_head(input, MAX_HEAD_BYTES)
            .await?
            .ok_or(Error::EndOfStream)?;

        let content_length = parse_content_length(&head)?;
        if content_length == 0 || content_length > BUFFER_LIMIT as u64 {
            return Err(Error::framing(format!(
                "content length {content_length} is out of range"
            )));
        }

        let mut body = BytesMut::zeroed(content_length as usize);
        input.read_exact(&mut body).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::framing("frame body is truncated")
            } else {
                Error::from(e)
            }
        })?;

        buf.take(body);

        Ok(())
    }
}

/// A [`Protocol`] wrapped by a transform pass on each side.
///
/// The pack pass runs before framing, the unpack pass after unframing, so a
/// paired pack/unpack pipeline is transparent to the peer.
pub struct ProtocolWithPass<P> {
    protocol: P,
    pack_pass: Box<dyn Pass>,
    unpack_pass: Box<dyn Pass>,
}

impl<P: Protocol> ProtocolWithPass<P> {
    pub fn new(
        protocol: P,
        pack_pass: impl Pass + 'static,
        unpack_pass: impl Pass + 'static,
    ) -> Self {
        Self {
            protocol,
            pack_pass: Box::new(pack_pass),
            unpack_pass: Box::new(unpack_pass),
        }
    }
}

#[async_trait::async_trait]
impl<P: Protocol> Protocol for ProtocolWithPass<P> {
    async fn pack(&self, buf: &mut IoVec, out: &mut FrameWriter) -> Result<()> {
        self.pack_pass.run(buf)?;
        self.protocol.pack(buf, out).await
    }

    async fn unpack(&self, input: &mut FrameReader, buf: &mut IoVec) -> Result<()> {
        self.protocol.unpack(input, buf).await?;
        self.unpack_pass.run(buf)
    }
}

/// Reads bytes up to and including the blank line that terminates an HTTP/1.1
/// header section.
///
/// Returns `None` on a clean EOF before the first byte. An EOF inside the
/// section, or a section exceeding `limit`, is a framing error.
pub async fn read_head<R>(input: &mut R, limit: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    const TERMINATOR: &[u8] = b"\r\n\r\n";

    let mut head: Vec<u8> = Vec::new();

    loop {
        let chunk = input.fill_buf().await?;
        if chunk.is_empty() {
            if head.is_empty() {
                return Ok(None);
            }

            return Err(Error::framing("connection closed inside a frame head"));
        }

        // The terminator may straddle two reads; search from up to three
        // bytes before the new data.
        let overlap = head.len().min(TERMINATOR.len() - 1);
        let mut window = Vec::with_capacity(overlap + chunk.len());
        window.extend_from_slice(&head[head.len() - overlap..]);
        window.extend_from_slice(chunk);

        match find(&window, TERMINATOR) {
            Some(at) => {
                let keep = at + TERMINATOR.len() - overlap;
                head.extend_from_slice(&chunk[..keep]);
                input.consume(keep);

                return Ok(Some(head));
            }
            None => {
                let taken = chunk.len();
                head.extend_from_slice(chunk);
                input.consume(taken);

                if head.len() > limit {
                    return Err(Error::framing(format!("frame head exceeds {limit} bytes")));
                }
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_content_length(head: &[u8]) -> Result<u64> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);

    match request.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(Error::framing("incomplete request head"));
        }
        Err(e) => {
            return Err(Error::framing(format!("bad request head: {e}")));
        }
    }

    let header = request
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
        .ok_or_else(|| Error::framing("frame head lacks a content length"))?;

    let value = std::str::from_utf8(header.value)
        .map_err(|_| Error::framing("content length is not ascii"))?;

    value
        .trim()
        .parse()
        .map_err(|_| Error::framing(format!("content length {value:?} is not a number")))
}
