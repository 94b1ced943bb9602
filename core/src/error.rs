use std::io;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by passes, protocols and ports.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A clean FIN on the read side.
    ///
    /// Terminates one direction of a session without being a failure; the
    /// switch recasts it into a half-close of the opposite write side.
    #[error("end of stream")]
    EndOfStream,
    /// A per-operation deadline expired.
    #[error("deadline expired")]
    Timeout,
    /// Bad envelope syntax, out-of-range length or truncated body.
    #[error("framing: {0}")]
    Framing(String),
    /// A transform pass refused its input.
    #[error("transform: {0}")]
    Transform(String),
    /// The ingress or peer handshake was rejected.
    #[error("handshake: {0}")]
    Handshake(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn framing(msg: impl Into<String>) -> Self {
        Error::Framing(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Error::Transform(msg.into())
    }

    pub fn handshake(msg: impl Into<String>) -> Self {
        Error::Handshake(msg.into())
    }

    /// Whether this is a clean end-of-stream rather than a failure.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }
}
