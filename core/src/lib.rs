#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod iovec;
mod pass;
mod port;
mod protocol;
mod relayer;
mod switch;

pub mod rpc;

pub use error::{Error, Result};
pub use iovec::IoVec;
pub use pass::{PairedPassBuilder, Pass, PassManager, StatefulPass, SyncPass};
pub use port::{
    DEFAULT_TIMEOUT, FramedPort, INITIAL_BUFFER_SIZE, MIN_BUFFER_SIZE, Port, RawPort, UDP_TIMEOUT,
};
pub use protocol::{
    BUFFER_LIMIT, FrameReader, FrameWriter, HttpProtocol, Protocol, ProtocolWithPass, read_head,
};
pub use relayer::{Backend, Frontend, Relayer};
pub use switch::Switch;
