//! Reversible byte transforms that shape relay traffic.
//!
//! None of these are ciphers. They exist so that no single byte-level
//! fingerprint identifies the stream, and every one of them has an exact
//! inverse registered alongside it.

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod padding;
mod random;
mod swap;

pub use padding::{TailPaddingDecoder, TailPaddingEncoder};
pub use random::{RandomDecoder, RandomEncoder};
pub use swap::ByteSwap;
