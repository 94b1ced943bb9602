use crate::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::collections::VecDeque;
use std::io::{self, Read};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// An ordered queue of owned byte chunks with a read cursor at the head.
///
/// Transform passes append their metadata (padding blocks, tag bytes) as
/// separate chunks, so the payload itself is only copied once a caller asks
/// for the contiguous sequence via [`IoVec::consume`].
///
/// The logical byte sequence is the concatenation of chunks in insertion
/// order; chunks are never split on insert.
#[derive(Debug, Default)]
pub struct IoVec {
    chunks: VecDeque<BytesMut>,
    /// How many bytes of the front chunk the cursor has already passed.
    head_offset: usize,
}

impl IoVec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk at the tail, taking ownership. Empty chunks are ignored.
    pub fn take(&mut self, chunk: impl IntoChunk) {
        let chunk = chunk.into_chunk();
        if chunk.is_empty() {
            return;
        }

        self.chunks.push_back(chunk);
    }

    /// Number of unread bytes in the buffer.
    pub fn len(&self) -> usize {
        let total: usize = self.chunks.iter().map(BytesMut::len).sum();

        total - self.head_offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Peeks the final byte of the tail chunk.
    pub fn last_byte(&self) -> Result<u8> {
        let last = self
            .chunks
            .back()
            .and_then(|chunk| chunk.last())
            .ok_or_else(|| Error::transform("last byte of an empty buffer"))?;

        Ok(*last)
    }

    /// Removes `n` bytes from the tail, walking chunks right to left.
    ///
    /// Fails without modifying the buffer if fewer than `n` bytes are present.
    pub fn drop_last(&mut self, n: usize) -> Result<()> {
        if n > self.len() {
            return Err(Error::transform(format!(
                "cannot drop {n} bytes from a buffer of {}",
                self.len()
            )));
        }

        let mut remaining = n;
        while remaining > 0 {
            let tail = self
                .chunks
                .back_mut()
                .expect("drop length is checked against the total");

            if tail.len() <= remaining {
                remaining -= tail.len();
                self.chunks.pop_back();
            } else {
                let keep = tail.len() - remaining;
                tail.truncate(keep);
                remaining = 0;
            }
        }

        Ok(())
    }

    /// Destructively returns the entire unread payload as one contiguous
    /// chunk, leaving the buffer empty.
    pub fn consume(&mut self) -> BytesMut {
        if self.head_offset > 0
            && let Some(front) = self.chunks.front_mut()
        {
            let _ = front.split_to(self.head_offset);
            self.head_offset = 0;
        }

        let Some(mut first) = self.chunks.pop_front() else {
            return BytesMut::new();
        };

        first.reserve(self.chunks.iter().map(BytesMut::len).sum());
        for chunk in self.chunks.drain(..) {
            first.put(chunk);
        }

        first
    }

    /// Streams all unread chunks to `sink` in order, draining the buffer.
    ///
    /// Partial writes are fatal; `sink` either receives the whole sequence or
    /// the error is propagated.
    pub async fn write_to<W>(&mut self, sink: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        while let Some(chunk) = self.chunks.front() {
            sink.write_all(&chunk[self.head_offset..]).await?;
            self.head_offset = 0;
            self.chunks.pop_front();
        }

        Ok(())
    }
}

/// Converts owned or borrowed byte data into the [`BytesMut`] chunk format
/// [`IoVec::take`] stores, bridging types the `bytes` crate's own `From`
/// impls for [`BytesMut`] don't cover directly (notably `Vec<u8>`).
pub trait IntoChunk {
    fn into_chunk(self) -> BytesMut;
}

impl IntoChunk for BytesMut {
    fn into_chunk(self) -> BytesMut {
        self
    }
}

impl IntoChunk for Vec<u8> {
    fn into_chunk(self) -> BytesMut {
        BytesMut::from(&self[..])
    }
}

impl IntoChunk for &[u8] {
    fn into_chunk(self) -> BytesMut {
        BytesMut::from(self)
    }
}

impl IntoChunk for &str {
    fn into_chunk(self) -> BytesMut {
        BytesMut::from(self)
    }
}

impl Read for IoVec {
    /// Copies unread bytes from the head into `dst`, advancing the cursor.
    /// Returns 0 once the buffer is empty.
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let mut copied = 0;

        while copied < dst.len() {
            let Some(front) = self.chunks.front() else {
                break;
            };

            let available = &front[self.head_offset..];
            let n = available.len().min(dst.len() - copied);
            dst[copied..copied + n].copy_from_slice(&available[..n]);
            copied += n;
            self.head_offset += n;

            if self.head_offset == front.len() {
                self.chunks.pop_front();
                self.head_offset = 0;
            }
        }

        Ok(copied)
    }
}
