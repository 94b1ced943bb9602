use bytes::{BufMut, BytesMut};
use hopwire_core::{IoVec, Pass, Result};

/// Appends a random 4-byte-aligned padding block of 0 to 60 bytes, followed
/// by a single byte holding the block length.
pub struct TailPaddingEncoder;

impl Pass for TailPaddingEncoder {
    fn run(&self, buf: &mut IoVec) -> Result<()> {
        let len = (rand::random::<u32>() % 64) as usize & (63 << 2);

        let mut padding = BytesMut::with_capacity(len + 1);
        for _ in 0..len / 4 {
            padding.put_u32(rand::random::<u32>());
        }
        padding.put_u8(len as u8);

        buf.take(padding);

        Ok(())
    }
}

/// Removes the padding block described by the trailing length byte.
pub struct TailPaddingDecoder;

impl Pass for TailPaddingDecoder {
    fn run(&self, buf: &mut IoVec) -> Result<()> {
        let len = buf.last_byte()?;

        buf.drop_last(1 + usize::from(len))
    }
}
