use hopwire_core::{IoVec, Pass, Result};

/// Swaps every adjacent byte pair in place; a trailing odd byte stays put.
///
/// The transform is its own inverse, so the same pass serves both the pack
/// and unpack pipelines.
pub struct ByteSwap;

impl Pass for ByteSwap {
    fn run(&self, buf: &mut IoVec) -> Result<()> {
        let mut bytes = buf.consume();

        for pair in bytes.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }

        buf.take(bytes);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_strategy::proptest]
    fn double_swap_is_the_identity(payload: Vec<u8>) {
        let mut buf = IoVec::new();
        buf.take(payload.clone());

        ByteSwap.run(&mut buf).unwrap();
        ByteSwap.run(&mut buf).unwrap();

        assert_eq!(buf.consume(), payload);
    }

    #[test]
    fn swap_exchanges_adjacent_pairs() {
        let mut buf = IoVec::new();
        buf.take(&b"abcde"[..]);

        ByteSwap.run(&mut buf).unwrap();

        assert_eq!(buf.consume(), &b"badce"[..]);
    }

    #[test]
    fn swap_sees_the_whole_logical_sequence() {
        let mut buf = IoVec::new();
        buf.take(&b"abc"[..]);
        buf.take(&b"def"[..]);

        ByteSwap.run(&mut buf).unwrap();

        assert_eq!(buf.consume(), &b"badcfe"[..]);
    }
}
