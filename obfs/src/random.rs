use hopwire_core::{Error, IoVec, Pass, PassManager, Result};

/// Highest number of variants a single trailing tag byte can describe.
const MAX_VARIANTS: usize = 256;

fn check_variant_count(count: usize) -> Result<()> {
    if count == 0 {
        return Err(Error::transform("codec needs at least one variant"));
    }
    if count > MAX_VARIANTS {
        return Err(Error::transform(format!(
            "{count} variants cannot be addressed by a one-byte tag"
        )));
    }

    Ok(())
}

/// Runs one randomly selected variant pipeline per frame and appends a tag
/// byte naming the choice.
///
/// The decoder recovers the variant as `tag % variants.len()`, so both sides
/// must register the paired pipelines in the same order; the list order is
/// part of the wire contract.
pub struct RandomEncoder {
    variants: Vec<PassManager>,
}

impl RandomEncoder {
    pub fn new(variants: Vec<PassManager>) -> Result<Self> {
        check_variant_count(variants.len())?;

        Ok(Self { variants })
    }
}

impl Pass for RandomEncoder {
    fn run(&self, buf: &mut IoVec) -> Result<()> {
        let tag = (rand::random::<u32>() & 0xFF) as u8;

        self.variants[usize::from(tag) % self.variants.len()].run(buf)?;
        buf.take(vec![tag]);

        Ok(())
    }
}

/// Reads the trailing tag byte and runs the named inverse pipeline.
pub struct RandomDecoder {
    variants: Vec<PassManager>,
}

impl RandomDecoder {
    pub fn new(variants: Vec<PassManager>) -> Result<Self> {
        check_variant_count(variants.len())?;

        Ok(Self { variants })
    }
}

impl Pass for RandomDecoder {
    fn run(&self, buf: &mut IoVec) -> Result<()> {
        let tag = buf.last_byte()?;
        buf.drop_last(1)?;

        self.variants[usize::from(tag) % self.variants.len()].run(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ByteSwap, TailPaddingDecoder, TailPaddingEncoder};
    use hopwire_core::PairedPassBuilder;

    type Shape = fn(PairedPassBuilder) -> PairedPassBuilder;

    /// Builds paired encoder/decoder pipelines for each listed shape.
    fn paired_codec(shapes: &[Shape]) -> (RandomEncoder, RandomDecoder) {
        let mut encoders = Vec::new();
        let mut decoders = Vec::new();

        for shape in shapes {
            let (pack, unpack) = shape(PairedPassBuilder::new()).build();
            encoders.push(pack);
            decoders.push(unpack);
        }

        (
            RandomEncoder::new(encoders).unwrap(),
            RandomDecoder::new(decoders).unwrap(),
        )
    }

    fn pad_then_swap(b: PairedPassBuilder) -> PairedPassBuilder {
        b.add_paired(TailPaddingEncoder, TailPaddingDecoder)
            .add_paired(ByteSwap, ByteSwap)
    }

    fn swap_then_pad(b: PairedPassBuilder) -> PairedPassBuilder {
        b.add_paired(ByteSwap, ByteSwap)
            .add_paired(TailPaddingEncoder, TailPaddingDecoder)
    }

    fn pad_only(b: PairedPassBuilder) -> PairedPassBuilder {
        b.add_paired(TailPaddingEncoder, TailPaddingDecoder)
    }

    fn pad_swap_pad(b: PairedPassBuilder) -> PairedPassBuilder {
        b.add_paired(TailPaddingEncoder, TailPaddingDecoder)
            .add_paired(ByteSwap, ByteSwap)
            .add_paired(TailPaddingEncoder, TailPaddingDecoder)
    }

    #[test]
    fn construction_rejects_an_empty_variant_list() {
        assert!(RandomEncoder::new(Vec::new()).is_err());
        assert!(RandomDecoder::new(Vec::new()).is_err());
    }

    #[test]
    fn construction_rejects_more_variants_than_a_tag_can_name() {
        let variants: Vec<PassManager> = (0..257).map(|_| PassManager::new()).collect();

        assert!(RandomEncoder::new(variants).is_err());
    }

    #[test_strategy::proptest]
    fn codec_roundtrips_with_two_variants(payload: Vec<u8>) {
        let (encoder, decoder) = paired_codec(&[pad_then_swap, swap_then_pad]);

        let mut buf = IoVec::new();
        buf.take(payload.clone());

        encoder.run(&mut buf).unwrap();
        decoder.run(&mut buf).unwrap();

        assert_eq!(buf.consume(), payload);
    }

    /// Every variant gets picked over enough iterations; all of them must
    /// invert cleanly against the mirrored decoder list.
    #[test]
    fn codec_roundtrips_across_the_full_variant_list() {
        let (encoder, decoder) =
            paired_codec(&[pad_then_swap, swap_then_pad, pad_only, pad_swap_pad]);

        for i in 0..1000 {
            let payload: Vec<u8> = (0..(i % 64) + 24).map(|_| rand::random()).collect();

            let mut buf = IoVec::new();
            buf.take(payload.clone());

            encoder.run(&mut buf).unwrap();
            decoder.run(&mut buf).unwrap();

            assert_eq!(buf.consume(), payload, "iteration {i}");
        }
    }

    #[test]
    fn decoding_an_empty_buffer_fails() {
        let (_, decoder) = paired_codec(&[pad_only]);

        assert!(decoder.run(&mut IoVec::new()).is_err());
    }
}
