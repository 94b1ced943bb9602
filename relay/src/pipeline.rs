//! The wire pipeline both ends of a wrapped link agree on: HTTP framing
//! around a per-frame random codec.

use hopwire_core::{FramedPort, HttpProtocol, PairedPassBuilder, ProtocolWithPass, Result};
use hopwire_obfs::{
    ByteSwap, RandomDecoder, RandomEncoder, TailPaddingDecoder, TailPaddingEncoder,
};
use tokio::net::TcpStream;

type Shape = fn(PairedPassBuilder) -> PairedPassBuilder;

/// Variant shapes of the per-frame codec. Order and length are part of the
/// wire contract; a peer built with a different list cannot decode us.
const SHAPES: &[Shape] = &[pad_swap, pad_swap_pad, swap, swap_pad];

fn pad_swap(b: PairedPassBuilder) -> PairedPassBuilder {
    b.add_paired(TailPaddingEncoder, TailPaddingDecoder)
        .add_paired(ByteSwap, ByteSwap)
}

fn pad_swap_pad(b: PairedPassBuilder) -> PairedPassBuilder {
    b.add_paired(TailPaddingEncoder, TailPaddingDecoder)
        .add_paired(ByteSwap, ByteSwap)
        .add_paired(TailPaddingEncoder, TailPaddingDecoder)
}

fn swap(b: PairedPassBuilder) -> PairedPassBuilder {
    b.add_paired(ByteSwap, ByteSwap)
}

fn swap_pad(b: PairedPassBuilder) -> PairedPassBuilder {
    b.add_paired(ByteSwap, ByteSwap)
        .add_paired(TailPaddingEncoder, TailPaddingDecoder)
}

fn random_codec() -> Result<(RandomEncoder, RandomDecoder)> {
    let mut encoders = Vec::with_capacity(SHAPES.len());
    let mut decoders = Vec::with_capacity(SHAPES.len());

    for shape in SHAPES {
        let (pack, unpack) = shape(PairedPassBuilder::new()).build();
        encoders.push(pack);
        decoders.push(unpack);
    }

    Ok((RandomEncoder::new(encoders)?, RandomDecoder::new(decoders)?))
}

/// Builds the port used between peer relays.
pub fn wrap_port(stream: TcpStream) -> Result<FramedPort> {
    let (encoder, decoder) = random_codec()?;

    FramedPort::new(stream, ProtocolWithPass::new(HttpProtocol, encoder, decoder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopwire_core::{IoVec, Pass};

    #[test]
    fn codec_inverts_for_every_variant_in_the_production_list() {
        let (encoder, decoder) = random_codec().unwrap();

        for i in 0..256 {
            let payload: Vec<u8> = (0..64 + i).map(|_| rand::random()).collect();

            let mut buf = IoVec::new();
            buf.take(payload.clone());

            encoder.run(&mut buf).unwrap();
            decoder.run(&mut buf).unwrap();

            assert_eq!(buf.consume(), payload, "iteration {i}");
        }
    }
}
