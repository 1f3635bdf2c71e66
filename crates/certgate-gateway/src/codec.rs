//! Opaque byte codecs for forwarding RPCs without knowing their schemas.
//!
//! The RPC runtime treats the byte buffer as any other message for
//! marshalling purposes, so frames cross the gateway untouched.

use std::marker::PhantomData;

use bytes::{Buf, BufMut, Bytes};
use prost::Message;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

/// Passes wire bytes through untouched in both directions.
#[derive(Debug, Clone, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawEncoder;
    type Decoder = RawDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        RawEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawDecoder
    }
}

#[derive(Debug, Clone)]
pub struct RawEncoder;

impl Encoder for RawEncoder {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Bytes, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put(item);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RawDecoder;

impl Decoder for RawDecoder {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        // the runtime hands us exactly one length-delimited message
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}

/// Sends pre-serialized request bytes while decoding the response as a
/// typed message. Used to forward stored submissions byte-exact and still
/// read the upstream's answer.
#[derive(Debug)]
pub struct RawRequestCodec<T> {
    _marker: PhantomData<T>,
}

impl<T> Default for RawRequestCodec<T> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Codec for RawRequestCodec<T>
where
    T: Message + Default + Send + 'static,
{
    type Encode = Bytes;
    type Decode = T;
    type Encoder = RawEncoder;
    type Decoder = MessageDecoder<T>;

    fn encoder(&mut self) -> Self::Encoder {
        RawEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        MessageDecoder {
            _marker: PhantomData,
        }
    }
}

#[derive(Debug)]
pub struct MessageDecoder<T> {
    _marker: PhantomData<T>,
}

impl<T> Decoder for MessageDecoder<T>
where
    T: Message + Default + Send + 'static,
{
    type Item = T;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let buf = src.copy_to_bytes(src.remaining());
        let item = T::decode(buf).map_err(|e| Status::internal(e.to_string()))?;
        Ok(Some(item))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use certgate_proto::node_v1::SubmitCertificateRequest;
    use certgate_proto::types_v1::Certificate;

    #[test]
    fn message_decoder_round_trips_typed_messages() {
        let request = SubmitCertificateRequest {
            certificate: Some(Certificate {
                network_id: 5,
                height: 9,
                ..Default::default()
            }),
        };
        let encoded = request.encode_to_vec();

        let decoded = SubmitCertificateRequest::decode(encoded.as_slice()).unwrap();
        assert_eq!(decoded, request);
    }
}
