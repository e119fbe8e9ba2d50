use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

/// Writes a `Content-Length` framed body, refusing to write past the declared length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    declared: u64,
    remaining: u64,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { declared: length, remaining: length }
    }

    pub fn is_finish(&self) -> bool {
        self.remaining == 0
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(mut bytes) => {
                let len = bytes.remaining() as u64;
                if len > self.remaining {
                    return Err(SendError::LengthExceeded { declared: self.declared });
                }

                dst.reserve(bytes.remaining());
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let n = chunk.len();
                    dst.extend_from_slice(chunk);
                    bytes.advance(n);
                }
                self.remaining -= len;
                Ok(())
            }
            PayloadItem::Eof if self.remaining == 0 => Ok(()),
            PayloadItem::Eof => {
                Err(SendError::invalid_body(format!("body ended {} bytes short of its declared length", self.remaining)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn writes_exact_length() {
        let mut encoder = LengthEncoder::new(4);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"te")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"st")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert!(encoder.is_finish());
        assert_eq!(&dst[..], b"test");
    }

    #[test]
    fn refuses_overflow_and_short_bodies() {
        let mut dst = BytesMut::new();

        let mut encoder = LengthEncoder::new(2);
        let result = encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"test")), &mut dst);
        assert!(matches!(result, Err(SendError::LengthExceeded { declared: 2 })));
        assert!(dst.is_empty());

        let mut encoder = LengthEncoder::new(4);
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"te")), &mut dst).unwrap();
        assert!(encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).is_err());
    }
}
