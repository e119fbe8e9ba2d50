//! Streaming message encoder shared by both ends of a connection.

use std::marker::PhantomData;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, PayloadSize, RequestHeader, ResponseHead, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

/// Encodes a head followed by its payload items.
///
/// A head is refused while the previous message's payload is unfinished, and payload
/// items are refused before a head, so framing on the wire can't interleave.
#[derive(Debug)]
pub struct MessageEncoder<H> {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
    _head: PhantomData<fn(H)>,
}

/// Client side: encodes requests.
pub type RequestEncoder = MessageEncoder<RequestHeader>;

/// Server side: encodes responses.
pub type ResponseEncoder = MessageEncoder<ResponseHead>;

impl<H> MessageEncoder<H> {
    pub fn new() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None, _head: PhantomData }
    }

    /// Whether the last message was written completely.
    pub fn is_idle(&self) -> bool {
        self.payload_encoder.is_none()
    }
}

impl<H> Default for MessageEncoder<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, D> Encoder<Message<(H, PayloadSize), D>> for MessageEncoder<H>
where
    D: Buf,
    HeaderEncoder: Encoder<(H, PayloadSize), Error = SendError>,
{
    type Error = SendError;

    fn encode(&mut self, item: Message<(H, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive message head");
                    return Err(SendError::invalid_body("previous payload is unfinished"));
                }

                self.header_encoder.encode((head, payload_size), dst)?;
                self.payload_encoder = Some(payload_size.into());
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect message head but receive payload item");
                    return Err(SendError::invalid_body("payload without message head"));
                };

                let is_eof = payload_item.is_eof();
                payload_encoder.encode(payload_item, dst)?;

                if is_eof && payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::{Request, Response};

    #[test]
    fn chunked_request() {
        let mut encoder = RequestEncoder::new();
        let mut dst = BytesMut::new();
        let header = RequestHeader::from(Request::post("/hello").body(()).unwrap());

        encoder.encode(Message::<_, Bytes>::Header((header, PayloadSize::Chunked)), &mut dst).unwrap();
        encoder.encode(Message::<(RequestHeader, PayloadSize), _>::Payload(PayloadItem::Chunk(Bytes::from_static(b"test"))), &mut dst).unwrap();
        assert!(!encoder.is_idle());
        encoder.encode(Message::<(RequestHeader, PayloadSize), Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();
        assert!(encoder.is_idle());

        assert_eq!(&dst[..], b"POST /hello HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n4\r\ntest\r\n0\r\n\r\n");
    }

    #[test]
    fn payload_before_head_is_refused() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        let result = encoder.encode(Message::<(ResponseHead, PayloadSize), Bytes>::Payload(PayloadItem::Eof), &mut dst);
        assert!(result.is_err());
    }

    #[test]
    fn head_during_payload_is_refused() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        let head = || Response::new(());

        encoder.encode(Message::<_, Bytes>::Header((head(), PayloadSize::Length(4))), &mut dst).unwrap();
        assert!(encoder.encode(Message::<_, Bytes>::Header((head(), PayloadSize::Length(4))), &mut dst).is_err());
    }
}
