//! Streaming message decoder shared by both ends of a connection.
//!
//! A [`MessageDecoder`] alternates between two phases:
//! 1. head parsing, delegated to a head decoder (request or response side)
//! 2. payload parsing, delegated to a [`PayloadDecoder`] built from the head's [`PayloadSize`]
//!
//! The payload phase ends with exactly one [`PayloadItem::Eof`], after which the decoder
//! is back to parsing the next head from whatever is left in the buffer.

use crate::codec::body::PayloadDecoder;
use crate::codec::header::{RequestHeadDecoder, ResponseHeadDecoder};
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Default)]
pub struct MessageDecoder<D> {
    head_decoder: D,
    payload_decoder: Option<PayloadDecoder>,
}

/// Server side: decodes requests.
pub type RequestDecoder = MessageDecoder<RequestHeadDecoder>;

/// Client side: decodes responses.
pub type ResponseDecoder = MessageDecoder<ResponseHeadDecoder>;

impl<D: Default> MessageDecoder<D> {
    pub fn new() -> Self {
        Self { head_decoder: D::default(), payload_decoder: None }
    }
}

impl<D> MessageDecoder<D> {
    /// Whether the decoder sits between messages, with no payload in progress.
    pub fn is_idle(&self) -> bool {
        self.payload_decoder.is_none()
    }
}

impl ResponseDecoder {
    /// Announces whether the next response answers a `HEAD` request.
    pub fn set_head_request(&mut self, head_request: bool) {
        self.head_decoder.set_head_request(head_request);
    }
}

impl<D, H> Decoder for MessageDecoder<D>
where
    D: Decoder<Item = (H, PayloadSize), Error = ParseError>,
{
    type Item = Message<(H, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            return Ok(self.on_payload(item));
        }

        let message = match self.head_decoder.decode(src)? {
            Some((head, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((head, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode_eof(src)?;
            return Ok(self.on_payload(item));
        }

        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::UnexpectedEof),
        }
    }
}

impl<D> MessageDecoder<D> {
    fn on_payload<H>(&mut self, item: Option<PayloadItem>) -> Option<Message<(H, PayloadSize)>> {
        if item.as_ref().is_some_and(PayloadItem::is_eof) {
            self.payload_decoder.take();
        }
        item.map(Message::Payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn two_pipelined_requests() {
        let mut buffer = BytesMut::from(
            &b"POST /hello HTTP/1.1\r\nContent-Length: 4\r\n\r\ntestPOST /hello HTTP/1.1\r\nContent-Length: 0\r\n\r\n"[..],
        );
        let mut decoder = RequestDecoder::new();

        for expected in [&b"test"[..], &b""[..]] {
            let Some(Message::Header((header, _))) = decoder.decode(&mut buffer).unwrap() else {
                panic!("expect request header");
            };
            assert_eq!(header.uri().path(), "/hello");

            let mut body = Vec::new();
            loop {
                match decoder.decode(&mut buffer).unwrap().unwrap() {
                    Message::Payload(PayloadItem::Chunk(bytes)) => body.extend_from_slice(&bytes),
                    Message::Payload(PayloadItem::Eof) => break,
                    Message::Header(_) => panic!("expect payload"),
                }
            }
            assert_eq!(body, expected);
            assert!(decoder.is_idle());
        }

        assert!(buffer.is_empty());
        assert!(decoder.decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn close_delimited_response_ends_at_eof() {
        let mut buffer = BytesMut::from(&b"HTTP/1.1 200 OK\r\n\r\nhello"[..]);
        let mut decoder = ResponseDecoder::new();

        let Some(Message::Header((head, payload_size))) = decoder.decode(&mut buffer).unwrap() else {
            panic!("expect response head");
        };
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(payload_size, PayloadSize::UntilClose);

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_payload());
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        let eof = decoder.decode_eof(&mut buffer).unwrap().unwrap().into_payload_item().unwrap();
        assert!(eof.is_eof());
        assert!(decoder.is_idle());
        assert!(decoder.decode_eof(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn truncated_head_at_eof() {
        let mut buffer = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-"[..]);
        let mut decoder = ResponseDecoder::new();
        assert!(matches!(decoder.decode_eof(&mut buffer), Err(ParseError::UnexpectedEof)));
    }
}
