//! Picks the body decoding strategy from a message's [`PayloadSize`].

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    NoBody,
    /// Everything until the peer closes; `finished` once EOF was seen
    UntilClose { finished: bool },
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose { finished: false } }
    }

    /// Whether the whole payload has been consumed.
    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(decoder) => decoder.is_finish(),
            Kind::Chunked(decoder) => decoder.is_finish(),
            Kind::NoBody => true,
            Kind::UntilClose { finished } => *finished,
        }
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(size) => PayloadDecoder::fix_length(size),
            PayloadSize::Chunked => PayloadDecoder::chunked(),
            PayloadSize::Empty => PayloadDecoder::empty(),
            PayloadSize::UntilClose => PayloadDecoder::until_close(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
            Kind::UntilClose { .. } => {
                if src.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(PayloadItem::Chunk(src.split().freeze())))
                }
            }
        }
    }

    /// Called once the transport reached EOF: only a close-delimited payload may end here.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        match &mut self.kind {
            Kind::UntilClose { finished } => {
                *finished = true;
                Ok(Some(PayloadItem::Eof))
            }
            _ => Err(ParseError::UnexpectedEof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_delimited_ends_only_at_eof() {
        let mut decoder = PayloadDecoder::from(PayloadSize::UntilClose);
        let mut buffer = BytesMut::from(&b"hello"[..]);

        assert_eq!(decoder.decode(&mut buffer).unwrap().unwrap().as_bytes().unwrap().as_ref(), b"hello");
        assert!(decoder.decode(&mut buffer).unwrap().is_none());
        assert!(!decoder.is_finish());

        assert!(decoder.decode_eof(&mut buffer).unwrap().unwrap().is_eof());
        assert!(decoder.is_finish());
    }

    #[test]
    fn truncated_length_is_an_error_at_eof() {
        let mut decoder = PayloadDecoder::fix_length(10);
        let mut buffer = BytesMut::from(&b"hello"[..]);

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_chunk());
        assert!(matches!(decoder.decode_eof(&mut buffer), Err(ParseError::UnexpectedEof)));
    }

    #[test]
    fn no_body_is_finished() {
        let mut decoder = PayloadDecoder::from(PayloadSize::Empty);
        assert!(decoder.is_finish());
        assert!(decoder.decode(&mut BytesMut::new()).unwrap().unwrap().is_eof());
    }
}
