//! Status line and header parsing for the client side.

use bytes::{Buf, BytesMut};
use http::{Response, StatusCode, Version};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::{Framing, MAX_HEADER_BYTES, MAX_HEADER_NUM};
use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, ResponseHead};

/// Decodes a [`ResponseHead`] together with the [`PayloadSize`] of the body that follows.
///
/// Interim `1xx` responses (other than `101`) are consumed and skipped. The body framing
/// depends on the request too: a response to `HEAD` never has a body, which the caller
/// announces through [`ResponseHeadDecoder::set_head_request`].
#[derive(Debug, Default)]
pub struct ResponseHeadDecoder {
    head_request: bool,
}

impl ResponseHeadDecoder {
    pub fn set_head_request(&mut self, head_request: bool) {
        self.head_request = head_request;
    }

    fn payload_size(&self, head: &ResponseHead) -> Result<PayloadSize, ParseError> {
        let status = head.status();
        if status == StatusCode::SWITCHING_PROTOCOLS {
            // the connection now speaks another protocol
            return Ok(PayloadSize::UntilClose);
        }
        if self.head_request || status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
        {
            return Ok(PayloadSize::Empty);
        }

        Ok(Framing::from_headers(head.headers())?.response_payload())
    }
}

impl Decoder for ResponseHeadDecoder {
    type Item = (ResponseHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some((head, head_len)) = parse_head(src)? else {
                return Ok(None);
            };
            src.advance(head_len);

            if head.status().is_informational() && head.status() != StatusCode::SWITCHING_PROTOCOLS {
                trace!(status = head.status().as_u16(), "skip interim response");
                continue;
            }

            let payload_size = self.payload_size(&head)?;
            return Ok(Some((head, payload_size)));
        }
    }
}

fn parse_head(src: &BytesMut) -> Result<Option<(ResponseHead, usize)>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let mut res = httparse::Response::new(&mut headers);

    let head_len = match res.parse(&src[..]).map_err(|e| match e {
        httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        e => ParseError::invalid_header(e),
    })? {
        Status::Complete(head_len) => head_len,
        Status::Partial => {
            ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
            return Ok(None);
        }
    };
    trace!(head_len, "parsed response head");
    ensure!(head_len <= MAX_HEADER_BYTES, ParseError::too_large_header(head_len, MAX_HEADER_BYTES));

    let version = match res.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        v => return Err(ParseError::InvalidVersion(v)),
    };
    let status = res
        .code
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or(ParseError::InvalidStatus(res.code))?;

    let mut builder = Response::builder().status(status).version(version);
    for header in res.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    let head = builder.body(()).map_err(ParseError::invalid_header)?;

    Ok(Some((head, head_len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(decoder: &mut ResponseHeadDecoder, buffer: &mut BytesMut) -> (ResponseHead, PayloadSize) {
        decoder.decode(buffer).unwrap().unwrap()
    }

    #[test]
    fn content_length_response() {
        let mut buffer = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ntest"[..]);
        let (head, payload_size) = decode(&mut ResponseHeadDecoder::default(), &mut buffer);

        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(head.version(), Version::HTTP_11);
        assert_eq!(payload_size, PayloadSize::Length(4));
        assert_eq!(&buffer[..], b"test");
    }

    #[test]
    fn missing_length_is_close_delimited() {
        let mut buffer = BytesMut::from(&b"HTTP/1.0 200 OK\r\nServer: old\r\n\r\nwhatever"[..]);
        let (head, payload_size) = decode(&mut ResponseHeadDecoder::default(), &mut buffer);

        assert_eq!(head.version(), Version::HTTP_10);
        assert_eq!(payload_size, PayloadSize::UntilClose);
    }

    #[test]
    fn bodiless_responses() {
        let mut buffer = BytesMut::from(&b"HTTP/1.1 204 No Content\r\n\r\n"[..]);
        assert_eq!(decode(&mut ResponseHeadDecoder::default(), &mut buffer).1, PayloadSize::Empty);

        let mut buffer = BytesMut::from(&b"HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\n\r\n"[..]);
        assert_eq!(decode(&mut ResponseHeadDecoder::default(), &mut buffer).1, PayloadSize::Empty);

        let mut decoder = ResponseHeadDecoder::default();
        decoder.set_head_request(true);
        let mut buffer = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n"[..]);
        assert_eq!(decode(&mut decoder, &mut buffer).1, PayloadSize::Empty);
    }

    #[test]
    fn interim_responses_are_skipped() {
        let mut buffer =
            BytesMut::from(&b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n"[..]);
        let (head, payload_size) = decode(&mut ResponseHeadDecoder::default(), &mut buffer);

        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(payload_size, PayloadSize::Chunked);
        assert_eq!(&buffer[..], b"0\r\n\r\n");
    }

    #[test]
    fn partial_and_invalid_heads() {
        let mut buffer = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-"[..]);
        assert!(ResponseHeadDecoder::default().decode(&mut buffer).unwrap().is_none());

        let mut buffer = BytesMut::from(&b"HTTP/2.0 200 OK\r\n\r\n"[..]);
        assert!(ResponseHeadDecoder::default().decode(&mut buffer).is_err());

        let mut buffer = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: abc\r\n\r\n"[..]);
        assert!(matches!(
            ResponseHeadDecoder::default().decode(&mut buffer),
            Err(ParseError::InvalidContentLength { .. })
        ));
    }
}
