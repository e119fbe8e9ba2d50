//! Request line and header parsing on top of `httparse`.

use bytes::{Buf, BytesMut};
use http::{Request, Version};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::{Framing, MAX_HEADER_BYTES, MAX_HEADER_NUM};
use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Decodes a [`RequestHeader`] together with the [`PayloadSize`] of the body that follows.
///
/// Only the head is consumed from the buffer; body bytes are left for the payload decoder.
#[derive(Debug, Default)]
pub struct RequestHeadDecoder;

impl Decoder for RequestHeadDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (header, head_len) = {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
            let mut req = httparse::Request::new(&mut headers);

            let head_len = match req.parse(&src[..]).map_err(|e| match e {
                httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
                e => ParseError::invalid_header(e),
            })? {
                Status::Complete(head_len) => head_len,
                Status::Partial => {
                    ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                    return Ok(None);
                }
            };
            trace!(head_len, "parsed request head");
            ensure!(head_len <= MAX_HEADER_BYTES, ParseError::too_large_header(head_len, MAX_HEADER_BYTES));

            let version = match req.version {
                Some(0) => Version::HTTP_10,
                Some(1) => Version::HTTP_11,
                v => return Err(ParseError::InvalidVersion(v)),
            };

            let mut builder = Request::builder()
                .method(req.method.ok_or(ParseError::InvalidMethod)?)
                .uri(req.path.ok_or(ParseError::InvalidUri)?)
                .version(version);
            for header in req.headers.iter() {
                builder = builder.header(header.name, header.value);
            }

            let request = builder.body(()).map_err(ParseError::invalid_header)?;
            (RequestHeader::from(request), head_len)
        };

        src.advance(head_len);

        let payload_size = Framing::from_headers(header.headers())?.request_payload()?;
        Ok(Some((header, payload_size)))
    }
}
