//! Message head parsing and serialization.
//!
//! - [`RequestHeadDecoder`]: request line and headers, server side
//! - [`ResponseHeadDecoder`]: status line and headers, client side
//! - [`HeaderEncoder`]: serializes either head, writing the framing headers that match
//!   the body's [`PayloadSize`]
//!
//! Both decoders also work out how the body that follows is framed, following
//! [RFC 9112 Section 6](https://www.rfc-editor.org/rfc/rfc9112#section-6).

mod header_encoder;
mod request_head_decoder;
mod response_head_decoder;

pub use header_encoder::HeaderEncoder;
pub use request_head_decoder::RequestHeadDecoder;
pub use response_head_decoder::ResponseHeadDecoder;

use http::{HeaderMap, header};

use crate::protocol::{ParseError, PayloadSize};

/// Maximum number of headers allowed in a message head
pub(crate) const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes of a message head
pub(crate) const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Body framing announced by a message's headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    /// Neither `Content-Length` nor `Transfer-Encoding`
    Unspecified,
    Length(u64),
    Chunked,
    /// A transfer coding that does not end in `chunked`
    OtherEncoding,
}

impl Framing {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Result<Self, ParseError> {
        let has_te = headers.contains_key(header::TRANSFER_ENCODING);
        let has_cl = headers.contains_key(header::CONTENT_LENGTH);

        match (has_te, has_cl) {
            (false, false) => Ok(Framing::Unspecified),
            (true, false) => {
                // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-transfer-encoding
                let last = headers
                    .get_all(header::TRANSFER_ENCODING)
                    .iter()
                    .next_back()
                    .and_then(|value| value.as_bytes().rsplit(|b| *b == b',').next())
                    .map(<[u8]>::trim_ascii);

                match last {
                    Some(coding) if coding.eq_ignore_ascii_case(b"chunked") => Ok(Framing::Chunked),
                    _ => Ok(Framing::OtherEncoding),
                }
            }
            (false, true) => content_length(headers).map(Framing::Length),
            (true, true) => Err(ParseError::invalid_content_length("transfer-encoding and content-length both present")),
        }
    }

    /// The payload size of a request body with this framing.
    pub(crate) fn request_payload(self) -> Result<PayloadSize, ParseError> {
        match self {
            Framing::Unspecified => Ok(PayloadSize::Empty),
            Framing::Length(length) => Ok(PayloadSize::Length(length)),
            Framing::Chunked => Ok(PayloadSize::Chunked),
            Framing::OtherEncoding => Err(ParseError::invalid_body("request transfer-encoding must end with chunked")),
        }
    }

    /// The payload size of a response body with this framing; without a length or
    /// chunked coding the body runs until the server closes.
    pub(crate) fn response_payload(self) -> PayloadSize {
        match self {
            Framing::Length(length) => PayloadSize::Length(length),
            Framing::Chunked => PayloadSize::Chunked,
            Framing::Unspecified | Framing::OtherEncoding => PayloadSize::UntilClose,
        }
    }
}

/// Every `Content-Length` value must parse and agree.
fn content_length(headers: &HeaderMap) -> Result<u64, ParseError> {
    let mut length = None;
    for value in headers.get_all(header::CONTENT_LENGTH) {
        let value = value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
        for part in value.split(',') {
            let part = part.trim();
            let parsed = part.parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {part} is not u64")))?;
            match length {
                Some(existing) if existing != parsed => {
                    return Err(ParseError::invalid_content_length("conflicting content-length values"));
                }
                _ => length = Some(parsed),
            }
        }
    }
    length.ok_or_else(|| ParseError::invalid_content_length("empty value"))
}
