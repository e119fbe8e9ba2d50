//! Serializes request and response heads.
//!
//! The framing headers (`Content-Length` / `Transfer-Encoding`) are always derived from
//! the body's [`PayloadSize`], replacing whatever the caller set, so the peer reads
//! exactly as many body bytes as will be written.

use crate::protocol::{PayloadSize, RequestHeader, ResponseHead, SendError};

use bytes::{BufMut, BytesMut};

use http::{HeaderMap, HeaderValue, Version, header};
use std::io::Write;
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size reserved for a head
const INIT_HEADER_SIZE: usize = 4 * 1024;

const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");

#[derive(Debug, Default)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        let headers = head.headers_mut();
        match payload_size {
            PayloadSize::Length(n) => set_content_length(headers, n),
            PayloadSize::Chunked => set_chunked(headers),
            PayloadSize::Empty => set_content_length(headers, 0),
            PayloadSize::UntilClose => return Err(SendError::invalid_body("a response body is always framed")),
        }

        dst.reserve(INIT_HEADER_SIZE);
        match head.version() {
            Version::HTTP_11 => {
                let status = head.status();
                write!((&mut *dst).writer(), "HTTP/1.1 {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))?;
            }
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(SendError::UnsupportedVersion(v));
            }
        }

        write_headers(head.headers(), dst);
        Ok(())
    }
}

impl Encoder<(RequestHeader, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (RequestHeader, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        if header.version() != Version::HTTP_11 {
            error!(http_version = ?header.version(), "unsupported http version");
            return Err(SendError::UnsupportedVersion(header.version()));
        }

        let headers = header.headers_mut();
        match payload_size {
            PayloadSize::Length(n) => set_content_length(headers, n),
            PayloadSize::Chunked => set_chunked(headers),
            PayloadSize::Empty => {
                headers.remove(header::CONTENT_LENGTH);
                headers.remove(header::TRANSFER_ENCODING);
            }
            PayloadSize::UntilClose => return Err(SendError::invalid_body("a request body can't be close delimited")),
        }

        let target = header.uri().path_and_query().map_or("/", |path| path.as_str());
        dst.reserve(INIT_HEADER_SIZE);
        write!((&mut *dst).writer(), "{} {} HTTP/1.1\r\n", header.method(), target)?;

        write_headers(header.headers(), dst);
        Ok(())
    }
}

fn set_content_length(headers: &mut HeaderMap, length: u64) {
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
}

fn set_chunked(headers: &mut HeaderMap) {
    headers.remove(header::CONTENT_LENGTH);
    headers.insert(header::TRANSFER_ENCODING, CHUNKED);
}

fn write_headers(headers: &HeaderMap, dst: &mut BytesMut) {
    for (name, value) in headers {
        dst.put_slice(name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(value.as_ref());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, Response, StatusCode};

    fn encode_request(request: Request<()>, payload_size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((RequestHeader::from(request), payload_size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn request_with_fixed_body() {
        let request = Request::post("http://127.0.0.1:3003/hello?x=1").header(header::HOST, "127.0.0.1:3003").body(()).unwrap();

        assert_eq!(
            encode_request(request, PayloadSize::Length(4)),
            "POST /hello?x=1 HTTP/1.1\r\nhost: 127.0.0.1:3003\r\ncontent-length: 4\r\n\r\n"
        );
    }

    #[test]
    fn request_framing_replaces_caller_headers() {
        let request = Request::post("/hello").header(header::CONTENT_LENGTH, "99").body(()).unwrap();
        assert_eq!(encode_request(request, PayloadSize::Chunked), "POST /hello HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n");

        let request = Request::post("/hello").body(()).unwrap();
        assert_eq!(encode_request(request, PayloadSize::Length(0)), "POST /hello HTTP/1.1\r\ncontent-length: 0\r\n\r\n");

        let request = Request::get("/").body(()).unwrap();
        assert_eq!(encode_request(request, PayloadSize::Empty), "GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn response_head() {
        let head = Response::builder().status(StatusCode::OK).header(header::CONNECTION, "close").body(()).unwrap();
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, PayloadSize::Empty), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn close_delimited_response_is_refused() {
        let mut dst = BytesMut::new();
        let result = HeaderEncoder.encode((Response::new(()), PayloadSize::UntilClose), &mut dst);
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
        assert!(dst.is_empty());
    }

    #[test]
    fn http10_request_is_refused() {
        let request = Request::get("/").version(Version::HTTP_10).body(()).unwrap();
        let mut dst = BytesMut::new();
        let result = HeaderEncoder.encode((RequestHeader::from(request), PayloadSize::Empty), &mut dst);
        assert!(matches!(result, Err(SendError::UnsupportedVersion(_))));
    }
}
