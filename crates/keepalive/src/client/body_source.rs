use std::fmt;
use std::io;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::protocol::PayloadSize;

/// A request body.
///
/// `Fixed` bodies announce their exact byte count. `Stream` bodies may announce a length;
/// when they do, the stream must produce exactly that many bytes or the request fails with
/// [`ClientError::BodyLengthMismatch`](crate::client::ClientError::BodyLengthMismatch).
/// Without a declared length the body is sent chunked.
pub enum BodySource {
    Fixed(Bytes),
    Stream { stream: BoxStream<'static, io::Result<Bytes>>, declared: Option<u64> },
}

impl BodySource {
    pub fn empty() -> Self {
        BodySource::Fixed(Bytes::new())
    }

    pub fn fixed(bytes: impl Into<Bytes>) -> Self {
        BodySource::Fixed(bytes.into())
    }

    pub fn stream<S>(stream: S, declared: Option<u64>) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        BodySource::Stream { stream: stream.boxed(), declared }
    }

    /// A body read from `reader` until it reports EOF.
    pub fn reader<R>(reader: R, declared: Option<u64>) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::stream(ReaderStream::new(reader), declared)
    }

    pub fn declared_length(&self) -> Option<u64> {
        match self {
            BodySource::Fixed(bytes) => Some(bytes.len() as u64),
            BodySource::Stream { declared, .. } => *declared,
        }
    }

    /// The framing this body is sent with. An empty fixed body on a method that takes no
    /// body is sent without any framing header; otherwise emptiness is `Content-Length: 0`.
    pub(crate) fn payload_size(&self, need_body: bool) -> PayloadSize {
        match self.declared_length() {
            Some(0) if !need_body && matches!(self, BodySource::Fixed(_)) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Chunked,
        }
    }

    pub(crate) fn into_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        match self {
            BodySource::Fixed(bytes) if bytes.is_empty() => stream::empty().boxed(),
            BodySource::Fixed(bytes) => stream::once(async move { Ok::<_, io::Error>(bytes) }).boxed(),
            BodySource::Stream { stream, .. } => stream,
        }
    }
}

impl Default for BodySource {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::Fixed(bytes) => f.debug_tuple("Fixed").field(&bytes.len()).finish(),
            BodySource::Stream { declared, .. } => f.debug_struct("Stream").field("declared", declared).finish_non_exhaustive(),
        }
    }
}

impl From<Bytes> for BodySource {
    fn from(bytes: Bytes) -> Self {
        BodySource::Fixed(bytes)
    }
}

impl From<Vec<u8>> for BodySource {
    fn from(bytes: Vec<u8>) -> Self {
        BodySource::Fixed(bytes.into())
    }
}

impl From<&'static [u8]> for BodySource {
    fn from(bytes: &'static [u8]) -> Self {
        BodySource::Fixed(Bytes::from_static(bytes))
    }
}

impl From<&'static str> for BodySource {
    fn from(str: &'static str) -> Self {
        BodySource::Fixed(Bytes::from_static(str.as_bytes()))
    }
}

impl From<String> for BodySource {
    fn from(str: String) -> Self {
        BodySource::Fixed(str.into())
    }
}
