use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{FutureExt, SinkExt, StreamExt};
use http::Method;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace};

use crate::client::{BodySource, ClientError, Decision, Exchange, Origin};
use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseHead, response_wants_close};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Ids are unique across every pool in the process, so a connection released to a
    /// pool that didn't hand it out is never mistaken for one of its own.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type RequestMessage = Message<(RequestHeader, PayloadSize), Bytes>;

/// A client-side TCP connection to one origin.
///
/// Owned either by the pool (idle) or by exactly one in-flight exchange. The codecs keep
/// the framing state, so after a fully drained exchange both directions sit at a message
/// boundary and the next request can be written straight away.
pub struct Connection {
    id: ConnectionId,
    origin: Origin,
    framed_read: FramedRead<OwnedReadHalf, ResponseDecoder>,
    framed_write: FramedWrite<OwnedWriteHalf, RequestEncoder>,
    exchanges: u64,
    last_decision: Option<Decision>,
}

impl Connection {
    pub(crate) async fn connect(id: ConnectionId, origin: Origin) -> Result<Self, ClientError> {
        if origin.scheme() != &http::uri::Scheme::HTTP {
            return Err(ClientError::DialFailed {
                origin,
                source: std::io::Error::new(std::io::ErrorKind::Unsupported, "only plain http origins can be dialed"),
            });
        }

        let stream = match TcpStream::connect(origin.socket_target()).await {
            Ok(stream) => stream,
            Err(source) => return Err(ClientError::DialFailed { origin, source }),
        };
        stream.set_nodelay(true).map_err(|source| ClientError::DialFailed { origin: origin.clone(), source })?;

        debug!(conn = %id, %origin, "dialed new connection");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            id,
            origin,
            framed_read: FramedRead::with_capacity(reader, ResponseDecoder::new(), 8 * 1024),
            framed_write: FramedWrite::new(writer, RequestEncoder::new()),
            exchanges: 0,
            last_decision: None,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Number of exchanges that ran over this connection.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    pub fn last_decision(&self) -> Option<Decision> {
        self.last_decision
    }

    pub(crate) fn record_decision(&mut self, decision: Decision) {
        self.last_decision = Some(decision);
    }

    /// Whether neither direction is in the middle of a message.
    pub(crate) fn is_between_messages(&self) -> bool {
        self.framed_read.decoder().is_idle() && self.framed_write.encoder().is_idle()
    }

    /// Checks an idle connection without blocking.
    ///
    /// An idle HTTP/1.1 connection has nothing to read: EOF means the peer closed it, and
    /// any byte means the peer sent something unsolicited. Either way it can't be reused.
    pub(crate) fn is_open(&mut self) -> bool {
        if !self.framed_read.read_buffer().is_empty() {
            return false;
        }

        let mut byte = [0u8; 1];
        self.framed_read.get_mut().peek(&mut byte).now_or_never().is_none()
    }

    /// Writes the request head and streams the whole body.
    ///
    /// Bytes actually written are tracked in `exchange`. A body producing more or fewer
    /// bytes than its declared length aborts with [`ClientError::BodyLengthMismatch`]
    /// before anything past the declared length reaches the wire.
    pub(crate) async fn send_request(
        &mut self,
        header: RequestHeader,
        payload_size: PayloadSize,
        body: BodySource,
        exchange: &mut Exchange,
    ) -> Result<(), ClientError> {
        self.exchanges += 1;
        self.framed_read.decoder_mut().set_head_request(header.method() == Method::HEAD);

        trace!(conn = %self.id, method = %header.method(), uri = %header.uri(), ?payload_size, "writing request head");
        self.framed_write.feed(RequestMessage::Header((header, payload_size))).await?;

        let mut stream = body.into_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(ClientError::body_source)?;
            exchange.bytes_sent += chunk.len() as u64;

            if let Some(declared) = exchange.request_declared {
                if exchange.bytes_sent > declared {
                    return Err(ClientError::BodyLengthMismatch { declared, actual: exchange.bytes_sent });
                }
            }

            if !chunk.is_empty() {
                self.framed_write.feed(RequestMessage::Payload(PayloadItem::Chunk(chunk))).await?;
            }
        }

        if let Some(declared) = exchange.request_declared {
            if exchange.bytes_sent != declared {
                return Err(ClientError::BodyLengthMismatch { declared, actual: exchange.bytes_sent });
            }
        }

        self.framed_write.send(RequestMessage::Payload(PayloadItem::Eof)).await?;
        Ok(())
    }

    /// Reads the next final response head and records its framing in `exchange`.
    pub(crate) async fn read_response_head(&mut self, exchange: &mut Exchange) -> Result<ResponseHead, ClientError> {
        match self.framed_read.next().await {
            Some(Ok(Message::Header((head, payload_size)))) => {
                trace!(conn = %self.id, status = %head.status(), ?payload_size, "read response head");
                exchange.response_framing = Some(payload_size);
                exchange.server_close = response_wants_close(&head);
                Ok(head)
            }
            Some(Ok(Message::Payload(_))) => Err(ParseError::invalid_body("payload before response head").into()),
            Some(Err(e)) => Err(e.into()),
            None => Err(ParseError::UnexpectedEof.into()),
        }
    }

    /// Polls the next item of the response body currently being read.
    pub(crate) fn poll_payload(&mut self, cx: &mut Context<'_>) -> Poll<Result<PayloadItem, ParseError>> {
        match self.framed_read.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(Message::Payload(item)))) => Poll::Ready(Ok(item)),
            Poll::Ready(Some(Ok(Message::Header(_)))) => {
                Poll::Ready(Err(ParseError::invalid_body("response head while reading a body")))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Err(e)),
            Poll::Ready(None) => Poll::Ready(Err(ParseError::UnexpectedEof)),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("exchanges", &self.exchanges)
            .field("last_decision", &self.last_decision)
            .finish_non_exhaustive()
    }
}
