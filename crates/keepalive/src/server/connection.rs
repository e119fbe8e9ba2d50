use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http::header::CONNECTION;
use http::{HeaderValue, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, info, trace};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseHead, SendError};
use crate::server::{EchoConfig, ServerStats};

type ResponseMessage = Message<(ResponseHead, PayloadSize), Bytes>;

/// Where a server connection is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingRequestLine,
    ReadingHeaders,
    DrainingBody,
    Responding,
    Idle,
    Closed,
}

/// Serves the requests of one connection, one after another.
///
/// Every request body is read to its end before the first byte of the response is
/// written, so the next request on the connection starts at a clean message boundary.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct EchoConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    phase: Phase,
    config: Arc<EchoConfig>,
    stats: ServerStats,
}

impl<R, W> EchoConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, config: Arc<EchoConfig>, stats: ServerStats) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), 8 * 1024),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            phase: Phase::AwaitingRequestLine,
            config,
            stats,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub async fn process(mut self) -> Result<(), HttpError> {
        loop {
            let waiting = if self.framed_read.read_buffer().is_empty() {
                Phase::AwaitingRequestLine
            } else {
                Phase::ReadingHeaders
            };
            self.enter(waiting);

            match self.framed_read.next().await {
                Some(Ok(Message::Header((header, _payload_size)))) => {
                    if self.serve(header).await? {
                        self.close().await?;
                        return Ok(());
                    }
                    self.enter(Phase::Idle);
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("receive request body while expecting a request head");
                    self.reject(StatusCode::BAD_REQUEST).await?;
                    return Err(ParseError::invalid_body("need header while receive body").into());
                }

                Some(Err(e)) => {
                    error!(cause = %e, "can't receive next request");
                    self.reject(StatusCode::BAD_REQUEST).await?;
                    return Err(e.into());
                }

                None => {
                    self.enter(Phase::Closed);
                    info!("cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }

    /// Drains and answers one request. Returns whether the connection must close afterwards.
    async fn serve(&mut self, header: RequestHeader) -> Result<bool, HttpError> {
        if header.expects_continue() {
            let writer = self.framed_write.get_mut();
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
            writer.flush().await.map_err(SendError::io)?;
            info!("receive expect request header, sent continue response");
        }

        self.enter(Phase::DrainingBody);
        let (body, drained) = match self.drain_body().await {
            Ok(drained) => drained,
            Err(e) => {
                error!(cause = %e, "failed to drain request body");
                self.reject(StatusCode::BAD_REQUEST).await?;
                return Err(e.into());
            }
        };
        self.stats.record_request();
        info!(method = %header.method(), path = header.uri().path(), body_size = drained, "request body drained");

        if let Some(delay) = self.config.response_delay {
            tokio::time::sleep(delay).await;
        }

        self.enter(Phase::Responding);
        let close = !self.config.keep_alive || header.wants_close();
        self.respond(StatusCode::OK, body, close).await?;
        Ok(close)
    }

    /// Reads the current request body through its end, keeping it only when it is echoed.
    async fn drain_body(&mut self) -> Result<(Bytes, u64), ParseError> {
        let mut body = BytesMut::new();
        let mut drained = 0u64;
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    trace!(size = bytes.len(), "read request body chunk");
                    drained += bytes.len() as u64;
                    if self.config.echo_body {
                        body.extend_from_slice(&bytes);
                    }
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => return Ok((body.freeze(), drained)),
                Some(Ok(Message::Header(_))) => return Err(ParseError::invalid_body("request head while draining a body")),
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::UnexpectedEof),
            }
        }
    }

    async fn respond(&mut self, status: StatusCode, body: Bytes, close: bool) -> Result<(), SendError> {
        let mut head = ResponseHead::new(());
        *head.status_mut() = status;
        if close {
            head.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
        }

        let payload_size = PayloadSize::Length(body.len() as u64);
        self.framed_write.feed(ResponseMessage::Header((head, payload_size))).await?;
        if !body.is_empty() {
            self.framed_write.feed(ResponseMessage::Payload(PayloadItem::Chunk(body))).await?;
        }
        // flush the whole response in one go
        self.framed_write.send(ResponseMessage::Payload(PayloadItem::Eof)).await
    }

    /// Answers with an empty error response and closes the connection.
    async fn reject(&mut self, status: StatusCode) -> Result<(), HttpError> {
        self.enter(Phase::Responding);
        self.respond(status, Bytes::new(), true).await?;
        self.close().await
    }

    async fn close(&mut self) -> Result<(), HttpError> {
        self.enter(Phase::Closed);
        self.framed_write.get_mut().shutdown().await.map_err(SendError::io)?;
        Ok(())
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            trace!(from = ?self.phase, to = ?phase, "connection phase");
            self.phase = phase;
        }
    }
}

impl<R, W> std::fmt::Debug for EchoConnection<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoConnection").field("phase", &self.phase).field("config", &self.config).finish_non_exhaustive()
    }
}
