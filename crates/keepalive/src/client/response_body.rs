use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::task::noop_waker_ref;
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use tracing::{trace, warn};

use crate::client::pool::Checkout;
use crate::client::{ClientError, CloseReason, Decision, Exchange, ReuseDecider};
use crate::protocol::{ParseError, PayloadItem, PayloadSize};

/// The body of a response, streamed straight off its connection.
///
/// The connection goes back to the pool when the body has been read to its end. Dropping
/// the body before that closes the connection, because the unread remainder would be
/// taken for the next response. A body whose last bytes were read but whose end was not
/// polled yet still counts as read to its end.
pub struct ResponseBody {
    checkout: Option<Checkout>,
    exchange: Exchange,
    decision: Option<Decision>,
}

impl ResponseBody {
    pub(crate) fn new(checkout: Checkout, exchange: Exchange) -> Self {
        Self { checkout: Some(checkout), exchange, decision: None }
    }

    /// The exchange as observed so far.
    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    /// The reuse decision, once the connection has been handed back.
    pub fn decision(&self) -> Option<Decision> {
        self.decision
    }

    /// Reads and discards the rest of the body, returning how many bytes were skipped.
    pub async fn drain(&mut self) -> Result<u64, ClientError> {
        let mut discarded = 0;
        while let Some(frame) = self.frame().await {
            if let Ok(data) = frame?.into_data() {
                discarded += data.len() as u64;
            }
        }
        Ok(discarded)
    }

    /// Reads the whole body into one buffer.
    pub async fn bytes(self) -> Result<Bytes, ClientError> {
        Ok(self.collect().await?.to_bytes())
    }

    fn finish(&mut self, decision: Decision) {
        self.decision = Some(decision);
        if let Some(checkout) = self.checkout.take() {
            trace!(%decision, received = self.exchange.bytes_received, "response finished");
            checkout.release(decision);
        }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = ClientError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let Some(checkout) = this.checkout.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(checkout.connection().poll_payload(cx)) {
            Ok(PayloadItem::Chunk(bytes)) => {
                this.exchange.bytes_received += bytes.len() as u64;
                Poll::Ready(Some(Ok(Frame::data(bytes))))
            }
            Ok(PayloadItem::Eof) => {
                this.exchange.response_drained = true;
                this.finish(ReuseDecider::decide(&this.exchange));
                Poll::Ready(None)
            }
            Err(e) => {
                let reason = match e {
                    ParseError::Io { .. } => CloseReason::TransportError,
                    _ => CloseReason::ProtocolError,
                };
                warn!(cause = %e, %reason, "failed to read response body");
                this.finish(Decision::MustClose(reason));
                Poll::Ready(Some(Err(e.into())))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.checkout.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        if self.checkout.is_none() {
            return SizeHint::with_exact(0);
        }
        match self.exchange.response_framing {
            Some(PayloadSize::Length(length)) => SizeHint::with_exact(length.saturating_sub(self.exchange.bytes_received)),
            Some(PayloadSize::Empty) => SizeHint::with_exact(0),
            _ => SizeHint::default(),
        }
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        let Some(checkout) = self.checkout.as_mut() else {
            return;
        };

        // the end of the body may already be decodable from buffered bytes
        let mut cx = Context::from_waker(noop_waker_ref());
        if let Poll::Ready(Ok(PayloadItem::Eof)) = checkout.connection().poll_payload(&mut cx) {
            self.exchange.response_drained = true;
        }
        self.finish(ReuseDecider::decide(&self.exchange));
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").field("exchange", &self.exchange).field("decision", &self.decision).finish()
    }
}
