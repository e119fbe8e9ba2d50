//! Reuse eligibility of a connection after one request/response exchange.
//!
//! The verdict is a pure function of [`Exchange`] metadata. Rules are checked in order and
//! the first match wins:
//!
//! 1. an explicit close signal (`Connection: close` from either side, or an HTTP/1.0
//!    response without `keep-alive`)
//! 2. a close-delimited response body
//! 3. a response body the client did not read to its end
//! 4. a request body whose byte count differs from its declared length
//!
//! Anything else leaves the connection positioned exactly at a message boundary, so it
//! may carry the next request.

use std::fmt;

use crate::protocol::PayloadSize;

/// What happened on the wire during one request/response pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Exchange {
    /// Length announced for the request body; `None` when it was sent chunked.
    pub request_declared: Option<u64>,
    pub bytes_sent: u64,
    /// Framing of the response body; `None` until the response head is read.
    pub response_framing: Option<PayloadSize>,
    pub bytes_received: u64,
    /// The server asked to close the connection.
    pub server_close: bool,
    /// The client sent `Connection: close` itself.
    pub client_close: bool,
    /// The response body was read through its terminating frame.
    pub response_drained: bool,
}

impl Exchange {
    pub fn new(request_declared: Option<u64>, client_close: bool) -> Self {
        Self { request_declared, client_close, ..Default::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Reusable,
    MustClose(CloseReason),
}

impl Decision {
    pub fn is_reusable(&self) -> bool {
        matches!(self, Decision::Reusable)
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        match self {
            Decision::Reusable => None,
            Decision::MustClose(reason) => Some(*reason),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Reusable => f.write_str("reusable"),
            Decision::MustClose(reason) => write!(f, "must close: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ServerConnectionClose,
    ClientConnectionClose,
    CloseDelimitedBody,
    ResponseNotDrained,
    RequestLengthMismatch { declared: u64, sent: u64 },
    /// The exchange ended without a verdict: its future or checkout was dropped, or the
    /// connection was released in the middle of a message.
    Abandoned,
    /// The peer broke message framing.
    ProtocolError,
    /// Reading or writing the socket failed.
    TransportError,
}

impl CloseReason {
    /// Reasons caused by how the caller used the connection rather than by the peer.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, CloseReason::ResponseNotDrained | CloseReason::RequestLengthMismatch { .. })
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ServerConnectionClose => f.write_str("server requested close"),
            CloseReason::ClientConnectionClose => f.write_str("client requested close"),
            CloseReason::CloseDelimitedBody => f.write_str("response body delimited by connection close"),
            CloseReason::ResponseNotDrained => f.write_str("response body not fully read"),
            CloseReason::RequestLengthMismatch { declared, sent } => {
                write!(f, "request body declared {declared} bytes but {sent} were produced")
            }
            CloseReason::Abandoned => f.write_str("exchange abandoned"),
            CloseReason::ProtocolError => f.write_str("protocol error"),
            CloseReason::TransportError => f.write_str("transport error"),
        }
    }
}

/// Applies the reuse rules to a finished (or aborted) exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReuseDecider;

impl ReuseDecider {
    pub fn decide(exchange: &Exchange) -> Decision {
        if exchange.server_close {
            return Decision::MustClose(CloseReason::ServerConnectionClose);
        }
        if exchange.client_close {
            return Decision::MustClose(CloseReason::ClientConnectionClose);
        }

        if exchange.response_framing.is_some_and(|framing| framing.is_close_delimited()) {
            return Decision::MustClose(CloseReason::CloseDelimitedBody);
        }

        if !exchange.response_drained {
            return Decision::MustClose(CloseReason::ResponseNotDrained);
        }

        match exchange.request_declared {
            Some(declared) if declared != exchange.bytes_sent => {
                Decision::MustClose(CloseReason::RequestLengthMismatch { declared, sent: exchange.bytes_sent })
            }
            _ => Decision::Reusable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(declared: Option<u64>, framing: PayloadSize) -> Exchange {
        Exchange {
            request_declared: declared,
            bytes_sent: declared.unwrap_or(10),
            response_framing: Some(framing),
            bytes_received: framing.declared_length().unwrap_or(7),
            response_drained: true,
            ..Default::default()
        }
    }

    #[test]
    fn clean_exchanges_are_reusable() {
        assert_eq!(ReuseDecider::decide(&clean(Some(4), PayloadSize::Length(4))), Decision::Reusable);
        assert_eq!(ReuseDecider::decide(&clean(Some(0), PayloadSize::Length(0))), Decision::Reusable);
        assert_eq!(ReuseDecider::decide(&clean(None, PayloadSize::Chunked)), Decision::Reusable);
        assert_eq!(ReuseDecider::decide(&clean(Some(0), PayloadSize::Empty)), Decision::Reusable);
    }

    #[test]
    fn server_close_short_circuits() {
        let exchange = Exchange {
            server_close: true,
            response_drained: false,
            bytes_sent: 1,
            ..clean(Some(4), PayloadSize::UntilClose)
        };
        assert_eq!(ReuseDecider::decide(&exchange), Decision::MustClose(CloseReason::ServerConnectionClose));
    }

    #[test]
    fn client_close() {
        let exchange = Exchange { client_close: true, ..clean(Some(4), PayloadSize::Length(4)) };
        assert_eq!(ReuseDecider::decide(&exchange), Decision::MustClose(CloseReason::ClientConnectionClose));
    }

    #[test]
    fn close_delimited_body() {
        let exchange = clean(Some(4), PayloadSize::UntilClose);
        assert_eq!(ReuseDecider::decide(&exchange), Decision::MustClose(CloseReason::CloseDelimitedBody));
    }

    #[test]
    fn undrained_response_is_client_fault() {
        let exchange = Exchange { response_drained: false, ..clean(Some(4), PayloadSize::Length(4)) };
        let decision = ReuseDecider::decide(&exchange);
        assert_eq!(decision, Decision::MustClose(CloseReason::ResponseNotDrained));
        assert!(decision.close_reason().unwrap().is_client_fault());
    }

    #[test]
    fn no_response_head_is_not_drained() {
        let exchange = Exchange::new(Some(4), false);
        assert_eq!(ReuseDecider::decide(&exchange), Decision::MustClose(CloseReason::ResponseNotDrained));
    }

    #[test]
    fn request_length_mismatch() {
        let exchange = Exchange { bytes_sent: 3, ..clean(Some(4), PayloadSize::Length(4)) };
        let decision = ReuseDecider::decide(&exchange);
        assert_eq!(decision, Decision::MustClose(CloseReason::RequestLengthMismatch { declared: 4, sent: 3 }));
        assert!(decision.close_reason().unwrap().is_client_fault());
    }

    #[test]
    fn drain_checked_before_length() {
        let exchange = Exchange { bytes_sent: 3, response_drained: false, ..clean(Some(4), PayloadSize::Length(4)) };
        assert_eq!(ReuseDecider::decide(&exchange), Decision::MustClose(CloseReason::ResponseNotDrained));
    }
}
