use std::io;

use thiserror::Error;

use crate::client::{ConnectionId, Origin};
use crate::protocol::{ParseError, SendError};

/// Errors surfaced by the client and its connection pool.
///
/// A connection involved in any of these errors is closed, never pooled. An idle
/// connection found dead on acquire is not an error: the pool dials a fresh one.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to dial {origin}: {source}")]
    DialFailed {
        origin: Origin,
        #[source]
        source: io::Error,
    },

    #[error("malformed response framing: {source}")]
    ProtocolFraming {
        #[source]
        source: ParseError,
    },

    #[error("connection failed while reading the response: {source}")]
    Transport {
        #[source]
        source: io::Error,
    },

    #[error("request body length mismatch: declared {declared} bytes, body produced {actual}")]
    BodyLengthMismatch { declared: u64, actual: u64 },

    #[error("failed to read request body: {source}")]
    BodySource {
        #[source]
        source: io::Error,
    },

    #[error("failed to send request: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("connection pool is shut down")]
    PoolClosed,

    #[error("connection {id} was released to a pool that did not hand it out")]
    ReleaseMisuse { id: ConnectionId },
}

impl From<ParseError> for ClientError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Io { source } => Self::Transport { source },
            source => Self::ProtocolFraming { source },
        }
    }
}

impl ClientError {
    pub fn invalid_request<S: ToString>(str: S) -> Self {
        Self::InvalidRequest { reason: str.to_string() }
    }

    pub fn body_source<E: Into<io::Error>>(e: E) -> Self {
        Self::BodySource { source: e.into() }
    }

    /// Whether the caller caused the failure, as opposed to the peer or the network.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            ClientError::BodyLengthMismatch { .. }
                | ClientError::BodySource { .. }
                | ClientError::InvalidRequest { .. }
                | ClientError::ReleaseMisuse { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_classification() {
        assert!(ClientError::BodyLengthMismatch { declared: 4, actual: 3 }.is_client_fault());
        assert!(!ClientError::ProtocolFraming { source: ParseError::UnexpectedEof }.is_client_fault());
        assert!(!ClientError::Transport { source: io::ErrorKind::ConnectionReset.into() }.is_client_fault());
        assert!(
            !ClientError::DialFailed { origin: Origin::http("127.0.0.1", 1), source: io::ErrorKind::ConnectionRefused.into() }
                .is_client_fault()
        );
    }

    #[test]
    fn socket_errors_are_not_framing_errors() {
        let reset = ClientError::from(ParseError::io(io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(matches!(reset, ClientError::Transport { ref source } if source.kind() == io::ErrorKind::ConnectionReset));

        let eof = ClientError::from(ParseError::UnexpectedEof);
        assert!(matches!(eof, ClientError::ProtocolFraming { source: ParseError::UnexpectedEof }));
    }
}
