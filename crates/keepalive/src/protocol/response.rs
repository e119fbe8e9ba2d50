//! Response head type.

use http::Response;

use crate::protocol::keep_alive;

/// The head of an HTTP response, `http::Response<()>` until a body is attached.
pub type ResponseHead = Response<()>;

/// Whether the server signalled that the connection ends after this response.
pub fn response_wants_close(head: &ResponseHead) -> bool {
    keep_alive::wants_close(head.version(), head.headers())
}
