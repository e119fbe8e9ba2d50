//! Message body framing.
//!
//! [`PayloadDecoder`] and [`PayloadEncoder`] pick a strategy from the message's
//! [`PayloadSize`](crate::protocol::PayloadSize):
//!
//! - `Content-Length`: `LengthDecoder` / `LengthEncoder`
//! - `Transfer-Encoding: chunked`: `ChunkedDecoder` / `ChunkedEncoder`
//! - no body, or a body delimited by connection close
//!
//! Decoders never consume bytes past the end of their body, so whatever remains in the
//! read buffer belongs to the next message on the connection.

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
