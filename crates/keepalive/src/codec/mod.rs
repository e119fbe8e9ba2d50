//! Wire codecs for HTTP/1.1 messages, built on `tokio_util::codec`.
//!
//! - [`RequestDecoder`] / [`ResponseEncoder`]: the server side of a connection
//! - [`RequestEncoder`] / [`ResponseDecoder`]: the client side of a connection
//!
//! Each codec streams a message as one [`Message::Header`](crate::protocol::Message)
//! followed by payload items ending in EOF. Decoders never read past the end of a
//! message body, which is what lets a connection carry the next exchange.

mod body;
mod header;
mod message_decoder;
mod message_encoder;

pub use message_decoder::{MessageDecoder, RequestDecoder, ResponseDecoder};
pub use message_encoder::{MessageEncoder, RequestEncoder, ResponseEncoder};
