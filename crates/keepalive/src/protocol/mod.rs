//! Protocol types shared by both ends of a connection.
//!
//! - [`Message`], [`PayloadItem`], [`PayloadSize`]: what the codecs produce and consume.
//!   [`PayloadSize`] is the body framing a reuse decision is based on.
//! - [`RequestHeader`] / [`ResponseHead`]: message heads without bodies.
//! - [`ParseError`], [`SendError`], [`HttpError`]: decode, encode and server connection errors.

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod keep_alive;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHead;
pub use response::response_wants_close;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
