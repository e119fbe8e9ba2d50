//! The server side: an echo server that drains each request body before answering.
//!
//! Reuse on the client only works if the server leaves the connection at a message
//! boundary. [`EchoConnection`] reads every request body through its terminator (exact
//! `Content-Length` or the final chunk) before writing a response, then waits for the
//! next request on the same connection unless either side asked to close.

mod config;
pub use config::{EchoConfig, ServerStats};

mod connection;
pub use connection::{EchoConnection, Phase};

mod echo_server;
pub use echo_server::{EchoServer, ServerHandle};
