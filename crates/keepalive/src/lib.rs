//! HTTP/1.1 keep-alive connection reuse
//!
//! This crate provides a client-side connection pool that decides, deterministically,
//! whether the TCP connection used for one request may carry the next request to the same
//! origin, together with the server-side half of that contract: an echo server that drains
//! every request body before it answers.
//!
//! # Features
//!
//! - Per-origin idle connection pool, most recently released first
//! - Reuse decided from the finished exchange: close signals, body framing, drained bytes
//! - `Content-Length`, chunked and close-delimited bodies
//! - Fixed and streamed request bodies, with declared-length enforcement
//! - Reuse observers ([`client::ReuseTracer`])
//! - Expect-continue on the server
//! - Connections released or closed on every path, including dropped futures
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use micro_keepalive::client::{BodySource, Client, ReuseCounter};
//! use micro_keepalive::server::{EchoConfig, EchoServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = EchoServer::bind("127.0.0.1:0", EchoConfig::default()).await?.start()?;
//!
//!     let counter = Arc::new(ReuseCounter::new());
//!     let client = Client::builder().tracer(counter.clone()).build();
//!
//!     for _ in 0..2 {
//!         let response = client.post(&server.url("/echo"), BodySource::fixed("test")).await?;
//!         let body = response.into_body().bytes().await?;
//!         assert_eq!(&body[..], b"test");
//!     }
//!
//!     // the second request went over the connection dialed for the first
//!     assert_eq!(counter.count(), 1);
//!
//!     client.shutdown();
//!     server.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`client`]: pool, connections, reuse decision and the request flow
//! - [`server`]: the draining echo server
//! - [`codec`]: message encoders and decoders for both directions
//! - [`protocol`]: message, framing and error types shared by everything above
//!
//! # Reuse rules
//!
//! After each exchange [`client::ReuseDecider`] returns `Reusable` or `MustClose`, checking
//! in order:
//!
//! 1. an explicit close from either side (`Connection: close`, HTTP/1.0 without keep-alive)
//! 2. a close-delimited response body
//! 3. a response body not read to its end
//! 4. a request body whose length differs from the declared one
//!
//! Rules 3 and 4 are the caller's fault and are reported as such.
//!
//! # Limitations
//!
//! - HTTP/1.1 only, plain TCP only (no TLS)
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64
//! - No retries, redirects or proxies

pub mod client;
pub mod codec;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
