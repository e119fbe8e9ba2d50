//! The client side: a keep-alive connection pool and the request flow built on it.
//!
//! One exchange runs as follows:
//!
//! 1. [`ConnectionPool::acquire`] hands out an idle [`Connection`] for the [`Origin`]
//!    (firing every [`ReuseTracer`]) or dials a new one
//! 2. the request head and the whole [`BodySource`] are written
//! 3. the response head is read and a [`ResponseBody`] returned to the caller
//! 4. once the body ends, [`ReuseDecider`] judges the [`Exchange`] and the connection is
//!    released back to the pool or closed
//!
//! Every exit path releases the connection exactly once, including errors and dropped
//! futures or bodies.

mod body_source;
pub use body_source::BodySource;

mod http_client;
pub use http_client::{Client, ClientBuilder};

mod connection;
pub use connection::{Connection, ConnectionId};

mod decider;
pub use decider::{CloseReason, Decision, Exchange, ReuseDecider};

mod error;
pub use error::ClientError;

mod origin;
pub use origin::Origin;

mod pool;
pub use pool::{ConnectionPool, PoolConfig, PoolStats};

mod response_body;
pub use response_body::ResponseBody;

mod tracer;
pub use tracer::{ReuseCounter, ReuseTracer};
