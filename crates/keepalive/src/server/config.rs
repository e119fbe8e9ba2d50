use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Behaviour of an [`EchoServer`](crate::server::EchoServer).
#[derive(Debug, Clone)]
pub struct EchoConfig {
    /// Pause between draining a request body and writing the response.
    pub response_delay: Option<Duration>,
    /// Send the request body back; otherwise respond with an empty body.
    pub echo_body: bool,
    /// Keep connections open between requests; otherwise close after each response.
    pub keep_alive: bool,
}

impl EchoConfig {
    pub fn response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = Some(delay);
        self
    }

    pub fn echo_body(mut self, echo_body: bool) -> Self {
        self.echo_body = echo_body;
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self { response_delay: None, echo_body: true, keep_alive: true }
    }
}

/// Counters shared by a server and all of its connections.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    connections: AtomicU64,
    requests: AtomicU64,
}

impl ServerStats {
    /// Connections accepted so far.
    pub fn connections(&self) -> u64 {
        self.counters.connections.load(Ordering::Acquire)
    }

    /// Requests whose body was drained and answered.
    pub fn requests(&self) -> u64 {
        self.counters.requests.load(Ordering::Acquire)
    }

    pub(crate) fn record_connection(&self) {
        self.counters.connections.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_request(&self) {
        self.counters.requests.fetch_add(1, Ordering::AcqRel);
    }
}
