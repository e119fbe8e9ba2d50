use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::header::{HOST, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response};
use tracing::{debug, warn};

use crate::client::pool::Checkout;
use crate::client::{
    BodySource, ClientError, CloseReason, ConnectionPool, Decision, Exchange, Origin, PoolConfig, ResponseBody,
    ReuseDecider, ReuseTracer,
};
use crate::protocol::{RequestHeader, SendError};

const DEFAULT_USER_AGENT: &str = concat!("micro-keepalive/", env!("CARGO_PKG_VERSION"));

/// An HTTP/1.1 client that keeps connections alive between requests.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Clone)]
pub struct Client {
    pool: ConnectionPool,
    default_headers: HeaderMap,
}

impl Client {
    pub fn new() -> Self {
        ClientBuilder::new().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Closes idle connections; requests sent afterwards fail with [`ClientError::PoolClosed`].
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    pub async fn get(&self, uri: &str) -> Result<Response<ResponseBody>, ClientError> {
        self.send(build_request(Method::GET, uri, BodySource::empty())?).await
    }

    pub async fn post(&self, uri: &str, body: impl Into<BodySource>) -> Result<Response<ResponseBody>, ClientError> {
        self.send(build_request(Method::POST, uri, body.into())?).await
    }

    /// Sends a request over a pooled or freshly dialed connection.
    ///
    /// The request body is written completely before the response is read. A response
    /// without a body is finished immediately; otherwise the connection returns to the pool
    /// once the returned body has been read to its end.
    pub async fn send(&self, request: Request<BodySource>) -> Result<Response<ResponseBody>, ClientError> {
        let (parts, body) = request.into_parts();
        let origin = Origin::from_uri(&parts.uri)?;

        let mut header = RequestHeader::from(parts);
        self.prepare_headers(&mut header, &origin)?;

        let payload_size = body.payload_size(header.need_body());
        let mut exchange = Exchange::new(payload_size.declared_length(), header.wants_close());
        debug!(%origin, method = %header.method(), ?payload_size, "sending request");

        let mut checkout = Checkout::acquire(&self.pool, &origin).await?;
        let conn = checkout.connection();

        let result = match conn.send_request(header, payload_size, body, &mut exchange).await {
            Ok(()) => conn.read_response_head(&mut exchange).await,
            Err(e) => Err(e),
        };

        let head = match result {
            Ok(head) => head,
            Err(e) => {
                let decision = match &e {
                    ClientError::ProtocolFraming { .. } => Decision::MustClose(CloseReason::ProtocolError),
                    ClientError::Transport { .. } | ClientError::Send { source: SendError::Io { .. } } => {
                        Decision::MustClose(CloseReason::TransportError)
                    }
                    ClientError::BodyLengthMismatch { declared, actual } => {
                        Decision::MustClose(CloseReason::RequestLengthMismatch { declared: *declared, sent: *actual })
                    }
                    _ => ReuseDecider::decide(&exchange),
                };
                warn!(%origin, cause = %e, %decision, "request failed");
                checkout.release(decision);
                return Err(e);
            }
        };

        let bodiless = exchange.response_framing.is_some_and(|framing| framing.is_empty());
        let mut body = ResponseBody::new(checkout, exchange);
        if bodiless {
            body.drain().await?;
        }

        Ok(head.map(|()| body))
    }

    fn prepare_headers(&self, header: &mut RequestHeader, origin: &Origin) -> Result<(), ClientError> {
        let headers = header.headers_mut();
        if !headers.contains_key(HOST) {
            let host = HeaderValue::from_str(&origin.authority()).map_err(ClientError::invalid_request)?;
            headers.insert(HOST, host);
        }
        for (name, value) in &self.default_headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        Ok(())
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").field("pool", &self.pool).field("default_headers", &self.default_headers).finish()
    }
}

fn build_request(method: Method, uri: &str, body: BodySource) -> Result<Request<BodySource>, ClientError> {
    Request::builder().method(method).uri(uri).body(body).map_err(ClientError::invalid_request)
}

/// Configures a [`Client`]: pool limits, reuse tracers and headers sent with every request.
pub struct ClientBuilder {
    config: PoolConfig,
    tracers: Vec<Arc<dyn ReuseTracer>>,
    default_headers: HeaderMap,
}

impl ClientBuilder {
    pub fn new() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        Self { config: PoolConfig::default(), tracers: Vec::new(), default_headers }
    }

    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = idle_timeout;
        self
    }

    pub fn max_idle_per_origin(mut self, max_idle_per_origin: usize) -> Self {
        self.config.max_idle_per_origin = max_idle_per_origin;
        self
    }

    /// Registers a tracer fired on every connection reuse, after those added before it.
    pub fn tracer(mut self, tracer: Arc<dyn ReuseTracer>) -> Self {
        self.tracers.push(tracer);
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn build(self) -> Client {
        let pool = ConnectionPool::new(self.config);
        for tracer in self.tracers {
            pool.register_tracer(tracer);
        }
        Client { pool, default_headers: self.default_headers }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("tracers", &self.tracers.len())
            .field("default_headers", &self.default_headers)
            .finish()
    }
}
