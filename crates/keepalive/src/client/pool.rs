//! Idle connection cache keyed by [`Origin`].
//!
//! Connections move between two places: the idle set (owned by the pool) and a single
//! in-flight exchange (owned by its caller). The pool remembers which ids it has handed
//! out, so a connection released to the wrong pool, or released after the pool forgot it,
//! is reported instead of silently pooled.
//!
//! The idle set sits behind a `std::sync::Mutex` that is never held across an `.await`:
//! dialing and tracer callbacks happen with the lock released.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use crate::client::{CloseReason, ClientError, Connection, ConnectionId, Decision, Origin, ReuseTracer};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How long a connection may sit idle before it is discarded. `None` keeps it forever.
    pub idle_timeout: Option<Duration>,
    /// Idle connections kept per origin; the oldest is closed beyond that. `0` disables pooling.
    pub max_idle_per_origin: usize,
}

impl PoolConfig {
    pub fn idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn max_idle_per_origin(mut self, max_idle_per_origin: usize) -> Self {
        self.max_idle_per_origin = max_idle_per_origin;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { idle_timeout: Some(Duration::from_secs(90)), max_idle_per_origin: 32 }
    }
}

/// Counters describing what the pool did so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub dialed: u64,
    pub reused: u64,
    pub closed: u64,
    pub idle: usize,
}

struct PoolEntry {
    conn: Connection,
    idle_since: Instant,
}

#[derive(Default)]
struct PoolState {
    idle: HashMap<Origin, Vec<PoolEntry>>,
    checked_out: HashSet<ConnectionId>,
    closed: bool,
    stats: PoolStats,
}

impl PoolState {
    /// Closes idle connections of every origin that outlived `idle_timeout` or were closed
    /// by the peer, so origins that are never acquired again don't pin their sockets.
    fn sweep(&mut self, idle_timeout: Option<Duration>) {
        let mut discarded = 0;
        self.idle.retain(|origin, entries| {
            entries.retain_mut(|entry| {
                let keep = !idle_timeout.is_some_and(|timeout| entry.idle_since.elapsed() >= timeout) && entry.conn.is_open();
                if !keep {
                    debug!(conn = %entry.conn.id(), %origin, "discarding stale idle connection");
                    discarded += 1;
                }
                keep
            });
            !entries.is_empty()
        });
        self.stats.closed += discarded;
    }
}

struct PoolInner {
    config: PoolConfig,
    tracers: ArcSwap<Vec<Arc<dyn ReuseTracer>>>,
    state: Mutex<PoolState>,
}

/// A keep-alive connection pool. Cloning shares the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                tracers: ArcSwap::from_pointee(Vec::new()),
                state: Mutex::new(PoolState::default()),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Adds a tracer; tracers run in registration order.
    pub fn register_tracer(&self, tracer: Arc<dyn ReuseTracer>) {
        self.inner.tracers.rcu(|current| {
            let mut tracers = current.as_ref().clone();
            tracers.push(Arc::clone(&tracer));
            tracers
        });
    }

    /// Hands out the most recently released idle connection for `origin`, or dials one.
    ///
    /// Idle connections that expired or were closed by the peer are discarded on the way.
    /// Tracers fire only when an idle connection is handed out.
    pub async fn acquire(&self, origin: &Origin) -> Result<Connection, ClientError> {
        if let Some(conn) = self.take_idle(origin)? {
            for tracer in self.inner.tracers.load().iter() {
                tracer.on_reuse(origin);
            }
            return Ok(conn);
        }

        let id = ConnectionId::next();
        let conn = Connection::connect(id, origin.clone()).await?;

        let mut state = self.state();
        if state.closed {
            return Err(ClientError::PoolClosed);
        }
        state.checked_out.insert(id);
        state.stats.dialed += 1;
        Ok(conn)
    }

    fn take_idle(&self, origin: &Origin) -> Result<Option<Connection>, ClientError> {
        let mut state = self.state();
        if state.closed {
            return Err(ClientError::PoolClosed);
        }

        let idle_timeout = self.inner.config.idle_timeout;
        let Some(entries) = state.idle.get_mut(origin) else {
            return Ok(None);
        };

        let mut discarded = 0;
        let mut found = None;
        while let Some(mut entry) = entries.pop() {
            if idle_timeout.is_some_and(|timeout| entry.idle_since.elapsed() >= timeout) {
                debug!(conn = %entry.conn.id(), %origin, "idle connection expired");
                discarded += 1;
                continue;
            }
            if !entry.conn.is_open() {
                debug!(conn = %entry.conn.id(), %origin, "idle connection closed by peer, dialing fresh");
                discarded += 1;
                continue;
            }
            found = Some(entry.conn);
            break;
        }

        if entries.is_empty() {
            state.idle.remove(origin);
        }
        state.stats.closed += discarded;

        if let Some(conn) = &found {
            debug!(conn = %conn.id(), %origin, exchanges = conn.exchanges(), "reusing pooled connection");
            state.checked_out.insert(conn.id());
            state.stats.reused += 1;
        }
        Ok(found)
    }

    /// Returns a connection after its exchange.
    ///
    /// A `Reusable` connection joins the idle set of its origin unless the pool is shut
    /// down or the connection is mid-message; anything else is closed. Releasing a
    /// connection this pool does not have checked out fails with
    /// [`ClientError::ReleaseMisuse`], closes that connection, and leaves the idle set as is.
    pub fn release(&self, mut conn: Connection, decision: Decision) -> Result<(), ClientError> {
        let id = conn.id();
        let mut state = self.state();

        if !state.checked_out.remove(&id) {
            drop(state);
            warn!(conn = %id, origin = %conn.origin(), "released a connection this pool did not hand out");
            return Err(ClientError::ReleaseMisuse { id });
        }

        let decision = if decision.is_reusable() && !conn.is_between_messages() {
            warn!(conn = %id, "connection released as reusable in the middle of a message");
            Decision::MustClose(CloseReason::Abandoned)
        } else {
            decision
        };
        conn.record_decision(decision);
        state.sweep(self.inner.config.idle_timeout);

        match decision {
            Decision::Reusable if state.closed => {
                debug!(conn = %id, "pool is shut down, closing released connection");
                state.stats.closed += 1;
            }
            Decision::Reusable if self.inner.config.max_idle_per_origin == 0 => {
                debug!(conn = %id, "pooling disabled, closing released connection");
                state.stats.closed += 1;
            }
            Decision::Reusable => {
                let max_idle = self.inner.config.max_idle_per_origin;
                let origin = conn.origin().clone();

                let entries = state.idle.entry(origin.clone()).or_default();
                let mut discarded = 0;
                if entries.len() >= max_idle {
                    let excess = entries.len() + 1 - max_idle;
                    entries.drain(..excess);
                    discarded = excess as u64;
                }

                entries.push(PoolEntry { conn, idle_since: Instant::now() });
                debug!(conn = %id, %origin, idle = entries.len(), "connection returned to pool");
                state.stats.closed += discarded;
            }
            Decision::MustClose(reason) => {
                debug!(conn = %id, %reason, client_fault = reason.is_client_fault(), "closing connection");
                state.stats.closed += 1;
            }
        }
        Ok(())
    }

    /// Closes every idle connection. Connections in use are closed when released, and
    /// later `acquire` calls fail with [`ClientError::PoolClosed`].
    pub fn shutdown(&self) {
        let idle = {
            let mut state = self.state();
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.stats.closed += idle.values().map(|entries| entries.len() as u64).sum::<u64>();
            idle
        };
        debug!(idle = idle.len(), "connection pool shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.state().closed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state();
        PoolStats { idle: state.idle.values().map(Vec::len).sum(), ..state.stats }
    }

    /// Number of idle connections pooled for `origin`.
    pub fn idle_count(&self, origin: &Origin) -> usize {
        self.state().idle.get(origin).map_or(0, Vec::len)
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

/// A connection checked out for one exchange.
///
/// Dropping it without [`Checkout::release`] (a cancelled request future, an early
/// return) closes the connection and tells the pool.
pub(crate) struct Checkout {
    conn: Option<Connection>,
    pool: ConnectionPool,
}

impl Checkout {
    pub(crate) async fn acquire(pool: &ConnectionPool, origin: &Origin) -> Result<Self, ClientError> {
        let conn = pool.acquire(origin).await?;
        Ok(Self { conn: Some(conn), pool: pool.clone() })
    }

    pub(crate) fn connection(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("checked out connection is present until released")
    }

    pub(crate) fn release(mut self, decision: Decision) {
        if let Some(conn) = self.conn.take() {
            self.give_back(conn, decision);
        }
    }

    fn give_back(&self, conn: Connection, decision: Decision) {
        if let Err(e) = self.pool.release(conn, decision) {
            warn!(cause = %e, "failed to release connection");
        }
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.give_back(conn, Decision::MustClose(CloseReason::Abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, Origin) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Origin::http("127.0.0.1", port))
    }

    #[tokio::test]
    async fn reusable_connection_is_handed_out_again() {
        let (listener, origin) = listener().await;
        let _accept = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let pool = ConnectionPool::default();
        let conn = pool.acquire(&origin).await.unwrap();
        let id = conn.id();
        pool.release(conn, Decision::Reusable).unwrap();
        assert_eq!(pool.idle_count(&origin), 1);

        let conn = pool.acquire(&origin).await.unwrap();
        assert_eq!(conn.id(), id);
        assert_eq!(pool.idle_count(&origin), 0);

        pool.release(conn, Decision::MustClose(CloseReason::ServerConnectionClose)).unwrap();
        let stats = pool.stats();
        assert_eq!((stats.dialed, stats.reused, stats.closed, stats.idle), (1, 1, 1, 0));

        let conn = pool.acquire(&origin).await.unwrap();
        assert_ne!(conn.id(), id);
    }

    #[tokio::test]
    async fn idle_set_is_lifo() {
        let (listener, origin) = listener().await;
        let _accept = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let pool = ConnectionPool::default();
        let first = pool.acquire(&origin).await.unwrap();
        let second = pool.acquire(&origin).await.unwrap();
        let (first_id, second_id) = (first.id(), second.id());
        pool.release(first, Decision::Reusable).unwrap();
        pool.release(second, Decision::Reusable).unwrap();

        assert_eq!(pool.acquire(&origin).await.unwrap().id(), second_id);
        assert_eq!(pool.acquire(&origin).await.unwrap().id(), first_id);
    }

    #[tokio::test]
    async fn release_to_foreign_pool_is_misuse() {
        let (listener, origin) = listener().await;
        let _accept = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let pool = ConnectionPool::default();
        let other = ConnectionPool::default();
        let kept = pool.acquire(&origin).await.unwrap();
        pool.release(kept, Decision::Reusable).unwrap();

        let stranger = other.acquire(&origin).await.unwrap();
        let id = stranger.id();
        let result = pool.release(stranger, Decision::Reusable);
        assert!(matches!(result, Err(ClientError::ReleaseMisuse { id: misused }) if misused == id));
        assert_eq!(pool.idle_count(&origin), 1);
    }

    #[tokio::test]
    async fn ids_are_not_shared_between_pools() {
        let (listener, origin) = listener().await;
        let _accept = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let pool = ConnectionPool::default();
        let other = ConnectionPool::default();
        let ours = pool.acquire(&origin).await.unwrap();
        let theirs = other.acquire(&origin).await.unwrap();
        assert_ne!(ours.id(), theirs.id());

        // both pools have a connection checked out, the foreign one must still be refused
        let id = theirs.id();
        let result = pool.release(theirs, Decision::Reusable);
        assert!(matches!(result, Err(ClientError::ReleaseMisuse { id: misused }) if misused == id));
        assert_eq!(pool.idle_count(&origin), 0);

        pool.release(ours, Decision::Reusable).unwrap();
        assert_eq!(pool.idle_count(&origin), 1);
        assert_eq!(other.stats().idle, 0);
    }

    #[tokio::test]
    async fn concurrent_acquires_never_share_a_connection() {
        let (listener, origin) = listener().await;
        let _accept = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let pool = ConnectionPool::default();
        let conn = pool.acquire(&origin).await.unwrap();
        pool.release(conn, Decision::Reusable).unwrap();

        let (first, second) = tokio::join!(pool.acquire(&origin), pool.acquire(&origin));
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first.id(), second.id());

        let stats = pool.stats();
        assert_eq!((stats.dialed, stats.reused, stats.idle), (2, 1, 0));
    }

    #[tokio::test]
    async fn max_idle_per_origin_evicts_oldest() {
        let (listener, origin) = listener().await;
        let _accept = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let pool = ConnectionPool::new(PoolConfig::default().max_idle_per_origin(1));
        let first = pool.acquire(&origin).await.unwrap();
        let second = pool.acquire(&origin).await.unwrap();
        let second_id = second.id();
        pool.release(first, Decision::Reusable).unwrap();
        pool.release(second, Decision::Reusable).unwrap();

        assert_eq!(pool.idle_count(&origin), 1);
        assert_eq!(pool.acquire(&origin).await.unwrap().id(), second_id);
    }

    #[tokio::test]
    async fn expired_connection_is_not_reused() {
        let (listener, origin) = listener().await;
        let _accept = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let pool = ConnectionPool::new(PoolConfig::default().idle_timeout(Some(Duration::from_millis(10))));
        let conn = pool.acquire(&origin).await.unwrap();
        let id = conn.id();
        pool.release(conn, Decision::Reusable).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_ne!(pool.acquire(&origin).await.unwrap().id(), id);
        assert_eq!(pool.stats().reused, 0);
    }

    #[tokio::test]
    async fn release_sweeps_expired_connections_of_other_origins() {
        let mut origins = Vec::new();
        for _ in 0..2 {
            let (listener, origin) = listener().await;
            tokio::spawn(async move {
                let mut held = Vec::new();
                while let Ok((stream, _)) = listener.accept().await {
                    held.push(stream);
                }
            });
            origins.push(origin);
        }
        let (stale, live) = (&origins[0], &origins[1]);

        let pool = ConnectionPool::new(PoolConfig::default().idle_timeout(Some(Duration::from_millis(10))));
        let conn = pool.acquire(stale).await.unwrap();
        pool.release(conn, Decision::Reusable).unwrap();
        assert_eq!(pool.idle_count(stale), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;

        // only the other origin is touched from here on
        let conn = pool.acquire(live).await.unwrap();
        pool.release(conn, Decision::Reusable).unwrap();

        assert_eq!(pool.idle_count(stale), 0);
        assert_eq!(pool.idle_count(live), 1);
        let stats = pool.stats();
        assert_eq!((stats.closed, stats.idle), (1, 1));
    }

    #[tokio::test]
    async fn shutdown_rejects_acquire_and_closes_released() {
        let (listener, origin) = listener().await;
        let _accept = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let pool = ConnectionPool::default();
        let idle = pool.acquire(&origin).await.unwrap();
        let in_use = pool.acquire(&origin).await.unwrap();
        pool.release(idle, Decision::Reusable).unwrap();

        pool.shutdown();
        assert_eq!(pool.stats().idle, 0);
        assert!(matches!(pool.acquire(&origin).await, Err(ClientError::PoolClosed)));

        pool.release(in_use, Decision::Reusable).unwrap();
        assert_eq!(pool.stats().idle, 0);
        assert_eq!(pool.stats().closed, 2);
    }

    #[tokio::test]
    async fn dial_failure_surfaces() {
        let (listener, origin) = listener().await;
        drop(listener);

        let pool = ConnectionPool::default();
        assert!(matches!(pool.acquire(&origin).await, Err(ClientError::DialFailed { .. })));
        assert_eq!(pool.stats().dialed, 0);
    }

    #[tokio::test]
    async fn dropped_checkout_closes_connection() {
        let (listener, origin) = listener().await;
        let _accept = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let pool = ConnectionPool::default();
        let checkout = Checkout::acquire(&pool, &origin).await.unwrap();
        drop(checkout);

        let stats = pool.stats();
        assert_eq!((stats.dialed, stats.closed, stats.idle), (1, 1, 0));
    }
}
