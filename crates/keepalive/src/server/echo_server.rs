use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::server::{EchoConfig, EchoConnection, ServerStats};

/// A minimal HTTP/1.1 server answering every request with its own body.
///
/// Connections are served concurrently, requests within a connection in order. Each
/// request body is drained completely before its response is written.
#[derive(Debug)]
pub struct EchoServer {
    listener: TcpListener,
    config: Arc<EchoConfig>,
    stats: ServerStats,
}

impl EchoServer {
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: EchoConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, config: Arc::new(config), stats: ServerStats::default() })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> ServerStats {
        self.stats.clone()
    }

    /// Starts accepting connections on a background task.
    pub fn start(self) -> io::Result<ServerHandle> {
        let local_addr = self.local_addr()?;
        let stats = self.stats.clone();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        Ok(ServerHandle { local_addr, stats, shutdown, task })
    }

    async fn run(self, shutdown: CancellationToken) {
        info!(addr = ?self.listener.local_addr().ok(), "echo server listening");

        loop {
            let (tcp_stream, remote_addr) = select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(stream_and_addr) => stream_and_addr,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
            };

            self.stats.record_connection();
            info!(%remote_addr, "accepted connection");

            let config = Arc::clone(&self.config);
            let stats = self.stats.clone();
            let shutdown = shutdown.child_token();

            tokio::spawn(async move {
                if let Err(e) = tcp_stream.set_nodelay(true) {
                    warn!(cause = %e, "failed to set TCP_NODELAY");
                }
                let (reader, writer) = tcp_stream.into_split();
                let connection = EchoConnection::new(reader, writer, config, stats);

                select! {
                    () = shutdown.cancelled() => info!(%remote_addr, "server stopping, connection dropped"),
                    result = connection.process() => match result {
                        Ok(()) => info!(%remote_addr, "finished process, connection shutdown"),
                        Err(e) => error!(%remote_addr, cause = %e, "service has error, connection shutdown"),
                    },
                }
            });
        }

        info!("echo server stopped");
    }
}

/// A running [`EchoServer`].
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    stats: ServerStats,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// An absolute `http://` URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.local_addr, path)
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Stops accepting, drops every open connection and waits for the accept loop to end.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!(cause = %e, "echo server task failed");
        }
    }
}
