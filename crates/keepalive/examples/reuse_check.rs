//! Sends a fixed body, a streamed body and an empty body over one client, five times,
//! and reports how many requests went over a reused connection.

use std::io::Cursor;
use std::sync::Arc;

use micro_keepalive::client::{BodySource, Client, ClientError, ReuseCounter};
use micro_keepalive::server::{EchoConfig, EchoServer};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

const SESSIONS: usize = 5;

async fn run_session(url: &str) -> Result<usize, ClientError> {
    let counter = Arc::new(ReuseCounter::new());
    let client = Client::builder().tracer(counter.clone()).build();

    let bodies = [
        BodySource::fixed(&b"test"[..]),
        BodySource::reader(Cursor::new(&b"test"[..]), Some(4)),
        BodySource::fixed(&b""[..]),
    ];
    for body in bodies {
        let response = client.post(url, body).await?;
        let echoed = response.into_body().bytes().await?;
        info!(body = ?echoed, "client received");
    }

    client.shutdown();
    Ok(counter.count())
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let server = match EchoServer::bind("127.0.0.1:0", EchoConfig::default()).await.and_then(EchoServer::start) {
        Ok(server) => server,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let url = server.url("/");
    let mut passed = 0;
    for session in 0..SESSIONS {
        match run_session(&url).await {
            // three requests on one client: the last two reuse the first connection
            Ok(2) => passed += 1,
            Ok(reused) => error!(session, reused, "unexpected number of reused connections"),
            Err(e) => error!(session, cause = %e, "session failed"),
        }
    }

    info!(passed, total = SESSIONS, "reuse check finished");
    server.stop().await;
}
