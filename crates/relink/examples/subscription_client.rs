//! Keeps a subscription socket alive and resubscribes after every reconnect.
//!
//! Run with: cargo run --example subscription_client -p relink --features tracing -- 3002
//!
//! The first argument is the server port (default 3002). Start any TCP
//! server on that port and kill it / restart it to watch the controller back
//! off, reconnect and fire its reconnect callback. Press Ctrl-C once to skip
//! the current backoff wait (after its 10s floor), twice to quit.

use relink::{close_code, ConnectAttempt, ReconnectConfig, ReconnectController, SignalSender};
use std::io;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tower::service_fn;
use tracing_subscriber::EnvFilter;

const SUBSCRIPTIONS: usize = 9;

async fn connect(port: u16, signals: SignalSender, attempt: ConnectAttempt) -> io::Result<()> {
    signals.on_connecting();
    let mut stream = match TcpStream::connect(("127.0.0.1", port)).await {
        Ok(stream) => stream,
        Err(e) => {
            signals.on_error(e.to_string());
            signals.on_close(None, e.to_string());
            return Err(e);
        }
    };
    tracing::info!(attempt = attempt.attempt, retries = attempt.retries, "socket open");
    signals.on_connected();

    // The session lives on its own task; the controller learns it ended
    // through the close signal.
    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => {
                    signals.on_close(Some(close_code::GOING_AWAY), "server closed the socket");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    signals.on_error(e.to_string());
                    signals.on_close(Some(close_code::ABNORMAL_CLOSURE), e.to_string());
                    return;
                }
            }
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,relink=debug")),
        )
        .init();

    let port: u16 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 3002,
    };

    let config = ReconnectConfig::builder()
        .name(format!("ws://localhost:{port}/graphql"))
        .max_attempts(20)
        .connect_timeout(Duration::from_secs(40))
        .on_close(|code, kind| tracing::info!(?code, %kind, "subscription closed"))
        .on_retry(|attempt, delay| tracing::info!(attempt, ?delay, "waiting before reconnect"))
        .build();

    let controller = ReconnectController::new(config);
    let signals = controller.signals();
    let handle = controller.spawn(service_fn(move |attempt: ConnectAttempt| {
        connect(port, signals.clone(), attempt)
    }));

    let _registration = handle.on_reconnected(|| {
        for n in 1..=SUBSCRIPTIONS {
            tracing::info!(subscription = format!("messageAdded{n}"), "resubscribing");
        }
    });

    let mut skipped = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if !skipped && handle.force_retry_now() {
                    tracing::info!("retrying now");
                    skipped = true;
                    continue;
                }
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                if handle.is_finished() {
                    break;
                }
                skipped = false;
            }
        }
    }

    match handle.join().await {
        Ok(outcome) => tracing::info!(?outcome, "controller stopped"),
        Err(e) => tracing::error!(error = %e, "controller stopped"),
    }
    Ok(())
}
