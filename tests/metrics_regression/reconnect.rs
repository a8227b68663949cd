//! Reconnect metrics regression tests

use super::helpers::*;
use relink::{ConnectAttempt, FixedInterval, ReconnectConfig, ReconnectController};
use serial_test::serial;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
#[serial]
async fn reconnect_metrics_exist() {
    init_recorder();

    let config = ReconnectConfig::builder()
        .name("test_reconnect")
        .backoff(FixedInterval::new(Duration::from_millis(10)))
        .build();
    let controller = ReconnectController::new(config);
    let signals = controller.signals();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let transport = signals.clone();
    let handle = controller.spawn(tower::service_fn(move |_: ConnectAttempt| {
        let count = calls_clone.fetch_add(1, Ordering::SeqCst);
        let transport = transport.clone();
        async move {
            if count == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            transport.on_connected();
            Ok(())
        }
    }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    signals.on_close(Some(1006), "");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_counter_exists("relink_connect_attempts_total");
    assert_metric_has_label(
        "relink_connect_attempts_total",
        "controller",
        "test_reconnect",
    );
    assert_metric_has_label("relink_connect_attempts_total", "outcome", "success");
    assert_metric_has_label("relink_connect_attempts_total", "outcome", "failure");

    assert_counter_exists("relink_closes_total");
    assert_metric_has_label("relink_closes_total", "kind", "abrupt");

    assert_counter_exists("relink_reconnections_total");
    assert_metric_has_label("relink_reconnections_total", "controller", "test_reconnect");

    assert_gauge_exists("relink_retry_count");
    assert_histogram_exists("relink_backoff_delay_seconds");
    assert_metric_has_label(
        "relink_backoff_delay_seconds",
        "controller",
        "test_reconnect",
    );

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
#[serial]
async fn reconnect_short_circuit_metrics() {
    init_recorder();

    let config = ReconnectConfig::builder()
        .name("short_circuit")
        .backoff(FixedInterval::new(Duration::from_secs(60)))
        .build();
    let controller = ReconnectController::new(config);
    let handle = controller.spawn(tower::service_fn(|_: ConnectAttempt| async {
        Err::<(), _>(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
    }));

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(handle.force_retry_now());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_counter_exists("relink_retry_short_circuits_total");
    assert_metric_has_label(
        "relink_retry_short_circuits_total",
        "controller",
        "short_circuit",
    );

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
#[serial]
async fn reconnect_exhausted_metrics() {
    init_recorder();

    let config = ReconnectConfig::builder()
        .name("exhausted_reconnect")
        .backoff(FixedInterval::new(Duration::from_millis(10)))
        .connect_timeout(Duration::from_millis(50))
        .max_attempts(1)
        .build();
    let controller = ReconnectController::new(config);
    let handle = controller.spawn(tower::service_fn(|_: ConnectAttempt| {
        std::future::pending::<io::Result<()>>()
    }));

    assert!(handle.join().await.is_err());

    assert_counter_exists("relink_attempts_exhausted_total");
    assert_metric_has_label(
        "relink_attempts_exhausted_total",
        "controller",
        "exhausted_reconnect",
    );
    assert_metric_has_label("relink_connect_attempts_total", "outcome", "timeout");
}
