use super::{EventLog, FlakyConnector, counter};
use relink::{
    AttemptError, ConnectAttempt, FixedInterval, ReconnectConfig, ReconnectController,
    ReconnectError, RunOutcome, close_code,
};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tower::service_fn;

fn fixed(delay: Duration) -> ReconnectConfig {
    ReconnectConfig::builder()
        .name("test")
        .backoff(FixedInterval::new(delay))
        .build()
}

#[tokio::test(start_paused = true)]
async fn exhausts_after_max_attempts() {
    let exhausted = Arc::new(AtomicU32::new(0));
    let e = Arc::clone(&exhausted);
    let config = ReconnectConfig::builder()
        .backoff(FixedInterval::new(Duration::from_millis(100)))
        .max_attempts(2)
        .on_exhausted(move |attempts| e.store(attempts, Ordering::SeqCst))
        .build();

    let controller = ReconnectController::new(config);
    let connector = FlakyConnector::silent(usize::MAX);
    let state = controller.state().clone();
    let log = EventLog::new();
    let _registration = controller.notifier().register(log.listener());
    let handle = controller.spawn(connector.clone());

    match handle.join().await {
        Err(ReconnectError::AttemptsExhausted { attempts, source }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(source, AttemptError::Transport(_)));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }

    assert_eq!(connector.calls(), 3);
    assert_eq!(exhausted.load(Ordering::SeqCst), 3);
    assert_eq!(log.count("AttemptFailed"), 3);
    assert_eq!(log.count("RetryScheduled"), 2);
    assert_eq!(log.count("AttemptsExhausted"), 1);
    assert!(state.is_terminated());
}

#[tokio::test(start_paused = true)]
async fn recovers_after_transient_failures() {
    let controller = ReconnectController::new(fixed(Duration::from_millis(100)));
    let signals = controller.signals();
    let connector = FlakyConnector::new(signals, 2);
    let handle = controller.spawn(connector.clone());
    let (reconnects, on_reconnected) = counter();
    let _registration = handle.on_reconnected(on_reconnected);

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(connector.calls(), 3);
    assert_eq!(handle.state().retries(), 0);
    // Refused attempts never reported a close, so this is a first connect.
    assert_eq!(reconnects.load(Ordering::SeqCst), 0);
    assert!(!handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn abrupt_close_fires_one_reconnect() {
    let controller = ReconnectController::new(fixed(Duration::from_millis(100)));
    let signals = controller.signals();
    let connector = FlakyConnector::new(signals.clone(), 0);
    let handle = controller.spawn(connector.clone());
    let (reconnects, on_reconnected) = counter();
    let _registration = handle.on_reconnected(on_reconnected);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(connector.calls(), 1);
    assert_eq!(reconnects.load(Ordering::SeqCst), 0);

    signals.on_close(Some(close_code::ABNORMAL_CLOSURE), "");
    signals.on_close(None, "");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(connector.calls(), 2);
    assert_eq!(reconnects.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state().reconnections(), 1);
}

#[tokio::test(start_paused = true)]
async fn graceful_close_reconnects_without_notification() {
    let controller = ReconnectController::new(fixed(Duration::from_millis(100)));
    let signals = controller.signals();
    let connector = FlakyConnector::new(signals.clone(), 0);
    let handle = controller.spawn(connector.clone());
    let (reconnects, on_reconnected) = counter();
    let _registration = handle.on_reconnected(on_reconnected);

    tokio::time::sleep(Duration::from_millis(10)).await;
    signals.on_close(Some(close_code::NORMAL_CLOSURE), "bye");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(connector.calls(), 2);
    assert_eq!(reconnects.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn event_stream_orders_connected_before_reconnected() {
    let controller = ReconnectController::new(fixed(Duration::from_millis(100)));
    let signals = controller.signals();
    let handle = controller.spawn(FlakyConnector::new(signals.clone(), 0));
    let log = EventLog::new();
    let _registration = handle.register(log.listener());

    tokio::time::sleep(Duration::from_millis(10)).await;
    signals.on_close(Some(close_code::INTERNAL_ERROR), "");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        log.types(),
        vec![
            "Connecting",
            "Connected",
            "Closed",
            "RetryScheduled",
            "Connecting",
            "Connected",
            "Reconnected",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn graceful_close_can_stop_the_controller() {
    let config = ReconnectConfig::builder()
        .backoff(FixedInterval::new(Duration::from_millis(100)))
        .reconnect_on_graceful_close(false)
        .build();
    let controller = ReconnectController::new(config);
    let signals = controller.signals();
    let connector = FlakyConnector::new(signals.clone(), 0);
    let handle = controller.spawn(connector.clone());

    tokio::time::sleep(Duration::from_millis(10)).await;
    signals.on_close(Some(close_code::NORMAL_CLOSURE), "");

    assert_eq!(handle.join().await.unwrap(), RunOutcome::ClosedGracefully);
    assert_eq!(connector.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn abrupt_close_reconnects_even_when_graceful_stops() {
    let config = ReconnectConfig::builder()
        .backoff(FixedInterval::new(Duration::from_millis(100)))
        .reconnect_on_graceful_close(false)
        .build();
    let controller = ReconnectController::new(config);
    let signals = controller.signals();
    let connector = FlakyConnector::new(signals.clone(), 0);
    let _handle = controller.spawn(connector.clone());

    tokio::time::sleep(Duration::from_millis(10)).await;
    signals.on_close(Some(close_code::GOING_AWAY), "restart");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(connector.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_every_sender_ends_a_live_session() {
    let controller = ReconnectController::new(fixed(Duration::from_millis(100)));
    let signals = controller.signals();
    let handle = controller.spawn(FlakyConnector::silent(0));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!handle.is_finished());
    drop(signals);

    assert_eq!(handle.join().await.unwrap(), RunOutcome::TransportDropped);
}

#[tokio::test(start_paused = true)]
async fn force_retry_now_after_floor_retries_immediately() {
    let controller = ReconnectController::new(fixed(Duration::from_secs(60)));
    let signals = controller.signals();
    let connector = FlakyConnector::new(signals, 1);
    let handle = controller.spawn(connector.clone());
    let log = EventLog::new();
    let _registration = handle.register(log.listener());

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(connector.calls(), 1);
    assert!(handle.force_retry_now());
    tokio::time::sleep(Duration::from_millis(10)).await;

    let times = connector.call_times();
    assert_eq!(times.len(), 2);
    assert_eq!(times[1] - times[0], Duration::from_secs(15));
    assert_eq!(log.count("RetryShortCircuited"), 1);
}

#[tokio::test(start_paused = true)]
async fn force_retry_now_during_floor_waits_for_floor() {
    let controller = ReconnectController::new(fixed(Duration::from_secs(60)));
    let signals = controller.signals();
    let connector = FlakyConnector::new(signals, 1);
    let handle = controller.spawn(connector.clone());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(handle.force_retry_now());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.calls(), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let times = connector.call_times();
    assert_eq!(times.len(), 2);
    assert_eq!(times[1] - times[0], Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn force_retry_now_is_ignored_for_short_waits() {
    let controller = ReconnectController::new(fixed(Duration::from_secs(5)));
    let signals = controller.signals();
    let connector = FlakyConnector::new(signals, 1);
    let handle = controller.spawn(connector.clone());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!handle.force_retry_now());
    assert!(handle.retry_now_trigger().is_none());

    tokio::time::sleep(Duration::from_secs(5)).await;
    let times = connector.call_times();
    assert_eq!(times.len(), 2);
    assert_eq!(times[1] - times[0], Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn force_retry_now_is_a_noop_while_connected() {
    let controller = ReconnectController::new(fixed(Duration::from_secs(60)));
    let signals = controller.signals();
    let handle = controller.spawn(FlakyConnector::new(signals, 0));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!handle.force_retry_now());
}

#[tokio::test(start_paused = true)]
async fn stale_trigger_does_not_cut_a_later_wait() {
    let controller = ReconnectController::new(fixed(Duration::from_secs(20)));
    let signals = controller.signals();
    let connector = FlakyConnector::new(signals, 2);
    let handle = controller.spawn(connector.clone());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let stale = handle
        .retry_now_trigger()
        .expect("first wait is interruptible");

    // First wait ends at t=20s, second attempt fails, second wait starts.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.calls(), 2);
    assert!(!stale.fire());

    tokio::time::sleep(Duration::from_secs(15)).await;
    let times = connector.call_times();
    assert_eq!(times.len(), 3);
    assert_eq!(times[2] - times[1], Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_cancels_pending_wait() {
    let controller = ReconnectController::new(fixed(Duration::from_secs(60)));
    let signals = controller.signals();
    let state = controller.state().clone();
    let connector = FlakyConnector::new(signals.clone(), usize::MAX);
    let handle = controller.spawn(connector.clone());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let trigger = handle.retry_now_trigger().expect("wait is interruptible");
    drop(handle);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.calls(), 1);
    assert!(!trigger.fire());
    assert!(state.is_terminated());
    assert!(!signals.on_connected());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_worker() {
    let controller = ReconnectController::new(fixed(Duration::from_secs(60)));
    let signals = controller.signals();
    let handle = controller.spawn(FlakyConnector::new(signals.clone(), 0));

    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.shutdown().await;

    assert!(!signals.on_close(None, "late"));
    assert!(signals.is_closed());
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_counts_as_failure() {
    let config = ReconnectConfig::builder()
        .backoff(FixedInterval::new(Duration::from_millis(100)))
        .connect_timeout(Duration::from_secs(1))
        .max_attempts(0)
        .build();
    let controller = ReconnectController::new(config);
    let handle = controller.spawn(service_fn(|_: ConnectAttempt| {
        std::future::pending::<io::Result<()>>()
    }));

    match handle.join().await {
        Err(ReconnectError::AttemptsExhausted { attempts, source }) => {
            assert_eq!(attempts, 1);
            assert!(source.is_timeout());
        }
        other => panic!("expected timeout exhaustion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn panicking_observer_does_not_stop_worker() {
    let controller = ReconnectController::new(fixed(Duration::from_millis(100)));
    let signals = controller.signals();
    let connector = FlakyConnector::new(signals.clone(), 0);
    let handle = controller.spawn(connector.clone());
    let _bad = handle.on_event(|_| panic!("observer failure"));
    let (reconnects, on_reconnected) = counter();
    let _good = handle.on_reconnected(on_reconnected);

    tokio::time::sleep(Duration::from_millis(10)).await;
    signals.on_close(None, "");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(connector.calls(), 2);
    assert_eq!(reconnects.load(Ordering::SeqCst), 1);
    assert!(!handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn unregistered_observer_misses_later_reconnects() {
    let controller = ReconnectController::new(fixed(Duration::from_millis(100)));
    let signals = controller.signals();
    let handle = controller.spawn(FlakyConnector::new(signals.clone(), 0));
    let (reconnects, on_reconnected) = counter();
    let registration = handle.on_reconnected(on_reconnected);

    tokio::time::sleep(Duration::from_millis(10)).await;
    signals.on_close(None, "");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(reconnects.load(Ordering::SeqCst), 1);

    assert!(registration.unregister());
    signals.on_close(None, "");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(reconnects.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state().reconnections(), 2);
}

#[tokio::test(start_paused = true)]
async fn close_before_connected_inside_attempt_keeps_session() {
    let controller = ReconnectController::new(fixed(Duration::from_millis(100)));
    let signals = controller.signals();
    let calls = Arc::new(AtomicU32::new(0));
    let c = Arc::clone(&calls);
    let transport = signals.clone();
    let handle = controller.spawn(service_fn(move |_: ConnectAttempt| {
        c.fetch_add(1, Ordering::SeqCst);
        transport.on_connecting();
        transport.on_close(Some(close_code::ABNORMAL_CLOSURE), "");
        transport.on_connected();
        async { Ok::<_, io::Error>(()) }
    }));

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        handle.state().connection(),
        relink::ConnectionState::Connected
    );
    assert_eq!(handle.state().reconnections(), 1);

    // The next close ends the session as usual.
    signals.on_close(None, "");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn session_closed_inside_attempt_backs_off() {
    let controller = ReconnectController::new(fixed(Duration::from_millis(100)));
    let signals = controller.signals();
    let calls = Arc::new(AtomicU32::new(0));
    let c = Arc::clone(&calls);
    let transport = signals.clone();
    let handle = controller.spawn(service_fn(move |_: ConnectAttempt| {
        let call = c.fetch_add(1, Ordering::SeqCst);
        transport.on_connected();
        if call == 0 {
            transport.on_close(Some(close_code::ABNORMAL_CLOSURE), "");
        }
        async { Ok::<_, io::Error>(()) }
    }));

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        handle.state().connection(),
        relink::ConnectionState::Connected
    );
    assert_eq!(handle.state().reconnections(), 1);
}

#[tokio::test(start_paused = true)]
async fn inline_run_honours_retry_now_slot() {
    let controller = ReconnectController::new(fixed(Duration::from_secs(60)));
    let slot = controller.retry_now_slot().clone();
    let connector = FlakyConnector::silent(1);
    let worker = tokio::spawn(controller.run(connector.clone()));

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(connector.calls(), 1);
    assert!(slot.fire());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(connector.calls(), 2);
    worker.abort();
}
