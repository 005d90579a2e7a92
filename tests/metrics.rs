#![cfg(feature = "metrics")]
//! Tests for `wsbridge` metrics.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use wsbridge::{
    Dispatcher,
    Endpoint,
    EndpointRegistration,
    Registry,
    SessionHandle,
    SocketConfig,
    handler::shared,
    metrics::{self as ws_metrics, Phase},
};
use wsbridge_testing::{Fault, MemoryContainer, MemorySession, RecordingHandler};

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(k, _, _, _)| {
            k.key().name() == name
                && label.is_none_or(|(key, value)| {
                    k.key().labels().any(|l| l.key() == key && l.value() == value)
                })
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

#[test]
fn registered_endpoints_are_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let server = MemoryContainer::new();
    server.reject_path("/rejected");

    metrics::with_local_recorder(&recorder, || {
        let mut registry = Registry::new(SocketConfig::default());
        for path in ["/a", "/b", "/rejected"] {
            registry
                .register_server(
                    EndpointRegistration::builder(path)
                        .handler(shared(RecordingHandler::new()))
                        .expect("valid registration"),
                )
                .expect("unique path");
        }
        registry.on_container_ready(server.clone());
    });

    assert_eq!(counter(&snapshotter, ws_metrics::ENDPOINTS_REGISTERED, None), 2);
}

#[rstest]
#[case(Fault::Error)]
#[case(Fault::Panic)]
fn open_failures_are_counted_by_phase(#[case] fault: Fault) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let session = MemorySession::new();
    let handle: SessionHandle = session.clone();
    let endpoint = Dispatcher::new(Arc::new(RecordingHandler::new().open_fault(fault)));

    metrics::with_local_recorder(&recorder, || endpoint.on_open(&handle));

    assert_eq!(
        counter(&snapshotter, ws_metrics::HANDLER_ERRORS, Some(("phase", Phase::Open.as_str()))),
        1
    );
}

#[test]
fn message_panics_are_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let session = MemorySession::new();
    let handle: SessionHandle = session.clone();
    let endpoint = Dispatcher::new(Arc::new(RecordingHandler::new().panicking_on_text()));
    endpoint.on_open(&handle);

    metrics::with_local_recorder(&recorder, || {
        session.receive_text("one");
        session.receive_text("two");
    });

    assert_eq!(
        counter(&snapshotter, ws_metrics::HANDLER_ERRORS, Some(("phase", "message"))),
        2
    );
}

#[test]
fn connection_gauge_tracks_adopted_sessions() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        ws_metrics::inc_client_connections();
        ws_metrics::inc_client_connections();
        ws_metrics::dec_client_connections();
    });

    let value = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(k, _, _, _)| k.key().name() == ws_metrics::CLIENT_CONNECTIONS_ACTIVE)
        .map(|(_, _, _, v)| v);
    assert!(
        matches!(value, Some(DebugValue::Gauge(g)) if (g.into_inner() - 1.0).abs() < f64::EPSILON),
        "unexpected gauge value: {value:?}"
    );
}

#[rstest]
#[case(1)]
#[case(3)]
fn connect_failures_are_counted(#[case] expected: u64) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        (0..expected).for_each(|_| ws_metrics::inc_connect_failures());
    });
    assert_eq!(counter(&snapshotter, ws_metrics::CONNECT_FAILURES, None), expected);
}
