//! Tests for the message dispatch adapter.
//!
//! Sessions are driven in memory so each test controls exactly which
//! fragments arrive and in what order.

use std::sync::Arc;

use rstest::{fixture, rstest};
use wsbridge::{
    CloseCode,
    CloseReason,
    Delivery,
    Dispatcher,
    Endpoint,
    Session,
    SessionHandle,
    TransportError,
};
use wsbridge_testing::{Event, Fault, LoggerHandle, MemorySession, RecordingHandler, logger};

struct Harness {
    handler: Arc<RecordingHandler>,
    endpoint: Arc<dyn Endpoint>,
    session: Arc<MemorySession>,
}

impl Harness {
    fn new(handler: RecordingHandler) -> Self {
        let handler = Arc::new(handler);
        Self {
            endpoint: Arc::new(Dispatcher::new(Arc::clone(&handler))),
            handler,
            session: MemorySession::new(),
        }
    }

    fn handle(&self) -> SessionHandle { self.session.clone() }

    fn open(self) -> Self {
        self.endpoint.on_open(&self.handle());
        self
    }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single-line rstest fixtures"
)]
#[fixture]
fn opened() -> Harness { Harness::new(RecordingHandler::new()).open() }

#[rstest]
fn whole_mode_delivers_one_message_per_logical_message(opened: Harness) {
    assert_eq!(opened.session.delivery(), Some(Delivery::Whole));

    opened.session.receive_text_fragment("hel", false);
    opened.session.receive_text_fragment("lo", true);
    opened.session.receive_binary_fragment(&[1, 2], false);
    opened.session.receive_binary_fragment(&[3], true);

    assert_eq!(
        opened.handler.events(),
        [
            Event::Open,
            Event::Text("hello".into(), true),
            Event::Binary(vec![1, 2, 3], true),
        ]
    );
}

#[test]
fn partial_mode_forwards_each_fragment() {
    let harness = Harness::new(RecordingHandler::new().partial()).open();
    assert_eq!(harness.session.delivery(), Some(Delivery::Partial));

    harness.session.receive_text_fragment("hel", false);
    harness.session.receive_text_fragment("lo", true);
    harness.session.receive_binary_fragment(&[9], false);
    harness.session.receive_binary_fragment(&[], true);

    assert_eq!(
        harness.handler.events(),
        [
            Event::Open,
            Event::Text("hel".into(), false),
            Event::Text("lo".into(), true),
            Event::Binary(vec![9], false),
            Event::Binary(vec![], true),
        ]
    );
}

#[rstest]
fn pong_payload_reaches_handler(opened: Harness) {
    opened.session.receive_pong(b"beat");
    assert_eq!(opened.handler.events().last(), Some(&Event::Pong(b"beat".to_vec())));
}

#[test]
fn handler_can_reply_through_session() {
    let harness = Harness::new(RecordingHandler::new().echoing()).open();
    harness.session.receive_text("ping");
    harness.session.receive_binary(&[0xde, 0xad]);
    assert_eq!(harness.session.sent_text(), ["ping"]);
    assert_eq!(harness.session.sent_binary(), [vec![0xde, 0xad]]);
}

#[rstest]
#[case(Fault::Error)]
#[case(Fault::Panic)]
fn open_failure_closes_once_with_unexpected_condition(#[case] fault: Fault) {
    let harness = Harness::new(RecordingHandler::new().open_fault(fault)).open();

    let closes = harness.session.closes();
    assert_eq!(closes, [CloseReason::unexpected_condition()]);
    assert_eq!(closes[0].code(), CloseCode::UNEXPECTED_CONDITION);
    assert!(!harness.session.is_open());
    assert_eq!(harness.handler.count(|e| matches!(e, Event::Error(_))), 0);
}

#[test]
fn open_failure_on_closed_session_sends_nothing() {
    let harness = Harness::new(RecordingHandler::new().open_fault(Fault::Error));
    harness.session.drop_connection();
    let harness = harness.open();
    assert!(harness.session.closes().is_empty());
}

#[rstest]
#[case::close_error(false)]
#[case::close_panic(true)]
fn failing_close_after_open_failure_is_swallowed(#[case] panic: bool) {
    let harness = Harness::new(RecordingHandler::new().open_fault(Fault::Error));
    if panic {
        harness.session.panic_on_close();
    } else {
        harness.session.fail_closes();
    }
    let harness = harness.open();
    assert_eq!(harness.session.closes().len(), 1);
}

#[test]
fn message_panic_is_reported_to_error_callback() {
    let harness = Harness::new(RecordingHandler::new().panicking_on_text()).open();
    harness.session.receive_text("boom");

    let errors: Vec<_> = harness
        .handler
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Error(message) => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("on_text panicked on purpose"), "{errors:?}");
    assert!(harness.session.closes().is_empty());
}

#[rstest]
#[case(Fault::Error)]
#[case(Fault::Panic)]
fn error_callback_failure_closes_session(#[case] fault: Fault) {
    let harness = Harness::new(RecordingHandler::new().panicking_on_text().error_fault(fault)).open();
    harness.session.receive_text("boom");
    assert_eq!(harness.session.closes(), [CloseReason::unexpected_condition()]);
}

#[rstest]
fn transport_errors_reach_error_callback(opened: Harness) {
    opened
        .endpoint
        .on_error(&opened.handle(), TransportError::Protocol("bad frame".into()).into());
    assert_eq!(
        opened.handler.events().last(),
        Some(&Event::Error("protocol error: bad frame".into()))
    );
    assert!(opened.session.closes().is_empty());
}

#[rstest]
fn close_callback_sees_reason(opened: Harness) {
    let reason = CloseReason::new(CloseCode::GOING_AWAY, "bye");
    opened.endpoint.on_close(&opened.handle(), &reason);
    assert_eq!(opened.handler.events().last(), Some(&Event::Close(reason)));
}

#[test]
fn endpoint_reports_handler_type() {
    let harness = Harness::new(RecordingHandler::new());
    assert!(harness.endpoint.handler_type().ends_with("RecordingHandler"));
}

#[rstest]
fn open_failure_is_logged(mut logger: LoggerHandle) {
    let _harness = Harness::new(RecordingHandler::new().open_fault(Fault::Error)).open();
    assert!(logger.contains(log::Level::Error, "closing session due to handler failure"));
}
