//! Per-connection task shared by the server and client providers.

use std::{io, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt, future, stream::SplitSink};
use log::{debug, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    select,
    sync::mpsc,
    time::{Instant, sleep_until, timeout},
};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{
        self,
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode as WireCloseCode},
    },
};
use tokio_util::sync::CancellationToken;

use super::{
    limits::LimitSnapshot,
    session::{Outbound, TungsteniteSession},
};
use crate::{
    dispatch::Endpoint,
    error::{SocketError, TransportError},
    session::{CloseCode, CloseReason, SessionHandle},
};

/// Time allowed for the peer to answer a close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Everything the connection task owns.
pub(super) struct Connection<S> {
    pub(super) ws: WebSocketStream<S>,
    pub(super) session: Arc<TungsteniteSession>,
    pub(super) endpoint: Arc<dyn Endpoint>,
    pub(super) outbound: mpsc::UnboundedReceiver<Outbound>,
    pub(super) limits: LimitSnapshot,
    pub(super) shutdown: CancellationToken,
}

type Sink<S> = SplitSink<WebSocketStream<S>, Message>;

pub(super) fn transport_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::Io(e) => TransportError::Io(e),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => TransportError::Closed,
        other => TransportError::Protocol(other.to_string()),
    }
}

pub(super) fn close_frame(reason: &CloseReason) -> CloseFrame {
    CloseFrame {
        code: WireCloseCode::from(reason.code().as_u16()),
        reason: reason.reason().to_owned().into(),
    }
}

async fn send<S>(sink: &mut Sink<S>, message: Message, limit: Option<Duration>) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = match limit {
        Some(limit) => timeout(limit, sink.send(message))
            .await
            .map_err(|_| TransportError::Io(io::Error::new(io::ErrorKind::TimedOut, "send timed out")))?,
        None => sink.send(message).await,
    };
    result.map_err(transport_error)
}

async fn elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => future::pending().await,
    }
}

/// Pump messages between the socket and the endpoint until the connection
/// ends, then report the close.
///
/// The endpoint's `on_open` must already have run.
pub(super) async fn drive<S>(connection: Connection<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Connection {
        ws,
        session,
        endpoint,
        mut outbound,
        limits,
        shutdown,
    } = connection;
    let handle: SessionHandle = session.clone();
    let (mut sink, mut stream) = ws.split();
    let idle_deadline = || limits.idle_timeout.map(|idle| Instant::now() + idle);
    let mut deadline = idle_deadline();
    let mut closing = false;
    let mut reported: Option<CloseReason> = None;

    loop {
        let mut local_close = None;
        // A queued close outranks shutdown so the requested code reaches the peer.
        select! {
            biased;

            command = outbound.recv(), if !closing => match command {
                Some(Outbound::Message(message)) => {
                    if let Err(e) = send(&mut sink, message, limits.send_timeout).await {
                        endpoint.on_error(&handle, SocketError::Transport(e));
                    }
                }
                Some(Outbound::Close(reason)) => local_close = Some(reason),
                None => break,
            },
            () = shutdown.cancelled(), if !closing => {
                local_close = Some(CloseReason::new(CloseCode::GOING_AWAY, "shutting down"));
            }
            () = elapsed(deadline) => {
                if closing {
                    debug!("peer did not answer close frame: session={}", handle.id());
                    break;
                }
                local_close = Some(CloseReason::new(CloseCode::GOING_AWAY, "idle timeout"));
            }
            inbound = stream.next() => match inbound {
                Some(Ok(message)) => {
                    if !closing {
                        deadline = idle_deadline();
                    }
                    match message {
                        Message::Text(text) if limits.text_too_big(text.len()) => {
                            local_close = Some(CloseReason::new(CloseCode::MESSAGE_TOO_BIG, "text message too big"));
                        }
                        Message::Binary(data) if limits.binary_too_big(data.len()) => {
                            local_close = Some(CloseReason::new(CloseCode::MESSAGE_TOO_BIG, "binary message too big"));
                        }
                        // Nothing reaches the handler once a close has started.
                        Message::Text(_) | Message::Binary(_) | Message::Pong(_) if closing => {}
                        Message::Text(text) => session.deliver_text(text.as_str()),
                        Message::Binary(data) => session.deliver_binary(&data),
                        Message::Pong(payload) => session.deliver_pong(&payload),
                        Message::Ping(_) | Message::Frame(_) => {}
                        Message::Close(frame) => {
                            session.mark_closed();
                            closing = true;
                            deadline = Some(Instant::now() + CLOSE_GRACE);
                            let reason = frame.map_or_else(
                                || CloseReason::new(CloseCode::NO_STATUS_CODE, ""),
                                |f| CloseReason::new(CloseCode::new(u16::from(f.code)), f.reason.as_str()),
                            );
                            reported.get_or_insert(reason);
                        }
                    }
                }
                Some(Err(e)) => {
                    if !closing {
                        warn!("connection failed: session={}, error={e}", handle.id());
                        session.mark_closed();
                        endpoint.on_error(&handle, SocketError::Transport(transport_error(e)));
                    }
                    reported.get_or_insert(CloseReason::new(CloseCode::CLOSED_ABNORMALLY, ""));
                    break;
                }
                None => break,
            },
        }

        if let Some(reason) = local_close.filter(|_| !closing) {
            session.mark_closed();
            closing = true;
            deadline = Some(Instant::now() + CLOSE_GRACE);
            if let Err(e) = send(&mut sink, Message::Close(Some(close_frame(&reason))), limits.send_timeout).await {
                debug!("failed to send close frame: session={}, error={e}", handle.id());
                reported.get_or_insert(reason);
                break;
            }
            reported.get_or_insert(reason);
        }
    }

    session.mark_closed();
    let reason = reported.unwrap_or_else(|| CloseReason::new(CloseCode::CLOSED_ABNORMALLY, ""));
    debug!("connection closed: session={}, reason={reason}", handle.id());
    endpoint.on_close(&handle, &reason);
}
