/// WebSocket transport for notification sessions
///
/// Endpoint: GET /io/user/notifications
///
/// Frames are decoded into [`ClientEvent`]s and fed to a
/// [`ConnectionSession`]; everything the session emits is written back as a
/// text frame. The handler also owns heartbeats and the close handshake.
use actix_web::{http::header::COOKIE, web, Error, HttpRequest, HttpResponse};
use actix_ws::{CloseCode, CloseReason, Message, MessageStream, Session};
use futures_util::StreamExt;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::state::AppState;
use crate::websocket::{ClientEvent, ConnectionId, ConnectionSession, ServerEvent, SessionExit};

pub const NOTIFICATIONS_PATH: &str = "/io/user/notifications";

pub async fn notifications_ws(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let connection_id = ConnectionId::new();
    let cookies = req
        .headers()
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let peer = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    let (response, session, frames) = actix_ws::handle(&req, stream)?;

    info!(
        connection_id = %connection_id,
        peer = %peer,
        has_cookies = cookies.is_some(),
        "realtime connection opened"
    );

    let state = state.get_ref().clone();
    actix_web::rt::spawn(async move {
        metrics::ACTIVE_CONNECTIONS.inc();
        drive_connection(connection_id, state, cookies, session, frames).await;
        metrics::ACTIVE_CONNECTIONS.dec();
        info!(connection_id = %connection_id, "realtime connection closed");
    });

    Ok(response)
}

enum Ending {
    Relay(SessionExit),
    Client(Option<CloseReason>),
}

async fn drive_connection(
    connection_id: ConnectionId,
    state: AppState,
    cookies: Option<String>,
    mut ws: Session,
    mut frames: MessageStream,
) {
    let heartbeat_interval = state.config.heartbeat_interval;
    let client_timeout = state.config.client_timeout;

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ClientEvent>();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let relay = ConnectionSession::new(connection_id, state, cookies, outbound_tx)
        .run(UnboundedReceiverStream::new(inbound_rx));
    tokio::pin!(relay);

    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    let mut last_seen = Instant::now();

    let ending = loop {
        tokio::select! {
            exit = &mut relay => break Ending::Relay(exit),

            Some(event) = outbound_rx.recv() => {
                if send_event(&mut ws, &event).await.is_err() {
                    break Ending::Client(None);
                }
            }

            frame = frames.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    last_seen = Instant::now();
                    match ClientEvent::from_json(&text) {
                        Ok(event) => {
                            let _ = inbound_tx.send(event);
                        }
                        Err(e) => {
                            warn!(connection_id = %connection_id, error = %e, "ignoring client frame");
                        }
                    }
                }
                Some(Ok(Message::Ping(bytes))) => {
                    last_seen = Instant::now();
                    if ws.pong(&bytes).await.is_err() {
                        break Ending::Client(None);
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    last_seen = Instant::now();
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!(connection_id = %connection_id, "ignoring binary frame");
                }
                Some(Ok(Message::Close(reason))) => {
                    debug!(connection_id = %connection_id, ?reason, "client requested close");
                    break Ending::Client(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(connection_id = %connection_id, error = %e, "websocket protocol error");
                    break Ending::Client(None);
                }
                None => break Ending::Client(None),
            },

            _ = heartbeat.tick() => {
                if last_seen.elapsed() > client_timeout {
                    warn!(connection_id = %connection_id, "client heartbeat timed out");
                    break Ending::Client(Some(CloseReason {
                        code: CloseCode::Normal,
                        description: Some("Heartbeat timeout".into()),
                    }));
                }
                if ws.ping(b"").await.is_err() {
                    break Ending::Client(None);
                }
            }
        }
    };

    let close_reason = match ending {
        Ending::Client(reason) => {
            // Ending the inbound stream makes the session release its subscription.
            drop(inbound_tx);
            let _ = (&mut relay).await;
            reason
        }
        Ending::Relay(exit) => {
            while let Ok(event) = outbound_rx.try_recv() {
                if send_event(&mut ws, &event).await.is_err() {
                    break;
                }
            }
            close_reason_for(exit)
        }
    };

    let _ = ws.close(close_reason).await;
}

fn close_reason_for(exit: SessionExit) -> Option<CloseReason> {
    match exit {
        SessionExit::ClientDisconnected => None,
        SessionExit::BrokerConnectionLost => Some(CloseReason {
            code: CloseCode::Away,
            description: Some("Notification channel lost".into()),
        }),
    }
}

async fn send_event(ws: &mut Session, event: &ServerEvent) -> Result<(), actix_ws::Closed> {
    match event.to_json() {
        Ok(json) => ws.text(json).await,
        Err(e) => {
            warn!(error = %e, "failed to serialize server event");
            Ok(())
        }
    }
}

/// Register the realtime endpoint
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(NOTIFICATIONS_PATH, web::get().to(notifications_ws));
}
