//! One realtime connection, from handshake to disconnect.
//!
//! ```text
//! Connected --request--> ResolvingIdentity --ok--> Subscribed --disconnect--> Closed
//!     ^                        |
//!     +-------- failure -------+
//! ```
//!
//! A failed resolution never leaves a subscription behind and returns the
//! connection to `Connected`, so the browser may retry on the same socket.

use futures_util::future::BoxFuture;
use futures_util::{Stream, StreamExt};
use std::future;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{ClientEvent, ConnectionId, ServerEvent};
use crate::config::BrokerErrorPolicy;
use crate::error::{ErrorCode, ResolveError};
use crate::metrics;
use crate::models::{NotificationChannel, UserId};
use crate::services::resolver::{self, ResolutionRequest};
use crate::services::{BrokerEvent, ChannelSubscription};
use crate::state::AppState;

type PendingResolution = BoxFuture<'static, Result<UserId, ResolveError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    Connected,
    ResolvingIdentity,
    Subscribed,
    Closed,
}

/// Why [`ConnectionSession::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The client went away (inbound stream ended).
    ClientDisconnected,
    /// The broker connection dropped and policy asked to close the client.
    BrokerConnectionLost,
}

pub struct ConnectionSession {
    id: ConnectionId,
    state: AppState,
    /// Raw `Cookie` header from the handshake.
    cookies: Option<String>,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    phase: SessionPhase,
    resolving: Option<PendingResolution>,
    subscription: Option<ChannelSubscription>,
}

impl ConnectionSession {
    pub fn new(
        id: ConnectionId,
        state: AppState,
        cookies: Option<String>,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            id,
            state,
            cookies,
            outbound,
            phase: SessionPhase::Connected,
            resolving: None,
            subscription: None,
        }
    }

    /// Drive the connection until the client leaves or the broker policy
    /// ends it. The subscription, if any, is released before returning.
    pub async fn run<S>(mut self, mut inbound: S) -> SessionExit
    where
        S: Stream<Item = ClientEvent> + Unpin,
    {
        let exit = loop {
            tokio::select! {
                event = inbound.next() => match event {
                    Some(event) => self.handle_client_event(event),
                    None => break SessionExit::ClientDisconnected,
                },
                outcome = pending_resolution(&mut self.resolving) => {
                    self.resolving = None;
                    self.finish_resolution(outcome).await;
                }
                event = next_broker_event(&mut self.subscription) => {
                    if let Some(exit) = self.handle_broker_event(event).await {
                        break exit;
                    }
                }
            }
        };

        self.close().await;
        exit
    }

    fn handle_client_event(&mut self, event: ClientEvent) {
        if self.phase != SessionPhase::Connected {
            warn!(
                connection_id = %self.id,
                event = event.name(),
                phase = ?self.phase,
                "ignoring subscription request; connection already bound or binding"
            );
            return;
        }

        info!(connection_id = %self.id, event = event.name(), "subscription requested");

        let request = match event {
            ClientEvent::SubscribeToNotifications { uuid } => {
                ResolutionRequest::Credential { token: uuid }
            }
            ClientEvent::SubscribeToNotificationsByCookies => ResolutionRequest::Cookies {
                header: self.cookies.clone(),
            },
        };

        let state = self.state.clone();
        self.resolving = Some(Box::pin(async move {
            resolver::resolve(&state, request).await
        }));
        self.phase = SessionPhase::ResolvingIdentity;
    }

    async fn finish_resolution(&mut self, outcome: Result<UserId, ResolveError>) {
        match outcome {
            Ok(user_id) => self.bind(user_id).await,
            Err(err) => {
                info!(
                    connection_id = %self.id,
                    code = %err.code(),
                    error = %err,
                    "identity resolution failed"
                );
                self.fail(err.code(), err.client_message());
            }
        }
    }

    async fn bind(&mut self, user_id: UserId) {
        let channel = NotificationChannel::for_user(&user_id);

        match self.state.broker.subscribe(&channel).await {
            Ok(subscription) => {
                info!(
                    connection_id = %self.id,
                    user_id = %user_id,
                    channel = %channel,
                    "connection subscribed to notifications"
                );
                self.subscription = Some(subscription);
                self.phase = SessionPhase::Subscribed;
                self.emit(ServerEvent::subscription_ok());
            }
            Err(e) => {
                error!(
                    connection_id = %self.id,
                    channel = %channel,
                    error = %e,
                    "failed to open channel subscription"
                );
                self.fail(ErrorCode::SubscriptionError, "Subscription to pub/sub failed.");
            }
        }
    }

    async fn handle_broker_event(&mut self, event: Option<BrokerEvent>) -> Option<SessionExit> {
        let reason = match event {
            Some(BrokerEvent::Message(payload)) => {
                debug!(connection_id = %self.id, bytes = payload.len(), "forwarding notification");
                metrics::NOTIFICATIONS_FORWARDED.inc();
                self.emit(ServerEvent::notification(payload));
                return None;
            }
            Some(BrokerEvent::ConnectionLost(reason)) => reason,
            None => "subscription stream ended".to_string(),
        };

        error!(
            connection_id = %self.id,
            reason = %reason,
            policy = ?self.state.config.broker_error_policy,
            "broker connection lost"
        );

        if let Some(subscription) = self.subscription.take() {
            subscription.close().await;
        }

        match self.state.config.broker_error_policy {
            BrokerErrorPolicy::Log => {
                warn!(
                    connection_id = %self.id,
                    "client connection stays open without a subscription until it subscribes again"
                );
                self.phase = SessionPhase::Connected;
                None
            }
            BrokerErrorPolicy::Disconnect => {
                metrics::record_subscription_failure(ErrorCode::SubscriptionError);
                self.emit(ServerEvent::error(
                    ErrorCode::SubscriptionError,
                    "Notification channel connection lost.",
                ));
                Some(SessionExit::BrokerConnectionLost)
            }
        }
    }

    fn fail(&mut self, code: ErrorCode, message: &str) {
        metrics::record_subscription_failure(code);
        self.emit(ServerEvent::error(code, message));
        self.phase = SessionPhase::Connected;
    }

    fn emit(&self, event: ServerEvent) {
        if self.outbound.send(event).is_err() {
            debug!(connection_id = %self.id, "client writer gone; dropping event");
        }
    }

    async fn close(&mut self) {
        self.phase = SessionPhase::Closed;
        self.resolving = None;
        if let Some(subscription) = self.subscription.take() {
            let channel = subscription.channel().clone();
            subscription.close().await;
            info!(connection_id = %self.id, channel = %channel, "subscription released");
        }
    }
}

async fn pending_resolution(pending: &mut Option<PendingResolution>) -> Result<UserId, ResolveError> {
    match pending.as_mut() {
        Some(resolution) => resolution.await,
        None => future::pending().await,
    }
}

async fn next_broker_event(subscription: &mut Option<ChannelSubscription>) -> Option<BrokerEvent> {
    match subscription.as_mut() {
        Some(subscription) => subscription.next_event().await,
        None => future::pending().await,
    }
}
