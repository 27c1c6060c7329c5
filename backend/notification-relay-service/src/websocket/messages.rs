/// Event envelopes exchanged over the realtime connection
///
/// Every text frame is `{"event": <name>, "data": <payload>}`.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorCode;

pub const SUBSCRIBE_EVENT: &str = "subscribe-to-notifications";
pub const SUBSCRIBE_BY_COOKIES_EVENT: &str = "subscribe-to-notifications-by-cookies";

/// Events sent by the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Bind using a one-time credential
    SubscribeToNotifications { uuid: String },
    /// Bind using the cookies sent with the handshake
    SubscribeToNotificationsByCookies,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not an event envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("invalid payload for '{event}': {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct CredentialPayload {
    uuid: String,
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;

        match envelope.event.as_str() {
            SUBSCRIBE_EVENT => {
                let payload: CredentialPayload =
                    serde_json::from_value(envelope.data).map_err(|source| {
                        ProtocolError::InvalidPayload {
                            event: envelope.event.clone(),
                            source,
                        }
                    })?;
                Ok(ClientEvent::SubscribeToNotifications { uuid: payload.uuid })
            }
            // Any payload is ignored; the cookies come from the handshake.
            SUBSCRIBE_BY_COOKIES_EVENT => Ok(ClientEvent::SubscribeToNotificationsByCookies),
            _ => Err(ProtocolError::UnknownEvent(envelope.event)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::SubscribeToNotifications { .. } => SUBSCRIBE_EVENT,
            ClientEvent::SubscribeToNotificationsByCookies => SUBSCRIBE_BY_COOKIES_EVENT,
        }
    }
}

/// Events pushed to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Message published on the user's channel, forwarded untouched
    Notification { message: String },
    /// Outcome of a subscription request
    Internal(InternalEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuccessCode {
    SubscriptionOk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InternalEvent {
    Success { code: SuccessCode, message: String },
    Error { code: ErrorCode, message: String },
}

impl ServerEvent {
    pub fn notification(message: impl Into<String>) -> Self {
        ServerEvent::Notification {
            message: message.into(),
        }
    }

    pub fn subscription_ok() -> Self {
        ServerEvent::Internal(InternalEvent::Success {
            code: SuccessCode::SubscriptionOk,
            message: "Subscription to pub/sub ok.".to_string(),
        })
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerEvent::Internal(InternalEvent::Error {
            code,
            message: message.into(),
        })
    }

    /// Error code carried by this event, if it reports a failure.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ServerEvent::Internal(InternalEvent::Error { code, .. }) => Some(*code),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
