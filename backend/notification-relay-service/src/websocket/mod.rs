/// Realtime notification connections
///
/// Architecture:
/// 1. messages: event envelopes exchanged with the browser
/// 2. session: one task per connection binding it to a user's channel
/// 3. handlers::websocket: actix-ws transport feeding the session
pub mod messages;
pub mod session;

pub use messages::{ClientEvent, InternalEvent, ProtocolError, ServerEvent, SuccessCode};
pub use session::{ConnectionSession, SessionExit};

use std::fmt;
use uuid::Uuid;

/// Unique identifier for a realtime connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
