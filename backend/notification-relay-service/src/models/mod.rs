use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a logged-in user, as issued by the upstream application.
///
/// Upstream may encode it as a JSON number or a string; both normalize to the
/// same textual form so `42` and `"42"` address the same channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawUserId", into = "String")]
pub struct UserId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUserId {
    Text(String),
    Number(serde_json::Number),
}

impl TryFrom<RawUserId> for UserId {
    type Error = String;

    fn try_from(raw: RawUserId) -> Result<Self, Self::Error> {
        let value = match raw {
            RawUserId::Text(s) => s,
            RawUserId::Number(n) => n.to_string(),
        };
        if value.contains('/') {
            return Err(format!("user id '{}' contains a channel delimiter", value));
        }
        Ok(UserId(value))
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        UserId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `{"userId": ...}` as written by the upstream application, both into the
/// credential store and as the delegated lookup response body.
#[derive(Debug, Deserialize)]
pub struct IdentityRecord {
    #[serde(rename = "userId", default)]
    user_id: Option<UserId>,
}

impl IdentityRecord {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// `None` for a missing, null or empty `userId`.
    pub fn into_user_id(self) -> Option<UserId> {
        self.user_id.filter(|id| !id.as_str().is_empty())
    }
}

/// Broker channel carrying one user's notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationChannel(String);

impl NotificationChannel {
    pub fn for_user(user_id: &UserId) -> Self {
        NotificationChannel(format!("/app/user/{}/notifications", user_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
