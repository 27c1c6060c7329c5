use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Process-level failures: configuration and startup.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),
}

/// Credential store access failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure to open or hold a dedicated broker subscription.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Error codes carried by `internal` error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UserIdRetrievalReturnedError,
    UseridIsNull,
    SubscribeByCookiesError,
    SubscriptionError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UserIdRetrievalReturnedError => "USER_ID_RETRIEVAL_RETURNED_ERROR",
            ErrorCode::UseridIsNull => "USERID_IS_NULL",
            ErrorCode::SubscribeByCookiesError => "SUBSCRIBE_BY_COOKIES_ERROR",
            ErrorCode::SubscriptionError => "SUBSCRIPTION_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an identity could not be resolved for a connection.
///
/// Every variant maps onto exactly one client-visible [`ErrorCode`]; the
/// variants are kept finer than the codes so logs say what actually happened.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("credential lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("credential record is malformed: {0}")]
    MalformedRecord(String),

    #[error("no user id bound to credential")]
    MissingUserId,

    #[error("delegated lookup is not configured")]
    DelegatedLookupUnavailable,

    #[error("delegated lookup request failed: {0}")]
    DelegatedTransport(String),

    #[error("delegated lookup returned status {0}")]
    DelegatedStatus(u16),

    #[error("delegated lookup returned a malformed body: {0}")]
    DelegatedMalformedBody(String),
}

impl ResolveError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ResolveError::Store(_) | ResolveError::MalformedRecord(_) => {
                ErrorCode::UserIdRetrievalReturnedError
            }
            ResolveError::MissingUserId => ErrorCode::UseridIsNull,
            ResolveError::DelegatedLookupUnavailable
            | ResolveError::DelegatedTransport(_)
            | ResolveError::DelegatedStatus(_)
            | ResolveError::DelegatedMalformedBody(_) => ErrorCode::SubscribeByCookiesError,
        }
    }

    /// Text sent to the browser alongside [`ResolveError::code`].
    pub fn client_message(&self) -> &'static str {
        match self {
            ResolveError::Store(_) => "Error detected when trying to get user id.",
            ResolveError::MalformedRecord(_) => "User id record is malformed.",
            ResolveError::MissingUserId => "Couldn't get userId.",
            ResolveError::DelegatedLookupUnavailable => {
                "Subscribe by cookies isn't available in the server."
            }
            ResolveError::DelegatedTransport(_) => "Server returned error",
            ResolveError::DelegatedStatus(_) => "Server returned != 200",
            ResolveError::DelegatedMalformedBody(_) => "Server returned an invalid body",
        }
    }
}
