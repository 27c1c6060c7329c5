use crate::error::AppError;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CREDENTIAL_PREFIX: &str = "cookie-";
pub const DEFAULT_DELEGATED_LOOKUP_URL: &str = "http://localhost:3333/python/currentUserId/";

/// What a live session does when its dedicated broker connection drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrokerErrorPolicy {
    /// Log the failure and keep the client connection open. The client is not
    /// told; it receives nothing until it sends a new subscription request.
    #[default]
    Log,
    /// Send `SUBSCRIPTION_ERROR` to the client, then close its connection.
    Disconnect,
}

impl FromStr for BrokerErrorPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(BrokerErrorPolicy::Log),
            "disconnect" => Ok(BrokerErrorPolicy::Disconnect),
            other => Err(AppError::Config(format!(
                "BROKER_ERROR_POLICY must be 'log' or 'disconnect', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub redis_url: String,
    /// Prepended to the client token to form the credential store key.
    pub credential_prefix: String,
    /// `None` disables subscribe-by-cookies.
    pub delegated_lookup_url: Option<String>,
    pub broker_error_policy: BrokerErrorPolicy,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            credential_prefix: DEFAULT_CREDENTIAL_PREFIX.to_string(),
            delegated_lookup_url: Some(DEFAULT_DELEGATED_LOOKUP_URL.to_string()),
            broker_error_policy: BrokerErrorPolicy::Log,
            heartbeat_interval: Duration::from_secs(25),
            client_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| AppError::Config(format!("PORT '{}' is invalid: {}", raw, e)))?,
            None => defaults.port,
        };

        // Empty string is meaningful here: it switches delegated lookup off.
        let delegated_lookup_url = match lookup("SUBSCRIBE_BY_COOKIES_URL") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().to_string()),
            None => defaults.delegated_lookup_url,
        };

        let broker_error_policy = match lookup("BROKER_ERROR_POLICY") {
            Some(raw) => raw.parse()?,
            None => defaults.broker_error_policy,
        };

        let heartbeat_interval =
            parse_secs(&lookup, "WS_HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval)?;
        let client_timeout =
            parse_secs(&lookup, "WS_CLIENT_TIMEOUT_SECS", defaults.client_timeout)?;
        if client_timeout <= heartbeat_interval {
            return Err(AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must be greater than WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            credential_prefix: lookup("UUIDCOOKIE_PREFIX").unwrap_or(defaults.credential_prefix),
            delegated_lookup_url,
            broker_error_policy,
            heartbeat_interval,
            client_timeout,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| AppError::Config(format!("{} '{}' is invalid: {}", key, raw, e)))?;
            if secs == 0 {
                return Err(AppError::Config(format!("{} must be positive", key)));
            }
            Ok(Duration::from_secs(secs))
        }
        None => Ok(default),
    }
}
