use crate::{
    config::Config,
    services::{Broker, CredentialStore},
};
use std::sync::Arc;

/// Shared, read-only context handed to every connection.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn CredentialStore>,
    pub broker: Arc<dyn Broker>,
    /// Client for the delegated identity lookup.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn CredentialStore>,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self {
            config,
            store,
            broker,
            http: reqwest::Client::new(),
        }
    }
}
