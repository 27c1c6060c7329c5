//! In-memory credential store and broker used by the integration tests.
#![allow(dead_code)]

pub mod websocket;

use async_trait::async_trait;
use notification_relay_service::config::{BrokerErrorPolicy, Config};
use notification_relay_service::error::{BrokerError, StoreError};
use notification_relay_service::models::NotificationChannel;
use notification_relay_service::services::{
    Broker, BrokerEvent, ChannelSubscription, CredentialStore,
};
use notification_relay_service::websocket::{
    ClientEvent, ConnectionId, ConnectionSession, ServerEvent, SessionExit,
};
use notification_relay_service::AppState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
    lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Poll until `key` disappears; the delete runs in the background.
    pub async fn wait_until_deleted(&self, key: &str) -> bool {
        for _ in 0..100 {
            if !self.contains(key) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn lookup(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Store whose lookups start but never finish.
#[derive(Default)]
pub struct StalledStore {
    lookups: AtomicUsize,
}

impl StalledStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub async fn wait_for_lookup(&self) -> bool {
        for _ in 0..100 {
            if self.lookups() > 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait]
impl CredentialStore for StalledStore {
    async fn lookup(&self, _key: &str) -> Result<Option<String>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Pub/sub fake: one broadcast channel per broker channel, one receiver per
/// subscription, mirroring a dedicated connection per subscriber.
#[derive(Default)]
pub struct MemoryBroker {
    channels: Mutex<HashMap<String, broadcast::Sender<BrokerEvent>>>,
    failing: AtomicBool,
    subscribe_calls: AtomicUsize,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<BrokerEvent> {
        self.channels
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    /// Returns how many live subscriptions received the message.
    pub fn publish(&self, channel: &str, payload: &str) -> usize {
        self.sender(channel)
            .send(BrokerEvent::Message(payload.to_string()))
            .unwrap_or(0)
    }

    /// Simulate the dedicated connections for `channel` dropping.
    pub fn break_connections(&self, channel: &str) -> usize {
        self.sender(channel)
            .send(BrokerEvent::ConnectionLost("connection reset".to_string()))
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Subscribe attempts, successful or not.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn subscribe(
        &self,
        channel: &NotificationChannel,
    ) -> Result<ChannelSubscription, BrokerError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("connection refused".into()));
        }

        let mut source = self.sender(channel.as_str()).subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = source.recv() => match event {
                        Ok(event) => {
                            let lost = matches!(event, BrokerEvent::ConnectionLost(_));
                            if tx.send(event).is_err() || lost {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(ChannelSubscription::new(channel.clone(), rx, shutdown_tx, task))
    }
}

pub fn test_config() -> Config {
    Config {
        delegated_lookup_url: None,
        ..Config::default()
    }
}

pub fn test_state(
    config: Config,
    store: Arc<dyn CredentialStore>,
    broker: Arc<MemoryBroker>,
) -> AppState {
    AppState::new(Arc::new(config), store, broker)
}

/// A session running on its own task, driven like a connected browser.
pub struct TestClient {
    pub inbound: Option<mpsc::UnboundedSender<ClientEvent>>,
    pub outbound: mpsc::UnboundedReceiver<ServerEvent>,
    pub task: JoinHandle<SessionExit>,
}

impl TestClient {
    pub fn connect(state: AppState, cookies: Option<&str>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let session = ConnectionSession::new(
            ConnectionId::new(),
            state,
            cookies.map(str::to_string),
            outbound_tx,
        );
        let task = tokio::spawn(session.run(UnboundedReceiverStream::new(inbound_rx)));

        Self {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            task,
        }
    }

    pub fn send(&self, event: ClientEvent) {
        self.inbound
            .as_ref()
            .expect("client already disconnected")
            .send(event)
            .expect("session stopped");
    }

    pub fn subscribe_with(&self, uuid: &str) {
        self.send(ClientEvent::SubscribeToNotifications {
            uuid: uuid.to_string(),
        });
    }

    pub async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(2), self.outbound.recv())
            .await
            .expect("timed out waiting for server event")
            .expect("session closed its outbound channel")
    }

    /// `true` if nothing arrives within `wait`.
    pub async fn stays_quiet(&mut self, wait: Duration) -> bool {
        match tokio::time::timeout(wait, self.outbound.recv()).await {
            Err(_) => true,
            Ok(None) => true,
            Ok(Some(_)) => false,
        }
    }

    pub async fn disconnect(mut self) -> (SessionExit, mpsc::UnboundedReceiver<ServerEvent>) {
        self.inbound.take();
        let exit = self.task.await.expect("session task panicked");
        (exit, self.outbound)
    }
}

pub fn with_policy(policy: BrokerErrorPolicy) -> Config {
    Config {
        broker_error_policy: policy,
        ..test_config()
    }
}
