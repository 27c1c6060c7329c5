//! Per-connection pub/sub subscriptions.
//!
//! Every [`ChannelSubscription`] owns one dedicated broker connection, so the
//! number of open pub/sub connections grows linearly with the number of
//! subscribed realtime clients.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use redis::aio::PubSub;
use redis_utils::RedisPool;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::BrokerError;
use crate::metrics;
use crate::models::NotificationChannel;

/// What a subscription yields to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// Raw payload published on the channel.
    Message(String),
    /// The dedicated connection failed; no further messages will arrive.
    ConnectionLost(String),
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a dedicated connection and subscribe it to `channel`.
    async fn subscribe(
        &self,
        channel: &NotificationChannel,
    ) -> Result<ChannelSubscription, BrokerError>;
}

/// A live subscription bound to one realtime connection.
///
/// Events are read with [`ChannelSubscription::next_event`]. Dropping the
/// value signals the pump task to unsubscribe and release the connection;
/// [`ChannelSubscription::close`] does the same and waits for it to finish.
pub struct ChannelSubscription {
    channel: NotificationChannel,
    events: mpsc::UnboundedReceiver<BrokerEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ChannelSubscription {
    /// Wrap a pump task that feeds `events` until `shutdown` fires.
    pub fn new(
        channel: NotificationChannel,
        events: mpsc::UnboundedReceiver<BrokerEvent>,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        metrics::ACTIVE_SUBSCRIPTIONS.inc();
        Self {
            channel,
            events,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    pub fn channel(&self) -> &NotificationChannel {
        &self.channel
    }

    /// Next event in broker delivery order; `None` once the pump has exited.
    pub async fn next_event(&mut self) -> Option<BrokerEvent> {
        self.events.recv().await
    }

    /// Unsubscribe and wait until the dedicated connection is released.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(channel = %self.channel, error = %e, "subscription task failed");
            }
        }
    }
}

impl Drop for ChannelSubscription {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        metrics::ACTIVE_SUBSCRIPTIONS.dec();
    }
}

/// Redis pub/sub broker.
#[derive(Clone)]
pub struct RedisBroker {
    pool: RedisPool,
}

impl RedisBroker {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn subscribe(
        &self,
        channel: &NotificationChannel,
    ) -> Result<ChannelSubscription, BrokerError> {
        let mut pubsub = self.pool.open_pubsub().await?;
        pubsub.subscribe(channel.as_str()).await?;

        info!(channel = %channel, "subscribed to redis channel");

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(pump(pubsub, channel.clone(), tx, shutdown_rx));

        Ok(ChannelSubscription::new(
            channel.clone(),
            rx,
            shutdown_tx,
            task,
        ))
    }
}

async fn pump(
    mut pubsub: PubSub,
    channel: NotificationChannel,
    events: mpsc::UnboundedSender<BrokerEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let messages = pubsub
        .on_message()
        .map(|msg| msg.get_payload_bytes().to_vec());
    if forward(messages, &channel, &events, &mut shutdown).await == PumpEnd::ConnectionLost {
        return;
    }

    if let Err(e) = pubsub.unsubscribe(channel.as_str()).await {
        debug!(channel = %channel, error = %e, "unsubscribe failed; dropping connection anyway");
    }
    debug!(channel = %channel, "redis subscription released");
}

#[derive(Debug, PartialEq, Eq)]
enum PumpEnd {
    /// Shutdown requested or the owner stopped listening.
    Released,
    ConnectionLost,
}

/// Relay raw payloads to `events` until shutdown or the stream ends.
async fn forward<S>(
    messages: S,
    channel: &NotificationChannel,
    events: &mpsc::UnboundedSender<BrokerEvent>,
    shutdown: &mut oneshot::Receiver<()>,
) -> PumpEnd
where
    S: Stream<Item = Vec<u8>>,
{
    tokio::pin!(messages);
    loop {
        tokio::select! {
            _ = &mut *shutdown => return PumpEnd::Released,
            payload = messages.next() => match payload {
                Some(bytes) => {
                    let payload = String::from_utf8_lossy(&bytes).into_owned();
                    debug!(channel = %channel, bytes = bytes.len(), "redis message received");
                    if events.send(BrokerEvent::Message(payload)).is_err() {
                        return PumpEnd::Released;
                    }
                }
                None => {
                    error!(channel = %channel, "redis pub/sub connection closed");
                    let _ = events.send(BrokerEvent::ConnectionLost(
                        "pub/sub connection closed".to_string(),
                    ));
                    return PumpEnd::ConnectionLost;
                }
            },
        }
    }
}
