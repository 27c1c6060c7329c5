use anyhow::{Context, Result};
use redis::aio::{ConnectionManager, PubSub};
use redis::{Client, ConnectionInfo, IntoConnectionInfo, RedisResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Redis connections for a single node.
///
/// Ordinary commands share one multiplexed [`ConnectionManager`]. Pub/sub
/// needs a connection of its own, because a connection in subscriber mode
/// rejects every command except (P)SUBSCRIBE/(P)UNSUBSCRIBE/PING/QUIT. Each
/// call to [`RedisPool::open_pubsub`] therefore dials a fresh connection.
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
    manager: SharedConnectionManager,
}

impl RedisPool {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let info: ConnectionInfo = redis_url
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;
        let label = node_label(&info);

        let client = Client::open(info).context("failed to construct Redis client")?;
        let connection_manager = ConnectionManager::new(client.clone())
            .await
            .context("failed to initialize Redis connection manager")?;

        info!(node = %label, "Redis connection manager ready");

        Ok(Self {
            client,
            manager: Arc::new(Mutex::new(connection_manager)),
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }

    /// Open a dedicated connection for pub/sub use.
    pub async fn open_pubsub(&self) -> RedisResult<PubSub> {
        self.client.get_async_pubsub().await
    }
}

/// `host:port` (or socket path) for log lines; never includes credentials.
pub fn node_label(info: &ConnectionInfo) -> String {
    match &info.addr {
        redis::ConnectionAddr::Tcp(host, port) => format!("{}:{}", host, port),
        redis::ConnectionAddr::TcpTls { host, port, .. } => format!("{}:{} (tls)", host, port),
        other => format!("{:?}", other),
    }
}
