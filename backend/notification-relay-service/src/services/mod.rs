pub mod broker;
pub mod credential_store;
pub mod resolver;

pub use broker::{Broker, BrokerEvent, ChannelSubscription, RedisBroker};
pub use credential_store::{delete_best_effort, CredentialStore, RedisCredentialStore};
pub use resolver::ResolutionRequest;
