//! Broker transport seam
//!
//! The lifecycle drives a [`BrokerClient`] through connect, subscribe and
//! disconnect requests. Request outcomes and unsolicited notifications come
//! back as [`BrokerEvent`]s on a channel owned by the lifecycle, one event at
//! a time.

use crate::params::{ConnectionParameters, TopicSubscriptionSet};
use bytes::Bytes;
use rumqttc::QoS;
use thiserror::Error;

pub mod mqtt;

/// Notifications delivered by a broker client
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// Broker accepted the connection
    ConnectSuccess,
    /// Connection attempt failed before the broker accepted it
    ConnectFailure { reason: String },
    /// An established connection dropped
    ConnectionLost { cause: String },
    /// Broker granted a subscription
    SubscribeSuccess { topic: Option<String> },
    /// Broker refused a subscription
    SubscribeFailure {
        topic: Option<String>,
        reason: String,
    },
    /// A message was published on a subscribed topic
    MessageArrived { topic: String, payload: Bytes },
    /// An outgoing publish finished its QoS handshake
    DeliveryComplete { packet_id: u16 },
}

/// Errors raised while issuing a request to the broker client
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker request failed: {0}")]
    RequestFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("No active broker session")]
    NotConnected,
}

/// Request side of a broker session
#[async_trait::async_trait]
pub trait BrokerClient: Send {
    /// Start a connection attempt; the outcome arrives as an event
    async fn connect(&mut self, params: &ConnectionParameters) -> Result<(), BrokerError>;

    /// Request a subscription; the outcome arrives as an event
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), BrokerError>;

    /// Request every subscription of the set; one outcome event per topic.
    ///
    /// Callers reacting to broker events use this so a large set does not
    /// wait on request capacity while its own events go unread. Clients that
    /// can batch filters into one request should override the default.
    async fn subscribe_many(&mut self, subscriptions: &TopicSubscriptionSet) -> Result<(), BrokerError> {
        for (topic, qos) in subscriptions.iter() {
            self.subscribe(topic, qos).await?;
        }
        Ok(())
    }

    /// Close the session and wait until it is torn down
    async fn disconnect(&mut self) -> Result<(), BrokerError>;
}

pub use mqtt::MqttBroker;
