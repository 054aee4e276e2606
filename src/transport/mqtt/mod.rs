//! MQTT broker client built on `rumqttc`
//!
//! Pure functions are kept apart from I/O so most of the logic is testable
//! without a broker.
//!
//! # Architecture
//!
//! - [`connection`] - Pure option building from connection parameters
//! - [`events`] - Pure routing of event loop results into [`BrokerEvent`]s
//! - [`client`] - Impure I/O: the client handle and its poller task
//!
//! [`BrokerEvent`]: crate::transport::BrokerEvent
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqttsub::config::SessionConfig;
//! use mqttsub::params::ConnectionParameters;
//! use mqttsub::transport::{BrokerClient, MqttBroker};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (mut broker, mut events) = MqttBroker::new(SessionConfig::default());
//! broker.connect(&ConnectionParameters::default()).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod events;

pub use client::MqttBroker;
pub use connection::{build_client_id, configure_mqtt_options};
pub use events::{EventRoute, EventRouter, SubscriptionTracker};
