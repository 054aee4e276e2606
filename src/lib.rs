//! mqttsub - MQTT subscriber client
//!
//! Subscribes to topics on an MQTT broker and prints every message it
//! receives, keeping the session alive through broker outages.
//!
//! # Overview
//!
//! - [`params`] turns command-line values into connection parameters, a
//!   topic subscription set and a handler type
//! - [`lifecycle`] drives the broker session: connect, subscribe, bounded
//!   reconnection and graceful shutdown
//! - [`transport`] is the broker seam, with a `rumqttc` implementation
//! - [`handlers`] print delivered messages raw or as JSON
//!
//! # Quick Start
//!
//! ```rust
//! use mqttsub::params::{aggregate, CliInput};
//!
//! let params = aggregate(CliInput {
//!     device: Some("greenhouse".to_string()),
//!     sensors: Some(vec!["temp".to_string(), "humidity".to_string()]),
//!     qos: Some(vec!["2".to_string()]),
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! assert_eq!(params.connection.server_uri(), "tcp://127.0.0.1:1883");
//! assert_eq!(
//!     params.subscriptions.topics(),
//!     ["greenhouse/temp", "greenhouse/humidity"]
//! );
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod observability;
pub mod params;
pub mod testing;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use error::{AppError, AppResult};
pub use handlers::{create_handler, HandlerType, MessageHandler};
pub use lifecycle::{ConnectionLifecycle, LifecycleError, LifecycleState, RetryPolicy};
pub use params::{aggregate, CliInput, Params, ValidationError};
pub use transport::{BrokerClient, BrokerEvent, MqttBroker};
