//! Command-line parameter aggregation
//!
//! Validates the raw command-line values and assembles the three inputs of a
//! subscriber session: where to connect ([`ConnectionParameters`]), what to
//! subscribe to ([`TopicSubscriptionSet`]) and how to print messages
//! ([`HandlerType`]). Everything here is synchronous and free of I/O, and all
//! errors surface before any network activity.

pub mod connection;
pub mod topics;

pub use connection::{ConnectionParameters, Protocol};
pub use topics::{TopicRequest, TopicShape, TopicSubscriptionSet};

use crate::handlers::HandlerType;
use rumqttc::QoS;
use thiserror::Error;
use tracing::{debug, error};

/// Input validation failures, reported to the user verbatim
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown protocol '{0}' (supported: tcp, ssl)")]
    UnknownProtocol(String),
    #[error("IP address '{address}' must have exactly 4 parts, got {parts}")]
    IpPartCount { address: String, parts: usize },
    #[error("IP parts must be numbers, got '{0}'")]
    IpPartNotNumeric(String),
    #[error("IP parts cannot contain such big numbers: '{0}'")]
    IpPartTooLarge(String),
    #[error("IP parts must be between 0 and 255, got {0}")]
    IpPartOutOfRange(i64),
    #[error("Port must be a number, got '{0}'")]
    PortNotNumeric(String),
    #[error("Port number must be between 0 and 65536 (exclusive), got {0}")]
    PortOutOfRange(i64),
    #[error("QoS must be 0, 1 or 2, got '{0}'")]
    InvalidQos(String),
    #[error("Topic names cannot be empty")]
    EmptyTopic,
    #[error("Device name cannot be empty")]
    EmptyDevice,
    #[error("Sensor names cannot be empty")]
    EmptySensor,
    #[error("Cannot supply --topics together with --device/--sensors")]
    TopicsWithDevice,
    #[error("Cannot supply both --raw and --json message handlers")]
    ConflictingHandlers,
}

/// Raw values as produced by the command-line surface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliInput {
    pub proto: Option<String>,
    pub ip: Option<String>,
    pub port: Option<String>,
    pub topics: Option<Vec<String>>,
    pub device: Option<String>,
    pub sensors: Option<Vec<String>>,
    pub qos: Option<Vec<String>>,
    pub raw: bool,
    pub json: bool,
}

/// Validated session inputs
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    pub connection: ConnectionParameters,
    pub subscriptions: TopicSubscriptionSet,
    pub handler: HandlerType,
}

/// Validate `input` and assemble the session parameters
pub fn aggregate(input: CliInput) -> Result<Params, ValidationError> {
    if let Err(e) = check_conflicts(&input) {
        error!("Conflicting arguments: {}", e);
        return Err(e);
    }

    let connection = ConnectionParameters::from_inputs(
        input.proto.as_deref(),
        input.ip.as_deref(),
        input.port.as_deref(),
    )?;

    let qos = parse_qos_list(input.qos.as_deref().unwrap_or_default())?;
    check_not_empty(&input)?;

    let subscriptions = topics::resolve(TopicRequest {
        topics: input.topics,
        device: input.device,
        sensors: input.sensors,
        qos,
    });
    let handler = select_handler(input.raw, input.json)?;

    debug!(
        server = %connection.server_uri(),
        topics = ?subscriptions.topics(),
        handler = ?handler,
        "Parameters validated"
    );

    Ok(Params {
        connection,
        subscriptions,
        handler,
    })
}

/// Map the handler flags to a handler type; raw is the default
pub fn select_handler(raw: bool, json: bool) -> Result<HandlerType, ValidationError> {
    match (raw, json) {
        (true, true) => Err(ValidationError::ConflictingHandlers),
        (_, true) => Ok(HandlerType::Json),
        _ => Ok(HandlerType::Raw),
    }
}

/// Parse QoS levels, rejecting anything outside 0-2
pub fn parse_qos_list(values: &[String]) -> Result<Vec<QoS>, ValidationError> {
    values
        .iter()
        .map(|value| {
            value
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(topics::qos_from_level)
                .ok_or_else(|| ValidationError::InvalidQos(value.clone()))
        })
        .collect()
}

fn check_conflicts(input: &CliInput) -> Result<(), ValidationError> {
    if input.topics.is_some() && (input.device.is_some() || input.sensors.is_some()) {
        return Err(ValidationError::TopicsWithDevice);
    }
    if input.raw && input.json {
        return Err(ValidationError::ConflictingHandlers);
    }
    Ok(())
}

fn check_not_empty(input: &CliInput) -> Result<(), ValidationError> {
    if input.topics.iter().flatten().any(|t| t.is_empty()) {
        return Err(ValidationError::EmptyTopic);
    }
    if input.device.as_ref().is_some_and(|d| d.is_empty()) {
        return Err(ValidationError::EmptyDevice);
    }
    if input.sensors.iter().flatten().any(|s| s.is_empty()) {
        return Err(ValidationError::EmptySensor);
    }
    Ok(())
}
