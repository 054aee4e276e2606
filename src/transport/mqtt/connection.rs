//! Pure connection configuration for the MQTT client
//!
//! Builds `rumqttc` options from validated connection parameters and session
//! settings. No I/O happens here.

use crate::config::SessionConfig;
use crate::params::{ConnectionParameters, Protocol};
use rumqttc::{MqttOptions, Transport};
use std::time::Duration;

/// Client id sent to the broker: configured prefix plus process id
pub fn build_client_id(prefix: &str) -> String {
    format!("{}-{}", prefix, std::process::id())
}

/// Configure MQTT options for one connection attempt
pub fn configure_mqtt_options(
    params: &ConnectionParameters,
    session: &SessionConfig,
) -> MqttOptions {
    let mut options = MqttOptions::new(
        build_client_id(&session.client_id),
        params.address.to_string(),
        params.port,
    );

    if params.protocol == Protocol::Ssl {
        options.set_transport(Transport::tls_with_default_config());
    }

    options.set_keep_alive(Duration::from_secs(session.keep_alive_secs));
    options.set_clean_session(session.clean_session);
    options
}
