//! Broker address validation
//!
//! Pure parsing of the protocol, IP address and port inputs into a
//! [`ConnectionParameters`] triple. Every field is either validated or left at
//! its documented default.

use super::ValidationError;
use std::fmt;
use std::net::Ipv4Addr;
use std::num::IntErrorKind;

/// Default broker port for plain MQTT
pub const DEFAULT_PORT: u16 = 1883;

/// Default broker address
pub const DEFAULT_ADDRESS: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Supported transport schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// Plain TCP
    #[default]
    Tcp,
    /// TLS over TCP
    Ssl,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Ssl => "ssl",
        }
    }

    /// Parse a protocol name against the allow-list
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        match name {
            "tcp" => Ok(Protocol::Tcp),
            "ssl" => Ok(Protocol::Ssl),
            other => Err(ValidationError::UnknownProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated broker address triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub protocol: Protocol,
    pub address: Ipv4Addr,
    pub port: u16,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            address: DEFAULT_ADDRESS,
            port: DEFAULT_PORT,
        }
    }
}

impl ConnectionParameters {
    /// Render as `<proto>://<ip>:<port>`
    pub fn server_uri(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.address, self.port)
    }

    /// Build parameters from optional raw inputs, keeping defaults for absent ones
    pub fn from_inputs(
        protocol: Option<&str>,
        ip: Option<&str>,
        port: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let mut params = Self::default();
        if let Some(protocol) = protocol {
            params.protocol = Protocol::parse(protocol)?;
        }
        if let Some(ip) = ip {
            params.address = parse_ip(ip)?;
        }
        if let Some(port) = port {
            params.port = parse_port(port)?;
        }
        Ok(params)
    }
}

/// Parse a dotted IPv4 address, reporting which rule a bad part broke
pub fn parse_ip(input: &str) -> Result<Ipv4Addr, ValidationError> {
    let parts: Vec<&str> = input.split('.').collect();
    if parts.len() != 4 {
        return Err(ValidationError::IpPartCount {
            address: input.to_string(),
            parts: parts.len(),
        });
    }

    let mut octets = [0u8; 4];
    for (octet, part) in octets.iter_mut().zip(&parts) {
        let value = part.parse::<i64>().map_err(|e| match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                ValidationError::IpPartTooLarge(part.to_string())
            }
            _ => ValidationError::IpPartNotNumeric(part.to_string()),
        })?;
        *octet = u8::try_from(value).map_err(|_| ValidationError::IpPartOutOfRange(value))?;
    }

    Ok(Ipv4Addr::from(octets))
}

/// Parse a port strictly between 0 and 65536
pub fn parse_port(input: &str) -> Result<u16, ValidationError> {
    let value = input
        .trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::PortNotNumeric(input.to_string()))?;

    if value > 0 && value < 65536 {
        Ok(value as u16)
    } else {
        Err(ValidationError::PortOutOfRange(value))
    }
}
