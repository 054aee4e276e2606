//! Message output handlers
//!
//! A handler receives every message the broker delivers and writes it to an
//! output stream. The handler type is chosen once from the command line.

use std::io::{self, Write};
use thiserror::Error;
use tracing::warn;

/// Handler selection tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerType {
    /// Print payloads verbatim
    #[default]
    Raw,
    /// Parse payloads as JSON and pretty-print them
    Json,
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Failed to write message output: {0}")]
    Output(#[from] io::Error),
}

/// Consumer of delivered messages
pub trait MessageHandler: Send {
    fn handle(&mut self, topic: &str, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Prints topic and payload as received
pub struct RawHandler<W> {
    out: W,
}

impl<W: Write + Send> RawHandler<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> MessageHandler for RawHandler<W> {
    fn handle(&mut self, topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        writeln!(self.out, "Message arrived")?;
        writeln!(self.out, "\ttopic: '{topic}'")?;
        writeln!(
            self.out,
            "\tpayload: '{}'\n",
            String::from_utf8_lossy(payload)
        )?;
        self.out.flush()?;
        Ok(())
    }
}

/// Pretty-prints JSON payloads, falling back to the raw text
pub struct JsonHandler<W> {
    out: W,
}

impl<W: Write + Send> JsonHandler<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn format_payload(topic: &str, payload: &[u8]) -> String {
        match serde_json::from_slice::<serde_json::Value>(payload) {
            Ok(json) => serde_json::to_string_pretty(&json)
                .unwrap_or_else(|_| String::from_utf8_lossy(payload).into_owned()),
            Err(e) => {
                warn!(topic = %topic, error = %e, "Payload is not valid JSON, printing as-is");
                String::from_utf8_lossy(payload).into_owned()
            }
        }
    }
}

impl<W: Write + Send> MessageHandler for JsonHandler<W> {
    fn handle(&mut self, topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        let timestamp = chrono::Local::now().format("%H:%M:%S");
        let body = Self::format_payload(topic, payload);
        writeln!(self.out, "[{timestamp}] {topic}")?;
        writeln!(self.out, "{body}\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Build the stdout handler for `handler_type`
pub fn create_handler(handler_type: HandlerType) -> Box<dyn MessageHandler> {
    match handler_type {
        HandlerType::Raw => Box::new(RawHandler::new(io::stdout())),
        HandlerType::Json => Box::new(JsonHandler::new(io::stdout())),
    }
}
