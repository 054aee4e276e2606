//! Observability for the subscriber
//!
//! Structured logging through `tracing`, configured from the environment.

pub mod logging;

pub use logging::{init_default_logging, init_logging, verbosity_level, LogFormat};

// Span macros for structured logging
pub use logging::lifecycle_span;
