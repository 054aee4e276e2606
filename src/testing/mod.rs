//! Testing utilities and mock implementations
//!
//! Mocks for driving the connection lifecycle without a running MQTT broker.

pub mod mocks;

pub use mocks::*;
