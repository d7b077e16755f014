//! Infrastructure adapters and runtime bootstrap.

pub mod delivery;
pub mod error;
pub mod http;
pub mod telemetry;
pub mod webhook;
