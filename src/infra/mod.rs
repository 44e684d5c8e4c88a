//! Infrastructure adapters: persistence, message bus, HTTP transport,
//! telemetry.

pub mod bus;
pub mod db;
pub mod error;
pub mod http;
pub mod telemetry;
