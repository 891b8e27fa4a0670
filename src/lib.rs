//! Sensor core for the asthma monitor: registry, decoding, state
//! reconciliation, persistence, the MQTT transport and the assistant
//! collaborator. `main.rs` wires these into a running host.

pub mod assistant;
pub mod config;
pub mod decode;
pub mod domain;
pub mod error;
pub mod hub;
pub mod persist;
pub mod server;
pub mod store;
pub mod transport;
