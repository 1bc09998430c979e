//! Port traits the domain talks to at its boundary.

pub mod config_port;
pub mod data_port;
pub mod snapshot_port;
