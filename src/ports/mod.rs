//! Port traits the domain consumes.

pub mod config_port;
pub mod data_port;
pub mod report_port;
