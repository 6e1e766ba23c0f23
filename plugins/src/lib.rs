//! Pluggable pieces for the FlowPilot engine: task backends, plan generators,
//! retry and concurrency strategies, and the config-driven factory.

pub mod backend;
pub mod executor;
pub mod factory;
pub mod followup;
pub mod http_client;
pub mod planner;
