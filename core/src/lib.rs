//! FlowPilot core: dependency-ordered, concurrent, restartable task execution.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod events_out;
pub mod executor;
pub mod orchestrator;
pub mod service;
pub mod state;
