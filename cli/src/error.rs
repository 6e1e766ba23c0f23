use thiserror::Error;

use flowpilot_core::api::{FlowError, PlanError};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid plan: {0}")]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("{0}")]
    Command(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    /// 11: config, 12: plan, 20: io, 50: everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 11,
            CliError::Plan(_) => 12,
            CliError::Flow(FlowError::Graph(_)) => 12,
            CliError::Io(_) | CliError::Command(_) => 20,
            CliError::Flow(_) | CliError::Anyhow(_) => 50,
        }
    }
}
