pub mod code;
pub mod flow;
pub mod graph;

pub use code::ErrorCode;
pub use flow::{FlowError, PlanError};
pub use graph::GraphError;
