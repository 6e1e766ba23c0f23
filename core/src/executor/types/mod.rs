pub mod config;
pub mod flow;
pub mod outcome;
pub mod plan;
pub mod task;

pub use config::*;
pub use flow::*;
pub use outcome::*;
pub use plan::*;
pub use task::*;
