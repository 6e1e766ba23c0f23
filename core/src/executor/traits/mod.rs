pub mod backend;
pub mod followup;
pub mod planner;
pub mod strategy;

pub use backend::*;
pub use followup::*;
pub use planner::*;
pub use strategy::*;
