pub mod cli;
pub mod resume;
pub mod run;
pub mod validate;
