mod file;
mod http;
mod single;

pub use file::FilePlanner;
pub use http::HttpPlanner;
pub use single::SingleTaskPlanner;
