pub mod concurrency;
pub mod retry;

pub use concurrency::{AdaptiveConcurrencyPlugin, FixedConcurrencyPlugin, HostLoad};
pub use retry::{ExponentialBackoffPlugin, LinearRetryPlugin};
