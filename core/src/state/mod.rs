//! # 状态管理模块
//!
//! 负责 flow 的运行时状态：注册表、状态转换规则和快照。
//!
//! 每个 flow 的可变状态由自己的锁保护；读取方通过 watch 通道获取
//! 最新快照，不与调度循环争用锁。

pub mod registry;
pub mod snapshot;
pub mod transitions;

pub use registry::{FlowHandle, FlowRecord, FlowRegistry};
pub use snapshot::{FlowSnapshot, SnapshotManager};
pub use transitions::{FlowTransition, TransitionError};
