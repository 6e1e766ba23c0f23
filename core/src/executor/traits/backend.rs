use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::executor::types::{Outcome, Task};

/// 任务执行后端（代码生成、shell、HTTP 等）
///
/// `execute` returns an [`Outcome`] for anything the backend can classify and
/// `Err` for unexpected failures; the orchestrator maps errors and panics to a
/// failed outcome. Backends should watch `cancel` and return early once it fires.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Checked once at registration.
    fn is_available(&self) -> bool {
        true
    }

    async fn execute(&self, task: &Task, cancel: CancellationToken) -> anyhow::Result<Outcome>;

    /// Best-effort out-of-band cancellation for backends with remote work.
    async fn cancel(&self, _task_id: &str) {}
}
