use async_trait::async_trait;

use crate::error::PlanError;
use crate::executor::types::Plan;

/// 计划生成器：把需求文本转换为初始任务列表
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_plan(&self, requirements: &str) -> Result<Plan, PlanError>;
}
