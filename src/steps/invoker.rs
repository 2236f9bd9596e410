//! 步骤调用器
//!
//! 持有 StepRegistry、单步超时与重试次数，invoke(step, blackboard) 在超时内调用步骤；
//! 超时转为 ServiceError，ServiceError 按配置重试；每次调用输出结构化审计日志（JSON）。
//! 未注册的步骤属于引擎故障，直接返回 EngineFault。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::{Blackboard, EngineFault, StepFailure, StepName};
use crate::steps::{StepRegistry, StepResult};

/// 步骤调用器：统一超时、重试与审计
pub struct StepInvoker {
    registry: Arc<StepRegistry>,
    timeout: Duration,
    max_retries: u32,
}

impl StepInvoker {
    pub fn new(registry: StepRegistry, timeout: Duration) -> Self {
        Self {
            registry: Arc::new(registry),
            timeout,
            max_retries: 0,
        }
    }

    /// ServiceError 时的额外重试次数（默认 0，不重试）
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// 调用指定步骤；步骤失败一律以 StepResult::Failed 返回，不会向上抛出
    pub async fn invoke(
        &self,
        name: StepName,
        blackboard: &Blackboard,
    ) -> Result<StepResult, EngineFault> {
        let step = self
            .registry
            .lookup(name)
            .ok_or(EngineFault::UnregisteredStep(name))?;

        let start = Instant::now();
        let mut attempts: u32 = 0;
        let result = loop {
            attempts += 1;
            let result = match timeout(self.timeout, step.invoke(blackboard)).await {
                Ok(r) => r,
                Err(_) => StepResult::service_error(format!(
                    "{name} timed out after {}ms",
                    self.timeout.as_millis()
                )),
            };
            let retryable = matches!(
                result,
                StepResult::Failed(StepFailure::ServiceError { .. })
            );
            if retryable && attempts <= self.max_retries {
                tracing::debug!(step = %name, attempts, "step service error, retrying");
                continue;
            }
            break result;
        };

        let outcome = match &result {
            StepResult::Output(_) => "ok",
            StepResult::Failed(StepFailure::MissingDependency { .. }) => "missing_dependency",
            StepResult::Failed(StepFailure::ServiceError { .. }) => "service_error",
        };
        let audit = serde_json::json!({
            "event": "step_audit",
            "step": name.as_str(),
            "outcome": outcome,
            "attempts": attempts,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "step");

        Ok(result)
    }
}
