//! scheduling 步骤：查询今日排班，产出 work_order_id

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Blackboard, BlackboardKey, BlackboardPatch, StepName};
use crate::steps::registry::tagged_record;
use crate::steps::services::SchedulingService;
use crate::steps::{Step, StepResult};

pub struct SchedulingStep {
    service: Arc<dyn SchedulingService>,
}

impl SchedulingStep {
    pub fn new(service: Arc<dyn SchedulingService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Step for SchedulingStep {
    fn name(&self) -> StepName {
        StepName::Scheduling
    }

    fn output_keys(&self) -> &[BlackboardKey] {
        &[BlackboardKey::SchedulingResult, BlackboardKey::WorkOrderId]
    }

    async fn invoke(&self, _blackboard: &Blackboard) -> StepResult {
        let entry = match self.service.scheduled_today().await {
            Ok(e) => e,
            Err(e) => return StepResult::service_error(e.to_string()),
        };
        match tagged_record(self.name(), &entry) {
            Ok(record) => StepResult::Output(
                BlackboardPatch::new()
                    .with(BlackboardKey::SchedulingResult, record)
                    .with(BlackboardKey::WorkOrderId, entry.work_order_id),
            ),
            Err(e) => StepResult::service_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::services::{MockFieldService, ScheduledWorkOrder, ServiceFault};

    struct DownService;

    #[async_trait]
    impl SchedulingService for DownService {
        async fn scheduled_today(&self) -> Result<ScheduledWorkOrder, ServiceFault> {
            Err(ServiceFault::Transport("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_scheduling_produces_work_order() {
        let step = SchedulingStep::new(Arc::new(MockFieldService));
        let mut bb = Blackboard::new();
        match step.invoke(&bb).await {
            StepResult::Output(patch) => bb.merge(patch),
            other => panic!("Expected output, got {other:?}"),
        }
        assert_eq!(bb.work_order_id(), Some("WO-100245"));
        let record = bb.get(BlackboardKey::SchedulingResult).unwrap();
        assert_eq!(record["agent"], "scheduling");
        assert_eq!(record["technician_id"], "TECH-42");
    }

    #[tokio::test]
    async fn test_scheduling_service_fault() {
        let step = SchedulingStep::new(Arc::new(DownService));
        let result = step.invoke(&Blackboard::new()).await;
        assert_eq!(
            result,
            StepResult::service_error("Request failed: connection refused")
        );
    }
}
