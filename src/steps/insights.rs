//! insights 步骤：按 work_order_id 查询工单类型、历史与 product_id

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Blackboard, BlackboardKey, BlackboardPatch, StepName};
use crate::steps::registry::tagged_record;
use crate::steps::services::InsightsService;
use crate::steps::{Step, StepResult};

pub struct InsightsStep {
    service: Arc<dyn InsightsService>,
}

impl InsightsStep {
    pub fn new(service: Arc<dyn InsightsService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Step for InsightsStep {
    fn name(&self) -> StepName {
        StepName::Insights
    }

    fn required_keys(&self) -> &[BlackboardKey] {
        &[BlackboardKey::WorkOrderId]
    }

    fn output_keys(&self) -> &[BlackboardKey] {
        &[BlackboardKey::InsightsResult, BlackboardKey::ProductId]
    }

    async fn invoke(&self, blackboard: &Blackboard) -> StepResult {
        let Some(work_order_id) = blackboard.work_order_id() else {
            return StepResult::missing(BlackboardKey::WorkOrderId);
        };
        let insights = match self.service.work_order_insights(work_order_id).await {
            Ok(i) => i,
            Err(e) => return StepResult::service_error(e.to_string()),
        };
        match tagged_record(self.name(), &insights) {
            Ok(record) => StepResult::Output(
                BlackboardPatch::new()
                    .with(BlackboardKey::InsightsResult, record)
                    .with(BlackboardKey::ProductId, insights.product_id),
            ),
            Err(e) => StepResult::service_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::services::MockFieldService;

    #[tokio::test]
    async fn test_insights_requires_work_order() {
        let step = InsightsStep::new(Arc::new(MockFieldService));
        let result = step.invoke(&Blackboard::new()).await;
        assert_eq!(result, StepResult::missing(BlackboardKey::WorkOrderId));
    }

    #[tokio::test]
    async fn test_insights_with_seeded_work_order() {
        let step = InsightsStep::new(Arc::new(MockFieldService));
        let mut bb = Blackboard::new();
        bb.set(BlackboardKey::WorkOrderId, "WO1");
        let StepResult::Output(patch) = step.invoke(&bb).await else {
            panic!("Expected output");
        };
        bb.merge(patch);
        assert_eq!(bb.product_id(), Some("PROD-77881"));
        let record = bb.get(BlackboardKey::InsightsResult).unwrap();
        assert_eq!(record["work_order_id"], "WO1");
        assert_eq!(record["work_order_type"], "Critical");
    }
}
