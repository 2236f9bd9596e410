//! knowledge 步骤：按 product_id 查询清洁 / 维护文档

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Blackboard, BlackboardKey, BlackboardPatch, StepName};
use crate::steps::registry::tagged_record;
use crate::steps::services::KnowledgeService;
use crate::steps::{Step, StepResult};

pub struct KnowledgeStep {
    service: Arc<dyn KnowledgeService>,
}

impl KnowledgeStep {
    pub fn new(service: Arc<dyn KnowledgeService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Step for KnowledgeStep {
    fn name(&self) -> StepName {
        StepName::Knowledge
    }

    fn required_keys(&self) -> &[BlackboardKey] {
        &[BlackboardKey::ProductId]
    }

    fn output_keys(&self) -> &[BlackboardKey] {
        &[BlackboardKey::KnowledgeResult]
    }

    async fn invoke(&self, blackboard: &Blackboard) -> StepResult {
        let Some(product_id) = blackboard.product_id() else {
            return StepResult::missing(BlackboardKey::ProductId);
        };
        let guide = match self.service.cleanup_guide(product_id).await {
            Ok(g) => g,
            Err(e) => return StepResult::service_error(e.to_string()),
        };
        match tagged_record(self.name(), &guide) {
            Ok(record) => StepResult::Output(
                BlackboardPatch::new().with(BlackboardKey::KnowledgeResult, record),
            ),
            Err(e) => StepResult::service_error(e),
        }
    }
}
