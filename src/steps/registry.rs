//! 步骤注册表
//!
//! 所有步骤实现 Step trait（name / required_keys / output_keys / invoke），由 StepRegistry 按 StepName 注册与查找；
//! StepInvoker 在调用时加超时、重试并输出审计日志。注册表初始化后只读，可在多个运行间共享。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::{Blackboard, BlackboardKey, BlackboardPatch, StepFailure, StepName};

/// 步骤执行结果：要么是待合并的输出，要么是失败标记；步骤内部错误一律转为后者
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Output(BlackboardPatch),
    Failed(StepFailure),
}

impl StepResult {
    pub fn missing(required_key: BlackboardKey) -> Self {
        StepResult::Failed(StepFailure::MissingDependency { required_key })
    }

    pub fn service_error(cause: impl Into<String>) -> Self {
        StepResult::Failed(StepFailure::ServiceError {
            cause: cause.into(),
        })
    }

    pub fn is_missing_dependency(&self) -> bool {
        matches!(
            self,
            StepResult::Failed(StepFailure::MissingDependency { .. })
        )
    }
}

/// 步骤 trait：声明输入依赖与输出契约，异步执行
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> StepName;

    /// 运行前应存在（非 null）的黑板键；仅为声明，缺失时由步骤自行返回 MissingDependency
    fn required_keys(&self) -> &[BlackboardKey] {
        &[]
    }

    /// 成功时写入的黑板键
    fn output_keys(&self) -> &[BlackboardKey] {
        &[]
    }

    async fn invoke(&self, blackboard: &Blackboard) -> StepResult;
}

/// 步骤注册表：StepName -> Arc<dyn Step>
#[derive(Default, Clone)]
pub struct StepRegistry {
    steps: HashMap<StepName, Arc<dyn Step>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册步骤；同名步骤后注册者覆盖
    pub fn register(&mut self, step: impl Step + 'static) {
        self.register_arc(Arc::new(step));
    }

    pub fn register_arc(&mut self, step: Arc<dyn Step>) {
        self.steps.insert(step.name(), step);
    }

    pub fn lookup(&self, name: StepName) -> Option<Arc<dyn Step>> {
        self.steps.get(&name).cloned()
    }

    pub fn step_names(&self) -> Vec<StepName> {
        let mut names: Vec<StepName> = self.steps.keys().copied().collect();
        names.sort();
        names
    }

    /// 闭集中尚未注册的步骤
    pub fn unregistered(&self) -> Vec<StepName> {
        StepName::ALL
            .into_iter()
            .filter(|n| !self.steps.contains_key(n))
            .collect()
    }
}

/// 将服务返回的结构化数据转为带 `agent` 标记字段的记录
pub(crate) fn tagged_record<T: Serialize>(step: StepName, data: &T) -> Result<Value, String> {
    let mut record = serde_json::to_value(data).map_err(|e| e.to_string())?;
    match record.as_object_mut() {
        Some(obj) => {
            obj.insert("agent".to_string(), step.as_str().into());
            Ok(record)
        }
        None => Err(format!("{step} output is not a record")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct ConstStep(StepName);

    #[async_trait]
    impl Step for ConstStep {
        fn name(&self) -> StepName {
            self.0
        }

        async fn invoke(&self, _blackboard: &Blackboard) -> StepResult {
            StepResult::Output(BlackboardPatch::new())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = StepRegistry::new();
        registry.register(ConstStep(StepName::Knowledge));
        registry.register(ConstStep(StepName::Compose));
        assert!(registry.lookup(StepName::Knowledge).is_some());
        assert!(registry.lookup(StepName::Scheduling).is_none());
        assert_eq!(
            registry.step_names(),
            vec![StepName::Knowledge, StepName::Compose]
        );
        assert_eq!(
            registry.unregistered(),
            vec![StepName::Scheduling, StepName::Insights]
        );
    }

    #[test]
    fn test_tagged_record_adds_agent() {
        #[derive(Serialize)]
        struct Data {
            work_order_id: String,
        }
        let record = tagged_record(
            StepName::Scheduling,
            &Data {
                work_order_id: "WO-1".into(),
            },
        )
        .unwrap();
        assert_eq!(record, json!({"agent": "scheduling", "work_order_id": "WO-1"}));
        assert!(tagged_record(StepName::Scheduling, &"plain").is_err());
    }
}
