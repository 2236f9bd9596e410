//! 属性测试：终止性、终止步骤唯一且最后、抽取幂等、依赖满足时不报缺失

use std::sync::Arc;

use async_trait::async_trait;
use hive::core::{Blackboard, BlackboardKey, PlanningError, RunStatus, StepName};
use hive::extract::{extract, Identifier};
use hive::planner::{PlanProposal, PlanningOracle};
use hive::steps::{
    ComposeStep, InsightsStep, KnowledgeStep, MockFieldService, SchedulingStep, Step,
    TemplateComposer,
};
use hive::Agent;
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

struct FixedOracle(Vec<StepName>);

#[async_trait]
impl PlanningOracle for FixedOracle {
    async fn plan(
        &self,
        _task_text: &str,
        _seeds: &[Identifier],
    ) -> Result<PlanProposal, PlanningError> {
        Ok(PlanProposal::new(self.0.clone()))
    }
}

fn step_name() -> impl Strategy<Value = StepName> {
    prop::sample::select(StepName::ALL.to_vec())
}

/// 任意计划（可空、可含多个或不含 compose）都会终止，且 compose 恰好执行一次并在最后
#[test]
fn test_any_plan_terminates_with_single_trailing_compose() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&prop::collection::vec(step_name(), 0..12), |raw| {
            let agent = Agent::builder()
                .with_oracle(Arc::new(FixedOracle(raw.clone())))
                .build();
            let outcome = rt.block_on(agent.run_detailed(
                "What is scheduled today for WO-1?",
                &[],
                CancellationToken::new(),
                None,
            ));

            prop_assert_eq!(&outcome.status, &RunStatus::Completed);
            prop_assert_eq!(outcome.executed.last(), Some(&StepName::Compose));
            let composes = outcome
                .executed
                .iter()
                .filter(|s| **s == StepName::Compose)
                .count();
            prop_assert_eq!(composes, 1);
            prop_assert!(outcome.executed.len() <= raw.len() + 1);
            prop_assert!(outcome.answer.is_some());
            Ok(())
        })
        .unwrap();
}

/// 对已规范化的标识符再次抽取得到相同结果
#[test]
fn test_extract_is_idempotent() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let text = "[a-z ]{0,12}((wo|WO|Wo)[-_ ]?[0-9]{1,6})?[a-z ,.]{0,12}((prod|PROD|Prod)[-_ ]?[0-9]{1,6})?[a-z ?]{0,12}";

    runner
        .run(&text, |text| {
            let first = extract(&text);
            let normalized = first
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            prop_assert_eq!(extract(&normalized), first);
            Ok(())
        })
        .unwrap();
}

/// 依赖键都在黑板上时，步骤结果绝不是 MissingDependency
#[test]
fn test_satisfied_requirements_never_report_missing() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut runner = proptest::test_runner::TestRunner::default();
    let mock = Arc::new(MockFieldService);
    let steps: Vec<Arc<dyn Step>> = vec![
        Arc::new(SchedulingStep::new(mock.clone())),
        Arc::new(InsightsStep::new(mock.clone())),
        Arc::new(KnowledgeStep::new(mock)),
        Arc::new(ComposeStep::new(Arc::new(TemplateComposer::new()))),
    ];

    runner
        .run(
            &(any::<bool>(), any::<bool>(), any::<bool>(), 0..4usize),
            |(has_task, has_wo, has_prod, idx)| {
                let mut bb = Blackboard::new();
                if has_task {
                    bb.set(BlackboardKey::TaskText, "task");
                }
                if has_wo {
                    bb.set(BlackboardKey::WorkOrderId, "WO-1");
                }
                if has_prod {
                    bb.set(BlackboardKey::ProductId, "PROD-1");
                }
                let step = &steps[idx];
                let satisfied = bb.first_missing(step.required_keys()).is_none();
                let result = rt.block_on(step.invoke(&bb));
                if satisfied {
                    prop_assert!(!result.is_missing_dependency());
                }
                Ok(())
            },
        )
        .unwrap();
}
