//! 执行引擎：把动态计划变成按序、感知依赖的步骤执行
//!
//! 状态机：Planning → Running(PlanQueue) → Terminated(RunStatus)
//!
//! - 规划失败（错误 / 无法解析 / 空计划）不致命：回退为只含 compose 的计划，并把诊断写入 `planning_failure`
//! - 计划在摄入时规范化一次：compose 有且只有一个，且在最后
//! - 严格按计划顺序执行，不按依赖重排；步骤失败写入 `<step>_error` 后继续
//! - 每轮循环顶部检查取消信号；未注册的步骤属于引擎故障，立即终止

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::blackboard::{Blackboard, BlackboardKey};
use crate::core::error::{AgentError, EngineFault, PlanningError};
use crate::core::events::{send_event, RunEvent};
use crate::core::plan::{PlanQueue, StepName};
use crate::extract::{extract, Identifier, IdentifierKind};
use crate::planner::{PlanProposal, PlanningOracle};
use crate::steps::{StepInvoker, StepResult};

/// 运行结束状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// 队列耗尽或终止步骤已执行
    Completed,
    /// 两步之间观察到取消信号
    Cancelled,
    /// 计划 / 注册表契约被破坏
    Faulted(EngineFault),
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Faulted(_) => "faulted",
        }
    }
}

/// 引擎状态
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    Planning,
    Running(PlanQueue),
    Terminated(RunStatus),
}

/// 一次运行的结果：回答 + 最终黑板快照
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    /// compose 写入的回答；compose 未运行时为 None
    pub answer: Option<String>,
    pub blackboard: Blackboard,
    /// 实际执行过的步骤（按顺序）
    pub executed: Vec<StepName>,
    pub started_at: i64,
    pub finished_at: i64,
}

impl RunOutcome {
    /// 转为调用方结果：取消与引擎故障是错误，其余返回回答
    ///
    /// 计划为空时 compose 不会运行，此时返回空字符串（尽力而为，不报错）。
    pub fn into_result(self) -> Result<String, AgentError> {
        match self.status {
            RunStatus::Completed => Ok(self.answer.unwrap_or_default()),
            RunStatus::Cancelled => Err(AgentError::Cancelled),
            RunStatus::Faulted(fault) => Err(AgentError::EngineFault(fault)),
        }
    }
}

/// 执行引擎：持有规划器与步骤调用器，本身无每次运行的可变状态，可被多个运行共享
pub struct ExecutionEngine {
    oracle: Arc<dyn PlanningOracle>,
    invoker: StepInvoker,
}

impl ExecutionEngine {
    pub fn new(oracle: Arc<dyn PlanningOracle>, invoker: StepInvoker) -> Self {
        Self { oracle, invoker }
    }

    pub fn invoker(&self) -> &StepInvoker {
        &self.invoker
    }

    /// 完整运行：播种 → 规划 → 规范化 → 执行
    pub async fn execute(
        &self,
        task_text: &str,
        seeds: &[Identifier],
        cancel: CancellationToken,
        events: Option<&mpsc::UnboundedSender<RunEvent>>,
    ) -> RunOutcome {
        let run_id = format!("run_{}", Uuid::new_v4());
        let started_at = Utc::now().timestamp_millis();
        let mut blackboard = Blackboard::new();
        blackboard.set(BlackboardKey::TaskText, task_text);

        // 抽取结果先写，调用方显式给出的标识符覆盖之
        for id in extract(task_text) {
            blackboard.set(id.kind.blackboard_key(), id.as_str());
        }
        for seed in seeds {
            match Identifier::normalized(seed.kind, seed.as_str()) {
                Some(id) => blackboard.set(id.kind.blackboard_key(), id.as_str()),
                None => tracing::warn!(value = %seed, kind = ?seed.kind, "ignoring malformed caller identifier"),
            }
        }
        let known: Vec<Identifier> = [
            (IdentifierKind::WorkOrder, blackboard.work_order_id()),
            (IdentifierKind::Product, blackboard.product_id()),
        ]
        .into_iter()
        .filter_map(|(kind, v)| v.map(|v| Identifier::new(kind, v)))
        .collect();

        let mut state = EngineState::Planning;
        let mut executed = Vec::new();
        let status = loop {
            state = match state {
                EngineState::Planning => {
                    let plan = self.plan(&run_id, task_text, &known, &mut blackboard, events).await;
                    EngineState::Running(plan)
                }
                EngineState::Running(plan) => {
                    let (status, steps) = self.drive(plan, &mut blackboard, &cancel, events).await;
                    executed = steps;
                    EngineState::Terminated(status)
                }
                EngineState::Terminated(status) => break status,
            };
        };

        tracing::info!(
            run_id = %run_id,
            status = status.as_str(),
            executed = ?executed,
            "run terminated"
        );
        send_event(
            events,
            RunEvent::Terminated {
                status: status.as_str().to_string(),
            },
        );

        RunOutcome {
            run_id,
            status,
            answer: blackboard.final_answer().map(String::from),
            blackboard,
            executed,
            started_at,
            finished_at: Utc::now().timestamp_millis(),
        }
    }

    /// Planning 阶段：询问规划器、合并种子值并规范化；任何规划失败都退回兜底计划
    async fn plan(
        &self,
        run_id: &str,
        task_text: &str,
        known: &[Identifier],
        blackboard: &mut Blackboard,
        events: Option<&mpsc::UnboundedSender<RunEvent>>,
    ) -> PlanQueue {
        let (plan, rejected) = match self.oracle.plan(task_text, known).await {
            Ok(proposal) => match Self::ingest(proposal, blackboard) {
                Ok(ingested) => ingested,
                Err(e) => Self::fall_back(e, blackboard, events),
            },
            Err(e) => Self::fall_back(e, blackboard, events),
        };

        tracing::info!(run_id = %run_id, plan = ?plan.steps(), rejected = ?rejected, "plan ready");
        send_event(
            events,
            RunEvent::PlanReady {
                run_id: run_id.to_string(),
                steps: plan.steps(),
                rejected,
            },
        );
        plan
    }

    /// 合并规划器种子值并规范化计划；没有任何可识别的步骤时视为空计划
    fn ingest(
        proposal: PlanProposal,
        blackboard: &mut Blackboard,
    ) -> Result<(PlanQueue, Vec<String>), PlanningError> {
        Self::apply_seed_values(&proposal.seed_values, blackboard);
        for label in &proposal.rejected {
            tracing::warn!(label = %label, "planner proposed an unknown step, dropped");
        }
        if proposal.steps.is_empty() {
            return Err(PlanningError::Empty);
        }
        Ok((PlanQueue::normalized(proposal.steps), proposal.rejected))
    }

    fn apply_seed_values(seeds: &HashMap<String, Option<String>>, blackboard: &mut Blackboard) {
        for (name, value) in seeds {
            let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            let Some(kind) = BlackboardKey::seedable(name).and_then(IdentifierKind::from_blackboard_key)
            else {
                tracing::debug!(key = %name, "ignoring non-seedable planner value");
                continue;
            };
            match Identifier::normalized(kind, value) {
                Some(id) => blackboard.set(kind.blackboard_key(), id.as_str()),
                None => tracing::warn!(key = %name, value = %value, "ignoring malformed planner seed"),
            }
        }
    }

    fn fall_back(
        error: PlanningError,
        blackboard: &mut Blackboard,
        events: Option<&mpsc::UnboundedSender<RunEvent>>,
    ) -> (PlanQueue, Vec<String>) {
        tracing::warn!(error = %error, "planning failed, falling back to compose-only plan");
        blackboard.set(
            BlackboardKey::PlanningFailure,
            serde_json::json!({ "error": error.to_string() }),
        );
        send_event(
            events,
            RunEvent::PlanningFallback {
                reason: error.to_string(),
            },
        );
        (PlanQueue::fallback(), Vec::new())
    }

    /// 主循环：逐个弹出队首并执行，直到队列为空、终止步骤完成、被取消或引擎故障
    pub async fn drive(
        &self,
        mut plan: PlanQueue,
        blackboard: &mut Blackboard,
        cancel: &CancellationToken,
        events: Option<&mpsc::UnboundedSender<RunEvent>>,
    ) -> (RunStatus, Vec<StepName>) {
        let mut executed = Vec::new();
        loop {
            if cancel.is_cancelled() {
                tracing::info!(remaining = plan.len(), "run cancelled between steps");
                send_event(events, RunEvent::Cancelled);
                return (RunStatus::Cancelled, executed);
            }
            let Some(step) = plan.head() else {
                return (RunStatus::Completed, executed);
            };

            send_event(
                events,
                RunEvent::StepStarted {
                    step,
                    remaining: plan.len() - 1,
                },
            );
            tracing::debug!(step = %step, "invoking step");

            match self.invoker.invoke(step, blackboard).await {
                Ok(StepResult::Output(patch)) => {
                    let keys = patch.keys();
                    blackboard.merge(patch);
                    send_event(events, RunEvent::StepCompleted { step, keys });
                }
                Ok(StepResult::Failed(failure)) => {
                    tracing::warn!(step = %step, failure = %failure, "step failed, continuing");
                    blackboard.set(BlackboardKey::StepError(step), failure.to_marker(step));
                    send_event(
                        events,
                        RunEvent::StepFailed {
                            step,
                            reason: failure.to_string(),
                        },
                    );
                }
                Err(fault) => {
                    tracing::error!(step = %step, fault = %fault, "engine fault, terminating run");
                    return (RunStatus::Faulted(fault), executed);
                }
            }

            plan.pop();
            executed.push(step);
            if step.is_terminal() {
                return (RunStatus::Completed, executed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BlackboardPatch, StepFailure};
    use crate::steps::{Step, StepRegistry};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// 固定返回给定提案的规划器
    struct FixedOracle(Result<PlanProposal, PlanningError>);

    #[async_trait]
    impl PlanningOracle for FixedOracle {
        async fn plan(
            &self,
            _task_text: &str,
            _seeds: &[Identifier],
        ) -> Result<PlanProposal, PlanningError> {
            self.0.clone()
        }
    }

    /// 写入 `<name>` 结果键的步骤；若声明了依赖而依赖缺失则返回 MissingDependency
    struct EchoStep {
        name: StepName,
        requires: Vec<BlackboardKey>,
        output: BlackboardKey,
    }

    #[async_trait]
    impl Step for EchoStep {
        fn name(&self) -> StepName {
            self.name
        }

        fn required_keys(&self) -> &[BlackboardKey] {
            &self.requires
        }

        async fn invoke(&self, blackboard: &Blackboard) -> StepResult {
            if let Some(key) = blackboard.first_missing(&self.requires) {
                return StepResult::missing(key);
            }
            StepResult::Output(BlackboardPatch::new().with(self.output, self.name.as_str()))
        }
    }

    fn echo(name: StepName, output: BlackboardKey) -> EchoStep {
        EchoStep {
            name,
            requires: Vec::new(),
            output,
        }
    }

    fn engine_with(oracle: FixedOracle, registry: StepRegistry) -> ExecutionEngine {
        ExecutionEngine::new(Arc::new(oracle), StepInvoker::new(registry, Duration::from_secs(5)))
    }

    fn full_registry() -> StepRegistry {
        let mut registry = StepRegistry::new();
        registry.register(echo(StepName::Scheduling, BlackboardKey::SchedulingResult));
        registry.register(EchoStep {
            name: StepName::Insights,
            requires: vec![BlackboardKey::WorkOrderId],
            output: BlackboardKey::InsightsResult,
        });
        registry.register(echo(StepName::Knowledge, BlackboardKey::KnowledgeResult));
        registry.register(echo(StepName::Compose, BlackboardKey::FinalAnswer));
        registry
    }

    fn proposal(steps: &[StepName]) -> PlanProposal {
        PlanProposal::new(steps.to_vec())
    }

    #[tokio::test]
    async fn test_executes_in_plan_order_and_appends_compose() {
        let engine = engine_with(
            FixedOracle(Ok(proposal(&[StepName::Knowledge, StepName::Scheduling]))),
            full_registry(),
        );
        let outcome = engine
            .execute("task", &[], CancellationToken::new(), None)
            .await;
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(
            outcome.executed,
            vec![StepName::Knowledge, StepName::Scheduling, StepName::Compose]
        );
        assert_eq!(outcome.answer.as_deref(), Some("compose"));
    }

    #[tokio::test]
    async fn test_missing_dependency_recorded_and_run_continues() {
        let engine = engine_with(
            FixedOracle(Ok(proposal(&[StepName::Insights, StepName::Compose]))),
            full_registry(),
        );
        let outcome = engine
            .execute("no ids here", &[], CancellationToken::new(), None)
            .await;
        assert_eq!(outcome.status, RunStatus::Completed);
        let marker = outcome
            .blackboard
            .get(BlackboardKey::StepError(StepName::Insights))
            .unwrap();
        assert_eq!(
            StepFailure::from_marker(marker),
            Some(StepFailure::MissingDependency {
                required_key: BlackboardKey::WorkOrderId
            })
        );
        assert_eq!(outcome.executed.last(), Some(&StepName::Compose));
    }

    #[tokio::test]
    async fn test_oracle_failure_falls_back_to_compose() {
        let engine = engine_with(
            FixedOracle(Err(PlanningError::Unparseable("garbage".into()))),
            full_registry(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = engine
            .execute("task", &[], CancellationToken::new(), Some(&tx))
            .await;
        assert_eq!(outcome.executed, vec![StepName::Compose]);
        assert!(outcome.blackboard.contains(BlackboardKey::PlanningFailure));
        assert!(matches!(
            rx.recv().await,
            Some(RunEvent::PlanningFallback { .. })
        ));
    }

    #[tokio::test]
    async fn test_all_labels_rejected_is_empty_plan() {
        let engine = engine_with(
            FixedOracle(Ok(PlanProposal::from_labels(["teleport"]))),
            full_registry(),
        );
        let outcome = engine
            .execute("task", &[], CancellationToken::new(), None)
            .await;
        assert_eq!(outcome.executed, vec![StepName::Compose]);
        let diag = outcome.blackboard.get(BlackboardKey::PlanningFailure).unwrap();
        assert_eq!(diag["error"], json!(PlanningError::Empty.to_string()));
    }

    #[tokio::test]
    async fn test_seed_order_last_writer_wins() {
        let oracle = FixedOracle(Ok(proposal(&[StepName::Compose])
            .with_seed("product_id", Some("PROD-9".to_string()))
            .with_seed("work_order_id", None)
            .with_seed("final_answer", Some("forged".to_string()))));
        let engine = engine_with(oracle, full_registry());
        let outcome = engine
            .execute(
                "WO-1 and PROD-1",
                &[Identifier::work_order("WO-2")],
                CancellationToken::new(),
                None,
            )
            .await;
        let bb = &outcome.blackboard;
        assert_eq!(bb.work_order_id(), Some("WO-2"));
        assert_eq!(bb.product_id(), Some("PROD-9"));
        assert_eq!(bb.final_answer(), Some("compose"));
    }

    #[tokio::test]
    async fn test_seed_values_are_normalized() {
        let oracle = FixedOracle(Ok(proposal(&[StepName::Knowledge, StepName::Compose])
            .with_seed("product_id", Some("prod_77881".to_string()))
            .with_seed("work_order_id", Some("not an id".to_string()))));
        let engine = engine_with(oracle, full_registry());
        let outcome = engine
            .execute(
                "How do I clean it?",
                &[Identifier::work_order("wo 5")],
                CancellationToken::new(),
                None,
            )
            .await;
        let bb = &outcome.blackboard;
        assert_eq!(bb.product_id(), Some("PROD-77881"));
        // 规划器给出的非法值被忽略，保留调用方的规范化值
        assert_eq!(bb.work_order_id(), Some("WO-5"));
    }

    #[tokio::test]
    async fn test_malformed_caller_identifier_is_dropped() {
        let engine = engine_with(
            FixedOracle(Ok(proposal(&[StepName::Compose]))),
            full_registry(),
        );
        let outcome = engine
            .execute(
                "details of WO-1",
                &[Identifier::product("banana")],
                CancellationToken::new(),
                None,
            )
            .await;
        assert_eq!(outcome.blackboard.work_order_id(), Some("WO-1"));
        assert!(!outcome.blackboard.contains(BlackboardKey::ProductId));
    }

    /// 执行完即触发取消的步骤
    struct CancellingStep {
        token: CancellationToken,
    }

    #[async_trait]
    impl Step for CancellingStep {
        fn name(&self) -> StepName {
            StepName::Scheduling
        }

        async fn invoke(&self, _blackboard: &Blackboard) -> StepResult {
            self.token.cancel();
            StepResult::Output(BlackboardPatch::new().with(BlackboardKey::WorkOrderId, "WO-100245"))
        }
    }

    #[tokio::test]
    async fn test_cancelled_between_steps_keeps_partial_state() {
        let cancel = CancellationToken::new();
        let mut registry = full_registry();
        registry.register(CancellingStep {
            token: cancel.clone(),
        });
        let engine = engine_with(
            FixedOracle(Ok(proposal(&[
                StepName::Scheduling,
                StepName::Insights,
                StepName::Compose,
            ]))),
            registry,
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = engine.execute("today?", &[], cancel, Some(&tx)).await;
        drop(tx);

        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(outcome.executed, vec![StepName::Scheduling]);
        assert_eq!(outcome.blackboard.work_order_id(), Some("WO-100245"));
        assert!(!outcome.blackboard.contains(BlackboardKey::InsightsResult));
        assert!(outcome.answer.is_none());

        let mut saw_cancelled = false;
        while let Some(ev) = rx.recv().await {
            if let RunEvent::StepStarted { step, .. } = ev {
                assert_eq!(step, StepName::Scheduling);
            }
            saw_cancelled |= ev == RunEvent::Cancelled;
        }
        assert!(saw_cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let engine = engine_with(
            FixedOracle(Ok(proposal(&[StepName::Scheduling]))),
            full_registry(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = engine.execute("task", &[], cancel, None).await;
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert!(outcome.executed.is_empty());
        assert!(matches!(outcome.into_result(), Err(AgentError::Cancelled)));
    }

    #[tokio::test]
    async fn test_unregistered_step_faults() {
        let mut registry = StepRegistry::new();
        registry.register(echo(StepName::Compose, BlackboardKey::FinalAnswer));
        let engine = engine_with(
            FixedOracle(Ok(proposal(&[StepName::Knowledge, StepName::Compose]))),
            registry,
        );
        let outcome = engine
            .execute("task", &[], CancellationToken::new(), None)
            .await;
        assert_eq!(
            outcome.status,
            RunStatus::Faulted(EngineFault::UnregisteredStep(StepName::Knowledge))
        );
        assert!(outcome.answer.is_none());
    }

    #[tokio::test]
    async fn test_drive_empty_plan_terminates() {
        let engine = engine_with(FixedOracle(Err(PlanningError::Empty)), full_registry());
        let mut bb = Blackboard::new();
        let (status, executed) = engine
            .drive(PlanQueue::default(), &mut bb, &CancellationToken::new(), None)
            .await;
        assert_eq!(status, RunStatus::Completed);
        assert!(executed.is_empty());
    }
}
