//! 规则规划器：关键词意图路由
//!
//! 意图路由是计划队列的退化情形：每个意图对应一条固定计划。无需 LLM，适合离线与测试。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{PlanningError, StepName};
use crate::extract::{Identifier, IdentifierKind};
use crate::planner::{PlanProposal, PlanningOracle};

/// 识别出的意图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// 今日排班 -> 工单详情 -> 清洁文档
    ScheduleFlow,
    /// 只查工单详情
    InsightsOnly,
    /// 只查清洁文档
    KnowledgeOnly,
    Unknown,
}

impl Intent {
    pub fn plan(&self) -> Vec<StepName> {
        use StepName::*;
        match self {
            Intent::ScheduleFlow => vec![Scheduling, Insights, Knowledge, Compose],
            Intent::InsightsOnly => vec![Insights, Compose],
            Intent::KnowledgeOnly => vec![Knowledge, Compose],
            Intent::Unknown => vec![Compose],
        }
    }
}

/// 关键词规划器
#[derive(Debug, Default, Clone)]
pub struct RulePlanner;

impl RulePlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, task_text: &str) -> Intent {
        let q = task_text.to_lowercase();

        if q.contains("scheduled today") || q.contains("today") {
            return Intent::ScheduleFlow;
        }
        if q.contains("work order") && (q.contains("detail") || q.contains("insight")) {
            return Intent::InsightsOnly;
        }
        if q.contains("clean") || q.contains("documentation") {
            return Intent::KnowledgeOnly;
        }
        Intent::Unknown
    }

    fn wants_cleanup(task_text: &str) -> bool {
        let q = task_text.to_lowercase();
        q.contains("clean") || q.contains("documentation")
    }
}

#[async_trait]
impl PlanningOracle for RulePlanner {
    async fn plan(
        &self,
        task_text: &str,
        seeds: &[Identifier],
    ) -> Result<PlanProposal, PlanningError> {
        let intent = self.classify(task_text);
        let mut steps = intent.plan();
        // 工单详情之后还问了清洁方法，且没有直接给出产品号：补上 knowledge
        let has_product = seeds.iter().any(|id| id.kind == IdentifierKind::Product);
        if intent == Intent::InsightsOnly && Self::wants_cleanup(task_text) && !has_product {
            steps = vec![StepName::Insights, StepName::Knowledge, StepName::Compose];
        }
        tracing::debug!(?intent, ?steps, "rule planner");
        Ok(PlanProposal::new(steps))
    }
}
