//! 规划层：由任务文本得到步骤计划（LLM 规划 / 关键词意图路由）
//!
//! 引擎只依赖 PlanningOracle；规划器失败或输出无法解析时返回 PlanningError，由引擎退回兜底计划。

pub mod llm;
pub mod rules;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::{PlanningError, StepName};
use crate::extract::Identifier;

pub use llm::{parse_plan_output, LlmPlanner, PlanReply};
pub use rules::{Intent, RulePlanner};

/// 规划结果：有序步骤 + 可选种子值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanProposal {
    pub steps: Vec<StepName>,
    /// 无法识别、已丢弃的步骤名
    pub rejected: Vec<String>,
    /// 种子值（键为黑板键名，null 表示不提供）
    pub seed_values: HashMap<String, Option<String>>,
}

impl PlanProposal {
    pub fn new(steps: impl IntoIterator<Item = StepName>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Default::default()
        }
    }

    /// 从原始步骤标签构建；未知标签进入 rejected
    pub fn from_labels<S: AsRef<str>>(labels: impl IntoIterator<Item = S>) -> Self {
        let mut proposal = Self::default();
        for label in labels {
            let label = label.as_ref();
            match StepName::parse_label(label) {
                Some(step) => proposal.steps.push(step),
                None => proposal.rejected.push(label.to_string()),
            }
        }
        proposal
    }

    pub fn with_seed(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.seed_values.insert(key.into(), value);
        self
    }
}

/// 规划器 trait：给定任务文本与已知标识符，返回计划
#[async_trait]
pub trait PlanningOracle: Send + Sync {
    async fn plan(
        &self,
        task_text: &str,
        seeds: &[Identifier],
    ) -> Result<PlanProposal, PlanningError>;
}
