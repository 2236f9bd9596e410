//! 计划队列：步骤名闭集与只允许弹出队首的有序队列
//!
//! 计划在摄入时规范化一次：截断首个终止步骤之后的内容（按终止规则它们永远不会执行），
//! 若没有终止步骤则追加，保证非空计划恰好含一个终止步骤且位于末尾。

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 步骤名（构建期已知的闭集）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    /// 查询今日排班，产出 work_order_id
    Scheduling,
    /// 按 work_order_id 查询工单详情，产出 product_id
    Insights,
    /// 按 product_id 查询清洁 / 维护文档
    Knowledge,
    /// 终止步骤：基于黑板生成最终回答
    Compose,
}

impl StepName {
    pub const ALL: [StepName; 4] = [
        StepName::Scheduling,
        StepName::Insights,
        StepName::Knowledge,
        StepName::Compose,
    ];

    /// 终止步骤，必须且只能在计划末尾执行一次
    pub const TERMINAL: StepName = StepName::Compose;

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Scheduling => "scheduling",
            StepName::Insights => "insights",
            StepName::Knowledge => "knowledge",
            StepName::Compose => "compose",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == Self::TERMINAL
    }

    /// 供 Planner prompt 使用的能力描述
    pub fn description(&self) -> &'static str {
        match self {
            StepName::Scheduling => "returns today's scheduled work order (work_order_id)",
            StepName::Insights => {
                "returns details/type/history for a work_order_id and includes product_id"
            }
            StepName::Knowledge => "returns documentation/cleanup steps for a product_id",
            StepName::Compose => "composes the final answer; must always be last",
        }
    }

    /// 解析规划器给出的步骤标签，兼容历史别名（大小写与首尾空白不敏感）
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "scheduling" | "scheduling_agent" | "schedule" => Some(StepName::Scheduling),
            "insights" | "service_insights" | "service_insights_agent" => Some(StepName::Insights),
            "knowledge" | "knowledge_agent" | "knowledge_access" => Some(StepName::Knowledge),
            "compose" | "final_answer" | "final" => Some(StepName::Compose),
            _ => None,
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_label(s).ok_or_else(|| format!("Unknown step: {s}"))
    }
}

/// 待执行步骤队列：只能弹出队首，运行中不重排、不插入
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanQueue {
    steps: VecDeque<StepName>,
}

impl PlanQueue {
    /// 规范化摄入：截断首个终止步骤之后的部分，缺少终止步骤时追加
    pub fn normalized(raw: impl IntoIterator<Item = StepName>) -> Self {
        let mut steps = VecDeque::new();
        let mut dropped = Vec::new();
        let mut terminated = false;
        for step in raw {
            if terminated {
                dropped.push(step);
                continue;
            }
            steps.push_back(step);
            terminated = step.is_terminal();
        }
        if !dropped.is_empty() {
            tracing::debug!(?dropped, "steps after the terminal step are unreachable, dropped");
        }
        if !terminated {
            steps.push_back(StepName::TERMINAL);
        }
        Self { steps }
    }

    /// 规划失败时的兜底计划：只运行终止步骤
    pub fn fallback() -> Self {
        Self::normalized([])
    }

    pub fn head(&self) -> Option<StepName> {
        self.steps.front().copied()
    }

    pub fn pop(&mut self) -> Option<StepName> {
        self.steps.pop_front()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> Vec<StepName> {
        self.steps.iter().copied().collect()
    }
}
