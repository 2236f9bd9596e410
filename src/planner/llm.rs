//! LLM 规划器
//!
//! 拼接规划 prompt（可用步骤、路由规则、JSON 输出约定与 schema），调用 LLM，
//! parse_plan_output 从回复中提取 JSON（```json 代码块或首个 `{` 到最后一个 `}`）并解析为 PlanProposal。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{PlanningError, StepName};
use crate::extract::Identifier;
use crate::llm::{LlmClient, Message};
use crate::planner::{PlanProposal, PlanningOracle};

/// 规划器回复格式：{"plan": [...], "seed_values": {...}}
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanReply {
    /// 有序步骤名，如 scheduling、insights、knowledge、compose
    pub plan: Vec<String>,
    /// 可选：从问题中识别出的 work_order_id / product_id
    ///
    /// 按原始 JSON 接收，由 seed_values_from 宽松转换；形状不对的种子值不影响计划本身。
    #[serde(default)]
    #[schemars(with = "Option<HashMap<String, Option<String>>>")]
    pub seed_values: Value,
}

/// 宽松转换种子值：字符串保留、数字转字符串、null 表示不提供，其余类型丢弃
fn seed_values_from(raw: Value) -> HashMap<String, Option<String>> {
    let map = match raw {
        Value::Object(map) => map,
        Value::Null => return HashMap::new(),
        other => {
            tracing::warn!(seed_values = %other, "planner seed_values is not an object, ignored");
            return HashMap::new();
        }
    };
    map.into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, Some(s))),
            Value::Number(n) => Some((key, Some(n.to_string()))),
            Value::Null => Some((key, None)),
            other => {
                tracing::warn!(key = %key, value = %other, "unsupported planner seed value, ignored");
                None
            }
        })
        .collect()
}

const ROUTING_RULES: &str = "\
Rules:
- If the user asks what is scheduled today, include scheduling.
- If the user asks for work order details/type/history, include insights.
- If the user asks for cleaning steps/docs, include knowledge.
- Always include compose last.
- If the user provides a work_order_id directly, scheduling is optional.
- If the user provides a product_id directly, you may skip insights and go to knowledge.";

/// 解析 LLM 输出为计划
pub fn parse_plan_output(output: &str) -> Result<PlanProposal, PlanningError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            return Err(PlanningError::Unparseable(trimmed.to_string()));
        }
    } else {
        return Err(PlanningError::Unparseable(trimmed.to_string()));
    };

    let reply: PlanReply = serde_json::from_str(json_str)
        .map_err(|e| PlanningError::Unparseable(format!("{}: {}", e, json_str)))?;

    let mut proposal = PlanProposal::from_labels(&reply.plan);
    proposal.seed_values = seed_values_from(reply.seed_values);
    Ok(proposal)
}

/// LLM 规划器：持有注入的 LLM 客户端与 system prompt
pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: default_system_prompt(),
        }
    }

    fn user_prompt(task_text: &str, seeds: &[Identifier]) -> String {
        let known = if seeds.is_empty() {
            "(none)".to_string()
        } else {
            seeds
                .iter()
                .map(|id| format!("{}={}", id.kind.blackboard_key(), id.value))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("Known identifiers: {known}\n\nUser question:\n{task_text}")
    }
}

fn default_system_prompt() -> String {
    let steps = StepName::ALL
        .iter()
        .map(|s| format!("- {}: {}", s, s.description()))
        .collect::<Vec<_>>()
        .join("\n");
    let schema = serde_json::to_string_pretty(&schema_for!(PlanReply)).unwrap_or_default();
    format!(
        "You are the planner for a field service multi-step orchestrator.\n\n\
         Steps available:\n{steps}\n\n{ROUTING_RULES}\n\n\
         Return ONLY JSON matching this schema:\n{schema}\n\n\
         Example:\n{{\"plan\": [\"scheduling\", \"insights\", \"knowledge\", \"compose\"]}}"
    )
}

#[async_trait]
impl PlanningOracle for LlmPlanner {
    async fn plan(
        &self,
        task_text: &str,
        seeds: &[Identifier],
    ) -> Result<PlanProposal, PlanningError> {
        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(Self::user_prompt(task_text, seeds)),
        ];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(PlanningError::Oracle)?;
        parse_plan_output(&output)
    }
}
