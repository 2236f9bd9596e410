//! 黑板：单次运行内共享的键值状态
//!
//! 键是固定的闭集（BlackboardKey），每个键有明确的生产者 / 消费者；值为 JSON（字符串、结构化记录或 null）。
//! 写入采用后写覆盖；null 视为缺省。黑板随运行创建、随运行返回而丢弃。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::core::plan::StepName;

/// 黑板键
///
/// | 键 | 生产者 | 消费者 |
/// |---|---|---|
/// | TaskText | 引擎（运行开始） | compose / planner |
/// | WorkOrderId | 实体抽取、调用方、规划种子、scheduling | insights |
/// | ProductId | 实体抽取、调用方、规划种子、insights | knowledge |
/// | SchedulingResult / InsightsResult / KnowledgeResult | 对应步骤 | compose |
/// | FinalAnswer | compose | 调用方 |
/// | PlanningFailure | 引擎（规划兜底） | compose |
/// | StepError(step) | 引擎（步骤失败） | compose |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlackboardKey {
    TaskText,
    WorkOrderId,
    ProductId,
    SchedulingResult,
    InsightsResult,
    KnowledgeResult,
    FinalAnswer,
    PlanningFailure,
    StepError(StepName),
}

impl BlackboardKey {
    /// 面向用户的名称，用于「xxx not available」一类的提示
    pub fn describe(&self) -> String {
        match self {
            BlackboardKey::TaskText => "task text".to_string(),
            BlackboardKey::WorkOrderId => "work order identifier".to_string(),
            BlackboardKey::ProductId => "product identifier".to_string(),
            BlackboardKey::SchedulingResult => "schedule".to_string(),
            BlackboardKey::InsightsResult => "work order details".to_string(),
            BlackboardKey::KnowledgeResult => "cleanup steps".to_string(),
            BlackboardKey::FinalAnswer => "final answer".to_string(),
            BlackboardKey::PlanningFailure => "planning diagnostic".to_string(),
            BlackboardKey::StepError(step) => format!("{step} diagnostic"),
        }
    }

    /// 规划器种子值允许写入的键
    pub fn seedable(name: &str) -> Option<Self> {
        match name.parse::<BlackboardKey>().ok()? {
            key @ (BlackboardKey::WorkOrderId | BlackboardKey::ProductId) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for BlackboardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlackboardKey::TaskText => f.write_str("task_text"),
            BlackboardKey::WorkOrderId => f.write_str("work_order_id"),
            BlackboardKey::ProductId => f.write_str("product_id"),
            BlackboardKey::SchedulingResult => f.write_str("scheduling_result"),
            BlackboardKey::InsightsResult => f.write_str("insights_result"),
            BlackboardKey::KnowledgeResult => f.write_str("knowledge_result"),
            BlackboardKey::FinalAnswer => f.write_str("final_answer"),
            BlackboardKey::PlanningFailure => f.write_str("planning_failure"),
            BlackboardKey::StepError(step) => write!(f, "{step}_error"),
        }
    }
}

impl FromStr for BlackboardKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s.trim() {
            "task_text" => BlackboardKey::TaskText,
            "work_order_id" => BlackboardKey::WorkOrderId,
            "product_id" => BlackboardKey::ProductId,
            "scheduling_result" => BlackboardKey::SchedulingResult,
            "insights_result" => BlackboardKey::InsightsResult,
            "knowledge_result" => BlackboardKey::KnowledgeResult,
            "final_answer" => BlackboardKey::FinalAnswer,
            "planning_failure" => BlackboardKey::PlanningFailure,
            other => {
                let step = other
                    .strip_suffix("_error")
                    .and_then(StepName::parse_label)
                    .ok_or_else(|| format!("Unknown blackboard key: {other}"))?;
                BlackboardKey::StepError(step)
            }
        };
        Ok(key)
    }
}

impl Serialize for BlackboardKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlackboardKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 一次步骤输出：待合并进黑板的键值对（按插入顺序合并）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlackboardPatch {
    entries: Vec<(BlackboardKey, Value)>,
}

impl BlackboardPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: BlackboardKey, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: BlackboardKey, value: impl Into<Value>) {
        self.entries.push((key, value.into()));
    }

    pub fn keys(&self) -> Vec<BlackboardKey> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }
}

impl IntoIterator for BlackboardPatch {
    type Item = (BlackboardKey, Value);
    type IntoIter = std::vec::IntoIter<(BlackboardKey, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// 黑板本体
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blackboard {
    entries: BTreeMap<BlackboardKey, Value>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取键；null 与未写入同样视为缺省
    pub fn get(&self, key: BlackboardKey) -> Option<&Value> {
        self.entries.get(&key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: BlackboardKey) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: BlackboardKey) -> bool {
        self.get(key).is_some()
    }

    /// 返回第一个缺失的键（全部存在时为 None）
    pub fn first_missing(&self, keys: &[BlackboardKey]) -> Option<BlackboardKey> {
        keys.iter().copied().find(|k| !self.contains(*k))
    }

    pub fn set(&mut self, key: BlackboardKey, value: impl Into<Value>) {
        self.entries.insert(key, value.into());
    }

    /// 合并补丁：逐键覆盖
    pub fn merge(&mut self, patch: BlackboardPatch) {
        for (key, value) in patch {
            self.entries.insert(key, value);
        }
    }

    /// 当前存在（非 null）的键
    pub fn keys(&self) -> Vec<BlackboardKey> {
        self.entries
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn task_text(&self) -> Option<&str> {
        self.get_str(BlackboardKey::TaskText)
    }

    pub fn work_order_id(&self) -> Option<&str> {
        self.get_str(BlackboardKey::WorkOrderId)
    }

    pub fn product_id(&self) -> Option<&str> {
        self.get_str(BlackboardKey::ProductId)
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.get_str(BlackboardKey::FinalAnswer)
    }

    /// JSON 快照（键为字符串形式），用于测试与日志
    pub fn snapshot(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }
}
