//! 错误类型
//!
//! - AgentError：运行级错误（取消、引擎故障、配置）
//! - EngineFault：计划与注册表契约被破坏（编程错误），终止当前运行
//! - PlanningError：规划器失败或输出无法解析，由引擎降级为兜底计划
//! - StepFailure：步骤失败标记，写入黑板诊断键，运行继续

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::blackboard::BlackboardKey;
use crate::core::plan::StepName;

/// 运行级错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Run cancelled")]
    Cancelled,

    #[error("Engine fault: {0}")]
    EngineFault(#[from] EngineFault),

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 引擎故障：不应在正确装配的系统中出现
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EngineFault {
    #[error("Step '{0}' is not registered")]
    UnregisteredStep(StepName),
}

/// 规划失败：可恢复，引擎回退到只含终止步骤的计划
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("Planning oracle failed: {0}")]
    Oracle(String),

    #[error("Unparseable plan: {0}")]
    Unparseable(String),

    #[error("Planning oracle returned an empty plan")]
    Empty,
}

/// 步骤失败标记（序列化后写入 `<step>_error`）
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum StepFailure {
    #[error("Missing {required_key}")]
    MissingDependency { required_key: BlackboardKey },

    #[error("Service error: {cause}")]
    ServiceError { cause: String },
}

impl StepFailure {
    /// 诊断记录：失败标记 + agent 字段
    pub fn to_marker(&self, step: StepName) -> serde_json::Value {
        let mut marker = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        if let Some(obj) = marker.as_object_mut() {
            obj.insert("agent".to_string(), step.as_str().into());
            obj.insert("message".to_string(), self.to_string().into());
        }
        marker
    }

    /// 从黑板诊断记录还原失败标记
    pub fn from_marker(marker: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(marker.clone()).ok()
    }
}
