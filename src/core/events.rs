//! 运行过程事件：用于流式展示规划、步骤执行与终止

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::blackboard::BlackboardKey;
use crate::core::plan::StepName;

/// 单次运行中的过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 计划已规范化，即将执行
    PlanReady {
        run_id: String,
        steps: Vec<StepName>,
        /// 规划器给出但无法识别的步骤名
        rejected: Vec<String>,
    },
    /// 规划失败，已回退到兜底计划
    PlanningFallback { reason: String },
    /// 开始执行步骤
    StepStarted { step: StepName, remaining: usize },
    /// 步骤成功，输出已合并
    StepCompleted {
        step: StepName,
        keys: Vec<BlackboardKey>,
    },
    /// 步骤失败，诊断已写入黑板
    StepFailed { step: StepName, reason: String },
    /// 运行在两步之间被取消
    Cancelled,
    /// 运行结束
    Terminated { status: String },
}

pub(crate) fn send_event(tx: Option<&mpsc::UnboundedSender<RunEvent>>, ev: RunEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
