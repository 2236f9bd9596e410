//! compose 终止步骤：把黑板渲染成最终回答
//!
//! 这是唯一把结构化数据变成文字的地方。回答只能依据黑板内容，缺失的信息要明确说明（如
//! "product identifier not available"），不能编造。LlmComposer 失败时退回 TemplateComposer，保证 compose 不会失败。

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::{Blackboard, BlackboardKey, BlackboardPatch, StepFailure, StepName};
use crate::llm::{LlmClient, Message};
use crate::steps::services::{CleanupGuide, ScheduledWorkOrder, WorkOrderInsights};
use crate::steps::{Step, StepResult};

/// 对外的最终回答
pub type RenderedAnswer = String;

/// 回答生成器 trait
#[async_trait]
pub trait Composer: Send + Sync {
    async fn compose(&self, blackboard: &Blackboard) -> RenderedAnswer;
}

/// 确定性模板渲染
#[derive(Debug, Default, Clone)]
pub struct TemplateComposer;

/// 某个步骤在黑板上的状态
enum Section<T> {
    /// 步骤未运行
    Absent,
    Ready(T),
    /// 记录存在但形状不符，原样输出
    Raw(Value),
    Failed(StepFailure),
}

fn section<T: DeserializeOwned>(bb: &Blackboard, key: BlackboardKey, step: StepName) -> Section<T> {
    if let Some(value) = bb.get(key) {
        return match serde_json::from_value::<T>(value.clone()) {
            Ok(v) => Section::Ready(v),
            Err(_) => Section::Raw(value.clone()),
        };
    }
    match bb
        .get(BlackboardKey::StepError(step))
        .and_then(StepFailure::from_marker)
    {
        Some(f) => Section::Failed(f),
        None => Section::Absent,
    }
}

fn unavailable(failure: &StepFailure) -> String {
    match failure {
        StepFailure::MissingDependency { required_key } => {
            format!("{} not available", required_key.describe())
        }
        StepFailure::ServiceError { cause } => format!("service error: {cause}"),
    }
}

impl TemplateComposer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, bb: &Blackboard) -> RenderedAnswer {
        let mut s = String::new();
        if let Some(task) = bb.task_text() {
            s.push_str(&format!("Question: {}\n\n", task));
        }
        if let Some(diag) = bb.get(BlackboardKey::PlanningFailure) {
            let reason = diag.get("error").and_then(Value::as_str).unwrap_or("unknown");
            s.push_str(&format!(
                "Note: no plan could be made for this request ({reason}); answering from available data only.\n\n"
            ));
        }

        let body_start = s.len();
        self.render_work_order(bb, &mut s);
        self.render_knowledge(bb, &mut s);
        if s.len() == body_start {
            s.push_str("No information was gathered for this request.\n");
        }
        s.trim_end().to_string()
    }

    fn render_work_order(&self, bb: &Blackboard, s: &mut String) {
        let schedule: Section<ScheduledWorkOrder> =
            section(bb, BlackboardKey::SchedulingResult, StepName::Scheduling);
        let insights: Section<WorkOrderInsights> =
            section(bb, BlackboardKey::InsightsResult, StepName::Insights);
        if matches!(schedule, Section::Absent)
            && matches!(insights, Section::Absent)
            && bb.work_order_id().is_none()
        {
            return;
        }

        match bb.work_order_id() {
            Some(id) => s.push_str(&format!("Work order: {}\n", id)),
            None => s.push_str("Work order: work order identifier not available\n"),
        }

        match schedule {
            Section::Absent => {}
            Section::Ready(entry) => s.push_str(&format!(
                "Scheduled: {} at {}, site {}, technician {}\n",
                entry.date, entry.scheduled_time, entry.site, entry.technician_id
            )),
            Section::Raw(v) => s.push_str(&format!("Schedule: {}\n", v)),
            Section::Failed(f) => s.push_str(&format!("Schedule: {}\n", unavailable(&f))),
        }

        match insights {
            Section::Absent => {}
            Section::Ready(i) => {
                s.push_str(&format!(
                    "Work order type: {} (priority {})\n",
                    i.work_order_type, i.priority
                ));
                s.push_str(&format!("Product: {}\n", i.product_id));
                s.push_str(&format!("Symptom: {}\n", i.symptom_summary));
                if !i.last_actions.is_empty() {
                    s.push_str("Recent actions:\n");
                    for a in &i.last_actions {
                        s.push_str(&format!("- {}\n", a));
                    }
                }
            }
            Section::Raw(v) => s.push_str(&format!("Work order details: {}\n", v)),
            Section::Failed(f) => {
                s.push_str(&format!("Work order details: {}\n", unavailable(&f)))
            }
        }
        s.push('\n');
    }

    fn render_knowledge(&self, bb: &Blackboard, s: &mut String) {
        let guide: Section<CleanupGuide> =
            section(bb, BlackboardKey::KnowledgeResult, StepName::Knowledge);
        match guide {
            // 没有文档也没有工单详情时，至少说明已知的产品号
            Section::Absent => {
                if let Some(product_id) = bb.product_id() {
                    if !bb.contains(BlackboardKey::InsightsResult) {
                        s.push_str(&format!("Product: {}\n", product_id));
                    }
                }
            }
            Section::Ready(g) => {
                s.push_str(&format!(
                    "Cleanup steps for {} ({}):\n",
                    g.product_id, g.doc_title
                ));
                for (i, step) in g.cleanup_steps.iter().enumerate() {
                    s.push_str(&format!("{}. {}\n", i + 1, step));
                }
                s.push_str(&format!("Source: {}\n", g.source));
            }
            Section::Raw(v) => s.push_str(&format!("Cleanup steps: {}\n", v)),
            Section::Failed(f) => s.push_str(&format!("Cleanup steps: {}\n", unavailable(&f))),
        }
    }
}

#[async_trait]
impl Composer for TemplateComposer {
    async fn compose(&self, blackboard: &Blackboard) -> RenderedAnswer {
        self.render(blackboard)
    }
}

/// LLM 回答生成：只允许使用 prompt 中给出的事实
pub struct LlmComposer {
    llm: Arc<dyn LlmClient>,
    fallback: TemplateComposer,
}

impl LlmComposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            fallback: TemplateComposer,
        }
    }

    fn prompt(bb: &Blackboard) -> String {
        let field = |key: BlackboardKey| {
            bb.get(key)
                .map(|v| serde_json::to_string_pretty(v).unwrap_or_default())
                .unwrap_or_else(|| "{}".to_string())
        };
        let diagnostics: Vec<String> = StepName::ALL
            .iter()
            .filter_map(|step| {
                bb.get(BlackboardKey::StepError(*step))
                    .map(|v| format!("- {}: {}", step, v))
            })
            .collect();
        format!(
            "User question:\n{}\n\n\
             Known identifiers: work_order_id={}, product_id={}\n\n\
             Scheduling result (if available):\n{}\n\n\
             Service insights result (if available):\n{}\n\n\
             Knowledge result (if available):\n{}\n\n\
             Step diagnostics:\n{}\n\n\
             Write a concise final answer that:\n\
             - Answers the user's question directly\n\
             - Includes: work_order_id, work_order_type (if available)\n\
             - Includes cleanup steps if available (as bullets)\n\
             - If something is missing (ex: product_id), say that clearly",
            bb.task_text().unwrap_or(""),
            bb.work_order_id().unwrap_or("not available"),
            bb.product_id().unwrap_or("not available"),
            field(BlackboardKey::SchedulingResult),
            field(BlackboardKey::InsightsResult),
            field(BlackboardKey::KnowledgeResult),
            if diagnostics.is_empty() {
                "(none)".to_string()
            } else {
                diagnostics.join("\n")
            },
        )
    }
}

#[async_trait]
impl Composer for LlmComposer {
    async fn compose(&self, blackboard: &Blackboard) -> RenderedAnswer {
        let messages = vec![
            Message::system(
                "You are a field service assistant.\nOnly use the factual data provided below. Do not invent details.",
            ),
            Message::user(Self::prompt(blackboard)),
        ];
        match self.llm.complete(&messages).await {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => {
                tracing::warn!("LLM composer returned an empty answer, using template");
                self.fallback.render(blackboard)
            }
            Err(e) => {
                tracing::warn!("LLM composer failed ({}), using template", e);
                self.fallback.render(blackboard)
            }
        }
    }
}

/// compose 步骤：调用 Composer 并写入 final_answer
pub struct ComposeStep {
    composer: Arc<dyn Composer>,
}

impl ComposeStep {
    pub fn new(composer: Arc<dyn Composer>) -> Self {
        Self { composer }
    }
}

#[async_trait]
impl Step for ComposeStep {
    fn name(&self) -> StepName {
        StepName::Compose
    }

    fn required_keys(&self) -> &[BlackboardKey] {
        &[BlackboardKey::TaskText]
    }

    fn output_keys(&self) -> &[BlackboardKey] {
        &[BlackboardKey::FinalAnswer]
    }

    async fn invoke(&self, blackboard: &Blackboard) -> StepResult {
        if let Some(key) = blackboard.first_missing(self.required_keys()) {
            return StepResult::missing(key);
        }
        let answer = self.composer.compose(blackboard).await;
        StepResult::Output(BlackboardPatch::new().with(BlackboardKey::FinalAnswer, answer))
    }
}
