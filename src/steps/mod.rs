//! 步骤层：注册表、调用器、现场服务步骤与 compose 终止步骤

pub mod compose;
pub mod insights;
pub mod invoker;
pub mod knowledge;
pub mod registry;
pub mod scheduling;
pub mod services;

pub use compose::{ComposeStep, Composer, LlmComposer, RenderedAnswer, TemplateComposer};
pub use insights::InsightsStep;
pub use invoker::StepInvoker;
pub use knowledge::KnowledgeStep;
pub use registry::{Step, StepRegistry, StepResult};
pub use scheduling::SchedulingStep;
pub use services::{
    CleanupGuide, HttpFieldService, InsightsService, KnowledgeService, MockFieldService,
    ScheduledWorkOrder, SchedulingService, ServiceFault, WorkOrderInsights,
};
