//! 核心层：黑板、计划队列、错误分类、运行事件与执行引擎

pub mod blackboard;
pub mod engine;
pub mod error;
pub mod events;
pub mod plan;

pub use blackboard::{Blackboard, BlackboardKey, BlackboardPatch};
pub use engine::{EngineState, ExecutionEngine, RunOutcome, RunStatus};
pub use error::{AgentError, EngineFault, PlanningError, StepFailure};
pub use events::RunEvent;
pub use plan::{PlanQueue, StepName};
