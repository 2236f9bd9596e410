//! Hive - 计划驱动的多步任务执行器
//!
//! 模块划分：
//! - **agent**: 对外入口（Agent / AgentBuilder），装配规划器、步骤与服务
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 黑板、计划队列、错误分类、运行事件与执行引擎
//! - **extract**: 从任务文本抽取工单号 / 产品号
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: 日志初始化
//! - **planner**: 规划器（LLM 规划 / 关键词意图路由）
//! - **steps**: 步骤注册表、调用器、现场服务步骤与 compose

pub mod agent;
pub mod config;
pub mod core;
pub mod extract;
pub mod llm;
pub mod observability;
pub mod planner;
pub mod steps;

pub use agent::{create_agent, Agent, AgentBuilder};
pub use core::{AgentError, RunOutcome, RunStatus};
pub use extract::{extract, Identifier, IdentifierKind};
