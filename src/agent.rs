//! 对外入口：Agent 与 AgentBuilder
//!
//! AgentBuilder 在构造时注入所有依赖（规划器、回答生成器、现场服务、LLM 客户端），
//! 构建出的 Agent 只读、可在多个并发运行间共享；每次 run 拥有独立的黑板与计划队列。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ComposerKind, PlannerKind, ServiceBackend};
use crate::core::{AgentError, ExecutionEngine, RunEvent, RunOutcome, StepName};
use crate::extract::Identifier;
use crate::llm::create_llm_from_config;
use crate::planner::{LlmPlanner, PlanningOracle, RulePlanner};
use crate::steps::{
    ComposeStep, Composer, HttpFieldService, InsightsService, InsightsStep, KnowledgeService,
    KnowledgeStep, LlmComposer, MockFieldService, RenderedAnswer, SchedulingService,
    SchedulingStep, Step, StepInvoker, StepRegistry, TemplateComposer,
};

/// 已装配的执行器
pub struct Agent {
    engine: ExecutionEngine,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// 运行一个任务并返回最终回答；取消或引擎故障时返回错误
    pub async fn run(
        &self,
        task_text: &str,
        seeds: &[Identifier],
    ) -> Result<RenderedAnswer, AgentError> {
        self.run_detailed(task_text, seeds, CancellationToken::new(), None)
            .await
            .into_result()
    }

    /// 运行一个任务并返回完整结果（回答、黑板快照、已执行步骤），可传入取消信号与事件通道
    pub async fn run_detailed(
        &self,
        task_text: &str,
        seeds: &[Identifier],
        cancel: CancellationToken,
        events: Option<&mpsc::UnboundedSender<RunEvent>>,
    ) -> RunOutcome {
        self.engine.execute(task_text, seeds, cancel, events).await
    }

    pub fn registered_steps(&self) -> Vec<StepName> {
        self.engine.invoker().registry().step_names()
    }
}

/// Agent 构建器：未显式指定的部分使用默认实现（关键词规划、模板回答、Mock 服务）
pub struct AgentBuilder {
    oracle: Option<Arc<dyn PlanningOracle>>,
    composer: Option<Arc<dyn Composer>>,
    scheduling: Arc<dyn SchedulingService>,
    insights: Arc<dyn InsightsService>,
    knowledge: Arc<dyn KnowledgeService>,
    extra_steps: Vec<Arc<dyn Step>>,
    step_timeout: Duration,
    max_retries: u32,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        let mock = Arc::new(MockFieldService);
        Self {
            oracle: None,
            composer: None,
            scheduling: mock.clone(),
            insights: mock.clone(),
            knowledge: mock,
            extra_steps: Vec::new(),
            step_timeout: Duration::from_secs(30),
            max_retries: 0,
        }
    }

    /// 按配置装配：规划器 / 回答生成器类型、现场服务后端、单步超时与重试
    ///
    /// 配置要求 LLM 但没有可用的 API Key 时，退回关键词规划与模板回答。
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let llm = match (cfg.planner.kind, cfg.composer.kind) {
            (PlannerKind::Rules, ComposerKind::Template) => None,
            _ => create_llm_from_config(cfg),
        };

        let mut builder = Self::new()
            .with_step_timeout(Duration::from_secs(cfg.steps.timeout_secs))
            .with_max_retries(cfg.steps.max_retries);

        match (cfg.planner.kind, &llm) {
            (PlannerKind::Llm, Some(llm)) => {
                builder = builder.with_oracle(Arc::new(LlmPlanner::new(llm.clone())));
            }
            (PlannerKind::Llm, None) => {
                tracing::warn!("LLM planner configured but no LLM available, using keyword rules");
            }
            (PlannerKind::Rules, _) => {}
        }

        match (cfg.composer.kind, &llm) {
            (ComposerKind::Llm, Some(llm)) => {
                builder = builder.with_composer(Arc::new(LlmComposer::new(llm.clone())));
            }
            (ComposerKind::Llm, None) => {
                tracing::warn!("LLM composer configured but no LLM available, using template");
            }
            (ComposerKind::Template, _) => {}
        }

        if cfg.services.backend == ServiceBackend::Http {
            let base_url = cfg.services.base_url.as_deref().ok_or_else(|| {
                AgentError::ConfigError("services.base_url is required for the http backend".into())
            })?;
            let service = HttpFieldService::new(base_url, cfg.services.timeout_secs)
                .map_err(|e| AgentError::ConfigError(e.to_string()))?;
            tracing::info!("Using HTTP field services at {}", base_url);
            builder = builder.with_field_service(Arc::new(service));
        }

        Ok(builder)
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn PlanningOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_composer(mut self, composer: Arc<dyn Composer>) -> Self {
        self.composer = Some(composer);
        self
    }

    /// 同一个后端同时提供排班、洞察与知识库服务
    pub fn with_field_service<S>(mut self, service: Arc<S>) -> Self
    where
        S: SchedulingService + InsightsService + KnowledgeService + 'static,
    {
        self.scheduling = service.clone();
        self.insights = service.clone();
        self.knowledge = service;
        self
    }

    pub fn with_scheduling_service(mut self, service: Arc<dyn SchedulingService>) -> Self {
        self.scheduling = service;
        self
    }

    pub fn with_insights_service(mut self, service: Arc<dyn InsightsService>) -> Self {
        self.insights = service;
        self
    }

    pub fn with_knowledge_service(mut self, service: Arc<dyn KnowledgeService>) -> Self {
        self.knowledge = service;
        self
    }

    /// 注册自定义步骤；与内置步骤同名时覆盖之
    pub fn with_step(mut self, step: Arc<dyn Step>) -> Self {
        self.extra_steps.push(step);
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn build(self) -> Agent {
        let composer = self
            .composer
            .unwrap_or_else(|| Arc::new(TemplateComposer::new()));
        let oracle = self
            .oracle
            .unwrap_or_else(|| Arc::new(RulePlanner::new()));

        let mut registry = StepRegistry::new();
        registry.register(SchedulingStep::new(self.scheduling));
        registry.register(InsightsStep::new(self.insights));
        registry.register(KnowledgeStep::new(self.knowledge));
        registry.register(ComposeStep::new(composer));
        for step in self.extra_steps {
            registry.register_arc(step);
        }

        let invoker =
            StepInvoker::new(registry, self.step_timeout).with_max_retries(self.max_retries);
        Agent {
            engine: ExecutionEngine::new(oracle, invoker),
        }
    }
}

/// 从配置文件与环境变量创建 Agent（config_path 为 None 时只读默认位置）
pub fn create_agent(config_path: Option<std::path::PathBuf>) -> Result<Agent, AgentError> {
    let cfg = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config ({}), using defaults", e);
        AppConfig::default()
    });
    let agent = AgentBuilder::from_config(&cfg)?.build();
    tracing::info!(
        app = cfg.app.name.as_deref().unwrap_or("hive"),
        planner = ?cfg.planner.kind,
        composer = ?cfg.composer.kind,
        backend = ?cfg.services.backend,
        "agent ready"
    );
    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BlackboardKey, StepFailure};
    use crate::steps::{CleanupGuide, ServiceFault};
    use async_trait::async_trait;

    /// 永远不返回的知识库服务
    struct StalledKnowledge;

    #[async_trait]
    impl KnowledgeService for StalledKnowledge {
        async fn cleanup_guide(&self, _product_id: &str) -> Result<CleanupGuide, ServiceFault> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err(ServiceFault::Transport("unreachable".into()))
        }
    }

    #[test]
    fn test_default_build_registers_all_steps() {
        let agent = Agent::builder().build();
        assert_eq!(agent.registered_steps(), StepName::ALL.to_vec());
    }

    #[test]
    fn test_http_backend_requires_base_url() {
        let mut cfg = AppConfig::default();
        cfg.services.backend = ServiceBackend::Http;
        assert!(matches!(
            AgentBuilder::from_config(&cfg),
            Err(AgentError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_run_with_mock_services() {
        let agent = Agent::builder().build();
        let answer = agent
            .run("Provide details of work order WO1", &[])
            .await
            .unwrap();
        assert!(answer.contains("Work order: WO1"));
        assert!(answer.contains("Critical"));
    }

    #[tokio::test]
    async fn test_step_timeout_reaches_invoker() {
        let agent = Agent::builder()
            .with_knowledge_service(Arc::new(StalledKnowledge))
            .with_step_timeout(Duration::from_millis(20))
            .build();
        let outcome = agent
            .run_detailed(
                "How do I clean product PROD-1?",
                &[],
                CancellationToken::new(),
                None,
            )
            .await;

        let marker = outcome
            .blackboard
            .get(BlackboardKey::StepError(StepName::Knowledge))
            .and_then(StepFailure::from_marker);
        match marker {
            Some(StepFailure::ServiceError { cause }) => {
                assert!(cause.contains("timed out after 20ms"), "{cause}")
            }
            other => panic!("Expected ServiceError, got {other:?}"),
        }
        assert!(outcome.answer.unwrap().contains("timed out"));
    }
}
