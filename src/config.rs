//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__PLANNER__KIND=llm`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub planner: PlannerSection,
    pub composer: ComposerSection,
    pub steps: StepsSection,
    pub services: ServicesSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai；实际是否启用还取决于 API Key
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

/// 规划器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlannerKind {
    /// LLM 规划（无 API Key 时退回规则）
    Llm,
    /// 关键词意图路由
    #[default]
    Rules,
}

/// [planner] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlannerSection {
    #[serde(default)]
    pub kind: PlannerKind,
}

/// 回答生成器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComposerKind {
    #[default]
    Template,
    Llm,
}

/// [composer] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ComposerSection {
    #[serde(default)]
    pub kind: ComposerKind,
}

/// [steps] 段：单步超时与 ServiceError 重试次数
#[derive(Debug, Clone, Deserialize)]
pub struct StepsSection {
    #[serde(default = "default_step_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for StepsSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_step_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_step_timeout_secs() -> u64 {
    30
}

/// 现场服务后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceBackend {
    #[default]
    Mock,
    Http,
}

/// [services] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesSection {
    #[serde(default)]
    pub backend: ServiceBackend,
    /// backend = "http" 时必填
    pub base_url: Option<String>,
    #[serde(default = "default_service_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            backend: ServiceBackend::Mock,
            base_url: None,
            timeout_secs: default_service_timeout_secs(),
        }
    }
}

fn default_service_timeout_secs() -> u64 {
    15
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
