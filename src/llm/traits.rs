//! LLM 客户端抽象
//!
//! 规划器与回答生成器通过构造参数注入 LlmClient，而不是在每次调用时自行创建客户端。

use async_trait::async_trait;

use crate::llm::Message;

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;
}
