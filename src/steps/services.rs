//! 外部现场服务：排班、工单洞察、知识库
//!
//! 每个步骤依赖一个服务 trait；MockFieldService 返回固定的演示数据，HttpFieldService 通过 REST 接口调用真实后端。
//! 服务只返回结构化数据，错误统一为 ServiceFault，由步骤转为 StepResult::Failed。

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 服务调用错误
#[derive(Error, Debug)]
pub enum ServiceFault {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed service response: {0}")]
    Decode(String),
}

/// 今日排班的工单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledWorkOrder {
    pub date: String,
    pub technician_id: String,
    pub work_order_id: String,
    pub scheduled_time: String,
    pub site: String,
}

/// 工单详情
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderInsights {
    pub work_order_id: String,
    pub work_order_type: String,
    pub product_id: String,
    pub symptom_summary: String,
    #[serde(default)]
    pub last_actions: Vec<String>,
    pub priority: String,
}

/// 产品清洁 / 维护文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupGuide {
    pub product_id: String,
    pub doc_title: String,
    pub cleanup_steps: Vec<String>,
    pub source: String,
}

#[async_trait]
pub trait SchedulingService: Send + Sync {
    async fn scheduled_today(&self) -> Result<ScheduledWorkOrder, ServiceFault>;
}

#[async_trait]
pub trait InsightsService: Send + Sync {
    async fn work_order_insights(&self, work_order_id: &str)
        -> Result<WorkOrderInsights, ServiceFault>;
}

#[async_trait]
pub trait KnowledgeService: Send + Sync {
    async fn cleanup_guide(&self, product_id: &str) -> Result<CleanupGuide, ServiceFault>;
}

/// Mock 服务：无需后端，返回固定演示数据
#[derive(Debug, Default, Clone)]
pub struct MockFieldService;

#[async_trait]
impl SchedulingService for MockFieldService {
    async fn scheduled_today(&self) -> Result<ScheduledWorkOrder, ServiceFault> {
        Ok(ScheduledWorkOrder {
            date: "today".to_string(),
            technician_id: "TECH-42".to_string(),
            work_order_id: "WO-100245".to_string(),
            scheduled_time: "10:00 AM".to_string(),
            site: "Acme Plant - San Jose".to_string(),
        })
    }
}

#[async_trait]
impl InsightsService for MockFieldService {
    async fn work_order_insights(
        &self,
        work_order_id: &str,
    ) -> Result<WorkOrderInsights, ServiceFault> {
        Ok(WorkOrderInsights {
            work_order_id: work_order_id.to_string(),
            work_order_type: "Critical".to_string(),
            product_id: "PROD-77881".to_string(),
            symptom_summary: "Oil leakage near primary valve".to_string(),
            last_actions: vec![
                "2025-12-02: Replaced seal kit".to_string(),
                "2025-10-18: Inspection and lubrication".to_string(),
            ],
            priority: "High".to_string(),
        })
    }
}

#[async_trait]
impl KnowledgeService for MockFieldService {
    async fn cleanup_guide(&self, product_id: &str) -> Result<CleanupGuide, ServiceFault> {
        Ok(CleanupGuide {
            product_id: product_id.to_string(),
            doc_title: "Cleaning & Maintenance Guide - Hydraulic Press Series".to_string(),
            cleanup_steps: vec![
                "Power down and lockout/tagout before cleaning.".to_string(),
                "Wipe exterior surfaces using a non-abrasive cloth.".to_string(),
                "Use approved degreaser on oil residue near the valve housing.".to_string(),
                "Inspect seals and fittings after cleaning for leak recurrence.".to_string(),
                "Run a short test cycle and confirm pressure stability.".to_string(),
            ],
            source: "KnowledgeBase".to_string(),
        })
    }
}

/// HTTP 服务：GET {base}/schedule/today、/work-orders/{id}、/products/{id}/cleanup-guide
pub struct HttpFieldService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFieldService {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ServiceFault> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ServiceFault::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceFault> {
        let url = self.url(path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ServiceFault::Transport(e.to_string()))?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceFault::NotFound(url));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(ServiceFault::Status {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| ServiceFault::Decode(e.to_string()))
    }
}

#[async_trait]
impl SchedulingService for HttpFieldService {
    async fn scheduled_today(&self) -> Result<ScheduledWorkOrder, ServiceFault> {
        self.get_json("schedule/today").await
    }
}

#[async_trait]
impl InsightsService for HttpFieldService {
    async fn work_order_insights(
        &self,
        work_order_id: &str,
    ) -> Result<WorkOrderInsights, ServiceFault> {
        self.get_json(&format!("work-orders/{work_order_id}")).await
    }
}

#[async_trait]
impl KnowledgeService for HttpFieldService {
    async fn cleanup_guide(&self, product_id: &str) -> Result<CleanupGuide, ServiceFault> {
        self.get_json(&format!("products/{product_id}/cleanup-guide"))
            .await
    }
}
