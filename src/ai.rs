use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{error, instrument, warn};

use crate::config::AiConfig;
use crate::error::{ReaderError, Result};
use crate::model::Novel;

pub const EXPLAIN_MISSING_KEY: &str = "API Key missing.";
pub const EXPLAIN_FAILED: &str = "Could not fetch explanation. Please check connection.";
pub const EXPLAIN_EMPTY: &str = "No explanation available.";
pub const REPORT_MISSING_KEY: &str = "API Key is missing. Unable to generate AI report.";
pub const REPORT_FAILED: &str = "The AI is taking a nap. Please try again later.";
pub const REPORT_EMPTY: &str = "Could not generate report.";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// 失败后按固定间隔重试，最多额外重试 `retries` 次
pub async fn with_retry<T, F, Fut>(retries: u32, delay: Duration, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut remaining = retries;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if remaining > 0 => {
                warn!("生成失败，{} 毫秒后重试: {}", delay.as_millis(), e);
                remaining -= 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Gemini generateContent 接口
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl GeminiClient {
    pub fn new(config: &AiConfig, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        })
    }

    async fn request(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/{}:generateContent", self.endpoint, self.model);
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReaderError::Generation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReaderError::Generation(format!("Status {}", status)));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ReaderError::Generation(e.to_string()))?;
        Ok(response_text(&payload))
    }
}

/// 拼接第一个候选结果的全部文本片段
fn response_text(payload: &Value) -> String {
    payload["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl TextGenerator for GeminiClient {
    #[instrument(skip_all)]
    async fn generate(&self, prompt: &str) -> Result<String> {
        with_retry(self.max_retries, self.retry_delay, || self.request(prompt)).await
    }
}

/// 阅读助手。任何失败都降级为一句提示，不会打断阅读。
#[derive(Clone)]
pub struct Assistant {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl Assistant {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    pub fn from_config(config: &AiConfig) -> Self {
        let generator = config.resolve_api_key().and_then(|key| {
            GeminiClient::new(config, key)
                .map_err(|e| error!("无法创建 AI 客户端: {}", e))
                .ok()
        });
        Self::new(generator.map(|g| Arc::new(g) as Arc<dyn TextGenerator>))
    }

    pub fn is_available(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn explain(&self, text: &str, title: &str) -> String {
        let Some(generator) = &self.generator else {
            return EXPLAIN_MISSING_KEY.to_string();
        };

        match generator.generate(&explain_prompt(text, title)).await {
            Ok(answer) if answer.trim().is_empty() => EXPLAIN_EMPTY.to_string(),
            Ok(answer) => answer,
            Err(e) => {
                error!("AI 解释失败: {}", e);
                EXPLAIN_FAILED.to_string()
            }
        }
    }

    pub async fn reading_report(&self, novels: &[Novel]) -> String {
        let Some(generator) = &self.generator else {
            return REPORT_MISSING_KEY.to_string();
        };

        match generator.generate(&report_prompt(novels)).await {
            Ok(answer) if answer.trim().is_empty() => REPORT_EMPTY.to_string(),
            Ok(answer) => answer,
            Err(e) => {
                error!("AI 报告失败: {}", e);
                REPORT_FAILED.to_string()
            }
        }
    }
}

pub fn explain_prompt(text: &str, title: &str) -> String {
    format!(
        "You are a helpful reading assistant.\n\
         The user is reading the novel \"{title}\".\n\
         They selected the following text: \"{text}\".\n\n\
         Please do the following:\n\
         1. If the text is not in English, translate it.\n\
         2. Provide a definition of difficult words.\n\
         3. Explain the cultural context or idiom if applicable.\n\
         4. Keep the response concise (under 100 words) and easy to read."
    )
}

pub fn report_prompt(novels: &[Novel]) -> String {
    let stats: Vec<Value> = novels
        .iter()
        .map(|novel| {
            let last_read = DateTime::<Utc>::from_timestamp_millis(novel.last_read_at)
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            json!({
                "title": novel.title,
                "currentChapter": novel.current_chapter,
                "lastRead": last_read,
            })
        })
        .collect();

    format!(
        "Analyze the following reading list data and provide a fun, short, and encouraging \
         reading personality report for the user.\n\
         Keep it under 150 words.\n\
         Use emojis.\n\
         Data: {}",
        Value::Array(stats)
    )
}
