use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// 代理路由：描述如何把目标地址包装成代理请求，以及如何从响应中取出页面。
/// 在配置文件中以 `type` 字段区分具体实现。
#[typetag::deserialize(tag = "type")]
pub trait ProxyRoute: Send + Sync {
    fn name(&self) -> &str;

    fn request_url(&self, target: &str) -> Result<Url>;

    fn decode(&self, body: String) -> Result<String>;
}

/// 获取策略：给定章节地址返回原始 HTML，失败时返回错误
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, url: &str) -> Result<String>;
}

fn encode_target(target: &str) -> String {
    url::form_urlencoded::byte_serialize(target.as_bytes()).collect()
}

fn fill_endpoint(endpoint: &str, target: &str) -> Result<Url> {
    let url = endpoint.replace("{url}", &encode_target(target));
    Url::parse(&url).map_err(|e| anyhow::anyhow!("代理地址无效 {}: {}", url, e))
}

/// 返回 JSON 信封的代理，页面内容在 `field` 字段中
#[derive(Deserialize, Debug)]
pub struct Envelope {
    name: String,
    endpoint: String,
    #[serde(default = "default_field")]
    field: String,
}

fn default_field() -> String {
    "contents".to_string()
}

impl Envelope {
    pub fn new(name: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            field: default_field(),
        }
    }
}

#[typetag::deserialize]
impl ProxyRoute for Envelope {
    fn name(&self) -> &str {
        &self.name
    }

    fn request_url(&self, target: &str) -> Result<Url> {
        fill_endpoint(&self.endpoint, target)
    }

    fn decode(&self, body: String) -> Result<String> {
        let envelope: Value = serde_json::from_str(&body)?;
        envelope
            .get(&self.field)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 {} 字段", self.field))
    }
}

/// 直接返回页面原文的代理
#[derive(Deserialize, Debug)]
pub struct Raw {
    name: String,
    endpoint: String,
}

impl Raw {
    pub fn new(name: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[typetag::deserialize]
impl ProxyRoute for Raw {
    fn name(&self) -> &str {
        &self.name
    }

    fn request_url(&self, target: &str) -> Result<Url> {
        fill_endpoint(&self.endpoint, target)
    }

    fn decode(&self, body: String) -> Result<String> {
        Ok(body)
    }
}

/// 不经过代理，直接请求源站
#[derive(Deserialize, Debug, Default)]
pub struct Direct {}

#[typetag::deserialize]
impl ProxyRoute for Direct {
    fn name(&self) -> &str {
        "Direct"
    }

    fn request_url(&self, target: &str) -> Result<Url> {
        Url::parse(target).map_err(|e| anyhow::anyhow!("章节地址无效 {}: {}", target, e))
    }

    fn decode(&self, body: String) -> Result<String> {
        Ok(body)
    }
}

pub fn build_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(ua_generator::ua::spoof_ua())
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// 通过 HTTP 执行某条代理路由
pub struct HttpStrategy {
    client: Client,
    route: Box<dyn ProxyRoute>,
}

impl HttpStrategy {
    pub fn new(client: Client, route: Box<dyn ProxyRoute>) -> Self {
        Self { client, route }
    }
}

#[async_trait]
impl FetchStrategy for HttpStrategy {
    fn name(&self) -> &str {
        self.route.name()
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let request_url = self.route.request_url(url)?;
        debug!("通过 {} 请求: {}", self.route.name(), request_url);

        let response = self.client.get(request_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Status {}", status);
        }

        let body = response.text().await?;
        self.route.decode(body)
    }
}
