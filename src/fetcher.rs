pub mod parser;
pub mod strategy;

use anyhow::Result;
use tracing::{error, info, instrument, warn};

use crate::config::FetchConfig;
use crate::error::ReaderError;
use crate::model::ChapterData;

pub use parser::parse_chapter;
pub use strategy::{FetchStrategy, HttpStrategy, ProxyRoute};

/// 按顺序尝试多个代理获取章节，第一个通过校验的响应即被采用
pub struct ChapterFetcher {
    strategies: Vec<Box<dyn FetchStrategy>>,
    min_content_len: usize,
}

impl ChapterFetcher {
    pub fn new(strategies: Vec<Box<dyn FetchStrategy>>, min_content_len: usize) -> Self {
        Self {
            strategies,
            min_content_len,
        }
    }

    pub fn from_config(config: FetchConfig) -> Result<Self> {
        if config.proxies.is_empty() {
            anyhow::bail!("未配置任何代理");
        }

        let client = strategy::build_client(config.timeout())?;
        let strategies = config
            .proxies
            .into_iter()
            .map(|route| Box::new(HttpStrategy::new(client.clone(), route)) as Box<dyn FetchStrategy>)
            .collect();

        Ok(Self::new(strategies, config.min_content_len))
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    #[instrument(skip(self))]
    pub async fn fetch_html(&self, url: &str) -> Result<String, ReaderError> {
        for strategy in &self.strategies {
            match strategy.fetch(url).await {
                Ok(body) => {
                    let len = body.chars().count();
                    if len < self.min_content_len {
                        warn!("代理 {} 返回内容过短: {} 字符", strategy.name(), len);
                        continue;
                    }
                    info!("代理 {} 获取成功", strategy.name());
                    return Ok(body);
                }
                Err(e) => warn!("代理 {} 失败: {}", strategy.name(), e),
            }
        }

        error!("所有代理均无法获取章节");
        Err(ReaderError::Fetch)
    }

    pub async fn fetch(&self, url: &str) -> Result<ChapterData, ReaderError> {
        let html = self.fetch_html(url).await?;
        parse_chapter(&html)
    }
}
