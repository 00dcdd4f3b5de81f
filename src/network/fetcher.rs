use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::page::{HtmlPage, PageReader};
use crate::core::config::SpiderConfig;
use crate::core::error::{Result, SpiderError};

/// 抓取端契约：把 URL 变成可读取的页面
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Box<dyn PageReader>>;
}

/// 基于 reqwest 的静态页面抓取器
///
/// 同一实例内的请求串行化，两次请求之间至少间隔 `request_delay_ms`（附加随机抖动）。
pub struct HttpFetcher {
    client: reqwest::Client,
    delay: Duration,
    retry_count: u32,
    last_request: Mutex<Option<Instant>>,
}

impl HttpFetcher {
    pub fn new(config: &SpiderConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(SpiderError::Network)?;

        Ok(Self {
            client,
            delay: Duration::from_millis(config.request_delay_ms),
            retry_count: config.retry_count,
            last_request: Mutex::new(None),
        })
    }

    async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let gap = self.delay + jitter(self.delay);
            let elapsed = at.elapsed();
            if elapsed < gap {
                tokio::time::sleep(gap - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_once(&self, url: &str) -> Result<HtmlPage> {
        self.wait_turn().await;

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SpiderError::Fetch {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        let loaded_url = resp.url().to_string();
        let html = resp.text().await?;
        Ok(HtmlPage::new(loaded_url, html))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Box<dyn PageReader>> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(page) => {
                    debug!(url, attempt, "页面已加载");
                    return Ok(Box::new(page));
                }
                Err(e) if attempt < self.retry_count => {
                    attempt += 1;
                    warn!(url, attempt, error = %e, "请求失败，准备重试");
                }
                Err(e) => {
                    return Err(SpiderError::Fetch {
                        url: url.to_string(),
                        message: format!("gave up after {} retries: {}", self.retry_count, e),
                    });
                }
            }
        }
    }
}

/// 最多为基础间隔的四分之一
fn jitter(base: Duration) -> Duration {
    let bound = base.as_millis() as u64 / 4;
    if bound == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=bound))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_quarter() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            assert!(jitter(base) <= Duration::from_millis(250));
        }
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn builds_from_default_config() {
        let fetcher = HttpFetcher::new(&SpiderConfig::default()).unwrap();
        assert_eq!(fetcher.delay, Duration::from_millis(1000));
        assert_eq!(fetcher.retry_count, 10);
    }
}
