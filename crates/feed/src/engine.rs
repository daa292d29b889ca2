use async_trait::async_trait;
use barsync_core::common::TimeFrame;
use barsync_core::common::time::TimeProvider;
use barsync_core::config::DownloadConfig;
use barsync_core::market::entity::{Bar, FetchResult};
use barsync_core::market::error::{AuthError, FetchError};
use barsync_core::market::port::{BarChartApi, BarFetcher, PageRequest, PageResponse, TokenSource};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// 429 响应没有 Retry-After 头时的等待时间
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// # Summary
/// 抓取引擎的调优参数。
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    // K 线周期
    pub timeframe: TimeFrame,
    // 单页最多请求的 K 线数
    pub max_bars_per_request: u32,
    // 相邻两页之间的间隔
    pub rate_limit_delay: Duration,
    // 传输失败的最大重试次数
    pub max_retries: u32,
}

impl EngineSettings {
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            timeframe: config.timeframe,
            max_bars_per_request: config.max_bars_per_request,
            rate_limit_delay: config.rate_limit_delay,
            max_retries: config.max_retries,
        }
    }
}

/// 单次请求协议的状态
#[derive(Debug)]
enum RequestState {
    Send,
    RateLimited(Duration),
    Reauth,
    BackoffRetry(String),
    Done(Option<Vec<Bar>>),
}

/// # Summary
/// 单品种历史抓取引擎：从 "now" 开始按页向过去回溯，直到覆盖请求的起点。
///
/// # Invariants
/// - 429 与 401 不消耗重试预算；只有传输失败 / 其他非 2xx 受 `max_retries` 约束。
/// - 所有等待都是当前任务内的异步 sleep，不阻塞其他品种的下载任务。
pub struct FetchEngine {
    api: Arc<dyn BarChartApi>,
    tokens: Arc<dyn TokenSource>,
    clock: Arc<dyn TimeProvider>,
    settings: EngineSettings,
}

impl FetchEngine {
    pub fn new(
        api: Arc<dyn BarChartApi>,
        tokens: Arc<dyn TokenSource>,
        clock: Arc<dyn TimeProvider>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            api,
            tokens,
            clock,
            settings,
        }
    }

    /// 按两端的分钟差估算本页要回溯的 K 线数，限制在 [1, max_bars_per_request]
    pub fn bars_back(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
        let max = self.settings.max_bars_per_request.max(1);
        let minutes = (end - start).num_minutes().clamp(1, i64::from(max));
        u32::try_from(minutes).unwrap_or(max)
    }

    /// # Summary
    /// 执行单页请求协议。
    ///
    /// # Logic
    /// 1. Send：取令牌并发送请求，按响应分类转移状态。
    /// 2. RateLimited：等待 Retry-After 后重发，不计入重试次数。
    /// 3. Reauth：作废缓存令牌后重发，不计入重试次数。
    /// 4. BackoffRetry：未超预算时等待 2^r 秒后重发，否则放弃。
    ///
    /// # Arguments
    /// * `request`: 分页参数，重发时保持完全一致。
    ///
    /// # Returns
    /// `Some(bars)` 为成功（可能为空页），`None` 表示重试耗尽；令牌交换失败返回 `AuthError`。
    pub async fn request_page(&self, request: &PageRequest) -> Result<Option<Vec<Bar>>, AuthError> {
        let mut attempt: u32 = 0;
        let mut state = RequestState::Send;

        loop {
            state = match state {
                RequestState::Send => {
                    let token = self.tokens.access_token().await?;
                    match self.api.get_bars(request, &token).await {
                        PageResponse::Bars(bars) => RequestState::Done(Some(bars)),
                        PageResponse::RateLimited { retry_after } => {
                            RequestState::RateLimited(retry_after.unwrap_or(DEFAULT_RETRY_AFTER))
                        }
                        PageResponse::Unauthorized => RequestState::Reauth,
                        PageResponse::Failed(reason) => RequestState::BackoffRetry(reason),
                    }
                }
                RequestState::RateLimited(wait) => {
                    warn!("Rate limited, waiting {}s...", wait.as_secs());
                    tokio::time::sleep(wait).await;
                    RequestState::Send
                }
                RequestState::Reauth => {
                    info!("Token expired, refreshing...");
                    self.tokens.invalidate().await;
                    RequestState::Send
                }
                RequestState::BackoffRetry(reason) if attempt < self.settings.max_retries => {
                    let wait = Duration::from_secs(2u64.saturating_pow(attempt));
                    warn!("Request failed: {}. Retrying in {}s...", reason, wait.as_secs());
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                    RequestState::Send
                }
                RequestState::BackoffRetry(reason) => {
                    error!(
                        "Request failed after {} retries: {}",
                        self.settings.max_retries, reason
                    );
                    RequestState::Done(None)
                }
                RequestState::Done(result) => return Ok(result),
            };
        }
    }
}

#[async_trait]
impl BarFetcher for FetchEngine {
    /// # Summary
    /// 抓取 `symbol` 从 `start` 至今的已收盘 K 线。
    ///
    /// # Logic
    /// 1. 窗口终点从 now 开始，每页请求终点之前的 bars_back 根。
    /// 2. 空页表示历史已到尽头；最旧一根不晚于 `start` 表示已覆盖。
    /// 3. 否则终点移到最旧一根之前一分钟，间隔 rate_limit_delay 后继续。
    /// 4. 合并所有页并交由 `FetchResult::assemble` 规整。
    ///
    /// # Returns
    /// 成功返回 `FetchResult`；某页重试耗尽返回 `RetriesExhausted`，令牌失败返回 `Authentication`。
    async fn fetch_bars(&self, symbol: &str, start: DateTime<Utc>) -> Result<FetchResult, FetchError> {
        let mut window_end = self.clock.now();
        let mut raw: Vec<Bar> = Vec::new();
        let mut pages = 0usize;

        while window_end > start {
            let request = PageRequest {
                symbol: symbol.to_string(),
                timeframe: self.settings.timeframe,
                bars_back: self.bars_back(start, window_end),
                last_date: window_end,
            };

            let Some(page) = self.request_page(&request).await? else {
                return Err(FetchError::RetriesExhausted {
                    symbol: symbol.to_string(),
                    retries: self.settings.max_retries,
                });
            };

            let (Some(oldest), Some(newest)) = (
                page.iter().map(|bar| bar.time).min(),
                page.iter().map(|bar| bar.time).max(),
            ) else {
                break;
            };

            pages += 1;
            info!(
                "  [{}] Batch {}: {} bars ({} to {})",
                symbol,
                pages,
                page.len(),
                oldest.date_naive(),
                newest.date_naive()
            );
            raw.extend(page);

            if oldest <= start {
                break;
            }

            let next_end = oldest - chrono::Duration::minutes(1);
            if next_end >= window_end {
                // 远端忽略了 lastdate，继续翻页不会前进
                warn!("  [{}] Page did not move before {}, stopping", symbol, window_end);
                break;
            }
            window_end = next_end;
            tokio::time::sleep(self.settings.rate_limit_delay).await;
        }

        Ok(FetchResult::assemble(symbol, raw, start, pages))
    }
}
