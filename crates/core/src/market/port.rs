use crate::common::TimeFrame;
use crate::market::entity::{Bar, FetchResult};
use crate::market::error::{AuthError, FetchError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// # Summary
/// 访问令牌来源。
///
/// # Invariants
/// - `access_token` 绝不返回处于过期安全缓冲期内的令牌。
/// - 实现者必须保证并发调用下同一时刻最多只有一次刷新在进行。
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// # Summary
    /// 获取一个可用的 Bearer 令牌。
    ///
    /// # Logic
    /// 1. 缓存令牌有效且不在安全缓冲期内时直接返回。
    /// 2. 否则用刷新令牌向令牌端点换取新令牌并缓存。
    ///
    /// # Returns
    /// 成功返回令牌字符串，交换失败返回 `AuthError`。
    async fn access_token(&self) -> Result<String, AuthError>;

    /// # Summary
    /// 无条件清空缓存令牌，下一次 `access_token` 必然触发刷新。
    async fn invalidate(&self);
}

/// # Summary
/// 单页 K 线请求参数。
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    // 证券代码
    pub symbol: String,
    // K 线周期
    pub timeframe: TimeFrame,
    // 本页最多回溯的 K 线数量
    pub bars_back: u32,
    // 本页的截止时间（包含）
    pub last_date: DateTime<Utc>,
}

/// # Summary
/// 单次 HTTP 交互的分类结果。
///
/// # Invariants
/// - 传输层错误与非 2xx（429 / 401 除外）统一归为 `Failed`。
#[derive(Debug, Clone, PartialEq)]
pub enum PageResponse {
    // 2xx，携带本页 K 线（可能为空）
    Bars(Vec<Bar>),
    // 429，`retry_after` 取自 Retry-After 头
    RateLimited { retry_after: Option<Duration> },
    // 401，令牌已失效
    Unauthorized,
    // 连接失败、超时、其他非 2xx 或响应无法解析
    Failed(String),
}

/// # Summary
/// 远端 K 线接口（Port）。只负责一次请求与响应分类，不做任何重试。
#[async_trait]
pub trait BarChartApi: Send + Sync {
    /// # Summary
    /// 发送一次分页请求。
    ///
    /// # Arguments
    /// * `request`: 分页参数。
    /// * `access_token`: Bearer 令牌。
    ///
    /// # Returns
    /// 分类后的响应，永不返回错误。
    async fn get_bars(&self, request: &PageRequest, access_token: &str) -> PageResponse;
}

/// # Summary
/// 单品种历史抓取器。
#[async_trait]
pub trait BarFetcher: Send + Sync {
    /// # Summary
    /// 抓取 `symbol` 从 `start` 至今的全部已收盘 K 线。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    /// * `start`: 起点（包含）。
    ///
    /// # Returns
    /// 满足 `FetchResult` 不变量的结果；历史为空时返回空结果而不是错误。
    async fn fetch_bars(&self, symbol: &str, start: DateTime<Utc>) -> Result<FetchResult, FetchError>;
}
