use crate::error::FeedError;
use async_trait::async_trait;
use barsync_core::market::entity::Bar;
use barsync_core::market::port::{BarChartApi, PageRequest, PageResponse};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// `lastdate` 查询参数的时间格式
pub const LAST_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// # Summary
/// TradeStation v3 K 线接口适配器。
///
/// # Invariants
/// - 只做一次请求与响应分类，重试、限流等待与令牌刷新由 `FetchEngine` 负责。
/// - 每次请求都带有固定的超时时间。
#[derive(Clone)]
pub struct TradeStationApi {
    // 内部使用的 HTTP 客户端
    client: Client,
    // 形如 https://api.tradestation.com/v3
    base_url: String,
}

impl TradeStationApi {
    /// # Summary
    /// 创建适配器。
    ///
    /// # Arguments
    /// * `base_url`: 接口根地址。
    /// * `timeout`: 单次请求超时。
    ///
    /// # Returns
    /// 成功返回实例，HTTP 客户端构建失败返回 `FeedError`。
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FeedError> {
        crate::install_crypto_provider();
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn bars_url(&self, symbol: &str) -> String {
        format!("{}/marketdata/barcharts/{}", self.base_url, symbol)
    }
}

/// # Summary
/// K 线接口响应顶层结构。
#[derive(Deserialize, Debug)]
struct BarChartResponse {
    #[serde(rename = "Bars", default)]
    bars: Vec<WireBar>,
}

/// # Summary
/// 接口返回的单根 K 线，价格字段可能是数字也可能是字符串。
#[derive(Deserialize, Debug)]
struct WireBar {
    #[serde(rename = "TimeStamp")]
    timestamp: String,
    #[serde(rename = "Open", default)]
    open: Option<Numeric>,
    #[serde(rename = "High", default)]
    high: Option<Numeric>,
    #[serde(rename = "Low", default)]
    low: Option<Numeric>,
    #[serde(rename = "Close", default)]
    close: Option<Numeric>,
    #[serde(rename = "TotalVolume", default)]
    total_volume: Option<Numeric>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl Numeric {
    fn value(&self) -> Option<f64> {
        let parsed = match self {
            Numeric::Number(v) => Some(*v),
            Numeric::Text(s) => s.trim().parse::<f64>().ok(),
            Numeric::Other(_) => None,
        };
        parsed.filter(|v| v.is_finite())
    }
}

fn coerce(field: &Option<Numeric>) -> Option<f64> {
    field.as_ref().and_then(Numeric::value)
}

impl WireBar {
    /// 价格无法解析时记为 NaN，成交量无法解析时记为 None
    fn into_bar(self) -> Result<Bar, String> {
        let time = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| format!("invalid TimeStamp '{}': {}", self.timestamp, e))?
            .with_timezone(&Utc);

        Ok(Bar {
            time,
            open: coerce(&self.open).unwrap_or(f64::NAN),
            high: coerce(&self.high).unwrap_or(f64::NAN),
            low: coerce(&self.low).unwrap_or(f64::NAN),
            close: coerce(&self.close).unwrap_or(f64::NAN),
            volume: coerce(&self.total_volume),
        })
    }
}

fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl BarChartApi for TradeStationApi {
    /// # Summary
    /// 请求一页 K 线。
    ///
    /// # Logic
    /// 1. GET /marketdata/barcharts/{symbol}，查询参数 interval / unit / barsback / lastdate。
    /// 2. 429 读取 Retry-After，401 标记令牌失效。
    /// 3. 其他非 2xx、网络错误、JSON 解析失败归为 `Failed`。
    /// 4. 时间戳无效的单根 K 线被跳过；整页都无效时归为 `Failed`。
    /// 5. 2xx 解析 `Bars` 数组，缺失时视为空页。
    async fn get_bars(&self, request: &PageRequest, access_token: &str) -> PageResponse {
        let last_date = request.last_date.format(LAST_DATE_FORMAT).to_string();
        let interval = request.timeframe.interval.to_string();
        let bars_back = request.bars_back.to_string();

        let result = self
            .client
            .get(self.bars_url(&request.symbol))
            .bearer_auth(access_token)
            .header(header::CONTENT_TYPE, "application/json")
            .query(&[
                ("interval", interval.as_str()),
                ("unit", request.timeframe.unit.as_str()),
                ("barsback", bars_back.as_str()),
                ("lastdate", last_date.as_str()),
            ])
            .send()
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => return PageResponse::Failed(e.to_string()),
        };

        match resp.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                return PageResponse::RateLimited {
                    retry_after: retry_after(resp.headers()),
                };
            }
            StatusCode::UNAUTHORIZED => return PageResponse::Unauthorized,
            status if !status.is_success() => {
                return PageResponse::Failed(format!("HTTP {}", status));
            }
            _ => {}
        }

        let body: BarChartResponse = match resp.json().await {
            Ok(body) => body,
            Err(e) => return PageResponse::Failed(format!("Parse error: {}", e)),
        };

        let received = body.bars.len();
        let mut bars = Vec::with_capacity(received);
        for wire in body.bars {
            match wire.into_bar() {
                Ok(bar) => bars.push(bar),
                Err(e) => warn!("[{}] Skipping bar: {}", request.symbol, e),
            }
        }

        // 整页都无法解析时不能当作空页，否则会被误判为历史已到尽头
        if bars.is_empty() && received > 0 {
            return PageResponse::Failed(format!(
                "Parse error: none of {} bars had a valid TimeStamp",
                received
            ));
        }
        PageResponse::Bars(bars)
    }
}
