use thiserror::Error;

/// # Summary
/// 访问令牌交换失败。
///
/// # Invariants
/// - 令牌服务内部不重试，直接向调用方传播。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    // 令牌端点不可达或返回非 2xx
    #[error("Token refresh failed: {0}")]
    Exchange(String),
    // 响应中缺少 access_token 字段
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

/// # Summary
/// 单个品种抓取失败的原因。
///
/// # Invariants
/// - 429 / 401 在请求协议内部消化，不会出现在这里。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    // 令牌交换失败
    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthError),
    // 某一页在用尽重试次数后仍然失败，历史可能不完整
    #[error("Request for {symbol} failed after {retries} retries")]
    RetriesExhausted { symbol: String, retries: u32 },
}
