use crate::error::FeedError;
use async_trait::async_trait;
use barsync_core::common::time::TimeProvider;
use barsync_core::config::Credentials;
use barsync_core::market::error::AuthError;
use barsync_core::market::port::TokenSource;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// 过期前的安全缓冲期，进入缓冲期的令牌视为失效
pub const REFRESH_BUFFER: Duration = Duration::minutes(5);
/// 令牌响应缺少 `expires_in` 时使用的有效期（秒）
pub const DEFAULT_EXPIRES_IN: i64 = 1200;

const EXCHANGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// # Summary
/// 缓存中的访问令牌。
struct AccessToken {
    value: SecretString,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .checked_sub_signed(REFRESH_BUFFER)
            .is_some_and(|deadline| now < deadline)
    }
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

/// # Summary
/// OAuth2 令牌管理器：用刷新令牌换取短期访问令牌并缓存。
///
/// # Invariants
/// - "检查-刷新" 整个过程在同一把异步锁内完成，
///   并发调用者观察到失效令牌时只会触发一次交换，其余调用者等待其结果。
/// - 交换失败不在内部重试，以 `AuthError` 返回给调用方。
pub struct TokenAuthority {
    // 内部使用的 HTTP 客户端
    client: Client,
    // 令牌端点
    token_url: String,
    // 不可变凭据
    credentials: Credentials,
    // 判断过期所用的时钟
    clock: Arc<dyn TimeProvider>,
    // 当前缓存的令牌
    cached: Mutex<Option<AccessToken>>,
}

impl TokenAuthority {
    /// # Summary
    /// 创建令牌管理器。
    ///
    /// # Arguments
    /// * `token_url`: 令牌端点地址。
    /// * `credentials`: OAuth2 凭据。
    /// * `clock`: 时钟。
    ///
    /// # Returns
    /// 成功返回实例，HTTP 客户端构建失败返回 `FeedError`。
    pub fn new(
        token_url: &str,
        credentials: Credentials,
        clock: Arc<dyn TimeProvider>,
    ) -> Result<Self, FeedError> {
        crate::install_crypto_provider();
        let client = Client::builder().timeout(EXCHANGE_TIMEOUT).build()?;

        Ok(Self {
            client,
            token_url: token_url.to_string(),
            credentials,
            clock,
            cached: Mutex::new(None),
        })
    }

    /// # Summary
    /// 执行一次刷新令牌交换。
    ///
    /// # Logic
    /// 1. 以表单方式 POST grant_type=refresh_token 及凭据。
    /// 2. 非 2xx 或网络失败映射为 `AuthError::Exchange`。
    /// 3. 缺少 access_token 映射为 `AuthError::InvalidResponse`。
    /// 4. 过期时间 = now + expires_in（缺省 1200 秒），超出时间范围时映射为 `InvalidResponse`。
    async fn exchange(&self) -> Result<AccessToken, AuthError> {
        info!("Refreshing access token...");

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.expose_secret()),
            ("refresh_token", self.credentials.refresh_token.expose_secret()),
        ];

        let resp = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Exchange(format!("HTTP {}: {}", status, body)));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        let parsed: TokenResponse = serde_json::from_value(body.clone())
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        let Some(access_token) = parsed.access_token else {
            return Err(AuthError::InvalidResponse(strip_secrets(body)));
        };

        let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .ok_or_else(|| {
                AuthError::InvalidResponse(format!("expires_in out of range: {}", expires_in))
            })?;
        info!("Token refreshed, expires in {}s", expires_in);

        Ok(AccessToken {
            value: SecretString::new(access_token.into()),
            expires_at,
        })
    }
}

/// 错误信息里只保留响应的字段名
fn strip_secrets(body: serde_json::Value) -> String {
    match body {
        serde_json::Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("fields [{}]", keys.join(", "))
        }
        other => format!("unexpected body type: {}", json_kind(&other)),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[async_trait]
impl TokenSource for TokenAuthority {
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && token.is_usable(self.clock.now())
        {
            debug!("Using cached access token");
            return Ok(token.value.expose_secret().to_string());
        }

        let fresh = self.exchange().await?;
        let value = fresh.value.expose_secret().to_string();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
