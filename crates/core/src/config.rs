//! 下载配置：配置文件的原始形态 [`ConfigFile`] 与校验后的只读快照 [`DownloadConfig`]。

use crate::catalog;
use crate::common::{BarUnit, TimeFrame};
use chrono::{DateTime, NaiveDate, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.tradestation.com/v3";
pub const DEFAULT_TOKEN_URL: &str = "https://signin.tradestation.com/oauth/token";

/// # Summary
/// 配置错误，任何网络活动开始之前即为致命错误。
#[derive(Error, Debug)]
pub enum ConfigError {
    // 缺少必填段或字段
    #[error("Missing configuration: {0}")]
    Missing(String),
    // 字段取值非法
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    // 配置文件无法读取或解析
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// # Summary
/// 持久化布局选择。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    // 每个品种一个文件
    #[default]
    Single,
    // 按自然日分区
    Daily,
    // 按自然月分区
    Monthly,
}

impl StorageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageFormat::Single => "single",
            StorageFormat::Daily => "daily",
            StorageFormat::Monthly => "monthly",
        }
    }
}

impl FromStr for StorageFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(StorageFormat::Single),
            "daily" => Ok(StorageFormat::Daily),
            "monthly" => Ok(StorageFormat::Monthly),
            _ => Err(ConfigError::Invalid(format!(
                "Invalid storage format '{}'. Valid options: single, daily, monthly",
                s
            ))),
        }
    }
}

impl std::fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Summary
/// OAuth2 凭据三元组，构造后不可变。
///
/// # Invariants
/// - `client_secret` 与 `refresh_token` 只以 `SecretString` 形式持有，不会出现在 Debug 输出中。
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
}

impl Credentials {
    pub fn new(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: SecretString::new(client_secret.into()),
            refresh_token: SecretString::new(refresh_token.into()),
        }
    }
}

/// # Summary
/// 远端接口地址，测试时可指向本地 mock 服务。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub base_url: String,
    pub token_url: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

/// # Summary
/// 一次下载运行的只读配置快照。
///
/// # Invariants
/// - 运行开始前加载一次，运行期间不再修改。
/// - `symbols` 非空；`max_bars_per_request` 与 `timeframe.interval` 至少为 1。
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub credentials: Credentials,
    pub endpoints: ApiEndpoints,
    pub data_dir: PathBuf,
    pub start_date: NaiveDate,
    pub symbols: Vec<String>,
    pub timeframe: TimeFrame,
    pub max_bars_per_request: u32,
    pub rate_limit_delay: Duration,
    pub max_retries: u32,
    pub max_workers: usize,
    pub request_timeout: Duration,
    pub storage_format: StorageFormat,
    pub log_dir: Option<PathBuf>,
}

impl DownloadConfig {
    /// 使用默认值构造配置，品种列表为完整目录
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            endpoints: ApiEndpoints::default(),
            data_dir: PathBuf::from("./data"),
            start_date: default_start_date(),
            symbols: catalog::all_symbols(),
            timeframe: TimeFrame::default(),
            max_bars_per_request: 57_600,
            rate_limit_delay: Duration::from_millis(500),
            max_retries: 3,
            max_workers: 1,
            request_timeout: Duration::from_secs(60),
            storage_format: StorageFormat::Single,
            log_dir: None,
        }
    }

    /// 起始日期当天 00:00 UTC，作为全量下载的下限
    pub fn start_floor(&self) -> DateTime<Utc> {
        self.start_date.and_time(chrono::NaiveTime::MIN).and_utc()
    }
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2007, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// # Summary
/// `tradestation` 配置段，字段全部可选以便给出准确的缺失提示。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsSection {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

/// # Summary
/// `api` 配置段。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiSection {
    pub base_url: Option<String>,
    pub token_url: Option<String>,
}

/// # Summary
/// 配置文件的原始反序列化形态。
///
/// # Invariants
/// - 仅用于承载外部输入，必须经过 [`ConfigFile::into_config`] 校验后才能使用。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub tradestation: Option<CredentialsSection>,
    pub api: Option<ApiSection>,
    pub data_dir: Option<PathBuf>,
    pub start_date: Option<String>,
    pub symbols: Option<Vec<String>>,
    pub interval: Option<u32>,
    pub unit: Option<String>,
    pub max_bars_per_request: Option<u32>,
    pub rate_limit_delay: Option<f64>,
    pub max_retries: Option<u32>,
    pub max_workers: Option<usize>,
    pub request_timeout: Option<u64>,
    pub storage_format: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl ConfigFile {
    /// # Summary
    /// 校验原始配置并生成 `DownloadConfig`。
    ///
    /// # Logic
    /// 1. 检查 `tradestation` 段以及三个凭据字段是否齐全。
    /// 2. 解析日期、周期单位、存储格式。
    /// 3. 其余字段缺省时取默认值；品种列表为空时使用完整目录。
    ///
    /// # Returns
    /// 成功返回 `DownloadConfig`，否则返回 `ConfigError`。
    pub fn into_config(self) -> Result<DownloadConfig, ConfigError> {
        let section = self
            .tradestation
            .ok_or_else(|| ConfigError::Missing("'tradestation' section".to_string()))?;

        let mut missing = Vec::new();
        if section.client_id.as_deref().is_none_or(str::is_empty) {
            missing.push("client_id");
        }
        if section.client_secret.as_deref().is_none_or(str::is_empty) {
            missing.push("client_secret");
        }
        if section.refresh_token.as_deref().is_none_or(str::is_empty) {
            missing.push("refresh_token");
        }
        let (Some(client_id), Some(client_secret), Some(refresh_token), true) = (
            section.client_id,
            section.client_secret,
            section.refresh_token,
            missing.is_empty(),
        ) else {
            return Err(ConfigError::Missing(format!(
                "required fields in tradestation config: {}",
                missing.join(", ")
            )));
        };

        let mut config = DownloadConfig::new(Credentials::new(
            &client_id,
            &client_secret,
            &refresh_token,
        ));

        if let Some(api) = self.api {
            if let Some(base_url) = api.base_url {
                config.endpoints.base_url = base_url.trim_end_matches('/').to_string();
            }
            if let Some(token_url) = api.token_url {
                config.endpoints.token_url = token_url;
            }
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(start_date) = self.start_date {
            config.start_date = NaiveDate::parse_from_str(&start_date, "%Y-%m-%d").map_err(|e| {
                ConfigError::Invalid(format!("start_date '{}': {}", start_date, e))
            })?;
        }
        if let Some(symbols) = self.symbols.filter(|s| !s.is_empty()) {
            config.symbols = symbols;
        }
        if let Some(interval) = self.interval {
            if interval == 0 {
                return Err(ConfigError::Invalid("interval must be at least 1".to_string()));
            }
            config.timeframe.interval = interval;
        }
        if let Some(unit) = self.unit {
            config.timeframe.unit = unit.parse::<BarUnit>().map_err(ConfigError::Invalid)?;
        }
        if let Some(max_bars) = self.max_bars_per_request {
            if max_bars == 0 {
                return Err(ConfigError::Invalid(
                    "max_bars_per_request must be at least 1".to_string(),
                ));
            }
            config.max_bars_per_request = max_bars;
        }
        if let Some(delay) = self.rate_limit_delay {
            config.rate_limit_delay = Duration::try_from_secs_f64(delay).map_err(|e| {
                ConfigError::Invalid(format!("rate_limit_delay {}: {}", delay, e))
            })?;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(max_workers) = self.max_workers {
            config.max_workers = max_workers.max(1);
        }
        if let Some(timeout) = self.request_timeout {
            config.request_timeout = Duration::from_secs(timeout.max(1));
        }
        if let Some(format) = self.storage_format {
            config.storage_format = format.parse()?;
        }
        config.log_dir = self.log_dir;

        Ok(config)
    }
}
