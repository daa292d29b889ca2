//! 配置加载：YAML 文件 + `BARSYNC_` 前缀的环境变量覆盖。

use barsync_core::config::{ConfigError, ConfigFile, DownloadConfig};
use std::path::{Path, PathBuf};

/// 环境变量前缀，嵌套字段以 `__` 分隔，如 `BARSYNC_TRADESTATION__REFRESH_TOKEN`
pub const ENV_PREFIX: &str = "BARSYNC";

/// `--init-config` 生成的模板文件名
pub const TEMPLATE_FILE: &str = "config.yaml.template";

pub const TEMPLATE: &str = r#"# barsync configuration

# OAuth2 credentials (required)
tradestation:
  client_id: "YOUR_CLIENT_ID"
  client_secret: "YOUR_CLIENT_SECRET"
  refresh_token: "YOUR_REFRESH_TOKEN"

# Where bar files are written
data_dir: ./data

# Earliest date fetched for symbols without stored history (UTC)
start_date: "2007-01-01"

# Bar size
interval: 1
unit: Minute            # Minute | Daily | Weekly | Monthly

# Request tuning
max_bars_per_request: 57600
rate_limit_delay: 0.5   # seconds between pages
max_retries: 3
request_timeout: 60     # seconds per HTTP call

# Symbols downloaded in parallel (1 = sequential)
max_workers: 1

# single | daily | monthly
storage_format: single

# Optional daily-rolling log files
# log_dir: ./logs

# Leave empty to download the full built-in catalogue
symbols: []
"#;

/// # Summary
/// 读取并校验配置。
///
/// # Logic
/// 1. 配置文件不存在时直接报错，提示生成模板。
/// 2. 合并 YAML 文件与环境变量。
/// 3. 反序列化为 `ConfigFile` 后校验为 `DownloadConfig`。
///
/// # Arguments
/// * `path`: 配置文件路径。
///
/// # Returns
/// 成功返回 `DownloadConfig`，否则返回 `ConfigError`。
pub fn load(path: &Path) -> Result<DownloadConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Load(format!(
            "Config file not found: {}. Run `barsync --init-config` to create a template",
            path.display()
        )));
    }

    let raw: ConfigFile = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Yaml))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .and_then(|c| c.try_deserialize::<ConfigFile>())
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    raw.into_config()
}

/// 在 `dir` 下写入配置模板，返回模板路径
pub fn write_template(dir: &Path) -> std::io::Result<PathBuf> {
    let path = dir.join(TEMPLATE_FILE);
    std::fs::write(&path, TEMPLATE)?;
    Ok(path)
}
