mod cli;
mod logging;
mod settings;

use barsync_core::common::time::{SystemClock, TimeProvider};
use barsync_core::market::port::TokenSource;
use barsync_feed::auth::TokenAuthority;
use barsync_feed::engine::{EngineSettings, FetchEngine};
use barsync_feed::tradestation::TradeStationApi;
use barsync_manager::download::{DownloadOrchestrator, OrchestratorSettings};
use barsync_store::bar::SqliteBarStore;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 注入到 DownloadOrchestrator。
///
/// # Logic
/// 1. 处理不需要配置的命令（模板、品种目录）。
/// 2. 加载配置并初始化日志。
/// 3. 实例化基础设施层（令牌、接口、存储）。
/// 4. 预先换取一次令牌，凭据无效时在下载开始前失败。
/// 5. 构造调度器并执行下载，有失败品种时以非零状态退出。
#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = cli::Cli::parse();

    if cli.init_config {
        let path = settings::write_template(std::path::Path::new("."))?;
        println!("Created {}", path.display());
        println!("Fill in your TradeStation credentials and rename it to config.yaml");
        return Ok(ExitCode::SUCCESS);
    }

    if cli.list_symbols {
        cli::print_catalog();
        return Ok(ExitCode::SUCCESS);
    }

    // 1. 配置
    let mut config = settings::load(&cli.config)?;
    if let Some(workers) = cli.workers {
        config.max_workers = workers.max(1);
    }
    let requested = cli.requested_symbols()?;
    let incremental = !cli.full;

    // 2. 日志
    let _guard = logging::init(config.log_dir.as_deref())?;
    info!("barsync starting...");
    info!("  Data directory: {}", config.data_dir.display());
    info!("  Storage format: {}", config.storage_format);
    info!("  Timeframe: {}", config.timeframe);
    info!("  Mode: {}", if incremental { "incremental" } else { "full" });

    // 3. 基础设施层
    let clock: Arc<dyn TimeProvider> = Arc::new(SystemClock);
    let tokens = Arc::new(TokenAuthority::new(
        &config.endpoints.token_url,
        config.credentials.clone(),
        clock.clone(),
    )?);
    let api = Arc::new(TradeStationApi::new(
        &config.endpoints.base_url,
        config.request_timeout,
    )?);
    let store = Arc::new(SqliteBarStore::open(&config.data_dir, config.storage_format)?);

    // 4. 首次换取令牌失败视为整体失败
    if let Err(e) = tokens.access_token().await {
        error!("Authentication failed: {}", e);
        return Err(e.into());
    }

    // 5. 应用服务层
    let engine = Arc::new(FetchEngine::new(
        api,
        tokens,
        clock.clone(),
        EngineSettings::from_config(&config),
    ));
    let orchestrator = DownloadOrchestrator::new(
        engine,
        store,
        clock,
        OrchestratorSettings::from_config(&config),
    );

    let stats = orchestrator.download_all(requested, incremental).await;

    if stats.errors > 0 {
        error!("{} symbol(s) failed", stats.errors);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
