use barsync_core::common::time::TimeProvider;
use barsync_core::config::DownloadConfig;
use barsync_core::download::entity::DownloadStats;
use barsync_core::market::error::FetchError;
use barsync_core::market::port::BarFetcher;
use barsync_core::store::error::StoreError;
use barsync_core::store::port::BarStore;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// 顺序模式下相邻两个品种之间的停顿
pub const SYMBOL_PAUSE: Duration = Duration::from_millis(200);

/// # Summary
/// 单个品种下载失败的原因。
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    // 没有任何历史且远端也没有返回数据，无法区分"无数据"与"品种不可达"
    #[error("No data returned for {0}")]
    EmptyHistory(String),
    // 下载任务 panic 或被取消
    #[error("Worker failed: {0}")]
    Worker(String),
}

/// # Summary
/// 单个品种下载成功后的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolOutcome {
    // 写入了 n 根 K 线
    Downloaded(usize),
    // 已有历史且没有新数据
    UpToDate,
}

impl SymbolOutcome {
    pub fn bars(&self) -> usize {
        match self {
            SymbolOutcome::Downloaded(n) => *n,
            SymbolOutcome::UpToDate => 0,
        }
    }
}

/// # Summary
/// 调度参数。
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    // 全量下载的起点
    pub start_floor: DateTime<Utc>,
    // 未显式指定品种时使用的列表
    pub symbols: Vec<String>,
    // 并发下载的品种数，<= 1 为严格顺序
    pub max_workers: usize,
    // 顺序模式下品种之间的停顿
    pub symbol_pause: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            start_floor: config.start_floor(),
            symbols: config.symbols.clone(),
            max_workers: config.max_workers,
            symbol_pause: SYMBOL_PAUSE,
        }
    }
}

type SharedStats = Arc<Mutex<DownloadStats>>;

fn with_stats<R>(stats: &SharedStats, f: impl FnOnce(&mut DownloadStats) -> R) -> R {
    let mut guard = stats.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// # Summary
/// 下载调度器，负责增量起点解析、逐品种下载与统计汇总。
/// 编译期仅依赖 `barsync-core` 中的 Trait 定义，所有具体实现通过构造函数注入。
///
/// # Invariants
/// - 每个品种在独立的 tokio 任务中执行，单个品种的失败或 panic 不会中断整个运行。
/// - 每次 `download_all` 都新建一份统计，运行结束后以值的形式返回。
pub struct DownloadOrchestrator {
    // 单品种抓取器
    fetcher: Arc<dyn BarFetcher>,
    // K 线存储
    store: Arc<dyn BarStore>,
    // 时钟
    clock: Arc<dyn TimeProvider>,
    settings: OrchestratorSettings,
}

impl DownloadOrchestrator {
    /// # Summary
    /// 创建 DownloadOrchestrator 实例。
    ///
    /// # Arguments
    /// * `fetcher` - 单品种抓取器的具体实现。
    /// * `store` - K 线存储的具体实现。
    /// * `clock` - 统计起止时间所用的时钟。
    /// * `settings` - 调度参数。
    ///
    /// # Returns
    /// * `Arc<Self>` - 可共享的调度器实例。
    pub fn new(
        fetcher: Arc<dyn BarFetcher>,
        store: Arc<dyn BarStore>,
        clock: Arc<dyn TimeProvider>,
        settings: OrchestratorSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            fetcher,
            store,
            clock,
            settings,
        })
    }

    /// # Summary
    /// 解析某品种本次下载的起点。
    ///
    /// # Logic
    /// 1. 非增量模式直接使用配置的起点。
    /// 2. 增量模式下查询最新已存时间：不存在则使用配置起点；
    ///    存在则以该时间本身为起点，重新抓取最后一根以覆盖当时可能未收盘的数据。
    ///
    /// # Returns
    /// * `(start, has_existing)`
    pub async fn resolve_start(
        &self,
        symbol: &str,
        incremental: bool,
    ) -> Result<(DateTime<Utc>, bool), StoreError> {
        if !incremental {
            return Ok((self.settings.start_floor, false));
        }

        match self.store.last_timestamp(symbol).await? {
            Some(last) => Ok((last, true)),
            None => Ok((self.settings.start_floor, false)),
        }
    }

    /// # Summary
    /// 下载单个品种。
    ///
    /// # Logic
    /// 1. 解析起点。
    /// 2. 调用抓取器。
    /// 3. 结果为空：没有已有历史则视为失败，否则视为已是最新。
    /// 4. 非空结果合并写入存储。
    ///
    /// # Arguments
    /// * `symbol` - 证券代码。
    /// * `incremental` - 是否增量下载。
    ///
    /// # Returns
    /// * `Result<SymbolOutcome, DownloadError>`
    pub async fn download_symbol(
        &self,
        symbol: &str,
        incremental: bool,
    ) -> Result<SymbolOutcome, DownloadError> {
        let (start, has_existing) = self.resolve_start(symbol, incremental).await?;
        if has_existing {
            info!("[{}] Resuming from {}", symbol, start);
        } else {
            info!("[{}] Downloading full history from {}", symbol, start.date_naive());
        }

        let result = self.fetcher.fetch_bars(symbol, start).await?;

        if result.is_empty() {
            if has_existing {
                info!("[{}] Already up to date", symbol);
                return Ok(SymbolOutcome::UpToDate);
            }
            warn!("[{}] No data returned", symbol);
            return Err(DownloadError::EmptyHistory(symbol.to_string()));
        }

        self.store.append(symbol, &result.bars).await?;
        info!(
            "[{}] Saved {} bars in {} page(s)",
            symbol,
            result.len(),
            result.pages
        );

        Ok(SymbolOutcome::Downloaded(result.len()))
    }

    /// 下载单个品种并把结果计入统计
    async fn run_symbol(&self, symbol: &str, incremental: bool, stats: &SharedStats) {
        match self.download_symbol(symbol, incremental).await {
            Ok(outcome) => with_stats(stats, |s| s.record_success(outcome.bars())),
            Err(e) => {
                error!("[{}] Failed: {}", symbol, e);
                with_stats(stats, |s| s.record_failure(symbol));
            }
        }
    }

    /// # Summary
    /// 下载一组品种。
    ///
    /// # Logic
    /// 1. 未指定品种时使用配置列表；重复出现的品种只处理一次，其余计为跳过。
    /// 2. `max_workers <= 1` 时逐个处理，品种之间停顿 `symbol_pause`。
    /// 3. 否则以信号量限制并发，最多 `max_workers` 个品种同时下载。
    /// 4. 任务 panic 在汇合点捕获，计为该品种失败。
    /// 5. 全部完成后写入结束时间并输出汇总。
    ///
    /// # Arguments
    /// * `symbols` - 要下载的品种，`None` 使用配置列表。
    /// * `incremental` - 是否增量下载。
    ///
    /// # Returns
    /// * `DownloadStats` - 本次运行的统计。
    pub async fn download_all(
        self: &Arc<Self>,
        symbols: Option<Vec<String>>,
        incremental: bool,
    ) -> DownloadStats {
        let requested = symbols.unwrap_or_else(|| self.settings.symbols.clone());
        let stats: SharedStats = Arc::new(Mutex::new(DownloadStats::started_at(self.clock.now())));

        let mut seen = HashSet::new();
        let mut queue = Vec::with_capacity(requested.len());
        for symbol in requested {
            if seen.insert(symbol.clone()) {
                queue.push(symbol);
            } else {
                warn!("[{}] Duplicate symbol, skipping", symbol);
                with_stats(&stats, DownloadStats::record_skipped);
            }
        }

        let workers = self.settings.max_workers.max(1);
        info!(
            "Starting download of {} symbols (incremental: {}, workers: {})",
            queue.len(),
            incremental,
            workers
        );

        if workers == 1 {
            self.run_sequential(queue, incremental, &stats).await;
        } else {
            self.run_pooled(queue, incremental, workers, &stats).await;
        }

        let now = self.clock.now();
        let summary = with_stats(&stats, |s| {
            s.end_time = Some(now);
            s.clone()
        });
        log_summary(&summary, now);
        summary
    }

    async fn run_sequential(
        self: &Arc<Self>,
        queue: Vec<String>,
        incremental: bool,
        stats: &SharedStats,
    ) {
        let total = queue.len();
        for (i, symbol) in queue.into_iter().enumerate() {
            info!("Processing {}/{}: {}", i + 1, total, symbol);
            let this = self.clone();
            let task_stats = stats.clone();
            let task_symbol = symbol.clone();
            let handle = tokio::spawn(async move {
                this.run_symbol(&task_symbol, incremental, &task_stats).await;
            });
            if let Err(e) = handle.await {
                error!("[{}] {}", symbol, DownloadError::Worker(e.to_string()));
                with_stats(stats, |s| s.record_failure(&symbol));
            }

            if i + 1 < total {
                tokio::time::sleep(self.settings.symbol_pause).await;
            }
        }
    }

    async fn run_pooled(
        self: &Arc<Self>,
        queue: Vec<String>,
        incremental: bool,
        workers: usize,
        stats: &SharedStats,
    ) {
        let permits = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut owners = HashMap::new();

        for symbol in queue {
            let this = self.clone();
            let permits = permits.clone();
            let task_stats = stats.clone();
            let task_symbol = symbol.clone();
            let handle = tasks.spawn(async move {
                // 信号量不会被关闭，获取失败时照常执行
                let _permit = permits.acquire_owned().await.ok();
                this.run_symbol(&task_symbol, incremental, &task_stats).await;
            });
            owners.insert(handle.id(), symbol);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            if let Err(e) = joined {
                let symbol = owners.get(&e.id()).cloned().unwrap_or_default();
                error!("[{}] {}", symbol, DownloadError::Worker(e.to_string()));
                with_stats(stats, |s| s.record_failure(&symbol));
            }
        }
    }
}

fn log_summary(stats: &DownloadStats, now: DateTime<Utc>) {
    let elapsed = stats.elapsed(now);
    info!("Download complete");
    info!("  Symbols processed: {}", stats.symbols_processed);
    info!("  Symbols skipped: {}", stats.symbols_skipped);
    info!("  Bars downloaded: {}", stats.bars_downloaded);
    info!("  Errors: {}", stats.errors);
    info!("  Elapsed: {}s", elapsed.num_seconds());
    if !stats.failed_symbols.is_empty() {
        warn!("  Failed symbols: {}", stats.failed_symbols.join(", "));
    }
}
