use async_trait::async_trait;
use barsync_core::common::time::FixedClock;
use barsync_core::market::entity::{Bar, FetchResult};
use barsync_core::market::error::FetchError;
use barsync_core::market::port::BarFetcher;
use barsync_core::store::port::BarStore;
use barsync_core::test_utils::MemBarStore;
use barsync_manager::download::{
    DownloadError, DownloadOrchestrator, OrchestratorSettings, SymbolOutcome,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 单个品种的脚本化行为
#[derive(Clone)]
enum Script {
    // 返回从请求起点开始的 n 根 K 线
    Bars(u32),
    Empty,
    Exhausted,
    Panic,
}

/// # Summary
/// 按品种返回预设结果的抓取器，并记录每次请求的起点。
struct ScriptedFetcher {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl ScriptedFetcher {
    fn new(scripts: &[(&str, Script)]) -> Self {
        Self {
            scripts: scripts
                .iter()
                .map(|(s, b)| (s.to_string(), b.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, DateTime<Utc>)> {
        self.calls.lock().unwrap().clone()
    }
}

fn bar(time: DateTime<Utc>) -> Bar {
    Bar {
        time,
        open: 1.0,
        high: 1.0,
        low: 1.0,
        close: 1.0,
        volume: Some(1.0),
    }
}

#[async_trait]
impl BarFetcher for ScriptedFetcher {
    async fn fetch_bars(&self, symbol: &str, start: DateTime<Utc>) -> Result<FetchResult, FetchError> {
        self.calls.lock().unwrap().push((symbol.to_string(), start));
        match self.scripts.get(symbol).cloned().unwrap_or(Script::Bars(3)) {
            Script::Bars(n) => {
                let bars = (0..n)
                    .map(|i| bar(start + Duration::minutes(i64::from(i))))
                    .collect();
                Ok(FetchResult {
                    symbol: symbol.to_string(),
                    bars,
                    pages: 1,
                })
            }
            Script::Empty => Ok(FetchResult::default()),
            Script::Exhausted => Err(FetchError::RetriesExhausted {
                symbol: symbol.to_string(),
                retries: 3,
            }),
            Script::Panic => panic!("fetcher blew up for {}", symbol),
        }
    }
}

fn floor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn orchestrator(
    fetcher: Arc<ScriptedFetcher>,
    store: Arc<MemBarStore>,
    max_workers: usize,
) -> Arc<DownloadOrchestrator> {
    let settings = OrchestratorSettings {
        start_floor: floor(),
        symbols: vec!["@ES".to_string(), "@NQ".to_string()],
        max_workers,
        symbol_pause: std::time::Duration::from_millis(200),
    };
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
    DownloadOrchestrator::new(fetcher, store, clock, settings)
}

#[tokio::test]
async fn test_no_history_starts_from_floor() -> anyhow::Result<()> {
    let fetcher = Arc::new(ScriptedFetcher::new(&[]));
    let store = Arc::new(MemBarStore::new());
    let orch = orchestrator(fetcher.clone(), store.clone(), 1);

    assert_eq!(orch.resolve_start("@ES", true).await?, (floor(), false));

    let outcome = orch.download_symbol("@ES", true).await?;

    assert_eq!(outcome, SymbolOutcome::Downloaded(3));
    assert_eq!(fetcher.calls(), vec![("@ES".to_string(), floor())]);
    assert_eq!(store.load("@ES").await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_existing_history_resumes_at_last_bar() -> anyhow::Result<()> {
    let last = Utc.with_ymd_and_hms(2024, 2, 10, 15, 59, 0).unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(&[]));
    let store = Arc::new(MemBarStore::new());
    store.seed("@ES", vec![bar(last - Duration::minutes(1)), bar(last)]);
    let orch = orchestrator(fetcher.clone(), store.clone(), 1);

    assert_eq!(orch.resolve_start("@ES", true).await?, (last, true));
    // 全量模式忽略已有历史
    assert_eq!(orch.resolve_start("@ES", false).await?, (floor(), false));

    orch.download_symbol("@ES", true).await?;

    assert_eq!(fetcher.calls()[0].1, last);
    // 重新抓取的最后一根覆盖原有行，不产生重复
    let stored = store.load("@ES").await?;
    assert_eq!(stored.len(), 4);
    assert!(stored.windows(2).all(|w| w[0].time < w[1].time));
    Ok(())
}

#[tokio::test]
async fn test_empty_result_without_history_is_failure() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[("@XX", Script::Empty)]));
    let store = Arc::new(MemBarStore::new());
    let orch = orchestrator(fetcher, store.clone(), 1);

    let err = orch.download_symbol("@XX", true).await.unwrap_err();

    assert!(matches!(err, DownloadError::EmptyHistory(s) if s == "@XX"));
    assert_eq!(store.symbol_count(), 0);
}

#[tokio::test]
async fn test_empty_result_with_history_is_up_to_date() -> anyhow::Result<()> {
    let last = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 0).unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(&[("@ES", Script::Empty)]));
    let store = Arc::new(MemBarStore::new());
    store.seed("@ES", vec![bar(last)]);
    let orch = orchestrator(fetcher, store, 1);

    assert_eq!(orch.download_symbol("@ES", true).await?, SymbolOutcome::UpToDate);

    let stats = orch.download_all(Some(vec!["@ES".to_string()]), true).await;
    assert_eq!(stats.symbols_processed, 1);
    assert_eq!(stats.bars_downloaded, 0);
    assert_eq!(stats.errors, 0);
    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_writes_nothing() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[("@CL", Script::Exhausted)]));
    let store = Arc::new(MemBarStore::new());
    let orch = orchestrator(fetcher, store.clone(), 1);

    let stats = orch.download_all(Some(vec!["@CL".to_string()]), true).await;

    assert_eq!(stats.errors, 1);
    assert_eq!(stats.failed_symbols, vec!["@CL".to_string()]);
    assert_eq!(store.symbol_count(), 0);
}

fn ten_symbols() -> Vec<String> {
    (1..=10).map(|i| format!("sym{}", i)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_pooled_run_matches_sequential_run() {
    let scripts = [("sym3", Script::Exhausted)];

    let sequential = orchestrator(
        Arc::new(ScriptedFetcher::new(&scripts)),
        Arc::new(MemBarStore::new()),
        1,
    )
    .download_all(Some(ten_symbols()), true)
    .await;

    let pooled_fetcher = Arc::new(ScriptedFetcher::new(&scripts));
    let pooled = orchestrator(pooled_fetcher.clone(), Arc::new(MemBarStore::new()), 4)
        .download_all(Some(ten_symbols()), true)
        .await;

    for stats in [&sequential, &pooled] {
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.failed_symbols, vec!["sym3".to_string()]);
        assert_eq!(stats.symbols_processed, 9);
        assert_eq!(stats.bars_downloaded, 27);
        assert!(stats.end_time.is_some());
    }
    assert_eq!(pooled_fetcher.calls().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_symbol_does_not_abort_run() {
    let scripts = [("@BAD", Script::Panic)];
    let symbols = vec!["@ES".to_string(), "@BAD".to_string(), "@NQ".to_string()];

    for workers in [1, 3] {
        let store = Arc::new(MemBarStore::new());
        let stats = orchestrator(Arc::new(ScriptedFetcher::new(&scripts)), store.clone(), workers)
            .download_all(Some(symbols.clone()), true)
            .await;

        assert_eq!(stats.symbols_processed, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.failed_symbols, vec!["@BAD".to_string()]);
        assert_eq!(store.symbol_count(), 2);
    }
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_symbols_are_skipped() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[]));
    let orch = orchestrator(fetcher.clone(), Arc::new(MemBarStore::new()), 1);
    let symbols = vec!["@ES".to_string(), "@NQ".to_string(), "@ES".to_string()];

    let stats = orch.download_all(Some(symbols), true).await;

    assert_eq!(stats.symbols_processed, 2);
    assert_eq!(stats.symbols_skipped, 1);
    assert_eq!(fetcher.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_default_symbol_list_and_sequential_pause() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[]));
    let orch = orchestrator(fetcher.clone(), Arc::new(MemBarStore::new()), 1);

    let started = tokio::time::Instant::now();
    let stats = orch.download_all(None, false).await;

    let called: Vec<String> = fetcher.calls().into_iter().map(|(s, _)| s).collect();
    assert_eq!(called, vec!["@ES".to_string(), "@NQ".to_string()]);
    assert_eq!(stats.symbols_processed, 2);
    assert!(started.elapsed() >= std::time::Duration::from_millis(200));
}
