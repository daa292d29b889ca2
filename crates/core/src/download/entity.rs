use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 一次下载运行的统计。
///
/// # Invariants
/// - 每次运行新建一份，运行期间由各下载任务在同一把锁下修改。
/// - 运行结束（`end_time` 写入）后只读。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadStats {
    // 成功处理的品种数（含"已是最新"）
    pub symbols_processed: usize,
    // 因重复出现而跳过的品种数
    pub symbols_skipped: usize,
    // 新写入的 K 线数
    pub bars_downloaded: usize,
    // 失败的品种数
    pub errors: usize,
    // 失败品种列表，按失败发生顺序
    pub failed_symbols: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl DownloadStats {
    /// 以给定开始时间新建统计
    pub fn started_at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(start_time),
            ..Self::default()
        }
    }

    /// 记录一个成功处理的品种及其新增 K 线数
    pub fn record_success(&mut self, bars: usize) {
        self.symbols_processed += 1;
        self.bars_downloaded += bars;
    }

    /// 记录一个失败品种
    pub fn record_failure(&mut self, symbol: &str) {
        self.errors += 1;
        self.failed_symbols.push(symbol.to_string());
    }

    pub fn record_skipped(&mut self) {
        self.symbols_skipped += 1;
    }

    /// # Summary
    /// 运行耗时。
    ///
    /// # Logic
    /// 1. 未开始时返回 0。
    /// 2. 已结束时取 `end_time - start_time`，否则以 `now` 作为终点。
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        match self.start_time {
            None => Duration::zero(),
            Some(start) => self.end_time.unwrap_or(now) - start,
        }
    }
}
