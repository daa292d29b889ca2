use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 单根 OHLCV K 线。
///
/// # Invariants
/// - 身份键为 (symbol, time)，同一品种内 `time` 唯一。
/// - `volume` 在远端缺失或无法解析时为 `None`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    // K 线开始时间 (UTC)
    pub time: DateTime<Utc>,
    // 开盘价
    pub open: f64,
    // 最高价
    pub high: f64,
    // 最低价
    pub low: f64,
    // 收盘价
    pub close: f64,
    // 成交量
    pub volume: Option<f64>,
}

/// # Summary
/// 单个品种一次抓取的最终结果。
///
/// # Invariants
/// - `bars` 按时间严格升序，时间戳无重复。
/// - 所有 `bars` 的时间都不早于请求的起点。
/// - 最后一根（可能尚未收盘的）K 线已被剔除。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchResult {
    // 证券代码
    pub symbol: String,
    // 规整后的 K 线
    pub bars: Vec<Bar>,
    // 实际发出的分页请求数
    pub pages: usize,
}

impl FetchResult {
    /// # Summary
    /// 将多页原始 K 线合并成满足不变量的结果。
    ///
    /// # Logic
    /// 1. 按时间稳定排序。
    /// 2. 时间戳重复时保留后出现的那一根。
    /// 3. 过滤掉早于 `start` 的 K 线。
    /// 4. 丢弃最后一根（可能仍在形成中）。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    /// * `raw`: 各页 K 线按到达顺序拼接后的列表。
    /// * `start`: 请求的起点（包含）。
    /// * `pages`: 分页请求数。
    ///
    /// # Returns
    /// 规整后的 `FetchResult`。
    pub fn assemble(symbol: &str, mut raw: Vec<Bar>, start: DateTime<Utc>, pages: usize) -> Self {
        raw.sort_by_key(|bar| bar.time);

        let mut bars: Vec<Bar> = Vec::with_capacity(raw.len());
        for bar in raw {
            match bars.last_mut() {
                Some(prev) if prev.time == bar.time => *prev = bar,
                _ => bars.push(bar),
            }
        }

        bars.retain(|bar| bar.time >= start);
        bars.pop();

        Self {
            symbol: symbol.to_string(),
            bars,
            pages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bar_at(minute: i64, close: f64) -> Bar {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        Bar {
            time: base + Duration::minutes(minute),
            open: close,
            high: close,
            low: close,
            close,
            volume: Some(10.0),
        }
    }

    #[test]
    fn test_assemble_sorts_dedups_and_drops_last() {
        let start = bar_at(0, 0.0).time;
        // 两页：新页在前，旧页在后，边界 minute=2 重复
        let raw = vec![
            bar_at(2, 20.0),
            bar_at(3, 30.0),
            bar_at(4, 40.0),
            bar_at(0, 0.0),
            bar_at(1, 10.0),
            bar_at(2, 21.0),
        ];

        let result = FetchResult::assemble("@ES", raw, start, 2);
        let times: Vec<_> = result.bars.iter().map(|b| b.time).collect();
        assert_eq!(
            times,
            vec![bar_at(0, 0.0).time, bar_at(1, 0.0).time, bar_at(2, 0.0).time, bar_at(3, 0.0).time]
        );
        // 重复的时间戳保留后出现的那根
        assert_eq!(result.bars[2].close, 21.0);
        assert_eq!(result.pages, 2);
    }

    #[test]
    fn test_assemble_filters_before_start() {
        let start = bar_at(2, 0.0).time;
        let raw = (0..5).map(|m| bar_at(m, 1.0)).collect();
        let result = FetchResult::assemble("@NQ", raw, start, 1);
        assert_eq!(result.len(), 2);
        assert_eq!(result.bars[0].time, start);
    }

    #[test]
    fn test_single_bar_yields_empty_result() {
        let start = bar_at(0, 0.0).time;
        let result = FetchResult::assemble("@CL", vec![bar_at(5, 1.0)], start, 1);
        assert!(result.is_empty());
    }

    #[test]
    fn test_reassemble_same_pages_is_idempotent() {
        let start = bar_at(0, 0.0).time;
        let page: Vec<Bar> = (0..10).map(|m| bar_at(m, f64::from(u32::try_from(m).unwrap()))).collect();

        let once = FetchResult::assemble("@GC", page.clone(), start, 1);
        let mut doubled = page.clone();
        doubled.extend(page);
        let twice = FetchResult::assemble("@GC", doubled, start, 1);

        assert_eq!(once.bars, twice.bars);
        assert!(once.bars.windows(2).all(|w| w[0].time < w[1].time));
    }
}
