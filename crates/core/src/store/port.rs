use super::error::StoreError;
use crate::market::entity::Bar;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// K 线历史存储接口。
///
/// # Invariants
/// - 按 (symbol, time) 幂等覆盖：重复写入同一时间戳不会产生重复行。
/// - 不同品种之间的读写互不影响，可被多个下载任务并发调用。
#[async_trait]
pub trait BarStore: Send + Sync {
    /// # Summary
    /// 读取某品种已持久化的最新 K 线时间。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    ///
    /// # Returns
    /// 存在历史时返回最新时间，否则返回 `None`。
    async fn last_timestamp(&self, symbol: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// # Summary
    /// 将一段升序 K 线合并进已有历史。
    ///
    /// # Logic
    /// 1. 与已有历史按时间戳合并，重叠部分以新数据为准。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    /// * `bars`: 升序、无重复的 K 线。
    ///
    /// # Returns
    /// 成功返回 Ok，失败返回 `StoreError`。
    async fn append(&self, symbol: &str, bars: &[Bar]) -> Result<(), StoreError>;

    /// 按时间升序读取某品种的全部历史
    async fn load(&self, symbol: &str) -> Result<Vec<Bar>, StoreError>;
}
