//! 供下游 crate 测试使用的内存实现。

use crate::market::entity::Bar;
use crate::store::error::StoreError;
use crate::store::port::BarStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// # Summary
/// 基于 DashMap 的内存 K 线存储。
///
/// # Invariants
/// - 每个品种的历史以时间为键保存，天然满足按时间戳幂等覆盖。
#[derive(Default)]
pub struct MemBarStore {
    db: DashMap<String, BTreeMap<DateTime<Utc>, Bar>>,
}

impl MemBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置某品种的历史
    pub fn seed(&self, symbol: &str, bars: Vec<Bar>) {
        let mut entry = self.db.entry(symbol.to_string()).or_default();
        for bar in bars {
            entry.insert(bar.time, bar);
        }
    }

    /// 已写入过数据的品种数
    pub fn symbol_count(&self) -> usize {
        self.db.len()
    }
}

#[async_trait]
impl BarStore for MemBarStore {
    async fn last_timestamp(&self, symbol: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .db
            .get(symbol)
            .and_then(|bars| bars.keys().next_back().copied()))
    }

    async fn append(&self, symbol: &str, bars: &[Bar]) -> Result<(), StoreError> {
        let mut entry = self.db.entry(symbol.to_string()).or_default();
        for bar in bars {
            entry.insert(bar.time, bar.clone());
        }
        Ok(())
    }

    async fn load(&self, symbol: &str) -> Result<Vec<Bar>, StoreError> {
        Ok(self
            .db
            .get(symbol)
            .map(|bars| bars.values().cloned().collect())
            .unwrap_or_default())
    }
}
