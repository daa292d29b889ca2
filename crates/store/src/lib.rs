//! # barsync-store
//!
//! K 线持久化适配器。[`bar::SqliteBarStore`] 实现 `barsync_core::store::port::BarStore`，
//! 按 `StorageFormat` 把每个品种写入单文件或按日 / 月分区的 SQLite 数据库。

pub mod bar;
