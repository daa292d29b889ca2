//! # barsync-core
//!
//! 领域层：只包含实体、错误与端口 (Trait) 定义，不做任何 I/O。
//! 具体的 HTTP、SQLite 实现位于 `barsync-feed` 与 `barsync-store`。

pub mod catalog;
pub mod common;
pub mod config;
pub mod download;
pub mod market;
pub mod store;

#[cfg(feature = "test-utils")]
pub mod test_utils;
