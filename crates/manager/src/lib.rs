//! # barsync-manager
//!
//! 应用服务层。[`download::DownloadOrchestrator`] 只依赖 `barsync-core` 中的端口，
//! 具体的抓取器与存储实现由调用方注入。

pub mod download;
