//! # barsync-feed
//!
//! 行情接入层：
//! - [`auth::TokenAuthority`]：OAuth2 刷新令牌交换与访问令牌缓存。
//! - [`tradestation::TradeStationApi`]：K 线接口的 reqwest 适配器。
//! - [`engine::FetchEngine`]：按时间向后翻页的抓取引擎，负责限流、重试与令牌刷新。

pub mod auth;
pub mod engine;
pub mod error;
pub mod tradestation;

/// 为 rustls 安装 ring 加密后端，重复调用没有副作用
pub(crate) fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::trace!("rustls crypto provider already installed");
    }
}
