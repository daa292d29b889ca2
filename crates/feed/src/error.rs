use thiserror::Error;

/// # Summary
/// 行情接入组件的初始化错误。
#[derive(Error, Debug)]
pub enum FeedError {
    // reqwest 客户端构建失败
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}
