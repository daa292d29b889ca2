use chrono::{DateTime, Duration, Utc};
use std::sync::RwLock;

/// # Summary
/// 时钟接口，用于隔离系统时间。
/// 分页抓取的起点 "now" 与下载统计的起止时间都通过此接口读取。
pub trait TimeProvider: Send + Sync {
    /// 获取当前 UTC 时间
    fn now(&self) -> DateTime<Utc>;
}

/// # Summary
/// 真实时钟，直接返回操作系统当前时间。
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeProvider for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// # Summary
/// 手动拨动的固定时钟，测试中用于构造确定的 "now"。
///
/// # Invariants
/// - 并发安全：内部利用 `RwLock` 保护当前时间；锁中毒时沿用中毒前的值。
pub struct FixedClock {
    current_time: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// 使用指定的初始时间创建时钟
    pub fn new(initial_time: DateTime<Utc>) -> Self {
        Self {
            current_time: RwLock::new(initial_time),
        }
    }

    /// 强制修改时钟的当前时间
    pub fn set_time(&self, new_time: DateTime<Utc>) {
        let mut time = self.current_time.write().unwrap_or_else(|e| e.into_inner());
        *time = new_time;
    }

    /// 将时钟向前拨动指定时长
    pub fn advance(&self, by: Duration) {
        let mut time = self.current_time.write().unwrap_or_else(|e| e.into_inner());
        *time += by;
    }
}

impl TimeProvider for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current_time.read().unwrap_or_else(|e| e.into_inner())
    }
}
