use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod time;

/// # Summary
/// K 线周期单位，对应行情接口的 `unit` 查询参数。
///
/// # Invariants
/// - `as_str` 的输出必须与远端接口接受的取值完全一致。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum BarUnit {
    // 分钟线
    #[default]
    Minute,
    // 日线
    Daily,
    // 周线
    Weekly,
    // 月线
    Monthly,
}

impl BarUnit {
    /// 远端接口使用的单位名称
    pub fn as_str(&self) -> &'static str {
        match self {
            BarUnit::Minute => "Minute",
            BarUnit::Daily => "Daily",
            BarUnit::Weekly => "Weekly",
            BarUnit::Monthly => "Monthly",
        }
    }
}

impl FromStr for BarUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minute" | "min" | "m" => Ok(BarUnit::Minute),
            "daily" | "day" | "d" => Ok(BarUnit::Daily),
            "weekly" | "week" | "w" => Ok(BarUnit::Weekly),
            "monthly" | "month" => Ok(BarUnit::Monthly),
            _ => Err(format!("Unknown bar unit: {}", s)),
        }
    }
}

impl std::fmt::Display for BarUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Summary
/// K 线时间周期：数量 + 单位（例如 1 Minute、5 Minute、1 Daily）。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TimeFrame {
    // 周期数量
    pub interval: u32,
    // 周期单位
    pub unit: BarUnit,
}

impl Default for TimeFrame {
    fn default() -> Self {
        Self {
            interval: 1,
            unit: BarUnit::Minute,
        }
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.interval, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_unit_from_str_is_case_insensitive() {
        assert_eq!("minute".parse::<BarUnit>(), Ok(BarUnit::Minute));
        assert_eq!("DAILY".parse::<BarUnit>(), Ok(BarUnit::Daily));
        assert_eq!("Weekly".parse::<BarUnit>(), Ok(BarUnit::Weekly));
        assert!("fortnight".parse::<BarUnit>().is_err());
    }

    #[test]
    fn test_default_timeframe_is_one_minute() {
        let tf = TimeFrame::default();
        assert_eq!(tf.interval, 1);
        assert_eq!(tf.unit, BarUnit::Minute);
        assert_eq!(tf.to_string(), "1 Minute");
    }
}
