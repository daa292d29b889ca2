//! 内置连续期货品种目录，按类别分组。

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown category '{0}'")]
pub struct UnknownCategory(pub String);

/// 类别名 -> 品种代码，保持声明顺序
pub const DEFAULT_SYMBOLS: &[(&str, &[&str])] = &[
    ("index", &["@ES", "@NQ", "@YM", "@RTY", "@EMD", "@NKD"]),
    ("micro_index", &["@MES", "@MNQ", "@MYM", "@M2K"]),
    ("energy", &["@CL", "@NG", "@RB", "@HO", "@BRN", "@QM"]),
    ("micro_energy", &["@MCL", "@MNG"]),
    ("metals", &["@GC", "@SI", "@HG", "@PL", "@PA"]),
    ("micro_metals", &["@MGC", "@SIL", "@MHG"]),
    ("treasuries", &["@US", "@UB", "@TY", "@TN", "@FV", "@TU"]),
    ("grains", &["@C", "@S", "@W", "@KW", "@BO", "@SM", "@O", "@RR"]),
    ("softs", &["@KC", "@SB", "@CC", "@CT", "@OJ", "@LBR"]),
    ("meats", &["@LE", "@GF", "@HE"]),
    (
        "currencies",
        &["@EC", "@JY", "@BP", "@AD", "@CD", "@SF", "@NE1", "@PX", "@M6E", "@M6B"],
    ),
    ("volatility", &["@VX"]),
    ("crypto", &["@BTC", "@ETH", "@MBT", "@MET"]),
];

/// 所有类别名
pub fn categories() -> Vec<&'static str> {
    DEFAULT_SYMBOLS.iter().map(|(name, _)| *name).collect()
}

/// 完整目录，按声明顺序展开且去重
pub fn all_symbols() -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for symbol in DEFAULT_SYMBOLS.iter().flat_map(|(_, symbols)| symbols.iter()) {
        if !out.iter().any(|s| s == symbol) {
            out.push((*symbol).to_string());
        }
    }
    out
}

/// # Summary
/// 获取某一类别下的全部品种。
///
/// # Arguments
/// * `category`: 类别名，大小写不敏感。
///
/// # Returns
/// 类别存在时返回品种列表，否则返回 `UnknownCategory`。
pub fn symbols_by_category(category: &str) -> Result<Vec<String>, UnknownCategory> {
    let wanted = category.to_lowercase();
    DEFAULT_SYMBOLS
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, symbols)| symbols.iter().map(|s| (*s).to_string()).collect())
        .ok_or(UnknownCategory(category.to_string()))
}
