use barsync_core::catalog::{self, UnknownCategory};
use clap::Parser;
use std::path::PathBuf;

/// # Summary
/// 命令行参数。
#[derive(Parser, Debug)]
#[command(name = "barsync", version, about = "Download historical bars from TradeStation")]
pub struct Cli {
    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Symbols to download (overrides the configured list)
    #[arg(short = 's', long = "symbols", value_name = "SYMBOL", num_args = 1..)]
    pub symbols: Vec<String>,

    /// Download every symbol of these catalogue categories
    #[arg(short = 'c', long = "category", value_name = "CATEGORY", num_args = 1..)]
    pub categories: Vec<String>,

    /// Ignore stored history and download from the configured start date
    #[arg(long)]
    pub full: bool,

    /// Number of symbols downloaded in parallel
    #[arg(short = 'w', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Print the built-in symbol catalogue and exit
    #[arg(long)]
    pub list_symbols: bool,

    /// Write a configuration template and exit
    #[arg(long)]
    pub init_config: bool,
}

impl Cli {
    /// # Summary
    /// 由 `-s` 与 `-c` 合并出本次要下载的品种。
    ///
    /// # Returns
    /// 两者都未指定时返回 `None`（使用配置列表），类别不存在时返回错误。
    pub fn requested_symbols(&self) -> Result<Option<Vec<String>>, UnknownCategory> {
        if self.symbols.is_empty() && self.categories.is_empty() {
            return Ok(None);
        }

        let mut symbols = self.symbols.clone();
        for category in &self.categories {
            symbols.extend(catalog::symbols_by_category(category)?);
        }
        Ok(Some(symbols))
    }
}

/// 按类别打印内置品种目录
pub fn print_catalog() {
    println!("Available symbols by category:");
    for category in catalog::categories() {
        let symbols = catalog::symbols_by_category(category).unwrap_or_default();
        println!("  {:<14} {}", category, symbols.join(", "));
    }
    println!("Total: {} symbols", catalog::all_symbols().len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_selection_uses_config() {
        let cli = Cli::parse_from(["barsync"]);
        assert_eq!(cli.requested_symbols().unwrap(), None);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert!(!cli.full);
    }

    #[test]
    fn test_symbols_and_categories_are_combined() {
        let cli = Cli::parse_from(["barsync", "-s", "@ES", "@CL", "-c", "volatility", "-w", "4", "--full"]);
        let symbols = cli.requested_symbols().unwrap().unwrap();

        assert_eq!(symbols, vec!["@ES".to_string(), "@CL".to_string(), "@VX".to_string()]);
        assert_eq!(cli.workers, Some(4));
        assert!(cli.full);
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let cli = Cli::parse_from(["barsync", "-c", "equities"]);
        assert_eq!(
            cli.requested_symbols().unwrap_err(),
            UnknownCategory("equities".to_string())
        );
    }
}
