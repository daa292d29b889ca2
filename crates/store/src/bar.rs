use async_trait::async_trait;
use barsync_core::config::StorageFormat;
use barsync_core::market::entity::Bar;
use barsync_core::store::error::StoreError;
use barsync_core::store::port::BarStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const CREATE_BARS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS bars (
        time DATETIME NOT NULL PRIMARY KEY,
        open REAL,
        high REAL,
        low REAL,
        close REAL,
        volume REAL
    );
"#;

// SQLite 把 NaN 存成 NULL，价格列读回时还原为 NaN
type BarRow = (
    DateTime<Utc>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
);

/// # Summary
/// 把证券代码转换成安全且互不冲突的文件名。
///
/// # Logic
/// 1. 开头的 `@` 去掉；不以 `@` 开头的代码加前缀 `=`，使 `@ES` 与 `ES` 落在不同文件。
/// 2. `[A-Za-z0-9-]` 原样保留，`.` 仅在非开头位置保留。
/// 3. 其余字节（包括 `_` 本身）编码为 `_XX`（大写十六进制）。
///
/// # Invariants
/// * 不同的代码得到不同的文件名，且结果不会是 `.` 或 `..`。
pub fn sanitize_symbol(symbol: &str) -> String {
    let (mut out, rest) = match symbol.strip_prefix('@') {
        Some(rest) => (String::new(), rest),
        None => (String::from("="), symbol),
    };
    for byte in rest.bytes() {
        let keep =
            byte.is_ascii_alphanumeric() || byte == b'-' || (byte == b'.' && !out.is_empty());
        if keep {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("_{:02X}", byte));
        }
    }
    out
}

/// BarStore 的 SQLite 实现。
///
/// # Summary
/// 每个品种的历史保存在独立的数据库文件中：
/// - `single`：`{root}/{SYM}.db`
/// - `daily`：`{root}/{SYM}/{YYYY-MM-DD}.db`
/// - `monthly`：`{root}/{SYM}/{YYYY-MM}.db`
///
/// 分区按 K 线时间的 UTC 日期划分。
///
/// # Invariants
/// * 每个分区内 `time` 为主键，重复写入以新数据覆盖旧数据。
/// * 分区文件名按字典序即时间序，最新分区即字典序最大的文件。
/// * `single` 模式的连接池被缓存；分区模式文件数量可能很大，用完即关闭。
pub struct SqliteBarStore {
    root: PathBuf,
    format: StorageFormat,
    pools: DashMap<PathBuf, SqlitePool>,
}

impl SqliteBarStore {
    /// 创建存储实例。
    ///
    /// # Logic
    /// 1. 确保根目录存在。
    ///
    /// # Arguments
    /// * `root` - 数据根目录。
    /// * `format` - 持久化布局。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 存储实例或错误。
    pub fn open(root: impl Into<PathBuf>, format: StorageFormat) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::InitError(e.to_string()))?;
        Ok(Self {
            root,
            format,
            pools: DashMap::new(),
        })
    }

    pub fn format(&self) -> StorageFormat {
        self.format
    }

    /// 单文件模式下的数据库路径
    pub fn single_path(&self, symbol: &str) -> PathBuf {
        self.root.join(format!("{}.db", sanitize_symbol(symbol)))
    }

    /// 分区模式下某品种的分区目录
    pub fn partition_dir(&self, symbol: &str) -> PathBuf {
        self.root.join(sanitize_symbol(symbol))
    }

    /// K 线所属分区的数据库路径
    pub fn partition_path(&self, symbol: &str, time: DateTime<Utc>) -> PathBuf {
        match self.format {
            StorageFormat::Single => self.single_path(symbol),
            StorageFormat::Daily => self
                .partition_dir(symbol)
                .join(format!("{}.db", time.format("%Y-%m-%d"))),
            StorageFormat::Monthly => self
                .partition_dir(symbol)
                .join(format!("{}.db", time.format("%Y-%m"))),
        }
    }

    /// 打开（必要时创建）数据库文件并建表。
    async fn connect(path: &Path) -> Result<SqlitePool, StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(CREATE_BARS_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(pool)
    }

    /// 获取某个数据库文件的连接池，第二个返回值表示是否由缓存持有。
    async fn acquire(&self, path: &Path) -> Result<(SqlitePool, bool), StoreError> {
        if self.format != StorageFormat::Single {
            return Ok((Self::connect(path).await?, false));
        }

        if let Some(pool) = self.pools.get(path) {
            return Ok((pool.clone(), true));
        }

        let pool = Self::connect(path).await?;
        self.pools.insert(path.to_path_buf(), pool.clone());
        Ok((pool, true))
    }

    async fn release(pool: SqlitePool, cached: bool) {
        if !cached {
            pool.close().await;
        }
    }

    /// 列出某品种已存在的数据库文件，按时间升序。
    async fn existing_files(&self, symbol: &str) -> Result<Vec<PathBuf>, StoreError> {
        if self.format == StorageFormat::Single {
            let path = self.single_path(symbol);
            return Ok(if path.exists() { vec![path] } else { vec![] });
        }

        let dir = self.partition_dir(symbol);
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "db") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// 写入同一个数据库文件的一组 K 线，整组在一个事务中提交。
    async fn write_partition(&self, path: &Path, bars: &[&Bar]) -> Result<(), StoreError> {
        let (pool, cached) = self.acquire(path).await?;
        let result = Self::insert_all(&pool, bars).await;
        Self::release(pool, cached).await;
        result
    }

    async fn insert_all(pool: &SqlitePool, bars: &[&Bar]) -> Result<(), StoreError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        for bar in bars {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO bars (time, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(bar.time)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[async_trait]
impl BarStore for SqliteBarStore {
    /// # Summary
    /// 读取最新 K 线时间。
    ///
    /// # Logic
    /// 1. 找到最新的分区文件（单文件模式即唯一文件）。
    /// 2. 取该文件中最大的 `time`。
    async fn last_timestamp(&self, symbol: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let files = self.existing_files(symbol).await?;

        // 最新分区可能是空表，向前找到第一个有数据的分区
        for path in files.iter().rev() {
            let (pool, cached) = self.acquire(path).await?;
            let latest = sqlx::query_as::<_, (DateTime<Utc>,)>(
                "SELECT time FROM bars ORDER BY time DESC LIMIT 1",
            )
            .fetch_optional(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()));
            Self::release(pool, cached).await;

            if let Some((time,)) = latest? {
                return Ok(Some(time));
            }
        }

        Ok(None)
    }

    /// # Summary
    /// 合并写入 K 线。
    ///
    /// # Logic
    /// 1. 按所属分区分组。
    /// 2. 每个分区在一个事务内执行 `INSERT OR REPLACE`。
    async fn append(&self, symbol: &str, bars: &[Bar]) -> Result<(), StoreError> {
        if bars.is_empty() {
            return Ok(());
        }

        let mut groups: BTreeMap<PathBuf, Vec<&Bar>> = BTreeMap::new();
        for bar in bars {
            groups
                .entry(self.partition_path(symbol, bar.time))
                .or_default()
                .push(bar);
        }

        for (path, group) in &groups {
            self.write_partition(path, group).await?;
        }

        debug!(
            "[{}] Stored {} bars across {} file(s)",
            symbol,
            bars.len(),
            groups.len()
        );
        Ok(())
    }

    async fn load(&self, symbol: &str) -> Result<Vec<Bar>, StoreError> {
        let mut bars = Vec::new();

        for path in self.existing_files(symbol).await? {
            let (pool, cached) = self.acquire(&path).await?;
            let records = sqlx::query_as::<_, BarRow>(
                r#"
                SELECT time, open, high, low, close, volume
                FROM bars
                ORDER BY time ASC
                "#,
            )
            .fetch_all(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()));
            Self::release(pool, cached).await;

            bars.extend(records?.into_iter().map(|r| Bar {
                time: r.0,
                open: r.1.unwrap_or(f64::NAN),
                high: r.2.unwrap_or(f64::NAN),
                low: r.3.unwrap_or(f64::NAN),
                close: r.4.unwrap_or(f64::NAN),
                volume: r.5,
            }));
        }

        Ok(bars)
    }
}
