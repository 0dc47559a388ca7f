//! OHLCV 바 저장소.
//!
//! 하나의 SQLite 테이블 `market_data`에 모든 시계열을 저장합니다.
//! (symbol, venue, granularity, timestamp)가 고유 키이며, 같은 키로 다시
//! 쓰면 행을 추가하지 않고 OHLCV 값을 갱신합니다.
//!
//! 가격과 거래량은 정밀도 손실이 없도록 decimal 문자열로 저장합니다.
//!
//! # 동작 방식
//!
//! 1. 동기화가 `latest_timestamp`로 마지막 저장 시각을 조회
//! 2. 그 이후 구간을 페이지 단위로 가져옴
//! 3. 페이지마다 `upsert` 한 번 (단일 트랜잭션, 실패 시 전체 롤백)

use crate::error::{DataError, Result};
use crate::storage::query::{BarQuery, SeriesFilter};
use datafeed_core::{Granularity, MarketBar};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// 한 INSERT 문에 담는 최대 행 수 (행당 바인딩 9개).
const UPSERT_CHUNK: usize = 100;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS market_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        venue TEXT NOT NULL,
        granularity TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        open TEXT NOT NULL,
        high TEXT NOT NULL,
        low TEXT NOT NULL,
        close TEXT NOT NULL,
        volume TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (symbol, venue, granularity, timestamp)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_market_data_series ON market_data (symbol, venue, granularity)",
    "CREATE INDEX IF NOT EXISTS idx_market_data_timestamp ON market_data (timestamp)",
];

/// 저장된 바 레코드.
#[derive(Debug, Clone, FromRow)]
struct MarketBarRecord {
    symbol: String,
    venue: String,
    granularity: String,
    timestamp: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

impl MarketBarRecord {
    fn into_bar(self) -> Result<MarketBar> {
        let granularity = Granularity::from_str(&self.granularity).map_err(DataError::InvalidData)?;
        let decimal = |field: &str, value: &str| {
            Decimal::from_str(value).map_err(|e| {
                DataError::InvalidData(format!("{} '{}' at {}: {}", field, value, self.timestamp, e))
            })
        };

        Ok(MarketBar {
            open: decimal("open", &self.open)?,
            high: decimal("high", &self.high)?,
            low: decimal("low", &self.low)?,
            close: decimal("close", &self.close)?,
            volume: decimal("volume", &self.volume)?,
            symbol: self.symbol,
            venue: self.venue,
            granularity,
            timestamp: self.timestamp,
        })
    }
}

/// 저장소 통계.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// 전체 행 수
    pub total_records: i64,
    /// 제공처별 행 수 (많은 순)
    pub by_venue: Vec<(String, i64)>,
    /// 타임프레임별 행 수 (많은 순)
    pub by_granularity: Vec<(String, i64)>,
    /// 심볼별 행 수 (많은 순)
    pub by_symbol: Vec<(String, i64)>,
    /// 데이터베이스 크기 (bytes)
    pub size_bytes: i64,
    /// 데이터베이스 파일 경로 (메모리 DB면 None)
    pub path: Option<PathBuf>,
}

impl StoreStats {
    /// 행 수 상위 `n`개 심볼.
    pub fn top_symbols(&self, n: usize) -> &[(String, i64)] {
        &self.by_symbol[..n.min(self.by_symbol.len())]
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// 키별로 마지막 바만 남깁니다 (입력 순서 유지).
fn latest_per_key(bars: &[MarketBar]) -> Vec<&MarketBar> {
    let mut seen = HashSet::new();
    let mut latest: Vec<&MarketBar> = bars
        .iter()
        .rev()
        .filter(|b| seen.insert((b.symbol.as_str(), b.venue.as_str(), b.granularity, b.timestamp)))
        .collect();
    latest.reverse();
    latest
}

/// SQLite 기반 OHLCV 저장소.
#[derive(Debug, Clone)]
pub struct MarketDataStore {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl MarketDataStore {
    /// 파일 데이터베이스에 연결하고 스키마를 준비합니다.
    ///
    /// 파일과 상위 디렉토리가 없으면 생성합니다.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        let store = Self {
            pool,
            path: Some(path),
        };
        store.init_schema().await?;

        info!(path = ?store.path, "시장 데이터 저장소 연결");
        Ok(store)
    }

    /// 메모리 데이터베이스 (테스트/임시 분석용).
    ///
    /// 연결이 닫히면 데이터가 사라지므로 단일 연결을 끝까지 유지합니다.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        let store = Self { pool, path: None };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DataError::MigrationError(e.to_string()))?;
        }
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 바를 저장하거나 갱신합니다.
    ///
    /// 한 번의 호출은 하나의 트랜잭션입니다. 중간에 실패하면 이번 호출의
    /// 모든 쓰기가 롤백되고 `InsertError`를 반환합니다.
    ///
    /// 같은 키가 여러 번 들어오면 나중 바가 저장되고 한 번만 셉니다.
    #[instrument(skip(self, bars), fields(count = bars.len()))]
    pub async fn upsert(&self, bars: &[MarketBar]) -> Result<usize> {
        if bars.is_empty() {
            return Ok(0);
        }
        let bars = latest_per_key(bars);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;

        let mut written = 0u64;
        for chunk in bars.chunks(UPSERT_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "INSERT INTO market_data \
                 (symbol, venue, granularity, timestamp, open, high, low, close, volume) ",
            );
            qb.push_values(chunk, |mut row, bar| {
                row.push_bind(bar.symbol.clone())
                    .push_bind(bar.venue.clone())
                    .push_bind(bar.granularity.as_str())
                    .push_bind(bar.timestamp)
                    .push_bind(bar.open.to_string())
                    .push_bind(bar.high.to_string())
                    .push_bind(bar.low.to_string())
                    .push_bind(bar.close.to_string())
                    .push_bind(bar.volume.to_string());
            });
            qb.push(
                " ON CONFLICT (symbol, venue, granularity, timestamp) DO UPDATE SET \
                 open = excluded.open, \
                 high = excluded.high, \
                 low = excluded.low, \
                 close = excluded.close, \
                 volume = excluded.volume, \
                 updated_at = CURRENT_TIMESTAMP",
            );

            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| DataError::InsertError(e.to_string()))?;
            written += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;

        debug!(written, "바 저장 완료");
        Ok(written as usize)
    }

    /// 시계열의 마지막 저장 시각 (없으면 None).
    #[instrument(skip(self))]
    pub async fn latest_timestamp(
        &self,
        symbol: &str,
        venue: &str,
        granularity: Granularity,
    ) -> Result<Option<i64>> {
        let latest: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(timestamp)
            FROM market_data
            WHERE symbol = ? AND venue = ? AND granularity = ?
            "#,
        )
        .bind(symbol)
        .bind(venue)
        .bind(granularity.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(latest)
    }

    /// 구간 조회 (시간 오름차순, 경계 포함). 빈 구간은 채우지 않습니다.
    pub async fn query_range(
        &self,
        symbol: &str,
        venue: &str,
        granularity: Granularity,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<MarketBar>> {
        self.query(&BarQuery::new(symbol, venue, granularity).range(start, end))
            .await
    }

    /// `BarQuery` 조건으로 조회합니다.
    #[instrument(skip(self), fields(series = %query.key))]
    pub async fn query(&self, query: &BarQuery) -> Result<Vec<MarketBar>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT symbol, venue, granularity, timestamp, open, high, low, close, volume \
             FROM market_data WHERE 1=1",
        );
        query.push_conditions(&mut qb);
        qb.push(" ORDER BY timestamp ASC");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let records: Vec<MarketBarRecord> = qb.build_query_as().fetch_all(&self.pool).await?;
        let bars = records
            .into_iter()
            .map(MarketBarRecord::into_bar)
            .collect::<Result<Vec<_>>>()?;

        debug!(count = bars.len(), "구간 조회");
        Ok(bars)
    }

    /// 조건에 맞는 행 수.
    pub async fn count(&self, filter: &SeriesFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM market_data WHERE 1=1");
        filter.push_conditions(&mut qb);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// 저장된 심볼 목록 (이름순).
    pub async fn symbols(&self, venue: Option<&str>) -> Result<Vec<String>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT DISTINCT symbol FROM market_data WHERE 1=1");
        if let Some(venue) = venue {
            qb.push(" AND venue = ").push_bind(venue.to_string());
        }
        qb.push(" ORDER BY symbol");

        let symbols: Vec<String> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(symbols)
    }

    /// 전체 통계.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<StoreStats> {
        let total_records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM market_data")
            .fetch_one(&self.pool)
            .await?;

        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            total_records,
            by_venue: self.group_counts("venue").await?,
            by_granularity: self.group_counts("granularity").await?,
            by_symbol: self.group_counts("symbol").await?,
            size_bytes: page_count * page_size,
            path: self.path.clone(),
        })
    }

    /// 컬럼별 행 수 (많은 순, 같으면 이름순).
    async fn group_counts(&self, column: &'static str) -> Result<Vec<(String, i64)>> {
        let sql = format!(
            "SELECT {column}, COUNT(*) AS cnt FROM market_data GROUP BY {column} ORDER BY cnt DESC, {column} ASC"
        );
        let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// 조건에 맞는 행을 삭제합니다. 빈 조건은 전체 삭제입니다.
    #[instrument(skip(self))]
    pub async fn clear(&self, filter: &SeriesFilter) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM market_data WHERE 1=1");
        filter.push_conditions(&mut qb);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::DeleteError(e.to_string()))?;

        info!(deleted = result.rows_affected(), all = filter.is_all(), "데이터 삭제");
        Ok(result.rows_affected())
    }

    /// 연결 풀을 닫습니다.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
