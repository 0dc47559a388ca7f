//! MarketDataStore integration tests against an in-memory SQLite database.

use datafeed_core::{Granularity, MarketBar};
use datafeed_data::{BarQuery, BarSeries, DataError, MarketDataStore, SeriesFilter};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const HOUR: i64 = 3_600_000;

fn hourly_bars(symbol: &str, venue: &str, count: i64, close: Decimal) -> Vec<MarketBar> {
    (0..count)
        .map(|i| {
            MarketBar::new(
                symbol,
                venue,
                Granularity::H1,
                i * HOUR,
                close,
                close + dec!(1),
                close - dec!(1),
                close,
                dec!(10.5),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_upsert_is_idempotent_and_refreshes_values() {
    let store = MarketDataStore::in_memory().await.unwrap();

    let first = hourly_bars("BTC/USDT", "okx", 50, dec!(100));
    assert_eq!(store.upsert(&first).await.unwrap(), 50);

    // Same keys, revised values: row count must not change.
    let second = hourly_bars("BTC/USDT", "okx", 50, dec!(200));
    store.upsert(&second).await.unwrap();

    let filter = SeriesFilter::all().symbol("BTC/USDT");
    assert_eq!(store.count(&filter).await.unwrap(), 50);

    let bars = store
        .query_range("BTC/USDT", "okx", Granularity::H1, None, None)
        .await
        .unwrap();
    assert_eq!(bars.len(), 50);
    assert!(bars.iter().all(|b| b.close == dec!(200)));
    assert_eq!(bars[0].high, dec!(201));
}

#[tokio::test]
async fn test_upsert_preserves_decimal_precision() {
    let store = MarketDataStore::in_memory().await.unwrap();
    let bar = MarketBar::new(
        "ETH/USDT",
        "binance",
        Granularity::M5,
        0,
        dec!(2301.123456789),
        dec!(2302.5),
        dec!(2300.000000001),
        dec!(2301.75),
        dec!(0.00012345),
    );
    store.upsert(std::slice::from_ref(&bar)).await.unwrap();

    let stored = store
        .query_range("ETH/USDT", "binance", Granularity::M5, None, None)
        .await
        .unwrap();
    assert_eq!(stored, vec![bar]);
}

#[tokio::test]
async fn test_latest_timestamp() {
    let store = MarketDataStore::in_memory().await.unwrap();
    assert_eq!(
        store
            .latest_timestamp("BTC/USDT", "okx", Granularity::H1)
            .await
            .unwrap(),
        None
    );

    store
        .upsert(&hourly_bars("BTC/USDT", "okx", 24, dec!(1)))
        .await
        .unwrap();

    assert_eq!(
        store
            .latest_timestamp("BTC/USDT", "okx", Granularity::H1)
            .await
            .unwrap(),
        Some(23 * HOUR)
    );
    // Other series are independent.
    assert_eq!(
        store
            .latest_timestamp("BTC/USDT", "binance", Granularity::H1)
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_query_range_is_inclusive_and_ascending() {
    let store = MarketDataStore::in_memory().await.unwrap();
    let mut bars = hourly_bars("AAPL", "yahoo", 10, dec!(190));
    bars.reverse();
    store.upsert(&bars).await.unwrap();

    let range = store
        .query_range("AAPL", "yahoo", Granularity::H1, Some(2 * HOUR), Some(5 * HOUR))
        .await
        .unwrap();
    let timestamps: Vec<i64> = range.iter().map(|b| b.timestamp).collect();
    assert_eq!(timestamps, vec![2 * HOUR, 3 * HOUR, 4 * HOUR, 5 * HOUR]);

    let limited = store
        .query(&BarQuery::new("AAPL", "yahoo", Granularity::H1).start(HOUR).limit(3))
        .await
        .unwrap();
    let timestamps: Vec<i64> = limited.iter().map(|b| b.timestamp).collect();
    assert_eq!(timestamps, vec![HOUR, 2 * HOUR, 3 * HOUR]);
}

#[tokio::test]
async fn test_stats_symbols_and_clear() {
    let store = MarketDataStore::in_memory().await.unwrap();
    store
        .upsert(&hourly_bars("BTC/USDT", "okx", 30, dec!(1)))
        .await
        .unwrap();
    store
        .upsert(&hourly_bars("ETH/USDT", "okx", 20, dec!(1)))
        .await
        .unwrap();
    store
        .upsert(&hourly_bars("BTC/USDT", "binance", 10, dec!(1)))
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_records, 60);
    assert_eq!(
        stats.by_venue,
        vec![("okx".to_string(), 50), ("binance".to_string(), 10)]
    );
    assert_eq!(stats.by_granularity, vec![("1h".to_string(), 60)]);
    assert_eq!(stats.top_symbols(1), &[("BTC/USDT".to_string(), 40)]);
    assert!(stats.size_bytes > 0);
    assert!(stats.path.is_none());

    assert_eq!(
        store.symbols(Some("okx")).await.unwrap(),
        vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()]
    );

    let removed = store
        .clear(&SeriesFilter::all().symbol("BTC/USDT").venue("okx"))
        .await
        .unwrap();
    assert_eq!(removed, 30);
    assert_eq!(store.count(&SeriesFilter::all()).await.unwrap(), 30);

    let removed = store.clear(&SeriesFilter::all()).await.unwrap();
    assert_eq!(removed, 30);
    assert_eq!(store.stats().await.unwrap().total_records, 0);
}

#[tokio::test]
async fn test_file_store_roundtrip_to_series() {
    let dir = std::env::temp_dir().join(format!("datafeed-store-{}", std::process::id()));
    let path = dir.join("market_data.db");

    let store = MarketDataStore::connect(&path).await.unwrap();
    store
        .upsert(&hourly_bars("BTC/USDT", "okx", 5, dec!(42000)))
        .await
        .unwrap();

    let bars = store
        .query_range("BTC/USDT", "okx", Granularity::H1, None, None)
        .await
        .unwrap();
    let key = bars[0].series_key();
    let series = BarSeries::from_bars(key, bars).unwrap();
    assert_eq!(series.len(), 5);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.path.as_deref(), Some(path.as_path()));

    store.close().await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_failed_upsert_rolls_back_whole_call() {
    let dir = std::env::temp_dir().join(format!("datafeed-rollback-{}", std::process::id()));
    let path = dir.join("market_data.db");
    let _ = std::fs::remove_dir_all(&dir);

    let store = MarketDataStore::connect(&path).await.unwrap();

    // 두 번째 INSERT 묶음에 속한 150시 바에서 실패
    let admin = SqlitePool::connect_with(SqliteConnectOptions::new().filename(&path))
        .await
        .unwrap();
    sqlx::query(&format!(
        "CREATE TRIGGER reject_bar BEFORE INSERT ON market_data \
         WHEN NEW.timestamp = {} BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        150 * HOUR
    ))
    .execute(&admin)
    .await
    .unwrap();
    admin.close().await;

    let result = store
        .upsert(&hourly_bars("BTC/USDT", "okx", 200, dec!(100)))
        .await;
    assert!(matches!(result, Err(DataError::InsertError(_))), "{:?}", result);
    assert_eq!(store.count(&SeriesFilter::all()).await.unwrap(), 0);
    assert_eq!(
        store
            .latest_timestamp("BTC/USDT", "okx", Granularity::H1)
            .await
            .unwrap(),
        None
    );

    store.close().await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_upsert_duplicate_keys_in_one_call() {
    let store = MarketDataStore::in_memory().await.unwrap();

    let mut bars = hourly_bars("BTC/USDT", "okx", 2, dec!(100));
    let mut revised = bars[0].clone();
    revised.close = dec!(105);
    bars.push(revised);

    assert_eq!(store.upsert(&bars).await.unwrap(), 2);
    let stored = store
        .query_range("BTC/USDT", "okx", Granularity::H1, None, None)
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].close, dec!(105));
}
