//! SyncEngine integration tests against simulated sources and an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use datafeed_collector::modules::LoadRequest;
use datafeed_collector::{
    DataLoader, FetcherRegistry, SyncEngine, TargetOutcome, TargetState,
};
use datafeed_core::{Granularity, MarketBar, SyncTarget};
use datafeed_data::{MarketDataStore, SeriesFilter};
use datafeed_exchange::{RetryConfig, SimulatedSource};
use rust_decimal_macros::dec;

const HOUR: i64 = 3_600_000;
/// 2023-11-14 22:00 UTC
const T0: i64 = 472_222 * HOUR;

fn retry() -> RetryConfig {
    RetryConfig::default()
        .with_max_retries(1)
        .with_base_delay(Duration::from_millis(1))
}

async fn engine_with(sources: Vec<Arc<SimulatedSource>>, page_delay: Duration) -> SyncEngine {
    let store = MarketDataStore::in_memory().await.unwrap();
    let mut registry = FetcherRegistry::new();
    for source in sources {
        registry.register(source, retry(), page_delay);
    }
    SyncEngine::new(store, registry)
}

fn btc_okx() -> SyncTarget {
    SyncTarget::new("BTC/USDT", "okx", Granularity::H1, 7)
}

#[tokio::test]
async fn test_incremental_resume() {
    let source = Arc::new(SimulatedSource::new("okx", 30));
    source.generate("BTC/USDT", Granularity::H1, T0, 100);
    let engine = engine_with(vec![source.clone()], Duration::ZERO).await;
    let target = btc_okx();

    // 첫 실행: 저장소가 비어 있어 lookback 구간 전체
    let first = engine.sync_target(&target, T0 + 49 * HOUR).await;
    assert_eq!(
        first.outcome,
        TargetOutcome::Synced {
            bars: 50,
            pages: 2,
            malformed: 0
        }
    );
    assert_eq!(
        engine
            .store()
            .latest_timestamp("BTC/USDT", "okx", Granularity::H1)
            .await
            .unwrap(),
        Some(T0 + 49 * HOUR)
    );

    // 두 번째 실행: 마지막 바 다음부터만 요청
    source.clear_requests();
    let second = engine.sync_target(&target, T0 + 79 * HOUR).await;
    assert_eq!(second.window.unwrap().start, T0 + 50 * HOUR);
    assert!(matches!(second.outcome, TargetOutcome::Synced { bars: 30, .. }));
    let requests = source.requests();
    assert_eq!(requests[0].start, T0 + 50 * HOUR);
    assert!(requests.iter().all(|r| r.start > T0 + 49 * HOUR));

    // 세 번째 실행: 이미 최신
    source.clear_requests();
    let third = engine.sync_target(&target, T0 + 79 * HOUR).await;
    assert_eq!(third.outcome, TargetOutcome::UpToDate);
    assert!(source.requests().is_empty());

    assert_eq!(engine.store().count(&SeriesFilter::all()).await.unwrap(), 80);
    assert_eq!(engine.state(&target.key()), TargetState::Idle);
}

#[tokio::test]
async fn test_failure_is_isolated() {
    let okx = Arc::new(SimulatedSource::new("okx", 100));
    let binance = Arc::new(SimulatedSource::new("binance", 100));
    for source in [&okx, &binance] {
        source.generate("BTC/USDT", Granularity::H1, T0, 10);
        source.generate("ETH/USDT", Granularity::H1, T0, 10);
    }
    binance.make_unavailable("BTC/USDT");

    let engine = engine_with(vec![okx, binance], Duration::ZERO).await;
    let targets = vec![
        SyncTarget::new("BTC/USDT", "binance", Granularity::H1, 7),
        SyncTarget::new("BTC/USDT", "okx", Granularity::H1, 7),
        SyncTarget::new("ETH/USDT", "binance", Granularity::H1, 7),
    ];

    let run = engine.run_once_at(&targets, T0 + 9 * HOUR).await;

    assert_eq!(run.stats.total, 3);
    assert_eq!(run.stats.errors, 1);
    assert_eq!(run.stats.success, 2);
    assert_eq!(run.stats.total_bars, 20);
    assert!(matches!(run.reports[0].outcome, TargetOutcome::Failed { bars_written: 0, .. }));

    let failed: Vec<_> = run.failures().map(|r| r.key.to_string()).collect();
    assert_eq!(failed, vec!["binance:BTC/USDT:1h"]);
    assert_eq!(engine.state(&targets[0].key()), TargetState::Failed);
    assert_eq!(engine.state(&targets[1].key()), TargetState::Idle);
}

#[tokio::test]
async fn test_failed_state_clears_on_next_success() {
    let source = Arc::new(SimulatedSource::new("okx", 100));
    source.generate("BTC/USDT", Granularity::H1, T0, 10);
    source.make_unavailable("BTC/USDT");

    let engine = engine_with(vec![source.clone()], Duration::ZERO).await;
    let target = btc_okx();

    let report = engine.sync_target(&target, T0 + 9 * HOUR).await;
    assert!(matches!(report.outcome, TargetOutcome::Failed { .. }));
    assert_eq!(engine.state(&target.key()), TargetState::Failed);

    source.recover();
    let report = engine.sync_target(&target, T0 + 9 * HOUR).await;
    assert!(matches!(report.outcome, TargetOutcome::Synced { bars: 10, .. }));
    assert_eq!(engine.state(&target.key()), TargetState::Idle);
}

#[tokio::test]
async fn test_partial_failure_keeps_written_pages() {
    let source = Arc::new(SimulatedSource::new("okx", 10));
    source.generate("BTC/USDT", Granularity::H1, T0, 35);
    source.fail_after(2);

    let engine = engine_with(vec![source.clone()], Duration::ZERO).await;
    let target = btc_okx();
    let now = T0 + 34 * HOUR;

    let report = engine.sync_target(&target, now).await;
    match &report.outcome {
        TargetOutcome::Failed {
            error,
            bars_written,
        } => {
            assert_eq!(*bars_written, 20);
            assert!(error.contains("simulated outage"), "{}", error);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(engine.store().count(&SeriesFilter::all()).await.unwrap(), 20);

    // 복구 후 저장하지 못한 뒷부분만 다시 받음
    source.recover();
    let report = engine.sync_target(&target, now).await;
    assert!(matches!(report.outcome, TargetOutcome::Synced { bars: 15, .. }));
    assert_eq!(engine.store().count(&SeriesFilter::all()).await.unwrap(), 35);
}

#[tokio::test]
async fn test_rate_limit_exhaustion_fails_target_only() {
    let source = Arc::new(SimulatedSource::new("okx", 100));
    source.generate("BTC/USDT", Granularity::H1, T0, 5);
    source.rate_limit_next(10);

    let engine = engine_with(vec![source.clone()], Duration::ZERO).await;
    let report = engine.sync_target(&btc_okx(), T0 + 4 * HOUR).await;

    match report.outcome {
        TargetOutcome::Failed { error, .. } => assert!(error.contains("Rate limit"), "{}", error),
        other => panic!("unexpected outcome: {:?}", other),
    }
    // 최초 1회 + 재시도 1회
    assert_eq!(source.requests().len(), 2);
}

#[tokio::test]
async fn test_concurrent_sync_of_same_target_is_skipped() {
    let source = Arc::new(SimulatedSource::new("okx", 10));
    source.generate("BTC/USDT", Granularity::H1, T0, 30);
    let engine = engine_with(vec![source], Duration::from_millis(10)).await;
    let target = btc_okx();
    let now = T0 + 29 * HOUR;

    let (first, second) = tokio::join!(
        engine.sync_target(&target, now),
        engine.sync_target(&target, now)
    );

    assert!(matches!(first.outcome, TargetOutcome::Synced { bars: 30, .. }));
    assert_eq!(second.outcome, TargetOutcome::Busy);

    let mut run = datafeed_collector::SyncRunReport::default();
    run.record(second);
    assert_eq!(run.stats.skipped, 1);
}

#[tokio::test]
async fn test_unknown_venue_and_unsupported_granularity() {
    let tushare = Arc::new(
        SimulatedSource::new("tushare", 100).with_supported(vec![Granularity::D1]),
    );
    let engine = engine_with(vec![tushare.clone()], Duration::ZERO).await;

    let targets = vec![
        SyncTarget::new("BTC/USD", "kraken", Granularity::H1, 7),
        SyncTarget::new("000001.SZ", "tushare", Granularity::H1, 365),
    ];
    let run = engine.run_once_at(&targets, T0).await;

    assert_eq!(run.stats.errors, 2);
    match &run.reports[0].outcome {
        TargetOutcome::Failed { error, .. } => assert!(error.contains("Unknown venue")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    match &run.reports[1].outcome {
        TargetOutcome::Failed { error, .. } => assert!(error.contains("Unsupported granularity")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(tushare.requests().is_empty());
}

#[tokio::test]
async fn test_empty_provider_response() {
    let source = Arc::new(SimulatedSource::new("okx", 100));
    let engine = engine_with(vec![source], Duration::ZERO).await;

    let run = engine.run_once_at(&[btc_okx()], T0).await;
    assert_eq!(run.reports[0].outcome, TargetOutcome::Empty { malformed: 0 });
    assert_eq!(run.stats.empty, 1);
}

#[tokio::test]
async fn test_sync_range_overwrites_revised_bars() {
    let source = Arc::new(SimulatedSource::new("okx", 100));
    source.generate("BTC/USDT", Granularity::H1, T0, 3);
    let engine = engine_with(vec![source.clone()], Duration::ZERO).await;

    engine
        .sync_range("BTC/USDT", "okx", Granularity::H1, T0, T0 + 2 * HOUR)
        .await;

    // 마지막 바가 나중에 수정됨
    source.insert_bars([MarketBar::new(
        "BTC/USDT",
        "okx",
        Granularity::H1,
        T0 + 2 * HOUR,
        dec!(102),
        dec!(110),
        dec!(101),
        dec!(108.5),
        dec!(42),
    )]);
    let report = engine
        .sync_range("BTC/USDT", "okx", Granularity::H1, T0, T0 + 2 * HOUR)
        .await;
    assert!(matches!(report.outcome, TargetOutcome::Synced { bars: 3, .. }));

    let bars = engine
        .store()
        .query_range("BTC/USDT", "okx", Granularity::H1, None, None)
        .await
        .unwrap();
    assert_eq!(bars.len(), 3);
    assert_eq!(bars[2].close, dec!(108.5));
    assert_eq!(bars[2].volume, dec!(42));
}

#[tokio::test]
async fn test_loader_fetches_when_store_is_empty() {
    let source = Arc::new(SimulatedSource::new("okx", 50));
    let now = T0 + 7 * 24 * HOUR;
    source.generate("BTC/USDT", Granularity::H1, T0, 7 * 24 + 1);
    let engine = engine_with(vec![source.clone()], Duration::ZERO).await;
    let loader = DataLoader::new(&engine);

    let series = loader.quick_load_at("btc_1h_7d", now).await.unwrap();
    assert_eq!(series.len(), 7 * 24 + 1);
    assert_eq!(series.timestamp[0], T0);
    let summary = series.summary().unwrap();
    assert_eq!(summary.close_first, dec!(100));

    // 두 번째 로드는 저장소에서만 읽음
    source.clear_requests();
    let again = loader
        .load(&LoadRequest::new("BTC/USDT", "okx", Granularity::H1, T0, T0 + 10 * HOUR))
        .await
        .unwrap();
    assert_eq!(again.len(), 11);
    assert!(source.requests().is_empty());

    assert!(loader.quick_load_at("doge_1m_1d", now).await.is_err());
}
