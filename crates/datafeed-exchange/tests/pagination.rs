//! Pagination behaviour of RangeFetcher against the simulated source.

use std::sync::Arc;
use std::time::Duration;

use datafeed_core::Granularity;
use datafeed_exchange::{FetchError, RangeFetcher, RetryConfig, SimulatedSource};
use futures::{StreamExt, TryStreamExt};
use proptest::prelude::*;

const HOUR: i64 = 3_600_000;
const MINUTE: i64 = 60_000;

fn fetcher(source: &Arc<SimulatedSource>) -> RangeFetcher {
    RangeFetcher::new(source.clone()).with_retry(
        RetryConfig::default()
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(1)),
    )
}

#[tokio::test]
async fn test_250_hourly_bars_in_pages_of_100() {
    let source = Arc::new(SimulatedSource::new("test", 100));
    source.generate("BTC/USDT", Granularity::H1, 0, 250);

    let fetcher = fetcher(&source);
    let pages: Vec<_> = fetcher
        .fetch_pages("BTC/USDT", Granularity::H1, 0, 249 * HOUR)
        .try_collect()
        .await
        .unwrap();

    let sizes: Vec<usize> = pages.iter().map(|p| p.bars.len()).collect();
    assert_eq!(sizes, vec![100, 100, 50]);

    let bars = fetcher
        .collect_range("BTC/USDT", Granularity::H1, 0, 249 * HOUR)
        .await
        .unwrap();
    assert_eq!(bars.len(), 250);
    for (i, bar) in bars.iter().enumerate() {
        assert_eq!(bar.timestamp, i as i64 * HOUR);
    }
}

#[tokio::test]
async fn test_page_boundaries() {
    // N-1, N, N+1 bars with a page limit of N.
    for total in [9usize, 10, 11] {
        let source = Arc::new(SimulatedSource::new("test", 10));
        source.generate("ETH/USDT", Granularity::M1, 0, total);

        let bars = fetcher(&source)
            .collect_range("ETH/USDT", Granularity::M1, 0, 1_000 * MINUTE)
            .await
            .unwrap();
        assert_eq!(bars.len(), total, "total = {}", total);

        let expected_requests = total / 10 + 1;
        assert_eq!(source.requests().len(), expected_requests, "total = {}", total);
    }
}

#[tokio::test]
async fn test_empty_source_yields_nothing() {
    let source = Arc::new(SimulatedSource::new("test", 10));
    let bars = fetcher(&source)
        .collect_range("BTC/USDT", Granularity::M1, 0, 100 * MINUTE)
        .await
        .unwrap();
    assert!(bars.is_empty());
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test]
async fn test_each_request_starts_after_previous_page() {
    let source = Arc::new(SimulatedSource::new("test", 7));
    source.generate("BTC/USDT", Granularity::M5, 0, 40);

    let pages: Vec<_> = fetcher(&source)
        .fetch_pages("BTC/USDT", Granularity::M5, 0, i64::MAX / 2)
        .try_collect()
        .await
        .unwrap();

    let requests = source.requests();
    assert_eq!(requests.len(), pages.len());
    for (page, next) in pages.iter().zip(requests.iter().skip(1)) {
        let last = page.bars.last().unwrap().timestamp;
        assert!(next.start > last);
        assert_eq!(next.start, last + Granularity::M5.as_millis());
    }
}

#[tokio::test]
async fn test_range_end_is_respected() {
    let source = Arc::new(SimulatedSource::new("test", 5));
    source.generate("BTC/USDT", Granularity::M1, 0, 100);

    let bars = fetcher(&source)
        .collect_range("BTC/USDT", Granularity::M1, 3 * MINUTE, 12 * MINUTE)
        .await
        .unwrap();
    let timestamps: Vec<i64> = bars.iter().map(|b| b.timestamp).collect();
    assert_eq!(timestamps, (3..=12).map(|i| i * MINUTE).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_malformed_rows_do_not_end_paging_early() {
    let source = Arc::new(SimulatedSource::new("test", 10));
    source.generate("BTC/USDT", Granularity::M1, 0, 25);
    // Last row of the first page is malformed: the page is still full.
    source.mark_malformed("BTC/USDT", 9 * MINUTE);

    let pages: Vec<_> = fetcher(&source)
        .fetch_pages("BTC/USDT", Granularity::M1, 0, 100 * MINUTE)
        .try_collect()
        .await
        .unwrap();

    let kept: usize = pages.iter().map(|p| p.bars.len()).sum();
    let malformed: usize = pages.iter().map(|p| p.malformed).sum();
    assert_eq!(kept, 24);
    assert_eq!(malformed, 1);
    assert_eq!(source.requests()[1].start, 10 * MINUTE);
}

#[tokio::test]
async fn test_rate_limit_retried_within_ceiling() {
    let source = Arc::new(SimulatedSource::new("test", 10));
    source.generate("BTC/USDT", Granularity::M1, 0, 15);
    source.rate_limit_next(2);

    let bars = fetcher(&source)
        .collect_range("BTC/USDT", Granularity::M1, 0, 100 * MINUTE)
        .await
        .unwrap();
    assert_eq!(bars.len(), 15);
    // two rejected attempts + two pages
    assert_eq!(source.requests().len(), 4);
}

#[tokio::test]
async fn test_rate_limit_exhaustion_keeps_earlier_pages() {
    let source = Arc::new(SimulatedSource::new("test", 10));
    source.generate("BTC/USDT", Granularity::M1, 0, 30);

    let fetcher = fetcher(&source);
    let mut pages = fetcher.fetch_pages("BTC/USDT", Granularity::M1, 0, 100 * MINUTE);

    let first = pages.next().await.unwrap().unwrap();
    assert_eq!(first.bars.len(), 10);

    source.rate_limit_next(10);
    match pages.next().await {
        Some(Err(FetchError::RateLimitExhausted { attempts, .. })) => assert_eq!(attempts, 3),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn test_unsupported_granularity() {
    let source = Arc::new(SimulatedSource::new("test", 10).with_supported(vec![Granularity::D1]));
    let result = fetcher(&source)
        .collect_range("000001.SZ", Granularity::H1, 0, 100 * HOUR)
        .await;
    assert!(matches!(result, Err(FetchError::Provider(_))));
    assert!(source.requests().is_empty());
}

#[tokio::test]
async fn test_windowed_source_skips_gaps_and_pre_listing() {
    let source = Arc::new(SimulatedSource::new("test", 10).windowed());
    // 상장 전 25시간, 25시간 공백
    source.generate("BTC/USDT", Granularity::H1, 25 * HOUR, 5);
    source.generate("BTC/USDT", Granularity::H1, 55 * HOUR, 5);

    let pages: Vec<_> = fetcher(&source)
        .fetch_pages("BTC/USDT", Granularity::H1, 0, 79 * HOUR)
        .try_collect()
        .await
        .unwrap();

    let sizes: Vec<usize> = pages.iter().map(|p| p.bars.len()).collect();
    assert_eq!(sizes, vec![5, 5]);
    assert_eq!(pages[0].request_start, 20 * HOUR);
    assert_eq!(pages[1].request_start, 50 * HOUR);

    let starts: Vec<i64> = source.requests().iter().map(|r| r.start).collect();
    let expected: Vec<i64> = (0..8).map(|w| w * 10 * HOUR).collect();
    assert_eq!(starts, expected);
}

#[tokio::test]
async fn test_windowed_source_with_no_data_ends_at_range_end() {
    let source = Arc::new(SimulatedSource::new("test", 10).windowed());
    let bars = fetcher(&source)
        .collect_range("BTC/USDT", Granularity::H1, 0, 29 * HOUR)
        .await
        .unwrap();
    assert!(bars.is_empty());
    assert_eq!(source.requests().len(), 3);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_pagination_is_complete_and_ordered(total in 0usize..300, limit in 1usize..60) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let bars = runtime.block_on(async {
            let source = Arc::new(SimulatedSource::new("test", limit));
            source.generate("BTC/USDT", Granularity::M15, 0, total);
            fetcher(&source)
                .collect_range("BTC/USDT", Granularity::M15, 0, 10_000 * Granularity::M15.as_millis())
                .await
                .unwrap()
        });

        prop_assert_eq!(bars.len(), total);
        for (i, bar) in bars.iter().enumerate() {
            prop_assert_eq!(bar.timestamp, i as i64 * Granularity::M15.as_millis());
        }
    }

    #[test]
    fn prop_windowed_pagination_is_complete(
        offset in 0usize..200,
        total in 0usize..150,
        limit in 1usize..40,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let unit = Granularity::H1.as_millis();

        let bars = runtime.block_on(async {
            let source = Arc::new(SimulatedSource::new("test", limit).windowed());
            source.generate("BTC/USDT", Granularity::H1, offset as i64 * unit, total);
            fetcher(&source)
                .collect_range("BTC/USDT", Granularity::H1, 0, (offset + total + 50) as i64 * unit)
                .await
                .unwrap()
        });

        prop_assert_eq!(bars.len(), total);
        for (i, bar) in bars.iter().enumerate() {
            prop_assert_eq!(bar.timestamp, (offset + i) as i64 * unit);
        }
    }
}
