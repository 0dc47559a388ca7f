//! 제공처 이름 → 구간 수집기 레지스트리.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use datafeed_core::Venue;
use datafeed_exchange::{
    BinanceSource, CandleSource, OkxSource, RangeFetcher, RetryConfig, TushareSource, YahooSource,
};

use crate::error::CollectorError;
use crate::{CollectorConfig, Result};

/// 제공처별 [`RangeFetcher`] 모음.
#[derive(Debug, Clone, Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<String, RangeFetcher>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정의 재시도/페이지 간격으로 제공처를 등록합니다.
    /// 같은 이름이 이미 있으면 교체합니다.
    pub fn register(
        &mut self,
        source: Arc<dyn CandleSource>,
        retry: RetryConfig,
        page_delay: Duration,
    ) -> &mut Self {
        let venue = source.venue().to_string();
        let fetcher = RangeFetcher::new(source)
            .with_retry(retry)
            .with_page_delay(page_delay);
        self.fetchers.insert(venue, fetcher);
        self
    }

    pub fn get(&self, venue: &str) -> Result<&RangeFetcher> {
        self.fetchers
            .get(venue)
            .ok_or_else(|| CollectorError::UnknownVenue(venue.to_string()))
    }

    /// 등록된 제공처 이름 (정렬).
    pub fn venues(&self) -> Vec<&str> {
        let mut venues: Vec<&str> = self.fetchers.keys().map(String::as_str).collect();
        venues.sort_unstable();
        venues
    }

    /// 설정으로 OKX, Binance, Yahoo, Tushare를 모두 등록합니다.
    pub fn from_config(config: &CollectorConfig) -> Result<Self> {
        let retry = config.retry.clone();
        let page_delay = config.sync.page_delay();
        let mut registry = Self::new();

        for venue in Venue::ALL {
            let source: Arc<dyn CandleSource> = match venue {
                Venue::Okx => Arc::new(OkxSource::new(config.providers.okx.clone())?),
                Venue::Binance => Arc::new(BinanceSource::new(config.providers.binance.clone())?),
                Venue::Yahoo => Arc::new(YahooSource::new()?),
                Venue::Tushare => Arc::new(TushareSource::new(config.providers.tushare.clone())?),
            };
            registry.register(source, retry.clone(), page_delay);
        }

        tracing::debug!(venues = ?registry.venues(), "제공처 등록 완료");
        Ok(registry)
    }
}
