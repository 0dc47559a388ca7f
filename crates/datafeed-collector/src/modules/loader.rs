//! 백테스트용 데이터 로더.
//!
//! 저장소에서 시계열을 읽고, 저장소에 해당 구간 데이터가 하나도 없으면
//! 제공처에서 받아 저장한 뒤 다시 읽습니다.

use chrono::Utc;
use datafeed_core::{Granularity, MarketBar, SeriesKey};
use datafeed_data::BarSeries;
use tracing::{info, warn};

use super::sync::{SyncEngine, TargetOutcome};
use crate::error::CollectorError;
use crate::Result;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// 미리 정의된 로드 설정.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub symbol: &'static str,
    pub venue: &'static str,
    pub granularity: Granularity,
    pub days: u32,
}

/// 사용 가능한 프리셋.
pub const PRESETS: &[Preset] = &[
    Preset { name: "btc_1h_7d", symbol: "BTC/USDT", venue: "okx", granularity: Granularity::H1, days: 7 },
    Preset { name: "btc_4h_30d", symbol: "BTC/USDT", venue: "okx", granularity: Granularity::H4, days: 30 },
    Preset { name: "btc_1d_90d", symbol: "BTC/USDT", venue: "okx", granularity: Granularity::D1, days: 90 },
    Preset { name: "eth_1h_7d", symbol: "ETH/USDT", venue: "okx", granularity: Granularity::H1, days: 7 },
    Preset { name: "eth_4h_30d", symbol: "ETH/USDT", venue: "okx", granularity: Granularity::H4, days: 30 },
    // 1년 = 252 거래일
    Preset { name: "aapl_1d_1y", symbol: "AAPL", venue: "yahoo", granularity: Granularity::D1, days: 252 },
    Preset { name: "msft_1d_1y", symbol: "MSFT", venue: "yahoo", granularity: Granularity::D1, days: 252 },
];

impl Preset {
    pub fn find(name: &str) -> Option<&'static Preset> {
        PRESETS.iter().find(|p| p.name == name)
    }

    pub fn request(&self, now_ms: i64) -> LoadRequest {
        LoadRequest::lookback(self.symbol, self.venue, self.granularity, self.days, now_ms)
    }
}

/// 로드할 시계열과 구간 `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub key: SeriesKey,
    pub start: i64,
    pub end: i64,
}

impl LoadRequest {
    pub fn new(
        symbol: impl Into<String>,
        venue: impl Into<String>,
        granularity: Granularity,
        start: i64,
        end: i64,
    ) -> Self {
        Self {
            key: SeriesKey::new(symbol, venue, granularity),
            start,
            end,
        }
    }

    /// `now_ms`로부터 최근 `days`일.
    pub fn lookback(
        symbol: impl Into<String>,
        venue: impl Into<String>,
        granularity: Granularity,
        days: u32,
        now_ms: i64,
    ) -> Self {
        Self::new(
            symbol,
            venue,
            granularity,
            now_ms - i64::from(days) * DAY_MS,
            now_ms,
        )
    }
}

/// 저장소 우선 데이터 로더.
#[derive(Debug, Clone, Copy)]
pub struct DataLoader<'a> {
    engine: &'a SyncEngine,
}

impl<'a> DataLoader<'a> {
    pub fn new(engine: &'a SyncEngine) -> Self {
        Self { engine }
    }

    /// 시계열을 로드합니다. 저장소가 비어 있으면 제공처에서 받아옵니다.
    ///
    /// 받아오기에 실패하면 경고만 남기고 저장소에 있는 만큼 반환합니다.
    pub async fn load(&self, request: &LoadRequest) -> Result<BarSeries> {
        let key = &request.key;
        let mut bars = self.query(request).await?;

        if bars.is_empty() {
            info!(series = %key, "저장된 데이터 없음, 제공처에서 수집");
            let report = self
                .engine
                .sync_range(&key.symbol, &key.venue, key.granularity, request.start, request.end)
                .await;
            if let TargetOutcome::Failed { error, .. } = &report.outcome {
                warn!(series = %key, error = %error, "데이터 수집 실패");
            }
            bars = self.query(request).await?;
        }

        let series = BarSeries::from_bars(key.clone(), bars)?;
        if let Some(summary) = series.summary() {
            info!(
                series = %key,
                records = summary.records,
                close_min = %summary.close_min,
                close_max = %summary.close_max,
                "로드 완료"
            );
        }
        Ok(series)
    }

    /// 프리셋 이름으로 현재 시각 기준 로드.
    pub async fn quick_load(&self, preset: &str) -> Result<BarSeries> {
        self.quick_load_at(preset, Utc::now().timestamp_millis()).await
    }

    pub async fn quick_load_at(&self, preset: &str, now_ms: i64) -> Result<BarSeries> {
        let preset = Preset::find(preset).ok_or_else(|| {
            let names: Vec<&str> = PRESETS.iter().map(|p| p.name).collect();
            CollectorError::Config(format!(
                "unknown preset {}, available: {}",
                preset,
                names.join(", ")
            ))
        })?;
        self.load(&preset.request(now_ms)).await
    }

    async fn query(&self, request: &LoadRequest) -> Result<Vec<MarketBar>> {
        let key = &request.key;
        let bars = self
            .engine
            .store()
            .query_range(
                &key.symbol,
                &key.venue,
                key.granularity,
                Some(request.start),
                Some(request.end),
            )
            .await?;
        Ok(bars)
    }
}
