//! OHLCV 바와 시계열 키.

use crate::types::Granularity;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 하나의 OHLCV 관측값.
///
/// (symbol, venue, granularity, timestamp)가 저장소의 고유 키입니다.
/// `timestamp`는 UTC epoch 밀리초 기준 바의 시작 시각입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketBar {
    /// 심볼 (예: "BTC/USDT", "AAPL", "000001.SZ")
    pub symbol: String,
    /// 제공처 (예: "okx")
    pub venue: String,
    /// 타임프레임
    pub granularity: Granularity,
    /// 바 시작 시각 (epoch ms)
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl MarketBar {
    /// 새 바를 생성합니다.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        venue: impl Into<String>,
        granularity: Granularity,
        timestamp: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            venue: venue.into(),
            granularity,
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 이 바가 속한 시계열 키.
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey::new(&self.symbol, &self.venue, self.granularity)
    }
}

/// 하나의 시계열을 식별하는 키: (symbol, venue, granularity).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub venue: String,
    pub granularity: Granularity,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, venue: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            symbol: symbol.into(),
            venue: venue.into(),
            granularity,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.venue, self.symbol, self.granularity)
    }
}
