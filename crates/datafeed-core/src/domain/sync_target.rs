//! 동기화 대상과 수집 구간 계산.

use crate::domain::SeriesKey;
use crate::types::Granularity;
use serde::{Deserialize, Serialize};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// 설정에서 결정된 하나의 동기화 대상.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    pub symbol: String,
    pub venue: String,
    pub granularity: Granularity,
    /// 저장된 데이터가 없을 때 과거로 거슬러 올라갈 일수
    pub lookback_days: u32,
}

impl SyncTarget {
    pub fn new(
        symbol: impl Into<String>,
        venue: impl Into<String>,
        granularity: Granularity,
        lookback_days: u32,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            venue: venue.into(),
            granularity,
            lookback_days,
        }
    }

    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(&self.symbol, &self.venue, self.granularity)
    }

    /// 최신 저장 시각과 현재 시각으로 이번 수집 구간을 계산합니다.
    pub fn window(&self, latest_stored: Option<i64>, now_ms: i64) -> Option<FetchWindow> {
        FetchWindow::resolve(latest_stored, self.granularity, self.lookback_days, now_ms)
    }
}

/// 한 번의 동기화에서 요청할 시간 구간 `[start, end]` (epoch ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: i64,
    pub end: i64,
}

impl FetchWindow {
    /// 수집 구간을 결정합니다.
    ///
    /// - 저장된 데이터가 있으면 마지막 바 다음 구간부터 시작
    /// - 없으면 `now - lookback_days`부터 시작
    ///
    /// 시작이 `now` 이상이면 이미 최신 상태이므로 `None`.
    pub fn resolve(
        latest_stored: Option<i64>,
        granularity: Granularity,
        lookback_days: u32,
        now_ms: i64,
    ) -> Option<Self> {
        let start = match latest_stored {
            Some(latest) => latest + granularity.as_millis(),
            None => now_ms - i64::from(lookback_days) * DAY_MS,
        };

        if start >= now_ms {
            return None;
        }

        Some(Self { start, end: now_ms })
    }
}
