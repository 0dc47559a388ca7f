//! Yahoo Finance 미국 주식 커넥터.
//!
//! # 지원 간격
//!
//! - **분봉**: 1m (최근 7일), 5m/15m/30m (최근 60일)
//! - **시간봉**: 1h (최근 730일)
//! - **일봉 이상**: 1d, 1wk
//!
//! Yahoo는 페이지네이션이 없어 한 번의 호출로 구간 전체를 받고, 페이지
//! 한도만큼 잘라서 반환합니다. 분봉/시간봉은 조회 가능 기간으로 시작 시각을
//! 당깁니다.

use async_trait::async_trait;
use chrono::Utc;
use datafeed_core::{Granularity, MarketBar, ProviderKind};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{debug, warn};
use yahoo_finance_api as yahoo;

use crate::error::{ProviderError, ProviderResult};
use crate::source::{CandleSource, MalformedRow, PageRequest, SourcePage};

/// 한 번의 응답에서 사용하는 최대 행 수.
pub const YAHOO_PAGE_LIMIT: usize = 10_000;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Yahoo Finance 제공처.
pub struct YahooSource {
    connector: yahoo::YahooConnector,
}

impl YahooSource {
    pub fn new() -> ProviderResult<Self> {
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| ProviderError::Unavailable(format!("Yahoo Finance 연결 실패: {}", e)))?;
        Ok(Self { connector })
    }

    /// 타임프레임을 Yahoo 간격 문자열로 변환. 2h/4h는 제공되지 않음.
    pub fn interval(granularity: Granularity) -> Option<&'static str> {
        match granularity {
            Granularity::M1 => Some("1m"),
            Granularity::M5 => Some("5m"),
            Granularity::M15 => Some("15m"),
            Granularity::M30 => Some("30m"),
            Granularity::H1 => Some("1h"),
            Granularity::D1 => Some("1d"),
            Granularity::W1 => Some("1wk"),
            Granularity::H2 | Granularity::H4 => None,
        }
    }

    /// 분봉/시간봉의 조회 가능 기간 (일).
    pub fn max_lookback_days(granularity: Granularity) -> Option<i64> {
        match granularity {
            Granularity::M1 => Some(7),
            Granularity::M5 | Granularity::M15 | Granularity::M30 => Some(60),
            Granularity::H1 => Some(730),
            _ => None,
        }
    }

    /// 조회 가능 기간보다 오래된 시작 시각을 당깁니다.
    pub fn clamp_start(granularity: Granularity, start: i64, now_ms: i64) -> i64 {
        match Self::max_lookback_days(granularity) {
            // 경계에서 거부되지 않도록 하루 여유
            Some(days) => start.max(now_ms - (days - 1) * DAY_MS),
            None => start,
        }
    }

    /// 시세 한 건을 바로 변환합니다.
    #[allow(clippy::too_many_arguments)]
    fn quote_to_bar(
        &self,
        symbol: &str,
        granularity: Granularity,
        timestamp_secs: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Result<MarketBar, MalformedRow> {
        let mut timestamp = timestamp_secs * 1000;
        // 일봉/주봉은 장 시작 시각으로 오므로 해당 날짜 UTC 자정으로 맞춤
        if !granularity.is_intraday() {
            timestamp = Granularity::D1.align(timestamp);
        }

        let price = |value: f64, name: &str| {
            Decimal::from_f64(value)
                .filter(|_| value.is_finite() && value > 0.0)
                .map(|d| d.round_dp(6).normalize())
                .ok_or_else(|| MalformedRow::new(Some(timestamp), format!("invalid {} {}", name, value)))
        };

        Ok(MarketBar::new(
            symbol,
            self.venue(),
            granularity,
            timestamp,
            price(open, "open")?,
            price(high, "high")?,
            price(low, "low")?,
            price(close, "close")?,
            Decimal::from(volume),
        ))
    }

    fn to_offset_datetime(timestamp_ms: i64) -> ProviderResult<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(timestamp_ms.div_euclid(1000))
            .map_err(|e| ProviderError::NotSupported(format!("timestamp {}: {}", timestamp_ms, e)))
    }

    /// yahoo_finance_api 에러를 분류합니다.
    ///
    /// 빈 결과는 에러가 아니라 빈 페이지로 취급합니다 (`None` 반환).
    fn classify_error(message: &str) -> Option<ProviderError> {
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("too many requests") {
            Some(ProviderError::rate_limited(message))
        } else if lower.contains("no data")
            || lower.contains("no quotes")
            || lower.contains("no result")
            || lower.contains("empty")
        {
            None
        } else {
            Some(ProviderError::Unavailable(message.to_string()))
        }
    }
}

impl std::fmt::Debug for YahooSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl CandleSource for YahooSource {
    fn venue(&self) -> &str {
        "yahoo"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::UsEquity
    }

    fn page_limit(&self) -> usize {
        YAHOO_PAGE_LIMIT
    }

    fn supports(&self, granularity: Granularity) -> bool {
        Self::interval(granularity).is_some()
    }

    async fn fetch_page(&self, request: &PageRequest) -> ProviderResult<SourcePage> {
        let interval = Self::interval(request.granularity).ok_or_else(|| {
            ProviderError::NotSupported(format!("yahoo interval {}", request.granularity))
        })?;

        let start = Self::clamp_start(
            request.granularity,
            request.start,
            Utc::now().timestamp_millis(),
        );
        if start > request.end {
            return Ok(SourcePage::default());
        }
        if start != request.start {
            warn!(
                symbol = %request.symbol,
                granularity = %request.granularity,
                requested = request.start,
                clamped = start,
                "Yahoo 조회 가능 기간으로 시작 시각 조정"
            );
        }

        debug!(symbol = %request.symbol, interval, start, end = request.end, "Yahoo 시세 요청");

        let response = match self
            .connector
            .get_quote_history_interval(
                &request.symbol,
                Self::to_offset_datetime(start)?,
                Self::to_offset_datetime(request.end)?,
                interval,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return match Self::classify_error(&e.to_string()) {
                    Some(err) => Err(err),
                    None => Ok(SourcePage::default()),
                }
            }
        };

        let mut quotes = match response.quotes() {
            Ok(quotes) => quotes,
            Err(e) => {
                return match Self::classify_error(&e.to_string()) {
                    Some(_) => Err(ProviderError::ParseError(format!("Quote 파싱 오류: {}", e))),
                    None => Ok(SourcePage::default()),
                }
            }
        };
        quotes.sort_by_key(|q| q.timestamp);

        let limit = request.limit.clamp(1, YAHOO_PAGE_LIMIT);
        let rows = quotes.iter().take(limit).map(|q| {
            self.quote_to_bar(
                &request.symbol,
                request.granularity,
                q.timestamp as i64,
                q.open,
                q.high,
                q.low,
                q.close,
                q.volume,
            )
        });
        Ok(SourcePage::from_rows(rows))
    }
}
