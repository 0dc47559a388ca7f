//! Tushare Pro A주 일봉 커넥터.
//!
//! Tushare는 `POST` JSON 한 엔드포인트에 `api_name`으로 API를 고릅니다.
//! `daily`는 최신순으로 응답하며 심볼 형식은 `000001.SZ`, `600519.SH`입니다.
//!
//! 한 페이지는 `start`부터 `page_limit`일의 달력 구간입니다. 거래일은 달력일보다
//! 적으므로 한 구간이 호출당 최대 행 수를 넘지 않고, 더 긴 구간은 다음 창
//! 시작 시각으로 이어서 요청합니다.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use datafeed_core::{Granularity, MarketBar, ProviderKind};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{json_decimal, HttpConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::source::{CandleSource, MalformedRow, PageRequest, SourcePage};

/// `daily` 호출당 최대 행 수.
pub const TUSHARE_PAGE_LIMIT: usize = 6000;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const FIELDS: &str = "ts_code,trade_date,open,high,low,close,vol";

/// Tushare 커넥터 설정.
#[derive(Debug, Clone)]
pub struct TushareConfig {
    pub base_url: String,
    /// API 토큰 (없으면 모든 요청이 Unauthorized)
    pub token: Option<SecretString>,
    pub http: HttpConfig,
}

impl Default for TushareConfig {
    fn default() -> Self {
        Self {
            base_url: "http://api.tushare.pro".to_string(),
            token: None,
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TushareResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<TushareData>,
}

#[derive(Debug, Deserialize)]
struct TushareData {
    fields: Vec<String>,
    #[serde(default)]
    items: Vec<Vec<Value>>,
}

/// 응답 `fields` 순서에 따른 컬럼 위치.
#[derive(Debug, Clone, Copy)]
struct Columns {
    trade_date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    vol: usize,
}

impl Columns {
    fn resolve(fields: &[String]) -> ProviderResult<Self> {
        let find = |name: &str| {
            fields
                .iter()
                .position(|f| f == name)
                .ok_or_else(|| ProviderError::ParseError(format!("missing field {}", name)))
        };
        Ok(Self {
            trade_date: find("trade_date")?,
            open: find("open")?,
            high: find("high")?,
            low: find("low")?,
            close: find("close")?,
            vol: find("vol")?,
        })
    }
}

/// Tushare 일봉 제공처.
#[derive(Debug, Clone)]
pub struct TushareSource {
    client: reqwest::Client,
    config: TushareConfig,
}

impl TushareSource {
    pub fn new(config: TushareConfig) -> ProviderResult<Self> {
        let client = config.http.build_client()?;
        Ok(Self { client, config })
    }

    /// epoch ms → "YYYYMMDD" (UTC)
    pub fn format_date(timestamp_ms: i64) -> Option<String> {
        Utc.timestamp_millis_opt(timestamp_ms)
            .single()
            .map(|dt| dt.format("%Y%m%d").to_string())
    }

    /// "YYYYMMDD" → 해당 일자 00:00 UTC epoch ms
    pub fn parse_trade_date(value: &str) -> Option<i64> {
        NaiveDate::parse_from_str(value.trim(), "%Y%m%d")
            .ok()?
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
    }

    /// Tushare 에러 코드를 ProviderError로 매핑.
    fn map_error_code(code: i64, msg: &str) -> ProviderError {
        match code {
            // 분당 호출 한도
            40203 => ProviderError::RateLimited {
                retry_after: Some(std::time::Duration::from_secs(60)),
                message: msg.to_string(),
            },
            40001 | 40101 => ProviderError::Unauthorized(msg.to_string()),
            _ => ProviderError::ApiError {
                code,
                message: msg.to_string(),
            },
        }
    }

    fn parse_row(
        &self,
        symbol: &str,
        columns: Columns,
        row: &[Value],
    ) -> Result<MarketBar, MalformedRow> {
        let timestamp = row
            .get(columns.trade_date)
            .and_then(Value::as_str)
            .and_then(Self::parse_trade_date)
            .ok_or_else(|| MalformedRow::new(None, "invalid trade_date"))?;

        let field = |idx: usize, name: &str| {
            row.get(idx)
                .and_then(json_decimal)
                .ok_or_else(|| MalformedRow::new(Some(timestamp), format!("missing {}", name)))
        };

        Ok(MarketBar::new(
            symbol,
            self.venue(),
            Granularity::D1,
            timestamp,
            field(columns.open, "open")?,
            field(columns.high, "high")?,
            field(columns.low, "low")?,
            field(columns.close, "close")?,
            field(columns.vol, "vol")?,
        ))
    }
}

#[async_trait]
impl CandleSource for TushareSource {
    fn venue(&self) -> &str {
        "tushare"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::AShare
    }

    fn page_limit(&self) -> usize {
        TUSHARE_PAGE_LIMIT
    }

    fn supports(&self, granularity: Granularity) -> bool {
        granularity == Granularity::D1
    }

    async fn fetch_page(&self, request: &PageRequest) -> ProviderResult<SourcePage> {
        let token = self
            .config
            .token
            .as_ref()
            .ok_or_else(|| ProviderError::Unauthorized("Tushare token not configured".to_string()))?;

        let limit = request.limit.clamp(1, TUSHARE_PAGE_LIMIT) as i64;
        let window_end = request.end.min(request.start + (limit - 1) * DAY_MS);
        let (start_date, end_date) = match (
            Self::format_date(request.start),
            Self::format_date(window_end),
        ) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(ProviderError::NotSupported(format!(
                    "timestamp out of range: {}..{}",
                    request.start, window_end
                )))
            }
        };

        let body = json!({
            "api_name": "daily",
            "token": token.expose_secret(),
            "params": {
                "ts_code": request.symbol,
                "start_date": start_date,
                "end_date": end_date,
            },
            "fields": FIELDS,
        });

        debug!(symbol = %request.symbol, start_date = %start_date, end_date = %end_date, "Tushare daily 요청");

        let response = self
            .client
            .post(&self.config.base_url)
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after: super::retry_after(&response),
                message: format!("HTTP {}", status),
            });
        }
        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        let parsed: TushareResponse = response.json().await?;
        if parsed.code != 0 {
            return Err(Self::map_error_code(
                parsed.code,
                parsed.msg.as_deref().unwrap_or_default(),
            ));
        }

        let next_start = window_end + DAY_MS;
        let Some(data) = parsed.data else {
            return Ok(SourcePage::default().with_next_start(next_start));
        };
        let columns = Columns::resolve(&data.fields)?;
        let rows = data
            .items
            .iter()
            .map(|row| self.parse_row(&request.symbol, columns, row));
        Ok(SourcePage::from_rows(rows).with_next_start(next_start))
    }
}
