//! Binance 현물 klines 커넥터.
//!
//! `GET /api/v3/klines`는 `startTime` 이후 오래된 순으로 최대 1000개를 반환합니다.

use async_trait::async_trait;
use datafeed_core::{Granularity, MarketBar, ProviderKind};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{json_decimal, json_i64, retry_after, HttpConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::source::{CandleSource, MalformedRow, PageRequest, SourcePage};

/// Binance klines 최대 행 수.
pub const BINANCE_PAGE_LIMIT: usize = 1000;

const KLINES: &str = "/api/v3/klines";

/// Binance 커넥터 설정.
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub base_url: String,
    pub http: HttpConfig,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            http: HttpConfig::default(),
        }
    }
}

/// Binance 에러 응답.
#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i64,
    msg: String,
}

/// Binance klines 제공처.
#[derive(Debug, Clone)]
pub struct BinanceSource {
    client: reqwest::Client,
    config: BinanceConfig,
}

impl BinanceSource {
    pub fn new(config: BinanceConfig) -> ProviderResult<Self> {
        let client = config.http.build_client()?;
        Ok(Self { client, config })
    }

    /// "BTC/USDT" → "BTCUSDT"
    pub fn market_symbol(symbol: &str) -> String {
        symbol.replace(['/', '-'], "").to_uppercase()
    }

    /// Binance 에러 코드를 ProviderError로 매핑.
    fn map_error_code(code: i64, msg: &str) -> ProviderError {
        match code {
            -1003 => ProviderError::rate_limited(msg),
            -1121 => ProviderError::SymbolNotFound(msg.to_string()),
            -1001 => ProviderError::Unavailable(msg.to_string()),
            -1002 | -2014 | -2015 => ProviderError::Unauthorized(msg.to_string()),
            _ => ProviderError::ApiError {
                code,
                message: msg.to_string(),
            },
        }
    }

    /// `[openTime, o, h, l, c, v, closeTime, ...]` 한 행을 변환합니다.
    fn parse_row(
        &self,
        symbol: &str,
        granularity: Granularity,
        row: &Value,
    ) -> Result<MarketBar, MalformedRow> {
        let fields = row
            .as_array()
            .ok_or_else(|| MalformedRow::new(None, "row is not an array"))?;
        let timestamp = fields
            .first()
            .and_then(json_i64)
            .ok_or_else(|| MalformedRow::new(None, "missing open time"))?;

        let field = |idx: usize, name: &str| {
            fields
                .get(idx)
                .and_then(json_decimal)
                .ok_or_else(|| MalformedRow::new(Some(timestamp), format!("missing {}", name)))
        };

        Ok(MarketBar::new(
            symbol,
            self.venue(),
            granularity,
            timestamp,
            field(1, "open")?,
            field(2, "high")?,
            field(3, "low")?,
            field(4, "close")?,
            field(5, "volume")?,
        ))
    }
}

#[async_trait]
impl CandleSource for BinanceSource {
    fn venue(&self) -> &str {
        "binance"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::CryptoExchange
    }

    fn page_limit(&self) -> usize {
        BINANCE_PAGE_LIMIT
    }

    async fn fetch_page(&self, request: &PageRequest) -> ProviderResult<SourcePage> {
        let limit = request.limit.clamp(1, BINANCE_PAGE_LIMIT);
        let params = [
            ("symbol", Self::market_symbol(&request.symbol)),
            ("interval", request.granularity.as_str().to_string()),
            ("startTime", request.start.to_string()),
            ("endTime", request.end.to_string()),
            ("limit", limit.to_string()),
        ];

        let url = format!("{}{}", self.config.base_url, KLINES);
        debug!(url = %url, symbol = %request.symbol, start = request.start, "Binance klines 요청");

        let response = self.client.get(&url).query(&params).send().await?;
        let status = response.status();

        // 418: 요청 한도 위반으로 IP 차단
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
            return Err(ProviderError::RateLimited {
                retry_after: retry_after(&response),
                message: format!("HTTP {}", status),
            });
        }

        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<BinanceError>(&body) {
                return Err(Self::map_error_code(error.code, &error.msg));
            }
            if status.is_server_error() {
                return Err(ProviderError::Unavailable(format!("HTTP {}: {}", status, body)));
            }
            return Err(ProviderError::ApiError {
                code: i64::from(status.as_u16()),
                message: body,
            });
        }

        let rows: Vec<Value> = serde_json::from_str(&body)?;
        let rows = rows
            .iter()
            .map(|row| self.parse_row(&request.symbol, request.granularity, row));
        Ok(SourcePage::from_rows(rows))
    }
}
