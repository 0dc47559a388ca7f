//! OKX 캔들 커넥터.
//!
//! `GET /api/v5/market/history-candles`를 사용합니다. 이 엔드포인트는 최신순으로
//! 최대 100개를 반환하므로, `before = start - 1`과 `after = start + limit * 단위`로
//! 창을 지정해 `start`부터 정확히 한 페이지를 받습니다. 창에 데이터가 없어도
//! 다음 창 시작 시각을 함께 반환하므로 상장 전 구간이나 공백을 건너뜁니다.

use async_trait::async_trait;
use datafeed_core::{Granularity, MarketBar, ProviderKind};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{json_decimal, json_i64, retry_after, HttpConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::source::{CandleSource, MalformedRow, PageRequest, SourcePage};

/// OKX history-candles 최대 행 수.
pub const OKX_PAGE_LIMIT: usize = 100;

const HISTORY_CANDLES: &str = "/api/v5/market/history-candles";

/// OKX 커넥터 설정.
#[derive(Debug, Clone)]
pub struct OkxConfig {
    pub base_url: String,
    /// 데모 트레이딩 환경 헤더 사용 여부
    pub sandbox: bool,
    pub http: HttpConfig,
}

impl Default for OkxConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.okx.com".to_string(),
            sandbox: false,
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OkxResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<Value>,
}

/// OKX 캔들 제공처.
#[derive(Debug, Clone)]
pub struct OkxSource {
    client: reqwest::Client,
    config: OkxConfig,
}

impl OkxSource {
    pub fn new(config: OkxConfig) -> ProviderResult<Self> {
        let client = config.http.build_client()?;
        Ok(Self { client, config })
    }

    /// "BTC/USDT" → "BTC-USDT"
    pub fn inst_id(symbol: &str) -> String {
        symbol.replace('/', "-").to_uppercase()
    }

    /// 타임프레임을 OKX `bar` 파라미터로 변환합니다. 일봉 이상은 UTC 기준.
    pub fn bar_param(granularity: Granularity) -> &'static str {
        match granularity {
            Granularity::M1 => "1m",
            Granularity::M5 => "5m",
            Granularity::M15 => "15m",
            Granularity::M30 => "30m",
            Granularity::H1 => "1H",
            Granularity::H2 => "2H",
            Granularity::H4 => "4H",
            Granularity::D1 => "1Dutc",
            Granularity::W1 => "1Wutc",
        }
    }

    /// OKX 에러 코드를 ProviderError로 매핑.
    fn map_error_code(code: &str, msg: &str) -> ProviderError {
        match code {
            "50011" | "50061" => ProviderError::rate_limited(format!("{}: {}", code, msg)),
            "51001" => ProviderError::SymbolNotFound(msg.to_string()),
            "50001" | "50004" => ProviderError::Unavailable(format!("{}: {}", code, msg)),
            "50111" | "50113" => ProviderError::Unauthorized(msg.to_string()),
            _ => ProviderError::ApiError {
                code: code.parse().unwrap_or(-1),
                message: msg.to_string(),
            },
        }
    }

    /// `[ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]` 한 행을 변환합니다.
    fn parse_row(
        &self,
        symbol: &str,
        granularity: Granularity,
        row: &Value,
    ) -> Result<MarketBar, MalformedRow> {
        let fields = row
            .as_array()
            .ok_or_else(|| MalformedRow::new(None, "row is not an array"))?;
        let timestamp = fields.first().and_then(json_i64);
        let timestamp = timestamp.ok_or_else(|| MalformedRow::new(None, "missing timestamp"))?;

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
impl CandleSource for OkxSource {
    fn venue(&self) -> &str {
        "okx"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::CryptoExchange
    }

    fn page_limit(&self) -> usize {
        OKX_PAGE_LIMIT
    }

    async fn fetch_page(&self, request: &PageRequest) -> ProviderResult<SourcePage> {
        let limit = request.limit.clamp(1, OKX_PAGE_LIMIT);
        let after = request.start + request.granularity.as_millis() * limit as i64;
        let params = [
            ("instId", Self::inst_id(&request.symbol)),
            ("bar", Self::bar_param(request.granularity).to_string()),
            ("before", (request.start - 1).to_string()),
            ("after", after.to_string()),
            ("limit", limit.to_string()),
        ];

        let url = format!("{}{}", self.config.base_url, HISTORY_CANDLES);
        debug!(url = %url, symbol = %request.symbol, start = request.start, "OKX 캔들 요청");

        let mut builder = self.client.get(&url).query(&params);
        if self.config.sandbox {
            builder = builder.header("x-simulated-trading", "1");
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after: retry_after(&response),
                message: format!("HTTP {}", status),
            });
        }

        let body = response.text().await?;
        let parsed: OkxResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if status.is_server_error() => {
                return Err(ProviderError::Unavailable(format!("HTTP {}: {}", status, body)))
            }
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(ProviderError::ApiError {
                    code: i64::from(status.as_u16()),
                    message: body,
                })
            }
        };

        if parsed.code != "0" {
            return Err(Self::map_error_code(&parsed.code, &parsed.msg));
        }

        let rows = parsed
            .data
            .iter()
            .map(|row| self.parse_row(&request.symbol, request.granularity, row));
        // `after`는 창 끝 다음 시각 (배타적)
        Ok(SourcePage::from_rows(rows).with_next_start(after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inst_id() {
        assert_eq!(OkxSource::inst_id("btc/usdt"), "BTC-USDT");
        assert_eq!(OkxSource::inst_id("ETH-USDT"), "ETH-USDT");
    }

    #[test]
    fn test_bar_param() {
        assert_eq!(OkxSource::bar_param(Granularity::H4), "4H");
        assert_eq!(OkxSource::bar_param(Granularity::D1), "1Dutc");
    }

    #[test]
    fn test_map_error_code() {
        assert!(OkxSource::map_error_code("50011", "Too Many Requests").is_rate_limited());
        assert!(matches!(
            OkxSource::map_error_code("51001", "Instrument ID does not exist"),
            ProviderError::SymbolNotFound(_)
        ));
        assert!(matches!(
            OkxSource::map_error_code("51000", "Parameter error"),
            ProviderError::ApiError { code: 51000, .. }
        ));
    }
}
