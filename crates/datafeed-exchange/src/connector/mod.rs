//! 제공처별 커넥터.
//!
//! - `okx`: OKX 현물 캔들 (REST)
//! - `binance`: Binance 현물 klines (REST)
//! - `yahoo`: Yahoo Finance 미국 주식
//! - `tushare`: Tushare Pro A주 일봉

pub mod binance;
pub mod okx;
pub mod tushare;
pub mod yahoo;

use std::str::FromStr;
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::{ProviderError, ProviderResult};

pub use binance::{BinanceConfig, BinanceSource};
pub use okx::{OkxConfig, OkxSource};
pub use tushare::{TushareConfig, TushareSource};
pub use yahoo::YahooSource;

/// HTTP 클라이언트 공통 설정.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// 요청 타임아웃
    pub timeout: Duration,
    /// HTTP/HTTPS 프록시 (예: "http://127.0.0.1:7890")
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            proxy: None,
        }
    }
}

impl HttpConfig {
    /// 설정으로 reqwest 클라이언트를 생성합니다.
    pub fn build_client(&self) -> ProviderResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("datafeed/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ProviderError::Unavailable(format!("invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("HTTP client build failed: {}", e)))
    }
}

/// 429 등의 응답에서 `Retry-After`(초) 헤더를 읽습니다.
pub(crate) fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// 문자열 또는 숫자 JSON 값을 Decimal로 변환합니다.
pub(crate) fn json_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .ok(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Decimal::from(i)),
            None => n.as_f64().and_then(Decimal::from_f64),
        },
        _ => None,
    }
}

/// 문자열 또는 숫자 JSON 값을 i64로 변환합니다.
pub(crate) fn json_i64(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}
