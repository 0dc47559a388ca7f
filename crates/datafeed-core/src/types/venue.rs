//! 데이터 제공처(거래소/데이터 벤더) 정의.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 제공처가 다루는 시장 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// 암호화폐 거래소
    CryptoExchange,
    /// 미국 주식
    UsEquity,
    /// 중국 A주
    AShare,
}

/// 내장 커넥터가 있는 데이터 제공처.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Okx,
    Binance,
    Yahoo,
    Tushare,
}

impl Venue {
    pub const ALL: [Venue; 4] = [Venue::Okx, Venue::Binance, Venue::Yahoo, Venue::Tushare];

    /// 저장소와 설정에서 쓰는 소문자 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Okx => "okx",
            Venue::Binance => "binance",
            Venue::Yahoo => "yahoo",
            Venue::Tushare => "tushare",
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Venue::Okx | Venue::Binance => ProviderKind::CryptoExchange,
            Venue::Yahoo => ProviderKind::UsEquity,
            Venue::Tushare => ProviderKind::AShare,
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "okx" => Ok(Venue::Okx),
            "binance" => Ok(Venue::Binance),
            "yahoo" | "yfinance" => Ok(Venue::Yahoo),
            "tushare" => Ok(Venue::Tushare),
            _ => Err(format!("Unknown venue: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_parse() {
        assert_eq!("OKX".parse::<Venue>().unwrap(), Venue::Okx);
        assert_eq!("yfinance".parse::<Venue>().unwrap(), Venue::Yahoo);
        assert!("kraken".parse::<Venue>().is_err());
    }

    #[test]
    fn test_venue_kind() {
        assert_eq!(Venue::Binance.kind(), ProviderKind::CryptoExchange);
        assert_eq!(Venue::Yahoo.kind(), ProviderKind::UsEquity);
        assert_eq!(Venue::Tushare.kind(), ProviderKind::AShare);
    }
}
