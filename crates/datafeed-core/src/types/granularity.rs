//! 시계열 타임프레임 정의.
//!
//! 바 하나가 차지하는 고정된 시간 구간을 나타냅니다. 모든 타임스탬프는
//! UTC epoch 밀리초 기준 구간의 시작점(left edge)입니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 캔들 타임프레임.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Granularity {
    /// 1분봉
    #[serde(rename = "1m")]
    M1,
    /// 5분봉
    #[serde(rename = "5m")]
    M5,
    /// 15분봉
    #[serde(rename = "15m")]
    M15,
    /// 30분봉
    #[serde(rename = "30m")]
    M30,
    /// 1시간봉
    #[serde(rename = "1h")]
    H1,
    /// 2시간봉
    #[serde(rename = "2h")]
    H2,
    /// 4시간봉
    #[serde(rename = "4h")]
    H4,
    /// 일봉
    #[serde(rename = "1d")]
    D1,
    /// 주봉
    #[serde(rename = "1w")]
    W1,
}

impl Granularity {
    /// 지원하는 모든 타임프레임 (짧은 것부터).
    pub const ALL: [Granularity; 9] = [
        Granularity::M1,
        Granularity::M5,
        Granularity::M15,
        Granularity::M30,
        Granularity::H1,
        Granularity::H2,
        Granularity::H4,
        Granularity::D1,
        Granularity::W1,
    ];

    /// 이 타임프레임의 기간을 반환합니다.
    pub fn duration(&self) -> Duration {
        match self {
            Granularity::M1 => Duration::from_secs(60),
            Granularity::M5 => Duration::from_secs(5 * 60),
            Granularity::M15 => Duration::from_secs(15 * 60),
            Granularity::M30 => Duration::from_secs(30 * 60),
            Granularity::H1 => Duration::from_secs(60 * 60),
            Granularity::H2 => Duration::from_secs(2 * 60 * 60),
            Granularity::H4 => Duration::from_secs(4 * 60 * 60),
            Granularity::D1 => Duration::from_secs(24 * 60 * 60),
            Granularity::W1 => Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    /// 타임프레임 한 단위를 밀리초로 반환합니다.
    pub fn as_millis(&self) -> i64 {
        self.duration().as_millis() as i64
    }

    /// 표준 문자열 표현 ("1m", "1h", "1d" 등).
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::M1 => "1m",
            Granularity::M5 => "5m",
            Granularity::M15 => "15m",
            Granularity::M30 => "30m",
            Granularity::H1 => "1h",
            Granularity::H2 => "2h",
            Granularity::H4 => "4h",
            Granularity::D1 => "1d",
            Granularity::W1 => "1w",
        }
    }

    /// 하루보다 짧은 분봉/시간봉인지 여부.
    pub fn is_intraday(&self) -> bool {
        self.duration() < Duration::from_secs(24 * 60 * 60)
    }

    /// 타임스탬프를 이 타임프레임 구간의 시작점으로 내림합니다.
    ///
    /// 주봉은 epoch 기준 7일 단위로 정렬됩니다.
    pub fn align(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms - timestamp_ms.rem_euclid(self.as_millis())
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Granularity::ALL
            .iter()
            .copied()
            .find(|g| g.as_str() == s.trim())
            .ok_or_else(|| format!("Invalid granularity: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_millis() {
        assert_eq!(Granularity::M1.as_millis(), 60_000);
        assert_eq!(Granularity::H1.as_millis(), 3_600_000);
        assert_eq!(Granularity::D1.as_millis(), 86_400_000);
        assert_eq!(Granularity::W1.as_millis(), 7 * 86_400_000);
    }

    #[test]
    fn test_granularity_parse_roundtrip() {
        for g in Granularity::ALL {
            assert_eq!(g.as_str().parse::<Granularity>().unwrap(), g);
        }
        assert!("3m".parse::<Granularity>().is_err());
        assert!("1H".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_granularity_intraday() {
        assert!(Granularity::M15.is_intraday());
        assert!(Granularity::H4.is_intraday());
        assert!(!Granularity::D1.is_intraday());
        assert!(!Granularity::W1.is_intraday());
    }

    #[test]
    fn test_granularity_align() {
        let h = Granularity::H1.as_millis();
        assert_eq!(Granularity::H1.align(3 * h + 1234), 3 * h);
        assert_eq!(Granularity::H1.align(3 * h), 3 * h);
    }

    #[test]
    fn test_granularity_serde() {
        let json = serde_json::to_string(&Granularity::H4).unwrap();
        assert_eq!(json, "\"4h\"");
        let parsed: Granularity = serde_json::from_str("\"1d\"").unwrap();
        assert_eq!(parsed, Granularity::D1);
    }
}
