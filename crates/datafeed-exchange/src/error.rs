//! 데이터 제공처 에러 타입.

use std::time::Duration;
use thiserror::Error;

/// 단일 제공처 호출의 에러.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 요청 한도 초과. 제공처가 대기 시간을 알려주면 `retry_after`에 담김
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// 네트워크/연결 에러
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// 인증/권한 에러
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// API 에러 코드
    #[error("API error {code}: {message}")]
    ApiError { code: i64, message: String },

    /// 응답 파싱 에러
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 심볼을 찾을 수 없음
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 지원되지 않는 요청 (예: 타임프레임)
    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl ProviderError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        ProviderError::RateLimited {
            retry_after: None,
            message: message.into(),
        }
    }

    /// 요청 한도 초과 에러인지 확인.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    /// 제공처가 지정한 재시도 대기 시간.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::ParseError(err.to_string())
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::ParseError(err.to_string())
    }
}

/// 구간 수집(여러 페이지)의 에러.
#[derive(Debug, Error)]
pub enum FetchError {
    /// 재시도 한도까지 요청 한도 초과가 계속됨
    #[error("Rate limit retries exhausted after {attempts} attempts: {source}")]
    RateLimitExhausted {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// 재시도하지 않는 제공처 에러
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl FetchError {
    /// 원인이 된 제공처 에러.
    pub fn provider_error(&self) -> &ProviderError {
        match self {
            FetchError::RateLimitExhausted { source, .. } => source,
            FetchError::Provider(e) => e,
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
pub type FetchResult<T> = std::result::Result<T, FetchError>;
