//! 에러 타입 정의.

use datafeed_data::DataError;
use datafeed_exchange::{FetchError, ProviderError};
use thiserror::Error;

/// Collector 에러 타입
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 저장소 에러 (페이지 쓰기 실패 포함)
    #[error("Storage error: {0}")]
    Storage(#[from] DataError),

    /// 데이터 제공처 에러
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 등록되지 않은 제공처
    #[error("Unknown venue: {0}")]
    UnknownVenue(String),

    /// 제공처가 지원하지 않는 타임프레임
    #[error("Unsupported granularity {granularity} for {venue}")]
    UnsupportedGranularity { venue: String, granularity: String },
}

impl From<ProviderError> for CollectorError {
    fn from(err: ProviderError) -> Self {
        Self::Fetch(FetchError::Provider(err))
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
