//! OHLCV 데이터 제공처 커넥터와 페이지네이션.
//!
//! 지원 제공처:
//! - **OKX**, **Binance**: 암호화폐 현물 캔들
//! - **Yahoo Finance**: 미국 주식
//! - **Tushare Pro**: 중국 A주 일봉
//!
//! 모든 커넥터는 [`CandleSource`]를 구현하며, [`RangeFetcher`]가 페이지 단위
//! 호출을 구간 전체의 오름차순 스트림으로 이어 붙입니다.

pub mod connector;
pub mod error;
pub mod pagination;
pub mod retry;
pub mod simulated;
pub mod source;

pub use connector::{
    BinanceConfig, BinanceSource, HttpConfig, OkxConfig, OkxSource, TushareConfig, TushareSource,
    YahooSource,
};
pub use error::{FetchError, FetchResult, ProviderError, ProviderResult};
pub use pagination::{Page, RangeFetcher};
pub use retry::{with_rate_limit_retry, RetryConfig};
pub use simulated::SimulatedSource;
pub use source::{CandleSource, MalformedRow, PageRequest, SourcePage};
