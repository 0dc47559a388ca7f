//! 시장 데이터 피드의 핵심 도메인 타입.
//!
//! 이 crate는 다른 모든 crate가 공유하는 기본 타입을 제공합니다:
//! - OHLCV 바 (`MarketBar`)와 시계열 키 (`SeriesKey`)
//! - 타임프레임 (`Granularity`)과 데이터 제공처 (`Venue`)
//! - 동기화 대상 (`SyncTarget`)과 수집 구간 (`FetchWindow`)
//! - 로깅 초기화

pub mod domain;
pub mod logging;
pub mod types;

pub use domain::*;
pub use types::*;
