//! OHLCV 증분 동기화 Collector.
//!
//! 이 crate는 설정된 대상을 주기적으로 동기화하는 바이너리를 제공합니다:
//! - 암호화폐 (OKX, Binance)
//! - 미국 주식 (Yahoo Finance)
//! - A주 일봉 (Tushare)
//!
//! 저장소의 마지막 바 다음부터 현재까지만 받아 페이지 단위로 저장합니다.

pub mod config;
pub mod error;
pub mod modules;
pub mod stats;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use modules::{
    DataLoader, FetcherRegistry, Scheduler, SyncEngine, SyncRunReport, TargetOutcome,
    TargetReport, TargetState,
};
pub use stats::CollectionStats;
