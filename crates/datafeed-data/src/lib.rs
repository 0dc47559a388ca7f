//! OHLCV 시장 데이터 저장소.
//!
//! - `storage`: SQLite 기반 증분 저장소 (`MarketDataStore`)
//! - `series`: 백테스트/차트 라이브러리용 열 기반 시계열 (`BarSeries`)
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use datafeed_data::{MarketDataStore, BarQuery};
//!
//! let store = MarketDataStore::connect("market_data.db").await?;
//! let written = store.upsert(&bars).await?;
//! let bars = store.query(&BarQuery::new("BTC/USDT", "okx", Granularity::H1)).await?;
//! ```

pub mod error;
pub mod series;
pub mod storage;

pub use error::{DataError, Result};
pub use series::{BarSeries, SeriesSummary};
pub use storage::{BarQuery, MarketDataStore, SeriesFilter, StoreStats};
