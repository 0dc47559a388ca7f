//! 영구 저장소.

mod market_data;
mod query;

pub use market_data::{MarketDataStore, StoreStats};
pub use query::{BarQuery, SeriesFilter};
