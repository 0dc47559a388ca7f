//! 도메인 모델.

mod market_bar;
mod sync_target;

pub use market_bar::*;
pub use sync_target::*;
