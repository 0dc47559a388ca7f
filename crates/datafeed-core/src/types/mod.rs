//! 기본 타입 정의.

mod granularity;
mod venue;

pub use granularity::*;
pub use venue::*;
