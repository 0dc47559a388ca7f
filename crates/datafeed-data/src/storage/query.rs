//! 조회/삭제 조건.

use datafeed_core::{Granularity, SeriesKey};
use sqlx::{QueryBuilder, Sqlite};

/// 시계열 선택 조건. 모든 필드가 `None`이면 전체를 의미합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesFilter {
    pub symbol: Option<String>,
    pub venue: Option<String>,
    pub granularity: Option<Granularity>,
}

impl SeriesFilter {
    /// 전체 선택.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = Some(granularity);
        self
    }

    pub fn is_all(&self) -> bool {
        self.symbol.is_none() && self.venue.is_none() && self.granularity.is_none()
    }

    /// `WHERE 1=1` 뒤에 조건을 덧붙입니다.
    pub(crate) fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(symbol) = &self.symbol {
            qb.push(" AND symbol = ").push_bind(symbol.clone());
        }
        if let Some(venue) = &self.venue {
            qb.push(" AND venue = ").push_bind(venue.clone());
        }
        if let Some(granularity) = self.granularity {
            qb.push(" AND granularity = ").push_bind(granularity.as_str());
        }
    }
}

impl From<&SeriesKey> for SeriesFilter {
    fn from(key: &SeriesKey) -> Self {
        Self {
            symbol: Some(key.symbol.clone()),
            venue: Some(key.venue.clone()),
            granularity: Some(key.granularity),
        }
    }
}

/// 한 시계열의 구간 조회.
///
/// `start`/`end`는 포함 경계이며 생략 가능합니다. `limit`이 있으면
/// 오래된 것부터 최대 `limit`개를 반환합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarQuery {
    pub key: SeriesKey,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub limit: Option<usize>,
}

impl BarQuery {
    pub fn new(symbol: impl Into<String>, venue: impl Into<String>, granularity: Granularity) -> Self {
        Self::for_key(SeriesKey::new(symbol, venue, granularity))
    }

    pub fn for_key(key: SeriesKey) -> Self {
        Self {
            key,
            start: None,
            end: None,
            limit: None,
        }
    }

    pub fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    pub fn range(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        SeriesFilter::from(&self.key).push_conditions(qb);
        if let Some(start) = self.start {
            qb.push(" AND timestamp >= ").push_bind(start);
        }
        if let Some(end) = self.end {
            qb.push(" AND timestamp <= ").push_bind(end);
        }
    }
}
