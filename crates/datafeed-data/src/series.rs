//! 소비자용 열 기반 시계열.
//!
//! 백테스트/차트 라이브러리가 그대로 읽을 수 있도록 timestamp 오름차순의
//! 열(column) 배열로 바를 보관합니다.

use crate::error::{DataError, Result};
use chrono::{TimeZone, Utc};
use datafeed_core::{MarketBar, SeriesKey};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// 하나의 시계열 (timestamp 오름차순).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarSeries {
    pub key: SeriesKey,
    pub timestamp: Vec<i64>,
    pub open: Vec<Decimal>,
    pub high: Vec<Decimal>,
    pub low: Vec<Decimal>,
    pub close: Vec<Decimal>,
    pub volume: Vec<Decimal>,
}

/// 시계열 요약.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub records: usize,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
    pub close_min: Decimal,
    pub close_max: Decimal,
    pub close_first: Decimal,
    pub close_last: Decimal,
    pub volume_min: Decimal,
    pub volume_max: Decimal,
    pub volume_avg: Decimal,
}

impl BarSeries {
    /// 빈 시계열.
    pub fn empty(key: SeriesKey) -> Self {
        Self {
            key,
            timestamp: Vec::new(),
            open: Vec::new(),
            high: Vec::new(),
            low: Vec::new(),
            close: Vec::new(),
            volume: Vec::new(),
        }
    }

    /// 바 목록으로 시계열을 만듭니다.
    ///
    /// 입력 순서와 무관하게 timestamp 오름차순으로 정렬하며, 모든 바가
    /// `key`와 같은 시계열이어야 합니다.
    pub fn from_bars(key: SeriesKey, bars: impl IntoIterator<Item = MarketBar>) -> Result<Self> {
        let mut bars: Vec<MarketBar> = bars.into_iter().collect();
        if let Some(foreign) = bars.iter().find(|b| b.series_key() != key) {
            return Err(DataError::InvalidData(format!(
                "bar of {} in series {}",
                foreign.series_key(),
                key
            )));
        }
        bars.sort_by_key(|b| b.timestamp);

        let mut series = Self::empty(key);
        for bar in bars {
            series.timestamp.push(bar.timestamp);
            series.open.push(bar.open);
            series.high.push(bar.high);
            series.low.push(bar.low);
            series.close.push(bar.close);
            series.volume.push(bar.volume);
        }
        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.timestamp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_empty()
    }

    /// 요약 통계. 빈 시계열이면 None.
    pub fn summary(&self) -> Option<SeriesSummary> {
        let first_timestamp = *self.timestamp.first()?;
        let last_timestamp = *self.timestamp.last()?;
        let close_first = *self.close.first()?;
        let close_last = *self.close.last()?;
        let close_min = self.close.iter().copied().min()?;
        let close_max = self.close.iter().copied().max()?;
        let volume_min = self.volume.iter().copied().min()?;
        let volume_max = self.volume.iter().copied().max()?;
        let volume_sum: Decimal = self.volume.iter().copied().sum();

        Some(SeriesSummary {
            records: self.len(),
            first_timestamp,
            last_timestamp,
            close_min,
            close_max,
            close_first,
            close_last,
            volume_min,
            volume_max,
            volume_avg: volume_sum / Decimal::from(self.len()),
        })
    }

    /// CSV로 씁니다.
    ///
    /// 컬럼: `timestamp,datetime,open,high,low,close,volume` (datetime은 UTC RFC 3339)
    pub fn write_csv<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "timestamp,datetime,open,high,low,close,volume")?;

        for i in 0..self.len() {
            let datetime = Utc
                .timestamp_millis_opt(self.timestamp[i])
                .single()
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default();

            writeln!(
                writer,
                "{},{},{},{},{},{},{}",
                self.timestamp[i],
                datetime,
                self.open[i],
                self.high[i],
                self.low[i],
                self.close[i],
                self.volume[i]
            )?;
        }

        writer.flush()?;
        Ok(())
    }
}
