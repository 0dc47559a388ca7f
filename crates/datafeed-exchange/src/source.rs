//! 데이터 제공처 공통 trait.
//!
//! 모든 커넥터는 `CandleSource`를 구현하여 한 번의 API 호출로 한 페이지를
//! 반환합니다. 여러 페이지에 걸친 구간 수집은 `pagination` 모듈이 담당합니다.

use async_trait::async_trait;
use datafeed_core::{Granularity, MarketBar, ProviderKind};
use tracing::debug;

use crate::error::ProviderResult;

/// 한 페이지 요청.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub symbol: String,
    pub granularity: Granularity,
    /// 페이지 시작 시각 (포함, epoch ms)
    pub start: i64,
    /// 전체 구간 끝 (포함, epoch ms)
    pub end: i64,
    /// 최대 행 수
    pub limit: usize,
}

/// 제공처 응답에서 버려진 행.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRow {
    /// 파싱 가능했던 경우의 타임스탬프
    pub timestamp: Option<i64>,
    pub reason: String,
}

impl MalformedRow {
    pub fn new(timestamp: Option<i64>, reason: impl Into<String>) -> Self {
        Self {
            timestamp,
            reason: reason.into(),
        }
    }
}

/// 한 번의 API 호출 결과.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePage {
    /// 유효한 바 (timestamp 오름차순, 중복 없음)
    pub bars: Vec<MarketBar>,
    /// 제공처가 반환한 행 수 (불량 행 포함)
    pub received: usize,
    /// 버려진 불량 행 수
    pub malformed: usize,
    /// 응답에서 확인된 가장 늦은 타임스탬프 (불량 행 포함)
    pub last_timestamp: Option<i64>,
    /// 시간 창 단위로 조회하는 제공처의 다음 창 시작 시각.
    ///
    /// 설정되어 있으면 이번 페이지가 비었거나 가득 차지 않아도 이 시각부터
    /// 수집을 이어갑니다.
    pub next_start: Option<i64>,
}

impl SourcePage {
    /// 행 단위 파싱 결과를 모아 페이지를 만듭니다.
    ///
    /// 불량 행은 버리고 개수만 셉니다. 페이지 크기 판단에는 불량 행도
    /// 포함되므로, 불량 행 때문에 페이지네이션이 일찍 끝나지 않습니다.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Result<MarketBar, MalformedRow>>,
    {
        let mut page = SourcePage::default();

        for row in rows {
            page.received += 1;
            let timestamp = match row {
                Ok(bar) => {
                    let ts = bar.timestamp;
                    page.bars.push(bar);
                    Some(ts)
                }
                Err(malformed) => {
                    page.malformed += 1;
                    debug!(
                        timestamp = ?malformed.timestamp,
                        reason = %malformed.reason,
                        "불량 행 제외"
                    );
                    malformed.timestamp
                }
            };
            if let Some(ts) = timestamp {
                page.last_timestamp = Some(page.last_timestamp.map_or(ts, |last| last.max(ts)));
            }
        }

        // 같은 타임스탬프가 여러 번 오면 응답에서 나중 행을 사용
        page.bars.reverse();
        page.bars.sort_by_key(|b| b.timestamp);
        page.bars.dedup_by_key(|b| b.timestamp);
        page
    }

    /// 다음 창 시작 시각을 지정합니다.
    pub fn with_next_start(mut self, next_start: i64) -> Self {
        self.next_start = Some(next_start);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.received == 0
    }
}

/// OHLCV 데이터 제공처.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// 저장소에 기록되는 제공처 이름 (예: "okx").
    fn venue(&self) -> &str;

    /// 시장 분류.
    fn kind(&self) -> ProviderKind;

    /// 한 번의 호출로 받을 수 있는 최대 행 수.
    fn page_limit(&self) -> usize;

    /// 지원하는 타임프레임인지 여부.
    fn supports(&self, _granularity: Granularity) -> bool {
        true
    }

    /// `request.start`부터 최대 `request.limit`개의 바를 한 번의 호출로 가져옵니다.
    async fn fetch_page(&self, request: &PageRequest) -> ProviderResult<SourcePage>;
}
