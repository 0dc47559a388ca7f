//! 구간 수집 (페이지네이션).
//!
//! 제공처는 한 번에 최대 `page_limit`개만 반환하므로 긴 구간은 여러 번
//! 나누어 요청합니다.
//!
//! 1. `start`부터 최대 `page_limit`개 요청
//! 2. 응답이 비어 있으면 종료
//! 3. `[start, end]` 안의 바를 내보냄
//! 4. 응답이 가득 찼으면 `start = 마지막 바 + 1 단위`로 이동해 반복
//! 5. 가득 차지 않았으면 종료
//! 6. 다음 `start`가 `end`를 넘거나 앞으로 나아가지 못하면 종료
//!
//! 시간 창 단위로 조회하는 제공처(OKX, Tushare)는 응답에 다음 창 시작 시각을
//! 함께 돌려줍니다. 이 경우 빈 창이나 덜 찬 창 뒤에도 `end`까지 계속합니다.
//!
//! 스트림은 지연 평가되므로 소비자가 페이지를 처리하는 동안 다음 요청을
//! 보내지 않습니다. 중간에 에러가 나도 이미 내보낸 페이지는 유효합니다.

use std::sync::Arc;
use std::time::Duration;

use datafeed_core::{Granularity, MarketBar};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::error::{FetchError, FetchResult, ProviderError};
use crate::retry::{with_rate_limit_retry, RetryConfig};
use crate::source::{CandleSource, PageRequest, SourcePage};

/// 구간 수집에서 내보내는 한 페이지.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 이번 요청의 시작 시각
    pub request_start: i64,
    /// `[start, end]` 안의 유효한 바 (오름차순)
    pub bars: Vec<MarketBar>,
    /// 제공처가 반환한 행 수
    pub received: usize,
    /// 버려진 불량 행 수
    pub malformed: usize,
}

/// 제공처 하나에 대한 구간 수집기.
#[derive(Clone)]
pub struct RangeFetcher {
    source: Arc<dyn CandleSource>,
    retry: RetryConfig,
    page_delay: Duration,
}

impl RangeFetcher {
    pub fn new(source: Arc<dyn CandleSource>) -> Self {
        Self {
            source,
            retry: RetryConfig::default(),
            page_delay: Duration::ZERO,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 연속된 페이지 요청 사이의 고정 대기 시간.
    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    pub fn source(&self) -> &Arc<dyn CandleSource> {
        &self.source
    }

    /// `[start, end]` 구간의 바를 페이지 단위로 내보냅니다.
    pub fn fetch_pages(
        &self,
        symbol: &str,
        granularity: Granularity,
        start: i64,
        end: i64,
    ) -> BoxStream<'_, FetchResult<Page>> {
        if !self.source.supports(granularity) {
            let err = FetchError::Provider(ProviderError::NotSupported(format!(
                "{} does not provide {} bars",
                self.source.venue(),
                granularity
            )));
            return stream::once(async move { Err(err) }).boxed();
        }

        let symbol = symbol.to_string();
        let limit = self.source.page_limit().max(1);

        stream::try_unfold(Some(start), move |cursor| {
            let request = cursor.map(|page_start| PageRequest {
                symbol: symbol.clone(),
                granularity,
                start: page_start,
                end,
                limit,
            });
            async move {
                match request {
                    Some(request) => {
                        let paced = request.start != start;
                        self.next_page(request, paced).await
                    }
                    None => Ok(None),
                }
            }
        })
        .boxed()
    }

    /// 한 페이지를 가져오고 다음 페이지 시작 시각을 계산합니다.
    ///
    /// 시간 창 단위 제공처는 데이터가 없는 창(상장 전 구간, 거래 공백)을
    /// 빈 응답으로 돌려주므로, 다음 창이 있으면 건너뛰고 계속 요청합니다.
    async fn next_page(
        &self,
        mut request: PageRequest,
        mut paced: bool,
    ) -> FetchResult<Option<(Page, Option<i64>)>> {
        loop {
            if request.start > request.end {
                return Ok(None);
            }
            if paced && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let page =
                with_rate_limit_retry(&self.retry, || self.source.fetch_page(&request)).await?;
            let next = next_start(&request, &page);

            if page.is_empty() {
                match next {
                    Some(next) => {
                        debug!(start = request.start, next, "빈 구간, 다음 구간으로 이동");
                        request.start = next;
                        paced = true;
                        continue;
                    }
                    None => {
                        debug!(start = request.start, "빈 페이지, 수집 종료");
                        return Ok(None);
                    }
                }
            }

            let bars: Vec<MarketBar> = page
                .bars
                .into_iter()
                .filter(|b| b.timestamp >= request.start && b.timestamp <= request.end)
                .collect();

            debug!(
                start = request.start,
                received = page.received,
                kept = bars.len(),
                malformed = page.malformed,
                next = ?next,
                "페이지 수신"
            );

            let out = Page {
                request_start: request.start,
                bars,
                received: page.received,
                malformed: page.malformed,
            };
            return Ok(Some((out, next)));
        }
    }

    /// `[start, end]` 구간의 바를 오름차순으로 하나씩 내보냅니다.
    pub fn fetch_range(
        &self,
        symbol: &str,
        granularity: Granularity,
        start: i64,
        end: i64,
    ) -> BoxStream<'_, FetchResult<MarketBar>> {
        self.fetch_pages(symbol, granularity, start, end)
            .map_ok(|page| stream::iter(page.bars.into_iter().map(Ok::<_, FetchError>)))
            .try_flatten()
            .boxed()
    }

    /// 구간 전체를 메모리로 모읍니다.
    pub async fn collect_range(
        &self,
        symbol: &str,
        granularity: Granularity,
        start: i64,
        end: i64,
    ) -> FetchResult<Vec<MarketBar>> {
        self.fetch_range(symbol, granularity, start, end)
            .try_collect()
            .await
    }
}

/// 다음 페이지 시작 시각.
///
/// 가득 찬 페이지는 마지막 바 다음 단위부터, 시간 창 단위 제공처는 다음
/// 창부터 이어갑니다. 앞으로 나아가지 못하거나 `end`를 넘으면 `None`.
fn next_start(request: &PageRequest, page: &SourcePage) -> Option<i64> {
    let after_last = page
        .last_timestamp
        .filter(|_| page.received >= request.limit)
        .map(|last| last + request.granularity.as_millis());

    let next = match (after_last, page.next_start) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    next.filter(|&next| next > request.start && next <= request.end)
}

impl std::fmt::Debug for RangeFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeFetcher")
            .field("venue", &self.source.venue())
            .field("retry", &self.retry)
            .field("page_delay", &self.page_delay)
            .finish()
    }
}
