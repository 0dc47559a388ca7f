//! 메모리 기반 시뮬레이션 제공처.
//!
//! 네트워크 없이 페이지네이션, 재시도, 동기화를 검증할 때 사용합니다.
//! 페이지 크기, 요청 한도 초과/장애 시나리오를 설정할 수 있고 받은 요청을
//! 모두 기록합니다.
//!
//! 기본 모드는 `start`부터 다음 N개의 바를 반환합니다. 시간 창 모드에서는
//! OKX처럼 `start`부터 `page_limit` 단위 길이의 창 안에 있는 바만 반환합니다.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use datafeed_core::{Granularity, MarketBar, ProviderKind};
use rust_decimal::Decimal;

use crate::error::{ProviderError, ProviderResult};
use crate::source::{CandleSource, MalformedRow, PageRequest, SourcePage};

type SeriesData = BTreeMap<i64, MarketBar>;

#[derive(Debug, Default)]
struct Script {
    /// 앞으로 요청 한도 초과를 반환할 호출 수
    rate_limited: u32,
    /// 항상 장애를 반환할 심볼
    unavailable: HashSet<String>,
    /// 이 횟수만큼 성공한 뒤부터 장애 반환
    fail_after_calls: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    series: HashMap<(String, Granularity), SeriesData>,
    malformed: HashSet<(String, i64)>,
    requests: Vec<PageRequest>,
    successful_calls: usize,
    script: Script,
}

/// 시뮬레이션 제공처.
#[derive(Debug)]
pub struct SimulatedSource {
    venue: String,
    kind: ProviderKind,
    page_limit: usize,
    supported: Option<Vec<Granularity>>,
    windowed: bool,
    state: Mutex<State>,
}

impl SimulatedSource {
    pub fn new(venue: impl Into<String>, page_limit: usize) -> Self {
        Self {
            venue: venue.into(),
            kind: ProviderKind::CryptoExchange,
            page_limit,
            supported: None,
            windowed: false,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    /// 지원 타임프레임을 제한합니다.
    pub fn with_supported(mut self, granularities: Vec<Granularity>) -> Self {
        self.supported = Some(granularities);
        self
    }

    /// 시간 창 단위로 응답합니다.
    pub fn windowed(mut self) -> Self {
        self.windowed = true;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 바를 추가합니다. 같은 타임스탬프는 덮어씁니다.
    pub fn insert_bars(&self, bars: impl IntoIterator<Item = MarketBar>) {
        let mut state = self.state();
        for bar in bars {
            state
                .series
                .entry((bar.symbol.clone(), bar.granularity))
                .or_default()
                .insert(bar.timestamp, bar);
        }
    }

    /// `start`부터 `count`개의 연속된 바를 생성해 추가합니다.
    ///
    /// i번째 바의 종가는 `100 + i`입니다.
    pub fn generate(&self, symbol: &str, granularity: Granularity, start: i64, count: usize) {
        let unit = granularity.as_millis();
        let bars = (0..count).map(|i| {
            let price = Decimal::from(100 + i as i64);
            MarketBar::new(
                symbol,
                &self.venue,
                granularity,
                start + i as i64 * unit,
                price,
                price + Decimal::ONE,
                price - Decimal::ONE,
                price,
                Decimal::from(10),
            )
        });
        self.insert_bars(bars);
    }

    /// 해당 행을 불량 행으로 응답합니다.
    pub fn mark_malformed(&self, symbol: &str, timestamp: i64) {
        self.state().malformed.insert((symbol.to_string(), timestamp));
    }

    /// 다음 `count`번의 호출에 요청 한도 초과를 반환합니다.
    pub fn rate_limit_next(&self, count: u32) {
        self.state().script.rate_limited = count;
    }

    /// 해당 심볼 요청에 항상 장애를 반환합니다.
    pub fn make_unavailable(&self, symbol: &str) {
        self.state().script.unavailable.insert(symbol.to_string());
    }

    /// `calls`번 성공한 뒤부터 모든 요청에 장애를 반환합니다.
    pub fn fail_after(&self, calls: usize) {
        self.state().script.fail_after_calls = Some(calls);
    }

    /// 장애 시나리오를 모두 해제합니다.
    pub fn recover(&self) {
        self.state().script = Script::default();
    }

    /// 지금까지 받은 페이지 요청 (요청 한도 초과로 실패한 것 포함).
    pub fn requests(&self) -> Vec<PageRequest> {
        self.state().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }
}

#[async_trait]
impl CandleSource for SimulatedSource {
    fn venue(&self) -> &str {
        &self.venue
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn page_limit(&self) -> usize {
        self.page_limit
    }

    fn supports(&self, granularity: Granularity) -> bool {
        self.supported
            .as_ref()
            .map_or(true, |supported| supported.contains(&granularity))
    }

    async fn fetch_page(&self, request: &PageRequest) -> ProviderResult<SourcePage> {
        let mut state = self.state();
        state.requests.push(request.clone());

        if state.script.rate_limited > 0 {
            state.script.rate_limited -= 1;
            return Err(ProviderError::rate_limited("simulated rate limit"));
        }
        if state.script.unavailable.contains(&request.symbol) {
            return Err(ProviderError::Unavailable(format!(
                "simulated outage for {}",
                request.symbol
            )));
        }
        if let Some(limit) = state.script.fail_after_calls {
            if state.successful_calls >= limit {
                return Err(ProviderError::Unavailable("simulated outage".to_string()));
            }
        }
        state.successful_calls += 1;

        let key = (request.symbol.clone(), request.granularity);
        let window = request.granularity.as_millis() * request.limit as i64;
        let last = if self.windowed {
            request.end.min(request.start + window - 1)
        } else {
            request.end
        };
        let rows: Vec<Result<MarketBar, MalformedRow>> = match state.series.get(&key) {
            Some(data) if request.start <= last => data
                .range(request.start..=last)
                .take(request.limit)
                .map(|(&ts, bar)| {
                    if state.malformed.contains(&(request.symbol.clone(), ts)) {
                        Err(MalformedRow::new(Some(ts), "simulated malformed row"))
                    } else {
                        Ok(bar.clone())
                    }
                })
                .collect(),
            _ => Vec::new(),
        };

        let page = SourcePage::from_rows(rows);
        if self.windowed {
            Ok(page.with_next_start(request.start + window))
        } else {
            Ok(page)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_page() {
        let source = SimulatedSource::new("test", 3);
        source.generate("BTC/USDT", Granularity::M1, 0, 10);
        source.mark_malformed("BTC/USDT", 60_000);

        let page = source
            .fetch_page(&PageRequest {
                symbol: "BTC/USDT".to_string(),
                granularity: Granularity::M1,
                start: 0,
                end: 600_000,
                limit: 3,
            })
            .await
            .unwrap();

        assert_eq!(page.received, 3);
        assert_eq!(page.malformed, 1);
        assert_eq!(page.bars.len(), 2);
        assert_eq!(page.last_timestamp, Some(120_000));
        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_simulated_scripted_failures() {
        let source = SimulatedSource::new("test", 3);
        source.generate("BTC/USDT", Granularity::M1, 0, 10);
        let request = PageRequest {
            symbol: "BTC/USDT".to_string(),
            granularity: Granularity::M1,
            start: 0,
            end: 600_000,
            limit: 3,
        };

        source.rate_limit_next(1);
        assert!(source.fetch_page(&request).await.unwrap_err().is_rate_limited());
        assert!(source.fetch_page(&request).await.is_ok());

        source.make_unavailable("BTC/USDT");
        assert!(matches!(
            source.fetch_page(&request).await,
            Err(ProviderError::Unavailable(_))
        ));

        source.recover();
        assert!(source.fetch_page(&request).await.is_ok());
    }
}
