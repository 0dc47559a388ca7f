//! 증분 동기화 엔진.
//!
//! 대상마다 저장소의 마지막 시각으로 수집 구간을 계산하고, 제공처에서 받은
//! 페이지를 하나씩 저장합니다. 중간에 실패해도 이미 저장한 페이지는 남고
//! 저장하지 못한 뒷부분만 잃습니다.
//!
//! 대상별 상태:
//! - 성공: `Idle → Fetching → Writing → … → Idle`
//! - 실패: `Idle → Fetching → Failed` (다음 동기화를 시작할 때까지 유지)
//!
//! 한 대상의 실패는 다른 대상에 영향을 주지 않습니다.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use datafeed_core::{series_span, FetchWindow, Granularity, SeriesKey, SyncTarget};
use datafeed_data::MarketDataStore;
use futures::TryStreamExt;
use serde::Serialize;
use tracing::{debug, error, info, warn, Instrument};

use super::registry::FetcherRegistry;
use crate::error::CollectorError;
use crate::{CollectionStats, Result};

/// 대상별 진행 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TargetState {
    Idle,
    Fetching,
    Writing,
    Failed,
}

/// 대상 하나의 동기화 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TargetOutcome {
    /// 새 바를 저장함
    Synced {
        bars: usize,
        pages: usize,
        malformed: usize,
    },
    /// 저장소가 이미 최신
    UpToDate,
    /// 조회는 성공했지만 저장할 바가 없음
    Empty { malformed: usize },
    /// 다른 실행이 이미 동기화 중이라 건너뜀
    Busy,
    /// 실패. 실패 전에 저장한 바 수를 함께 기록
    Failed { error: String, bars_written: usize },
}

/// 대상별 결과 보고.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub key: SeriesKey,
    pub window: Option<FetchWindow>,
    pub outcome: TargetOutcome,
}

/// 한 번의 실행 결과.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncRunReport {
    pub reports: Vec<TargetReport>,
    pub stats: CollectionStats,
}

impl SyncRunReport {
    /// 대상 결과를 추가하고 통계에 반영합니다.
    pub fn record(&mut self, report: TargetReport) {
        let stats = &mut self.stats;
        stats.total += 1;
        match &report.outcome {
            TargetOutcome::Synced { bars, malformed, .. } => {
                stats.success += 1;
                stats.total_bars += bars;
                stats.malformed += malformed;
            }
            TargetOutcome::UpToDate => stats.up_to_date += 1,
            TargetOutcome::Empty { malformed } => {
                stats.empty += 1;
                stats.malformed += malformed;
            }
            TargetOutcome::Busy => stats.skipped += 1,
            TargetOutcome::Failed { bars_written, .. } => {
                stats.errors += 1;
                stats.total_bars += bars_written;
            }
        }
        self.reports.push(report);
    }

    /// 실패한 대상의 보고.
    pub fn failures(&self) -> impl Iterator<Item = &TargetReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, TargetOutcome::Failed { .. }))
    }
}

#[derive(Debug, Default)]
struct Progress {
    pages: usize,
    bars_written: usize,
    malformed: usize,
}

impl Progress {
    fn into_outcome(self) -> TargetOutcome {
        if self.bars_written > 0 {
            TargetOutcome::Synced {
                bars: self.bars_written,
                pages: self.pages,
                malformed: self.malformed,
            }
        } else {
            TargetOutcome::Empty {
                malformed: self.malformed,
            }
        }
    }
}

/// 동기화 중인 대상 표시. drop 시 해제되고, 실패가 아니면 상태는 `Idle`로 돌아감.
struct BusyGuard<'a> {
    engine: &'a SyncEngine,
    key: SeriesKey,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        {
            let mut states = lock(&self.engine.states);
            if states.get(&self.key) != Some(&TargetState::Failed) {
                states.insert(self.key.clone(), TargetState::Idle);
            }
        }
        lock(&self.engine.busy).remove(&self.key);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 동기화 엔진.
pub struct SyncEngine {
    store: MarketDataStore,
    registry: FetcherRegistry,
    target_delay: Duration,
    busy: Mutex<HashSet<SeriesKey>>,
    states: Mutex<HashMap<SeriesKey, TargetState>>,
}

impl SyncEngine {
    pub fn new(store: MarketDataStore, registry: FetcherRegistry) -> Self {
        Self {
            store,
            registry,
            target_delay: Duration::ZERO,
            busy: Mutex::new(HashSet::new()),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// 대상 사이 대기 시간.
    pub fn with_target_delay(mut self, target_delay: Duration) -> Self {
        self.target_delay = target_delay;
        self
    }

    pub fn store(&self) -> &MarketDataStore {
        &self.store
    }

    pub fn registry(&self) -> &FetcherRegistry {
        &self.registry
    }

    /// 시계열의 현재 상태. 한 번도 동기화하지 않았으면 `Idle`.
    ///
    /// 마지막 동기화가 실패했으면 다음 동기화를 시작할 때까지 `Failed`입니다.
    pub fn state(&self, key: &SeriesKey) -> TargetState {
        lock(&self.states)
            .get(key)
            .copied()
            .unwrap_or(TargetState::Idle)
    }

    fn set_state(&self, key: &SeriesKey, state: TargetState) {
        lock(&self.states).insert(key.clone(), state);
    }

    fn try_acquire(&self, key: &SeriesKey) -> Option<BusyGuard<'_>> {
        if !lock(&self.busy).insert(key.clone()) {
            return None;
        }
        Some(BusyGuard {
            engine: self,
            key: key.clone(),
        })
    }

    /// 대상 목록을 현재 시각 기준으로 순서대로 동기화합니다.
    pub async fn run_once(&self, targets: &[SyncTarget]) -> SyncRunReport {
        self.run_once_at(targets, Utc::now().timestamp_millis()).await
    }

    /// 대상 목록을 `now_ms` 기준으로 순서대로 동기화합니다.
    pub async fn run_once_at(&self, targets: &[SyncTarget], now_ms: i64) -> SyncRunReport {
        let started = Instant::now();
        let mut run = SyncRunReport::default();

        info!(targets = targets.len(), "동기화 시작");

        for (idx, target) in targets.iter().enumerate() {
            if idx > 0 && !self.target_delay.is_zero() {
                tokio::time::sleep(self.target_delay).await;
            }
            debug!(
                series = %target.key(),
                progress = format!("{}/{}", idx + 1, targets.len()),
                "대상 처리"
            );
            run.record(self.sync_target(target, now_ms).await);
        }

        run.stats.elapsed = started.elapsed();
        run
    }

    /// 대상 하나를 증분 동기화합니다.
    pub async fn sync_target(&self, target: &SyncTarget, now_ms: i64) -> TargetReport {
        let key = target.key();
        let Some(_guard) = self.try_acquire(&key) else {
            warn!(series = %key, "이미 동기화 중, 건너뜀");
            return TargetReport {
                key,
                window: None,
                outcome: TargetOutcome::Busy,
            };
        };

        let span = series_span!("sync_target", key);
        async {
            self.set_state(&key, TargetState::Fetching);

            let latest = match self
                .store
                .latest_timestamp(&key.symbol, &key.venue, key.granularity)
                .await
            {
                Ok(latest) => latest,
                Err(e) => {
                    return self.failed(&key, None, CollectorError::Storage(e), Progress::default())
                }
            };

            let Some(window) = target.window(latest, now_ms) else {
                info!(latest = ?latest, "이미 최신 상태");
                return TargetReport {
                    key: key.clone(),
                    window: None,
                    outcome: TargetOutcome::UpToDate,
                };
            };

            self.finish(&key, window).await
        }
        .instrument(span)
        .await
    }

    /// 명시한 구간 `[start, end]`를 받아 저장합니다.
    ///
    /// 이미 저장된 바도 다시 받아 덮어씁니다.
    pub async fn sync_range(
        &self,
        symbol: &str,
        venue: &str,
        granularity: Granularity,
        start: i64,
        end: i64,
    ) -> TargetReport {
        let key = SeriesKey::new(symbol, venue, granularity);
        let Some(_guard) = self.try_acquire(&key) else {
            warn!(series = %key, "이미 동기화 중, 건너뜀");
            return TargetReport {
                key,
                window: None,
                outcome: TargetOutcome::Busy,
            };
        };

        let span = series_span!("sync_range", key);
        async {
            self.set_state(&key, TargetState::Fetching);
            self.finish(&key, FetchWindow { start, end }).await
        }
        .instrument(span)
        .await
    }

    async fn finish(&self, key: &SeriesKey, window: FetchWindow) -> TargetReport {
        let mut progress = Progress::default();
        match self.write_window(key, window, &mut progress).await {
            Ok(()) => {
                info!(
                    start = window.start,
                    end = window.end,
                    pages = progress.pages,
                    bars = progress.bars_written,
                    malformed = progress.malformed,
                    "동기화 완료"
                );
                TargetReport {
                    key: key.clone(),
                    window: Some(window),
                    outcome: progress.into_outcome(),
                }
            }
            Err(e) => self.failed(key, Some(window), e, progress),
        }
    }

    /// 구간을 페이지 단위로 받아 한 페이지씩 저장합니다.
    async fn write_window(
        &self,
        key: &SeriesKey,
        window: FetchWindow,
        progress: &mut Progress,
    ) -> Result<()> {
        let fetcher = self.registry.get(&key.venue)?;
        if !fetcher.source().supports(key.granularity) {
            return Err(CollectorError::UnsupportedGranularity {
                venue: key.venue.clone(),
                granularity: key.granularity.to_string(),
            });
        }

        let mut pages = fetcher.fetch_pages(&key.symbol, key.granularity, window.start, window.end);
        while let Some(page) = pages.try_next().await? {
            progress.pages += 1;
            progress.malformed += page.malformed;
            if page.malformed > 0 {
                warn!(
                    request_start = page.request_start,
                    malformed = page.malformed,
                    "잘못된 행 제외"
                );
            }
            if page.bars.is_empty() {
                continue;
            }

            self.set_state(key, TargetState::Writing);
            progress.bars_written += self.store.upsert(&page.bars).await?;
            self.set_state(key, TargetState::Fetching);
        }

        Ok(())
    }

    fn failed(
        &self,
        key: &SeriesKey,
        window: Option<FetchWindow>,
        err: CollectorError,
        progress: Progress,
    ) -> TargetReport {
        self.set_state(key, TargetState::Failed);
        error!(
            error = %err,
            bars_written = progress.bars_written,
            "동기화 실패"
        );
        TargetReport {
            key: key.clone(),
            window,
            outcome: TargetOutcome::Failed {
                error: err.to_string(),
                bars_written: progress.bars_written,
            },
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("store", &self.store.path())
            .field("registry", &self.registry)
            .field("target_delay", &self.target_delay)
            .finish_non_exhaustive()
    }
}
