//! 주기 실행 스케줄러.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

/// 고정 주기로 작업을 반복합니다.
///
/// 틱은 순서대로 기다리므로 이전 실행이 끝나기 전에 다음 실행이 시작되지
/// 않으며, 밀린 틱은 건너뜁니다. 첫 실행은 즉시 시작합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `shutdown`이 완료될 때까지 `job`을 반복하고 실행 횟수를 반환합니다.
    ///
    /// 실행 중인 작업은 중단하지 않고 끝난 뒤에 종료합니다.
    pub async fn run<F, Fut, S>(&self, mut job: F, shutdown: S) -> usize
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
        S: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut runs = 0;
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!(runs, "종료 신호 수신, 스케줄러 종료 중...");
                    break;
                }
                _ = ticker.tick() => {
                    runs += 1;
                    tracing::info!(run = runs, "=== 동기화 실행 시작 ===");
                    job().await;
                    tracing::info!(
                        "=== 동기화 완료, 다음 실행: {}초 후 ===",
                        self.interval.as_secs()
                    );
                }
            }
        }
        runs
    }
}
