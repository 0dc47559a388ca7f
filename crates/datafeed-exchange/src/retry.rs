//! 요청 한도 초과 재시도.
//!
//! 요청 한도 초과(`ProviderError::RateLimited`)만 재시도합니다. 다른 에러는
//! 즉시 반환합니다. 재시도 횟수에는 상한이 있어 무한 대기하지 않습니다.
//!
//! # 예시
//!
//! ```rust,ignore
//! use datafeed_exchange::retry::{with_rate_limit_retry, RetryConfig};
//!
//! let page = with_rate_limit_retry(&RetryConfig::default(), || source.fetch_page(&request)).await?;
//! ```

use std::{future::Future, time::Duration};

use tracing::{debug, warn};

use crate::error::{FetchError, ProviderError};

/// 재시도 설정.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// 최대 재시도 횟수 (초기 시도 제외)
    pub max_retries: u32,
    /// 기본 대기 시간 (제공처가 대기 시간을 주지 않을 때 사용)
    pub base_delay: Duration,
    /// 최대 대기 시간
    pub max_delay: Duration,
    /// 지수 백오프 배수
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// 재시도 없음 (단일 시도).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// `attempt`번째 재시도(0부터) 전 대기 시간.
    ///
    /// 제공처가 지정한 시간이 있으면 그대로 쓰고, 없으면 지수 백오프.
    /// 어느 쪽이든 `max_delay`를 넘지 않습니다.
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        let delay = match error.retry_after() {
            Some(suggested) => suggested,
            None => {
                let multiplier = self.backoff_multiplier.powi(attempt as i32);
                Duration::from_secs_f64(self.base_delay.as_secs_f64() * multiplier)
            }
        };
        delay.min(self.max_delay)
    }
}

/// 요청 한도 초과 시 재시도하며 비동기 작업을 실행합니다.
///
/// # Returns
/// * `Ok(T)` - 작업 성공 결과
/// * `Err(FetchError::RateLimitExhausted)` - 재시도 한도 소진
/// * `Err(FetchError::Provider)` - 재시도하지 않는 에러
pub async fn with_rate_limit_retry<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "재시도 후 성공");
                }
                return Ok(result);
            }
            Err(e) if e.is_rate_limited() => {
                if attempt >= config.max_retries {
                    warn!(attempts = attempt + 1, error = %e, "요청 한도 재시도 소진");
                    return Err(FetchError::RateLimitExhausted {
                        attempts: attempt + 1,
                        source: e,
                    });
                }

                let delay = config.delay_for(attempt, &e);
                warn!(
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "요청 한도 초과, 대기 후 재시도"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(FetchError::Provider(e)),
        }
    }
}
