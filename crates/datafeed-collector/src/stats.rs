//! 수집 통계 구조체.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 동기화 실행 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// 총 대상 수
    pub total: usize,
    /// 새 데이터를 저장한 대상 수
    pub success: usize,
    /// 에러 횟수
    pub errors: usize,
    /// 건너뛴 횟수 (다른 실행이 이미 동기화 중)
    pub skipped: usize,
    /// 이미 최신 상태
    pub up_to_date: usize,
    /// 빈 데이터 (조회 성공, 데이터 없음)
    pub empty: usize,
    /// 저장된 총 바 수
    pub total_bars: usize,
    /// 버려진 잘못된 행 수
    pub malformed: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CollectionStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 성공률 계산 (%). 최신 상태와 빈 데이터도 정상 처리로 봅니다.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            let ok = self.success + self.up_to_date + self.empty;
            (ok as f64 / self.total as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            success = self.success,
            errors = self.errors,
            skipped = self.skipped,
            up_to_date = self.up_to_date,
            empty = self.empty,
            total_bars = self.total_bars,
            malformed = self.malformed,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "동기화 완료"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        assert_eq!(CollectionStats::new().success_rate(), 0.0);

        let stats = CollectionStats {
            total: 4,
            success: 1,
            up_to_date: 1,
            errors: 2,
            ..Default::default()
        };
        assert_eq!(stats.success_rate(), 50.0);
    }
}
