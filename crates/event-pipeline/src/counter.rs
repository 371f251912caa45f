//! 처리 중 이벤트 카운터
//!
//! 파이프라인 인스턴스마다 하나씩 만들어져 모든 스테이지에 명시적으로 전달됩니다.
//! 이벤트를 들여오는 스테이지(입력 수신, 팬아웃 복제)는 증가시키고,
//! 내보내는 스테이지(전송 완료, 필터 제거, 손실)는 이벤트 인스턴스마다 정확히 한 번 감소시킵니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use diagflow_core::metrics as m;

/// 공유 원자 카운터
#[derive(Debug, Clone, Default)]
pub struct InFlightCounter {
    count: Arc<AtomicI64>,
}

impl InFlightCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `n`개의 이벤트 인스턴스가 파이프라인에 들어왔습니다.
    pub fn increment(&self, n: usize) {
        if n == 0 {
            return;
        }
        let delta = i64::try_from(n).unwrap_or(i64::MAX);
        let current = self.count.fetch_add(delta, Ordering::AcqRel) + delta;
        record(current);
    }

    /// `n`개의 이벤트 인스턴스가 파이프라인에서 빠졌습니다.
    pub fn decrement(&self, n: usize) {
        if n == 0 {
            return;
        }
        let delta = i64::try_from(n).unwrap_or(i64::MAX);
        let current = self.count.fetch_sub(delta, Ordering::AcqRel) - delta;
        if current < 0 {
            tracing::warn!(current, "in-flight counter went negative");
        }
        record(current);
    }

    /// 현재 값
    pub fn get(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }

    /// 처리 중인 이벤트가 없는지 확인합니다.
    pub fn is_idle(&self) -> bool {
        self.get() <= 0
    }
}

#[allow(clippy::cast_precision_loss)]
fn record(current: i64) {
    metrics::gauge!(m::PIPELINE_EVENTS_IN_FLIGHT).set(current as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_and_decrements() {
        let counter = InFlightCounter::new();
        counter.increment(5);
        counter.decrement(2);
        assert_eq!(counter.get(), 3);
        assert!(!counter.is_idle());
        counter.decrement(3);
        assert!(counter.is_idle());
    }

    #[test]
    fn clones_share_state() {
        let counter = InFlightCounter::new();
        let other = counter.clone();
        other.increment(4);
        assert_eq!(counter.get(), 4);
    }

    #[test]
    fn concurrent_updates_balance() {
        let counter = InFlightCounter::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.increment(2);
                        c.decrement(2);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.get(), 0);
    }
}
