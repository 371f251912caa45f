//! 다중 구독 입력 헬퍼
//!
//! [`EventSubject`]는 현재 구독 중인 모든 관찰자에게 이벤트를 전달하는
//! [`Input`] 구현입니다. 구체 입력 어댑터와 테스트에서 사용합니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::event::EventData;
use crate::pipeline::{EventObserver, Input, Subscription};

type ObserverList = Vec<(u64, Arc<dyn EventObserver>)>;

/// 다중 구독 입력
pub struct EventSubject {
    name: String,
    observers: Arc<Mutex<ObserverList>>,
    next_id: AtomicU64,
}

impl EventSubject {
    /// 새 subject를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            observers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// 현재 관찰자 목록의 스냅샷
    ///
    /// 락을 잡은 채 콜백을 호출하지 않기 위해 복사본을 만듭니다.
    fn snapshot(&self) -> Vec<Arc<dyn EventObserver>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect()
    }

    /// 모든 관찰자에게 이벤트를 전달합니다.
    pub fn push(&self, event: EventData) {
        let observers = self.snapshot();
        let Some((last, rest)) = observers.split_last() else {
            return;
        };
        for observer in rest {
            observer.on_next(event.clone());
        }
        last.on_next(event);
    }

    /// 모든 관찰자에게 스트림 종료를 알립니다.
    pub fn complete(&self) {
        for observer in self.snapshot() {
            observer.on_completed();
        }
    }

    /// 모든 관찰자에게 스트림 오류를 알립니다.
    pub fn error(&self, error: &str) {
        for observer in self.snapshot() {
            observer.on_error(error);
        }
    }

    /// 현재 구독자 수
    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Input for EventSubject {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&self, observer: Arc<dyn EventObserver>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));

        let observers = Arc::clone(&self.observers);
        Subscription::new(move || {
            observers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(oid, _)| *oid != id);
        })
    }
}
