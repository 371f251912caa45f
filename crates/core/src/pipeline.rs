//! 협력자 trait -- 파이프라인 확장 포인트 정의
//!
//! 파이프라인 코어는 구체적인 입력/필터/출력 구현을 알지 못합니다.
//! 호스트 애플리케이션이 이 trait들을 구현하여
//! [`ComponentRegistry`](crate::registry::ComponentRegistry)에 등록합니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{FilterError, OutputError};
use crate::event::EventData;

/// dyn-compatible trait에서 사용하는 boxed future 타입
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 필터 평가 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    /// 이벤트 유지
    KeepEvent,
    /// 이벤트 제거
    DropEvent,
}

/// 이벤트 필터 trait
///
/// 파이프라인 상태에 대해 부작용이 없어야 합니다.
/// 이벤트에 메타데이터를 부착하는 것은 허용됩니다.
/// `Err`는 "유지 투표를 하지 않음"으로 취급되어 이벤트가 제거됩니다.
pub trait Filter: Send + Sync {
    /// 이벤트를 평가합니다.
    fn evaluate(&self, event: &mut EventData) -> Result<FilterResult, FilterError>;
}

/// 출력(싱크) trait
///
/// 파이프라인 종료로 인한 취소 시에는 [`OutputError::Cancelled`]를 반환해야 하며,
/// 그 외의 실패는 경고로 기록될 뿐 파이프라인을 멈추지 않습니다.
pub trait Output: Send + Sync {
    /// 배치를 전송합니다.
    ///
    /// `transmission_sequence_number`는 싱크별로 1부터 단조 증가합니다.
    fn send_events<'a>(
        &'a self,
        events: &'a [EventData],
        transmission_sequence_number: u64,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), OutputError>>;
}

/// 입력이 이벤트를 밀어넣는 관찰자 trait
pub trait EventObserver: Send + Sync {
    /// 이벤트 하나를 전달합니다.
    fn on_next(&self, event: EventData);

    /// 스트림이 정상 종료되었음을 알립니다.
    fn on_completed(&self);

    /// 스트림이 오류로 종료되었음을 알립니다.
    fn on_error(&self, error: &str);
}

/// 이벤트 입력(생산자) trait
pub trait Input: Send + Sync {
    /// 입력 이름 (로깅용)
    fn name(&self) -> &str;

    /// 관찰자를 구독시킵니다.
    ///
    /// 반환된 [`Subscription`]을 해제하면 더 이상 이벤트가 전달되지 않습니다.
    fn subscribe(&self, observer: Arc<dyn EventObserver>) -> Subscription;
}

/// 구독 핸들
///
/// `unsubscribe()`를 호출하거나 drop되면 해제 콜백이 한 번 실행됩니다.
pub struct Subscription {
    on_unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// 해제 시 실행할 콜백으로 구독을 생성합니다.
    pub fn new(on_unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_unsubscribe: Some(Box::new(on_unsubscribe)),
        }
    }

    /// 해제할 것이 없는 구독을 생성합니다.
    pub fn empty() -> Self {
        Self {
            on_unsubscribe: None,
        }
    }

    /// 구독을 해제합니다.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(callback) = self.on_unsubscribe.take() {
            callback();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.on_unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn unsubscribe_runs_callback_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_runs_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let counter = Arc::clone(&calls);
            let _sub = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_subscription_is_inert() {
        Subscription::empty().unsubscribe();
    }

    struct Noop;

    impl Output for Noop {
        fn send_events<'a>(
            &'a self,
            _events: &'a [EventData],
            _seq: u64,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, Result<(), OutputError>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn output_is_dyn_compatible() {
        let output: Arc<dyn Output> = Arc::new(Noop);
        let cancel = CancellationToken::new();
        assert!(output.send_events(&[], 1, &cancel).await.is_ok());
    }
}
