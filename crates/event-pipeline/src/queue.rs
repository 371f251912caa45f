//! 유한 스테이지 큐 -- 스테이지 사이의 백프레셔 채널
//!
//! [`stage_queue`]는 `tokio::sync::mpsc` 유한 채널 위에 다음을 더합니다:
//!
//! - 생산자 측 완료 신호: 모든 생산자 복제본이 살아 있어도 [`StageQueue::complete`]
//!   이후에는 새 항목을 받지 않으며, 소비자는 남은 항목을 모두 꺼낸 뒤 `None`을 받습니다.
//! - 장애 전파: [`StageQueue::fault`] 또는 [`StageReceiver::fault`]는 즉시 양쪽을 닫고,
//!   소비자는 버퍼에 남은 항목과 무관하게 `Err(PipelineFault)`를 받습니다.
//! - 공유 취소 토큰: 취소되면 대기 중인 `offer`/`recv`가 즉시 풀립니다.
//!
//! [`loss_reporting_queue`]는 여기에 더해, 용량 부족으로 대기(postpone)한 뒤
//! 끝내 전달되지 못한 항목을 세어 한 번만 스로틀링 경고를 보고합니다.
//! 보고 시점은 완료 시점 또는 대기 중이던 `offer`가 닫힘/취소로 실패한 시점입니다.
//! 호출자가 대기 중인 `offer` future를 버리면 항목은 호출자가 처리한 것으로 보고
//! 손실로 세지 않습니다.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use diagflow_core::health::{CONTEXT_THROTTLING, HealthReporter};
use diagflow_core::metrics as m;

use crate::error::PipelineFault;

/// 항목을 큐에 넣지 못함. 항목은 호출자에게 돌려줍니다.
#[derive(Debug)]
pub enum OfferError<T> {
    /// 용량 초과 (`try_offer`만 반환)
    Full(T),
    /// 큐가 완료/장애/취소됨
    Closed(T),
}

impl<T> OfferError<T> {
    /// 돌려받은 항목
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

impl<T> fmt::Display for OfferError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("queue is full"),
            Self::Closed(_) => f.write_str("queue is closed"),
        }
    }
}

struct Shared {
    name: String,
    /// 완료 또는 장애로 닫힘
    closed: CancellationToken,
    completed: AtomicBool,
    fault: Mutex<Option<PipelineFault>>,
    cancel: CancellationToken,
    loss: Option<LossTracker>,
}

struct LossTracker {
    health: Arc<dyn HealthReporter>,
    /// 대기 중인 postponed offer 수
    pending: AtomicU64,
    /// 닫힘/취소로 실패한 postponed offer 수
    lost: AtomicU64,
    reported: AtomicBool,
}

impl LossTracker {
    /// 대기 중이거나 이미 실패한 항목이 있으면 한 번만 보고합니다.
    fn report_once(&self, queue: &str) {
        let lost = self.pending.load(Ordering::Acquire) + self.lost.load(Ordering::Acquire);
        if lost == 0 || self.reported.swap(true, Ordering::AcqRel) {
            return;
        }
        metrics::counter!(
            m::PIPELINE_EVENTS_THROTTLED_TOTAL,
            m::LABEL_STAGE => queue.to_owned()
        )
        .increment(lost);
        self.health.report_warning(
            &format!("{lost} item(s) waiting for capacity in '{queue}' were lost when the queue closed"),
            Some(CONTEXT_THROTTLING),
        );
    }
}

/// postponed offer가 끝나면(완료, 실패, future 폐기 모두) 대기 수를 되돌립니다.
struct PendingGuard<'a>(&'a AtomicU64);

impl<'a> PendingGuard<'a> {
    fn enter(pending: &'a AtomicU64) -> Self {
        pending.fetch_add(1, Ordering::AcqRel);
        Self(pending)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Shared {
    fn fault_reason(&self) -> Option<PipelineFault> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_fault(&self, fault: PipelineFault) {
        {
            let mut guard = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_none() {
                *guard = Some(fault);
            }
        }
        self.closed.cancel();
    }

    fn is_open(&self) -> bool {
        !self.closed.is_cancelled() && !self.cancel.is_cancelled()
    }
}

/// 큐 생산자 핸들 (복제 가능)
pub struct StageQueue<T> {
    tx: mpsc::Sender<T>,
    shared: Arc<Shared>,
}

impl<T> Clone for StageQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// 큐 소비자 핸들
pub struct StageReceiver<T> {
    rx: mpsc::Receiver<T>,
    shared: Arc<Shared>,
}

/// 유한 스테이지 큐를 생성합니다.
pub fn stage_queue<T>(
    name: impl Into<String>,
    capacity: usize,
    cancel: CancellationToken,
) -> (StageQueue<T>, StageReceiver<T>) {
    build(name.into(), capacity, cancel, None)
}

/// 손실 보고 큐를 생성합니다.
///
/// 용량 부족으로 대기하던 `offer`가 완료 때문에 실패하면, 완료 시점에
/// 한 번만 `Throttling` 컨텍스트로 경고를 보고합니다.
pub fn loss_reporting_queue<T>(
    name: impl Into<String>,
    capacity: usize,
    cancel: CancellationToken,
    health: Arc<dyn HealthReporter>,
) -> (StageQueue<T>, StageReceiver<T>) {
    let loss = LossTracker {
        health,
        pending: AtomicU64::new(0),
        lost: AtomicU64::new(0),
        reported: AtomicBool::new(false),
    };
    build(name.into(), capacity, cancel, Some(loss))
}

fn build<T>(
    name: String,
    capacity: usize,
    cancel: CancellationToken,
    loss: Option<LossTracker>,
) -> (StageQueue<T>, StageReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let shared = Arc::new(Shared {
        name,
        closed: CancellationToken::new(),
        completed: AtomicBool::new(false),
        fault: Mutex::new(None),
        cancel,
        loss,
    });
    (
        StageQueue {
            tx,
            shared: Arc::clone(&shared),
        },
        StageReceiver { rx, shared },
    )
}

impl<T: Send> StageQueue<T> {
    /// 큐 이름
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// 기다리지 않고 항목을 넣습니다.
    pub fn try_offer(&self, item: T) -> Result<(), OfferError<T>> {
        if !self.shared.is_open() {
            return Err(OfferError::Closed(item));
        }
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(item)) => Err(OfferError::Full(item)),
            Err(mpsc::error::TrySendError::Closed(item)) => Err(OfferError::Closed(item)),
        }
    }

    /// 용량이 생길 때까지 기다렸다가 항목을 넣습니다.
    ///
    /// 대기 중 큐가 완료/장애/취소되면 `Closed`로 실패합니다.
    pub async fn offer(&self, item: T) -> Result<(), OfferError<T>> {
        let item = match self.try_offer(item) {
            Ok(()) => return Ok(()),
            Err(OfferError::Full(item)) => item,
            Err(closed) => return Err(closed),
        };

        let Some(loss) = &self.shared.loss else {
            return self.offer_postponed(item).await;
        };

        let result = {
            let _pending = PendingGuard::enter(&loss.pending);
            self.offer_postponed(item).await
        };
        if result.is_err() {
            loss.lost.fetch_add(1, Ordering::AcqRel);
            loss.report_once(&self.shared.name);
        }
        result
    }

    async fn offer_postponed(&self, item: T) -> Result<(), OfferError<T>> {
        tokio::select! {
            biased;
            _ = self.shared.closed.cancelled() => Err(OfferError::Closed(item)),
            _ = self.shared.cancel.cancelled() => Err(OfferError::Closed(item)),
            permit = self.tx.reserve() => match permit {
                Ok(permit) if self.shared.is_open() => {
                    permit.send(item);
                    Ok(())
                }
                _ => Err(OfferError::Closed(item)),
            },
        }
    }

    /// 더 이상 항목을 받지 않습니다. 이미 들어간 항목은 소비자가 꺼낼 수 있습니다.
    pub fn complete(&self) {
        if self.shared.completed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(loss) = &self.shared.loss {
            loss.report_once(&self.shared.name);
        }
        self.shared.closed.cancel();
        tracing::debug!(queue = %self.shared.name, "stage queue completed");
    }

    /// 복구 불가능한 장애로 큐를 닫습니다.
    pub fn fault(&self, fault: PipelineFault) {
        tracing::debug!(queue = %self.shared.name, reason = %fault, "stage queue faulted");
        self.shared.set_fault(fault);
    }

    /// 완료/장애/취소로 닫혔는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        !self.shared.is_open()
    }

    /// 현재 버퍼에 있는 항목 수
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 최대 용량
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// 사용률 (0.0 ~ 1.0)
    pub fn utilization(&self) -> f64 {
        let capacity = self.capacity();
        if capacity == 0 {
            return 0.0;
        }
        f64::from(u32::try_from(self.len()).unwrap_or(u32::MAX))
            / f64::from(u32::try_from(capacity).unwrap_or(u32::MAX))
    }
}

impl<T: Send> StageReceiver<T> {
    /// 다음 항목을 꺼냅니다.
    ///
    /// - `Ok(Some(item))`: 다음 항목
    /// - `Ok(None)`: 완료되었고 남은 항목이 없음, 또는 취소됨
    /// - `Err(fault)`: 장애 발생
    pub async fn recv(&mut self) -> Result<Option<T>, PipelineFault> {
        if let Some(fault) = self.shared.fault_reason() {
            return Err(fault);
        }

        tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => Ok(None),
            item = self.rx.recv() => Ok(item),
            _ = self.shared.closed.cancelled() => {
                if let Some(fault) = self.shared.fault_reason() {
                    return Err(fault);
                }
                Ok(self.rx.try_recv().ok())
            }
        }
    }

    /// 소비자 측에서 장애를 일으킵니다. 생산자의 이후 `offer`는 실패합니다.
    pub fn fault(&self, fault: PipelineFault) {
        tracing::debug!(queue = %self.shared.name, reason = %fault, "stage receiver faulted");
        self.shared.set_fault(fault);
    }

    /// 큐 이름
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}
