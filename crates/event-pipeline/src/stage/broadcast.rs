//! 팬아웃 스테이지 -- 싱크가 둘 이상일 때 배치를 싱크별로 복제합니다.
//!
//! 복제 전에 처리 중 카운터를 `(싱크 수 - 1) × 배치 길이`만큼 늘립니다.
//! 각 분기는 독립적인 깊은 복사본을 받으므로 싱크별 필터의 변경이 서로 보이지 않습니다.
//!
//! # 느린 분기 정책
//! 분기 큐가 가득 차 있으면 `offer_timeout` 동안 기다린 뒤, 그래도 받지 못하면
//! 그 분기의 새 배치를 버리고 `Throttling` 컨텍스트로 손실을 보고합니다.
//! 가득 찬 분기들은 동시에 기다리므로, 한 분기가 다른 분기를 막지 않고
//! 배치 하나당 지연은 최대 `offer_timeout`입니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use diagflow_core::event::EventData;
use diagflow_core::health::{CONTEXT_THROTTLING, HealthReporter};
use diagflow_core::metrics as m;

use crate::counter::InFlightCounter;
use crate::error::PipelineFault;
use crate::queue::{OfferError, StageQueue, StageReceiver};

/// 팬아웃 분기
pub struct BroadcastBranch {
    sink: String,
    queue: StageQueue<Vec<EventData>>,
}

impl BroadcastBranch {
    pub fn new(sink: impl Into<String>, queue: StageQueue<Vec<EventData>>) -> Self {
        Self {
            sink: sink.into(),
            queue,
        }
    }
}

/// 분기 손실 보고 (대기 태스크와 공유)
#[derive(Clone)]
struct BranchLoss {
    counter: InFlightCounter,
    health: Arc<dyn HealthReporter>,
}

impl BranchLoss {
    fn report(&self, sink: &str, lost: usize, reason: &str) {
        self.counter.decrement(lost);
        metrics::counter!(
            m::PIPELINE_BROADCAST_EVENTS_LOST_TOTAL,
            m::LABEL_SINK => sink.to_owned()
        )
        .increment(lost as u64);
        self.health.report_warning(
            &format!("{lost} event(s) lost for sink '{sink}': {reason}"),
            Some(CONTEXT_THROTTLING),
        );
    }
}

/// 팬아웃 스테이지
pub struct BroadcastStage {
    branches: Vec<BroadcastBranch>,
    loss: BranchLoss,
    offer_timeout: Duration,
}

impl BroadcastStage {
    pub fn new(
        branches: Vec<BroadcastBranch>,
        counter: InFlightCounter,
        health: Arc<dyn HealthReporter>,
        offer_timeout: Duration,
    ) -> Self {
        Self {
            branches,
            loss: BranchLoss { counter, health },
            offer_timeout,
        }
    }

    pub async fn run(self, mut input: StageReceiver<Vec<EventData>>) -> Result<(), PipelineFault> {
        loop {
            match input.recv().await {
                Ok(Some(batch)) => self.broadcast(batch).await,
                Ok(None) => {
                    for branch in &self.branches {
                        branch.queue.complete();
                    }
                    tracing::debug!(branches = self.branches.len(), "broadcast stage completed");
                    return Ok(());
                }
                Err(fault) => {
                    for branch in &self.branches {
                        branch.queue.fault(fault.clone());
                    }
                    return Err(fault);
                }
            }
        }
    }

    /// 배치를 모든 분기로 보냅니다. 가득 찬 분기는 동시에 기다립니다.
    pub async fn broadcast(&self, batch: Vec<EventData>) {
        let Some((last, others)) = self.branches.split_last() else {
            self.loss.counter.decrement(batch.len());
            return;
        };

        if batch.is_empty() {
            for branch in &self.branches {
                let _ = branch.queue.try_offer(Vec::new());
            }
            return;
        }

        self.loss.counter.increment(others.len() * batch.len());

        let mut postponed = JoinSet::new();
        for branch in others {
            self.deliver(branch, batch.clone(), &mut postponed);
        }
        self.deliver(last, batch, &mut postponed);

        while let Some(joined) = postponed.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "broadcast delivery task failed");
            }
        }
    }

    fn deliver(&self, branch: &BroadcastBranch, batch: Vec<EventData>, postponed: &mut JoinSet<()>) {
        let len = batch.len();
        let batch = match branch.queue.try_offer(batch) {
            Ok(()) => return,
            Err(OfferError::Full(batch)) => batch,
            Err(OfferError::Closed(_)) => {
                self.loss.report(&branch.sink, len, "branch is closed");
                return;
            }
        };

        let queue = branch.queue.clone();
        let sink = branch.sink.clone();
        let loss = self.loss.clone();
        let offer_timeout = self.offer_timeout;
        postponed.spawn(async move {
            match tokio::time::timeout(offer_timeout, queue.offer(batch)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => loss.report(&sink, len, "branch is closed"),
                Err(_) => loss.report(&sink, len, "branch did not consume in time"),
            }
        });
    }
}
