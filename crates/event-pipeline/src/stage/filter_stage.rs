//! 필터 스테이지 -- 배치의 각 이벤트에 필터 집합(논리곱)을 적용합니다.
//!
//! 큰 배치는 `max_concurrency`개의 청크로 나누어 블로킹 스레드 풀에서 병렬 평가하며,
//! 청크 순서대로 다시 이어 붙여 배치 안의 순서를 보존합니다.
//! 필터 에러는 경고로 보고하고 해당 이벤트는 제거합니다.

use std::sync::Arc;

use diagflow_core::event::EventData;
use diagflow_core::health::{CONTEXT_FILTERING, HealthReporter};
use diagflow_core::metrics as m;
use diagflow_core::pipeline::{Filter, FilterResult};

use crate::counter::InFlightCounter;
use crate::error::PipelineFault;
use crate::queue::{StageQueue, StageReceiver};

/// 이 크기 이하의 배치는 현재 태스크에서 바로 평가합니다.
const PARALLEL_THRESHOLD: usize = 64;

/// 필터 스테이지
pub struct FilterStage {
    name: String,
    filters: Arc<[Arc<dyn Filter>]>,
    counter: InFlightCounter,
    health: Arc<dyn HealthReporter>,
    max_concurrency: usize,
}

impl FilterStage {
    pub fn new(
        name: impl Into<String>,
        filters: Vec<Arc<dyn Filter>>,
        counter: InFlightCounter,
        health: Arc<dyn HealthReporter>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            name: name.into(),
            filters: filters.into(),
            counter,
            health,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// 상류가 끝날 때까지 배치를 필터링해 하류로 넘깁니다.
    pub async fn run(
        self,
        mut input: StageReceiver<Vec<EventData>>,
        output: StageQueue<Vec<EventData>>,
    ) -> Result<(), PipelineFault> {
        loop {
            match input.recv().await {
                Ok(Some(batch)) => {
                    let kept = match self.apply(batch).await {
                        Ok(kept) => kept,
                        Err(fault) => {
                            output.fault(fault.clone());
                            input.fault(fault.clone());
                            return Err(fault);
                        }
                    };
                    if let Err(e) = output.offer(kept).await {
                        let lost = e.into_inner().len();
                        self.counter.decrement(lost);
                        tracing::debug!(stage = %self.name, lost, "downstream closed, filter stage stopping");
                        return Ok(());
                    }
                }
                Ok(None) => {
                    output.complete();
                    tracing::debug!(stage = %self.name, "filter stage completed");
                    return Ok(());
                }
                Err(fault) => {
                    output.fault(fault.clone());
                    return Err(fault);
                }
            }
        }
    }

    /// 배치 하나를 필터링합니다. 제거된 수만큼 처리 중 카운터를 줄입니다.
    pub async fn apply(&self, batch: Vec<EventData>) -> Result<Vec<EventData>, PipelineFault> {
        let original = batch.len();
        if original == 0 {
            return Ok(batch);
        }

        let kept = if original <= PARALLEL_THRESHOLD || self.max_concurrency == 1 {
            evaluate_chunk(&self.filters, self.health.as_ref(), &self.name, batch)
        } else {
            self.apply_parallel(batch).await?
        };

        let removed = original - kept.len();
        if removed > 0 {
            self.counter.decrement(removed);
            metrics::counter!(m::PIPELINE_EVENTS_FILTERED_TOTAL).increment(removed as u64);
        }
        Ok(kept)
    }

    async fn apply_parallel(&self, batch: Vec<EventData>) -> Result<Vec<EventData>, PipelineFault> {
        let original = batch.len();
        let chunk_size = original.div_ceil(self.max_concurrency);

        let mut handles = Vec::with_capacity(original.div_ceil(chunk_size));
        let mut rest = batch;
        while !rest.is_empty() {
            let tail = rest.split_off(chunk_size.min(rest.len()));
            let chunk = std::mem::replace(&mut rest, tail);
            let filters = Arc::clone(&self.filters);
            let health = Arc::clone(&self.health);
            let name = self.name.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                evaluate_chunk(&filters, health.as_ref(), &name, chunk)
            }));
        }

        let mut kept = Vec::with_capacity(original);
        for handle in handles {
            match handle.await {
                Ok(mut part) => kept.append(&mut part),
                Err(e) => {
                    return Err(PipelineFault(format!(
                        "filter stage '{}' worker failed: {e}",
                        self.name
                    )));
                }
            }
        }
        Ok(kept)
    }
}

/// 모든 필터가 유지에 투표한 이벤트만 남깁니다.
fn evaluate_chunk(
    filters: &[Arc<dyn Filter>],
    health: &dyn HealthReporter,
    stage: &str,
    mut events: Vec<EventData>,
) -> Vec<EventData> {
    events.retain_mut(|event| {
        filters.iter().all(|filter| match filter.evaluate(event) {
            Ok(FilterResult::KeepEvent) => true,
            Ok(FilterResult::DropEvent) => false,
            Err(e) => {
                health.report_warning(
                    &format!("filter in stage '{stage}' failed, dropping event: {e}"),
                    Some(CONTEXT_FILTERING),
                );
                false
            }
        })
    });
    events
}
