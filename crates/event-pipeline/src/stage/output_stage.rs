//! 출력 스테이지 -- 살아남은 배치를 싱크로 전송합니다.
//!
//! - 싱크별 전송 순번은 1부터 단조 증가하며, 빈 배치는 순번을 소비하지 않고 건너뜁니다.
//! - 최대 `max_concurrency`개의 전송이 동시에 진행될 수 있습니다.
//! - 전송 실패는 `Output` 컨텍스트의 경고로 보고하고, 파이프라인 종료로 인한
//!   취소는 기록하지 않습니다.
//! - 결과와 무관하게 전송이 끝나면 처리 중 카운터를 배치 길이만큼 줄입니다.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use diagflow_core::error::OutputError;
use diagflow_core::event::EventData;
use diagflow_core::health::{CONTEXT_OUTPUT, HealthReporter};
use diagflow_core::metrics as m;
use diagflow_core::pipeline::Output;

use crate::counter::InFlightCounter;
use crate::error::PipelineFault;
use crate::queue::StageReceiver;

struct SendContext {
    sink: String,
    output: Arc<dyn Output>,
    counter: InFlightCounter,
    health: Arc<dyn HealthReporter>,
    cancel: CancellationToken,
}

/// 출력 스테이지
pub struct OutputStage {
    context: Arc<SendContext>,
    max_concurrency: usize,
    next_sequence: u64,
}

impl OutputStage {
    pub fn new(
        sink: impl Into<String>,
        output: Arc<dyn Output>,
        counter: InFlightCounter,
        health: Arc<dyn HealthReporter>,
        cancel: CancellationToken,
        max_concurrency: usize,
    ) -> Self {
        Self {
            context: Arc::new(SendContext {
                sink: sink.into(),
                output,
                counter,
                health,
                cancel,
            }),
            max_concurrency: max_concurrency.max(1),
            next_sequence: 1,
        }
    }

    /// 상류가 끝날 때까지 배치를 전송합니다. 진행 중인 전송이 모두 끝난 뒤 반환합니다.
    pub async fn run(mut self, mut input: StageReceiver<Vec<EventData>>) -> Result<(), PipelineFault> {
        let mut sends = JoinSet::new();

        let result = loop {
            match input.recv().await {
                Ok(Some(batch)) => {
                    if batch.is_empty() {
                        continue;
                    }
                    while sends.len() >= self.max_concurrency {
                        log_join(sends.join_next().await, &self.context.sink);
                    }
                    let sequence = self.next_sequence;
                    self.next_sequence += 1;
                    sends.spawn(send_batch(Arc::clone(&self.context), batch, sequence));
                }
                Ok(None) => break Ok(()),
                Err(fault) => break Err(fault),
            }
        };

        while let Some(joined) = sends.join_next().await {
            log_join(Some(joined), &self.context.sink);
        }
        tracing::debug!(sink = %self.context.sink, sent = self.next_sequence - 1, "output stage completed");
        result
    }

    /// 다음 배치에 부여될 전송 순번
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}

async fn send_batch(ctx: Arc<SendContext>, batch: Vec<EventData>, sequence: u64) {
    let started = Instant::now();
    let result = ctx.output.send_events(&batch, sequence, &ctx.cancel).await;

    match result {
        Ok(()) => {
            metrics::counter!(m::PIPELINE_BATCHES_SENT_TOTAL, m::LABEL_SINK => ctx.sink.clone())
                .increment(1);
            metrics::histogram!(
                m::PIPELINE_BATCH_SEND_DURATION_SECONDS,
                m::LABEL_SINK => ctx.sink.clone()
            )
            .record(started.elapsed().as_secs_f64());
        }
        Err(OutputError::Cancelled) if ctx.cancel.is_cancelled() => {}
        Err(e) => {
            metrics::counter!(m::PIPELINE_OUTPUT_FAILURES_TOTAL, m::LABEL_SINK => ctx.sink.clone())
                .increment(1);
            ctx.health.report_warning(
                &format!(
                    "output '{}' failed to send batch {sequence} ({} events): {e}",
                    ctx.sink,
                    batch.len()
                ),
                Some(CONTEXT_OUTPUT),
            );
        }
    }

    ctx.counter.decrement(batch.len());
}

fn log_join(joined: Option<Result<(), tokio::task::JoinError>>, sink: &str) {
    if let Some(Err(e)) = joined {
        tracing::error!(sink, error = %e, "output send task failed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::queue::stage_queue;
    use crate::test_support::{CollectingOutput, RecordingReporter, counted_event};

    fn output_stage(
        output: Arc<CollectingOutput>,
        health: Arc<RecordingReporter>,
        cancel: CancellationToken,
    ) -> (OutputStage, InFlightCounter) {
        let counter = InFlightCounter::new();
        let stage = OutputStage::new("test-sink", output, counter.clone(), health, cancel, 1);
        (stage, counter)
    }

    #[tokio::test]
    async fn sends_with_monotonic_sequence_and_skips_empty() {
        let cancel = CancellationToken::new();
        let output = Arc::new(CollectingOutput::default());
        let (stage, counter) = output_stage(
            Arc::clone(&output),
            Arc::new(RecordingReporter::default()),
            cancel.clone(),
        );
        counter.increment(3);

        let (queue, rx) = stage_queue("out", 8, cancel);
        queue.try_offer(vec![counted_event(1)]).unwrap();
        queue.try_offer(Vec::new()).unwrap();
        queue.try_offer(vec![counted_event(2), counted_event(3)]).unwrap();
        queue.complete();

        stage.run(rx).await.unwrap();
        assert_eq!(output.sequence_numbers(), vec![1, 2]);
        assert_eq!(output.event_count(), 3);
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test]
    async fn failure_is_reported_and_counter_still_decremented() {
        let cancel = CancellationToken::new();
        let output = Arc::new(CollectingOutput::failing("connection refused"));
        let health = Arc::new(RecordingReporter::default());
        let (stage, counter) = output_stage(output, Arc::clone(&health), cancel.clone());
        counter.increment(2);

        let (queue, rx) = stage_queue("out", 8, cancel);
        queue.try_offer(vec![counted_event(1), counted_event(2)]).unwrap();
        queue.complete();

        stage.run(rx).await.unwrap();
        assert_eq!(counter.get(), 0);
        let warnings = health.warnings_in(CONTEXT_OUTPUT);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancellation_is_silent() {
        let cancel = CancellationToken::new();
        let output = Arc::new(CollectingOutput::slow(Duration::from_secs(60)));
        let health = Arc::new(RecordingReporter::default());
        let (stage, counter) = output_stage(output, Arc::clone(&health), cancel.clone());
        counter.increment(1);

        let (queue, rx) = stage_queue("out", 8, CancellationToken::new());
        queue.try_offer(vec![counted_event(1)]).unwrap();
        let task = tokio::spawn(stage.run(rx));

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        queue.complete();

        task.await.unwrap().unwrap();
        assert!(health.warnings.lock().unwrap().is_empty());
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test]
    async fn fault_is_returned_after_pending_sends() {
        let cancel = CancellationToken::new();
        let output = Arc::new(CollectingOutput::default());
        let (stage, _counter) = output_stage(
            output,
            Arc::new(RecordingReporter::default()),
            cancel.clone(),
        );

        let (queue, rx) = stage_queue("out", 8, cancel);
        queue.try_offer(vec![counted_event(1)]).unwrap();
        let task = tokio::spawn(stage.run(rx));
        tokio::task::yield_now().await;
        queue.fault(PipelineFault("upstream".to_owned()));

        assert!(task.await.unwrap().is_err());
    }
}
