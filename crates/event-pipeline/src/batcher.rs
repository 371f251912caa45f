//! 배처 -- 개별 항목을 고정 크기 배치로 묶습니다.
//!
//! - `max_batch_size`개가 모이면 즉시 배치를 내보냅니다.
//! - 별도로 `max_batch_delay`마다 타이머가 현재 버퍼를 강제로 내보냅니다 (비어 있어도).
//! - 상류가 완료되면 남은 부분 배치를 내보낸 뒤 하류를 완료합니다.
//!
//! 내부 버퍼는 `max_batch_size`를 넘지 않습니다. 하류가 배치를 받지 못하면
//! 배처는 상류에서 더 읽지 않으므로 백프레셔가 상류 큐로 전달됩니다.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::error::PipelineFault;
use crate::queue::{OfferError, StageQueue, StageReceiver};

/// 배처 스테이지
#[derive(Debug, Clone)]
pub struct Batcher {
    max_batch_size: usize,
    max_batch_delay: Duration,
}

impl Batcher {
    pub fn new(max_batch_size: usize, max_batch_delay: Duration) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            max_batch_delay,
        }
    }

    /// 상류가 끝날 때까지 배치를 만듭니다.
    ///
    /// 상류 장애는 하류로 전파하고 `Err`로 반환합니다.
    pub async fn run<T: Send>(
        self,
        mut input: StageReceiver<T>,
        output: StageQueue<Vec<T>>,
    ) -> Result<(), PipelineFault> {
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.max_batch_delay,
            self.max_batch_delay,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut buffer: Vec<T> = Vec::with_capacity(self.max_batch_size);

        loop {
            tokio::select! {
                biased;
                received = input.recv() => match received {
                    Ok(Some(item)) => {
                        buffer.push(item);
                        if buffer.len() >= self.max_batch_size {
                            let batch = std::mem::replace(
                                &mut buffer,
                                Vec::with_capacity(self.max_batch_size),
                            );
                            if !emit(&output, batch).await {
                                return Ok(());
                            }
                        }
                    }
                    Ok(None) => {
                        if !buffer.is_empty() {
                            emit(&output, buffer).await;
                        }
                        output.complete();
                        tracing::debug!(queue = output.name(), "batcher completed");
                        return Ok(());
                    }
                    Err(fault) => {
                        output.fault(fault.clone());
                        return Err(fault);
                    }
                },
                _ = ticker.tick() => {
                    let batch = std::mem::replace(
                        &mut buffer,
                        Vec::with_capacity(self.max_batch_size),
                    );
                    if batch.is_empty() {
                        // 빈 플러시는 하류가 바쁘면 건너뜁니다
                        let _ = output.try_offer(batch);
                    } else if !emit(&output, batch).await {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// 배치를 하류로 보냅니다. 하류가 닫혔으면 `false`를 반환합니다.
async fn emit<T: Send>(output: &StageQueue<Vec<T>>, batch: Vec<T>) -> bool {
    match output.offer(batch).await {
        Ok(()) => true,
        Err(OfferError::Full(_) | OfferError::Closed(_)) => {
            tracing::debug!(queue = output.name(), "downstream closed, batcher stopping");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::queue::stage_queue;

    #[tokio::test(start_paused = true)]
    async fn full_batch_emitted_before_flush() {
        let cancel = CancellationToken::new();
        let (head, head_rx) = stage_queue::<u32>("head", 10, cancel.clone());
        let (out, mut out_rx) = stage_queue::<Vec<u32>>("batches", 10, cancel.clone());

        let task = tokio::spawn(Batcher::new(2, Duration::from_secs(3600)).run(head_rx, out));

        for i in 1..=3 {
            head.try_offer(i).unwrap();
        }

        assert_eq!(out_rx.recv().await.unwrap(), Some(vec![1, 2]));
        // 타이머가 돌기 전에는 부분 배치가 나오지 않음
        let pending = tokio::time::timeout(Duration::from_millis(10), out_rx.recv()).await;
        assert!(pending.is_err());

        head.complete();
        assert_eq!(out_rx.recv().await.unwrap(), Some(vec![3]));
        assert_eq!(out_rx.recv().await.unwrap(), None);
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flushes_partial_batch() {
        let cancel = CancellationToken::new();
        let (head, head_rx) = stage_queue::<u32>("head", 10, cancel.clone());
        let (out, mut out_rx) = stage_queue::<Vec<u32>>("batches", 10, cancel.clone());

        tokio::spawn(Batcher::new(100, Duration::from_millis(10)).run(head_rx, out));
        head.try_offer(7).unwrap();

        // 이벤트 이전에 빈 플러시가 나올 수 있음
        let mut batch = out_rx.recv().await.unwrap().unwrap();
        while batch.is_empty() {
            batch = out_rx.recv().await.unwrap().unwrap();
        }
        assert_eq!(batch, vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_emits_empty_batches() {
        let cancel = CancellationToken::new();
        let (_head, head_rx) = stage_queue::<u32>("head", 10, cancel.clone());
        let (out, mut out_rx) = stage_queue::<Vec<u32>>("batches", 10, cancel.clone());

        tokio::spawn(Batcher::new(5, Duration::from_millis(10)).run(head_rx, out));
        assert_eq!(out_rx.recv().await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn fault_propagates_downstream() {
        let cancel = CancellationToken::new();
        let (head, head_rx) = stage_queue::<u32>("head", 10, cancel.clone());
        let (out, mut out_rx) = stage_queue::<Vec<u32>>("batches", 10, cancel.clone());

        let task = tokio::spawn(Batcher::new(5, Duration::from_secs(60)).run(head_rx, out));
        head.fault(PipelineFault("input broke".to_owned()));

        assert!(task.await.unwrap().is_err());
        assert_eq!(
            out_rx.recv().await.unwrap_err(),
            PipelineFault("input broke".to_owned())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backpressure_stops_reading_upstream() {
        let cancel = CancellationToken::new();
        let (head, head_rx) = stage_queue::<u32>("head", 2, cancel.clone());
        let (out, _out_rx) = stage_queue::<Vec<u32>>("batches", 1, cancel.clone());

        tokio::spawn(Batcher::new(1, Duration::from_secs(3600)).run(head_rx, out));

        // 하류 1개 + 배처가 들고 있는 1개 + 헤드 2개
        for i in 0..4 {
            head.offer(i).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(head.try_offer(99).unwrap_err().is_full());
    }
}
