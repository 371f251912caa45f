//! 파이프라인 처리량 벤치마크
//!
//! 입력부터 출력까지 이벤트 N개가 드레인되는 시간을 측정합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use diagflow_core::error::OutputError;
use diagflow_core::event::{EventData, LogLevel};
use diagflow_core::pipeline::{BoxFuture, Output};
use diagflow_core::subject::EventSubject;
use diagflow_event_pipeline::{EventPipelineBuilder, EventSink, PipelineSettingsBuilder};

/// 이벤트 수만 세는 출력
#[derive(Default)]
struct CountingOutput {
    events: AtomicUsize,
}

impl Output for CountingOutput {
    fn send_events<'a>(
        &'a self,
        events: &'a [EventData],
        _transmission_sequence_number: u64,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), OutputError>> {
        Box::pin(async move {
            self.events.fetch_add(black_box(events.len()), Ordering::Relaxed);
            Ok(())
        })
    }
}

fn run_pipeline(rt: &Runtime, events: usize, sinks: usize) {
    rt.block_on(async {
        let subject = Arc::new(EventSubject::new("bench"));
        let settings = PipelineSettingsBuilder::new()
            .buffer_size(events * 2)
            .max_batch_size(100)
            .max_batch_delay(Duration::from_millis(5))
            .max_concurrency(4)
            .completion_timeout(Duration::from_secs(30))
            .build()
            .unwrap();

        let mut builder = EventPipelineBuilder::new()
            .settings(settings)
            .input(subject.clone());
        let outputs: Vec<Arc<CountingOutput>> =
            (0..sinks).map(|_| Arc::new(CountingOutput::default())).collect();
        for (i, output) in outputs.iter().enumerate() {
            builder = builder.sink(EventSink::new(format!("sink-{i}"), output.clone()));
        }
        let pipeline = builder.build().unwrap();

        for i in 0..events {
            subject.push(
                EventData::new("bench", LogLevel::Informational).with_payload("Seq", i as u64),
            );
        }
        pipeline.dispose().await.unwrap();

        for output in &outputs {
            assert_eq!(output.events.load(Ordering::Relaxed), events);
        }
    });
}

fn bench_pipeline_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("pipeline_throughput");
    group.sample_size(20);

    for events in [1_000usize, 10_000] {
        group.throughput(Throughput::Elements(events as u64));
        group.bench_with_input(BenchmarkId::new("single_sink", events), &events, |b, &n| {
            b.iter(|| run_pipeline(&rt, n, 1))
        });
        group.bench_with_input(BenchmarkId::new("fan_out_4", events), &events, |b, &n| {
            b.iter(|| run_pipeline(&rt, n, 4))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline_throughput);
criterion_main!(benches);
