//! 필터 표현식 벤치마크
//!
//! 표현식 파싱과 이벤트 평가의 처리량을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use diagflow_core::event::{EventData, LogLevel};
use diagflow_event_pipeline::FilterParser;

/// 단일 비교
const SIMPLE: &str = "Level <= Warning";

/// 복합 조건 (AND/OR/NOT, 정규식 포함)
const COMPOUND: &str = r#"(ProviderName == "Microsoft-Windows-Kernel" && Level <= Error) || (!(Message ~= "^heartbeat") && Keywords &== 0x10 && hasproperty(ActivityId))"#;

fn create_event() -> EventData {
    EventData::new("Microsoft-Windows-Kernel", LogLevel::Warning)
        .with_keywords(0x30)
        .with_payload("Message", "disk latency above threshold")
        .with_payload("ActivityId", "9f2b3c1a")
        .with_payload("DurationMs", 245u32)
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_parse");
    group.throughput(Throughput::Elements(1));

    for (name, expression) in [("simple", SIMPLE), ("compound", COMPOUND)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), expression, |b, expr| {
            b.iter(|| FilterParser::parse(black_box(expr)).unwrap())
        });
    }

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let event = create_event();
    let mut group = c.benchmark_group("filter_evaluate");
    group.throughput(Throughput::Elements(1));

    for (name, expression) in [("simple", SIMPLE), ("compound", COMPOUND)] {
        let node = FilterParser::parse(expression).unwrap();
        group.bench_function(name, |b| b.iter(|| node.evaluate(black_box(&event))));
    }

    group.finish();
}

fn bench_evaluate_scaling(c: &mut Criterion) {
    let event = create_event();
    let mut group = c.benchmark_group("filter_evaluate_scaling");

    // 비교 N개를 OR로 연결, 마지막 항만 일치
    for count in [1usize, 8, 32, 128] {
        let expression = (0..count)
            .map(|i| {
                if i + 1 == count {
                    "DurationMs == 245".to_owned()
                } else {
                    format!("DurationMs == {}", 1000 + i)
                }
            })
            .collect::<Vec<_>>()
            .join(" || ");
        let node = FilterParser::parse(&expression).unwrap();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &node, |b, node| {
            b.iter(|| node.evaluate(black_box(&event)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_evaluate, bench_evaluate_scaling);
criterion_main!(benches);
