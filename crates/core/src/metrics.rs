//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 파이프라인 스테이지는 이 상수를 사용하여 `metrics::counter!()`,
//! `metrics::gauge!()`, `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `diagflow_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(diagflow_core::metrics::PIPELINE_EVENTS_INGESTED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 싱크 이름 레이블 키
pub const LABEL_SINK: &str = "sink";

/// 스로틀링 위치 레이블 키 (head, broadcast, 큐 이름)
pub const LABEL_STAGE: &str = "stage";

// ─── Pipeline 메트릭 ────────────────────────────────────────────────

/// 파이프라인에 수신된 이벤트 수 (counter)
pub const PIPELINE_EVENTS_INGESTED_TOTAL: &str = "diagflow_pipeline_events_ingested_total";

/// 용량 초과로 버려진 이벤트 수 (counter, label: stage)
pub const PIPELINE_EVENTS_THROTTLED_TOTAL: &str = "diagflow_pipeline_events_throttled_total";

/// 필터에 의해 제거된 이벤트 수 (counter)
pub const PIPELINE_EVENTS_FILTERED_TOTAL: &str = "diagflow_pipeline_events_filtered_total";

/// 팬아웃 분기가 소비하지 못해 잃어버린 이벤트 수 (counter, label: sink)
pub const PIPELINE_BROADCAST_EVENTS_LOST_TOTAL: &str =
    "diagflow_pipeline_broadcast_events_lost_total";

/// 싱크로 전송된 배치 수 (counter, label: sink)
pub const PIPELINE_BATCHES_SENT_TOTAL: &str = "diagflow_pipeline_batches_sent_total";

/// 싱크 전송 실패 수 (counter, label: sink)
pub const PIPELINE_OUTPUT_FAILURES_TOTAL: &str = "diagflow_pipeline_output_failures_total";

/// 파이프라인 내 처리 중인 이벤트 수 (gauge)
pub const PIPELINE_EVENTS_IN_FLIGHT: &str = "diagflow_pipeline_events_in_flight";

/// 배치 전송 소요 시간 (histogram, 초, label: sink)
pub const PIPELINE_BATCH_SEND_DURATION_SECONDS: &str =
    "diagflow_pipeline_batch_send_duration_seconds";

// ─── Filter 메트릭 ──────────────────────────────────────────────────

/// 정규식 평가 시간 제한 초과 수 (counter)
pub const FILTER_REGEX_TIMEOUTS_TOTAL: &str = "diagflow_filter_regex_timeouts_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 배치 전송 시간 히스토그램 버킷 (초)
///
/// 1ms ~ 30s 범위 (원격 싱크의 네트워크 왕복 포함)
pub const BATCH_SEND_DURATION_BUCKETS: [f64; 10] =
    [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `diagflow-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        PIPELINE_EVENTS_INGESTED_TOTAL,
        "Total number of events accepted from inputs"
    );
    describe_counter!(
        PIPELINE_EVENTS_THROTTLED_TOTAL,
        "Total number of events dropped because a bounded queue was full"
    );
    describe_counter!(
        PIPELINE_EVENTS_FILTERED_TOTAL,
        "Total number of events removed by filters"
    );
    describe_counter!(
        PIPELINE_BROADCAST_EVENTS_LOST_TOTAL,
        "Total number of events lost because a sink branch did not keep up"
    );
    describe_counter!(
        PIPELINE_BATCHES_SENT_TOTAL,
        "Total number of non-empty batches handed to sinks"
    );
    describe_counter!(
        PIPELINE_OUTPUT_FAILURES_TOTAL,
        "Total number of sink send failures"
    );
    describe_gauge!(
        PIPELINE_EVENTS_IN_FLIGHT,
        "Current number of events inside the pipeline"
    );
    describe_histogram!(
        PIPELINE_BATCH_SEND_DURATION_SECONDS,
        "Time spent in a single sink send call in seconds"
    );
    describe_counter!(
        FILTER_REGEX_TIMEOUTS_TOTAL,
        "Total number of regex matches abandoned for exceeding the time limit"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        PIPELINE_EVENTS_INGESTED_TOTAL,
        PIPELINE_EVENTS_THROTTLED_TOTAL,
        PIPELINE_EVENTS_FILTERED_TOTAL,
        PIPELINE_BROADCAST_EVENTS_LOST_TOTAL,
        PIPELINE_BATCHES_SENT_TOTAL,
        PIPELINE_OUTPUT_FAILURES_TOTAL,
        PIPELINE_EVENTS_IN_FLIGHT,
        PIPELINE_BATCH_SEND_DURATION_SECONDS,
        FILTER_REGEX_TIMEOUTS_TOTAL,
    ];

    #[test]
    fn all_metrics_start_with_diagflow_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("diagflow_"),
                "Metric '{}' does not start with 'diagflow_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_end_with_total() {
        for name in ALL_METRIC_NAMES {
            if *name == PIPELINE_EVENTS_IN_FLIGHT || *name == PIPELINE_BATCH_SEND_DURATION_SECONDS {
                continue;
            }
            assert!(name.ends_with("_total"), "Counter '{}' must end with _total", name);
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_SINK, LABEL_STAGE] {
            assert_eq!(label.to_lowercase(), label);
        }
    }

    #[test]
    fn send_duration_buckets_are_sorted() {
        let buckets = BATCH_SEND_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(
                buckets[i] > buckets[i - 1],
                "Bucket values must be in ascending order"
            );
        }
    }
}
