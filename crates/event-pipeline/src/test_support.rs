//! 단위 테스트 공용 협력자 구현

use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use diagflow_core::error::{FilterError, OutputError};
use diagflow_core::event::{EventData, LogLevel};
use diagflow_core::health::HealthReporter;
use diagflow_core::pipeline::{BoxFuture, Filter, FilterResult, Output};

/// 보고된 내용을 기록하는 헬스 리포터
#[derive(Default)]
pub struct RecordingReporter {
    pub warnings: Mutex<Vec<(String, Option<String>)>>,
    pub problems: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingReporter {
    pub fn warnings_in(&self, context: &str) -> Vec<String> {
        self.warnings
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| c.as_deref() == Some(context))
            .map(|(d, _)| d.clone())
            .collect()
    }
}

impl HealthReporter for RecordingReporter {
    fn report_healthy(&self, _description: Option<&str>, _context: Option<&str>) {}

    fn report_warning(&self, description: &str, context: Option<&str>) {
        self.warnings
            .lock()
            .unwrap()
            .push((description.to_owned(), context.map(str::to_owned)));
    }

    fn report_problem(&self, description: &str, context: Option<&str>) {
        self.problems
            .lock()
            .unwrap()
            .push((description.to_owned(), context.map(str::to_owned)));
    }
}

/// 받은 배치를 모두 기록하는 출력
#[derive(Default)]
pub struct CollectingOutput {
    pub batches: Mutex<Vec<(u64, Vec<EventData>)>>,
    pub delay: Option<Duration>,
    pub fail_with: Option<String>,
}

impl CollectingOutput {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_owned()),
            ..Self::default()
        }
    }

    pub fn event_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(|(_, b)| b.len()).sum()
    }

    pub fn sequence_numbers(&self) -> Vec<u64> {
        self.batches.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }
}

impl Output for CollectingOutput {
    fn send_events<'a>(
        &'a self,
        events: &'a [EventData],
        transmission_sequence_number: u64,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), OutputError>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(OutputError::Cancelled),
                }
            }
            if let Some(reason) = &self.fail_with {
                return Err(OutputError::Failed(reason.clone()));
            }
            self.batches
                .lock()
                .unwrap()
                .push((transmission_sequence_number, events.to_vec()));
            Ok(())
        })
    }
}

/// `Count` 페이로드가 짝수인 이벤트만 유지하고, `Explode`가 있으면 실패하는 필터
pub struct EvenCountFilter;

impl Filter for EvenCountFilter {
    fn evaluate(&self, event: &mut EventData) -> Result<FilterResult, FilterError> {
        if event.payload.contains_key("Explode") {
            return Err(FilterError::Evaluation("explode".to_owned()));
        }
        let even = event
            .payload
            .get("Count")
            .and_then(|v| v.as_bits())
            .is_some_and(|n| n % 2 == 0);
        Ok(if even {
            FilterResult::KeepEvent
        } else {
            FilterResult::DropEvent
        })
    }
}

/// 페이로드를 변경하고 항상 유지하는 필터
pub struct TaggingFilter(pub &'static str);

impl Filter for TaggingFilter {
    fn evaluate(&self, event: &mut EventData) -> Result<FilterResult, FilterError> {
        event.payload.insert("Tag".to_owned(), self.0.into());
        Ok(FilterResult::KeepEvent)
    }
}

pub fn counted_event(count: u64) -> EventData {
    EventData::new("test", LogLevel::Informational).with_payload("Count", count)
}
