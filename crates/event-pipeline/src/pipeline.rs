//! 파이프라인 오케스트레이션 -- 스테이지를 연결하고 생명주기를 관리합니다.
//!
//! # 내부 아키텍처
//! ```text
//! Inputs -> head queue -> Batcher -> [global FilterStage] -> [BroadcastStage]
//!        -> per sink: [FilterStage] -> OutputStage
//! ```
//!
//! 괄호 안의 스테이지는 필요할 때만 생성됩니다 (전역 필터가 있을 때, 싱크가 둘 이상일 때,
//! 싱크에 필터가 있을 때).
//!
//! # 상태
//! `constructing` → `running` → `draining` → `disposed`
//!
//! [`EventPipeline::dispose`]는 입력 구독을 해제하고, 처리 중 이벤트가 0이 될 때까지
//! (또는 완료 제한 시간까지) 기다린 뒤 헤드 큐를 완료하여 모든 스테이지로 완료를 전파합니다.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use diagflow_core::event::EventData;
use diagflow_core::health::{CONTEXT_THROTTLING, HealthReporter, HealthStatus, TracingHealthReporter};
use diagflow_core::metrics as m;
use diagflow_core::pipeline::{EventObserver, Filter, Input, Output, Subscription};

use crate::batcher::Batcher;
use crate::config::PipelineSettings;
use crate::counter::InFlightCounter;
use crate::error::{EventPipelineError, PipelineFault};
use crate::queue::{OfferError, StageQueue, StageReceiver, loss_reporting_queue};
use crate::stage::{BroadcastBranch, BroadcastStage, FilterStage, OutputStage};

/// 드레인 중 처리 중 카운터 확인 간격
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 스테이지 완료 대기의 최소 시간
const MIN_COMPLETION_WAIT: Duration = Duration::from_millis(100);

/// 강제 취소 후 스테이지가 취소를 관찰하고 끝날 때까지 기다리는 시간
const CANCEL_GRACE: Duration = Duration::from_millis(50);

/// 헤드 큐 사용률이 이 값을 넘으면 `Degraded`
const DEGRADED_UTILIZATION: f64 = 0.9;

/// 싱크 -- 출력과 싱크 전용 필터 집합
pub struct EventSink {
    name: String,
    output: Arc<dyn Output>,
    filters: Vec<Arc<dyn Filter>>,
}

impl EventSink {
    pub fn new(name: impl Into<String>, output: Arc<dyn Output>) -> Self {
        Self {
            name: name.into(),
            output,
            filters: Vec::new(),
        }
    }

    /// 싱크 전용 필터를 추가합니다.
    pub fn with_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// 싱크 전용 필터 목록을 설정합니다.
    pub fn with_filters(mut self, filters: Vec<Arc<dyn Filter>>) -> Self {
        self.filters = filters;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 파이프라인 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    /// 스테이지 연결 중
    Constructing,
    /// 실행 중
    Running,
    /// 종료 대기 중
    Draining,
    /// 해제됨
    Disposed,
}

struct StageTask {
    name: String,
    handle: JoinHandle<Result<(), PipelineFault>>,
    joined: bool,
}

/// 이벤트 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use diagflow_event_pipeline::{EventPipelineBuilder, EventSink};
///
/// let pipeline = EventPipelineBuilder::new()
///     .input(input)
///     .sink(EventSink::new("console", output))
///     .build()?;
///
/// // ...
/// pipeline.dispose().await?;
/// ```
pub struct EventPipeline {
    settings: PipelineSettings,
    state: Mutex<PipelineState>,
    head: StageQueue<EventData>,
    counter: InFlightCounter,
    subscriptions: Mutex<Vec<Subscription>>,
    tasks: Mutex<Vec<StageTask>>,
    fault: Arc<Mutex<Option<PipelineFault>>>,
    cancel: CancellationToken,
    health: Arc<dyn HealthReporter>,
    sink_names: Vec<String>,
}

impl EventPipeline {
    /// 현재 상태 이름
    pub fn state_name(&self) -> &'static str {
        match self.state() {
            PipelineState::Constructing => "constructing",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Disposed => "disposed",
        }
    }

    fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// 파이프라인에 들어왔지만 아직 내보내지 않은 이벤트 수
    pub fn events_in_flight(&self) -> i64 {
        self.counter.get()
    }

    /// 런타임 설정
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// 설정된 싱크 이름 목록
    pub fn sink_names(&self) -> &[String] {
        &self.sink_names
    }

    /// 헤드 큐 사용률 (0.0 ~ 1.0)
    pub fn buffer_utilization(&self) -> f64 {
        self.head.utilization()
    }

    /// 기록된 장애 사유
    pub fn fault_reason(&self) -> Option<PipelineFault> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 파이프라인 상태를 점검합니다.
    pub fn health_check(&self) -> HealthStatus {
        if let Some(fault) = self.fault_reason() {
            return HealthStatus::Unhealthy(format!("faulted: {fault}"));
        }
        match self.state() {
            PipelineState::Running => {
                let utilization = self.head.utilization();
                if utilization > DEGRADED_UTILIZATION {
                    HealthStatus::Degraded(format!(
                        "head queue utilization high: {:.1}%",
                        utilization * 100.0
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Constructing => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Draining => HealthStatus::Unhealthy("draining".to_owned()),
            PipelineState::Disposed => HealthStatus::Unhealthy("disposed".to_owned()),
        }
    }

    /// 복구 불가능한 장애를 헤드 큐에 주입합니다.
    ///
    /// 장애는 모든 하류 스테이지로 전파되며 [`dispose`](Self::dispose)는
    /// [`EventPipelineError::Faulted`]를 반환합니다.
    pub fn fault(&self, reason: impl Into<String>) {
        let fault = PipelineFault(reason.into());
        tracing::error!(reason = %fault, "event pipeline faulted");
        record_fault(&self.fault, &fault);
        self.head.fault(fault);
    }

    /// 파이프라인을 드레인하고 해제합니다. 두 번째 호출은 아무것도 하지 않습니다.
    ///
    /// 1. 입력 구독 해제
    /// 2. 처리 중 카운터가 0이 될 때까지 (또는 완료 제한 시간까지) 대기
    /// 3. 헤드 큐 완료 → 모든 스테이지로 완료 전파
    /// 4. `max(100ms, completion_timeout - 드레인 시간)` 동안 스테이지 완료 대기
    /// 5. 공유 취소 토큰 취소 (시간 초과였다면 짧게 한 번 더 대기)
    /// 6. 남은 스테이지 태스크 정리
    pub async fn dispose(&self) -> Result<(), EventPipelineError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                PipelineState::Draining | PipelineState::Disposed => return Ok(()),
                PipelineState::Constructing | PipelineState::Running => {
                    *state = PipelineState::Draining;
                }
            }
        }

        let started = Instant::now();
        tracing::info!(in_flight = self.counter.get(), "disposing event pipeline");

        // 1. 새 이벤트 차단
        let subscriptions = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for subscription in subscriptions {
            subscription.unsubscribe();
        }

        // 2. 드레인
        let completion_timeout = self.settings.completion_timeout;
        while !self.counter.is_idle()
            && started.elapsed() < completion_timeout
            && self.fault_reason().is_none()
        {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        let drain_time = started.elapsed();
        if !self.counter.is_idle() {
            tracing::warn!(
                in_flight = self.counter.get(),
                elapsed_ms = drain_time.as_millis() as u64,
                "drain did not reach zero in-flight events"
            );
        }

        // 3. 완료 전파
        self.head.complete();

        // 4. 스테이지 완료 대기
        let wait = MIN_COMPLETION_WAIT.max(completion_timeout.saturating_sub(drain_time));
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let joined = tokio::time::timeout(wait, join_stages(&mut tasks)).await;

        // 5. 강제 취소. 취소를 관찰한 스테이지는 대기 중이던 손실을 보고하고 끝납니다.
        self.cancel.cancel();
        if joined.is_err() {
            let _ = tokio::time::timeout(CANCEL_GRACE, join_stages(&mut tasks)).await;
        }

        // 6. 정리
        for task in &tasks {
            task.handle.abort();
        }
        self.set_state(PipelineState::Disposed);

        match joined {
            Err(_) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(elapsed_ms, "event pipeline stages did not complete in time");
                Err(EventPipelineError::CompletionTimeout { elapsed_ms })
            }
            Ok(Some(fault)) => Err(fault.into()),
            Ok(None) => {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "event pipeline disposed"
                );
                Ok(())
            }
        }
    }
}

impl Drop for EventPipeline {
    fn drop(&mut self) {
        let state = *self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state == PipelineState::Disposed {
            return;
        }
        tracing::debug!("event pipeline dropped without dispose, forcing teardown");

        let subscriptions = std::mem::take(
            self.subscriptions
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        self.cancel.cancel();
        for task in self
            .tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.handle.abort();
        }
    }
}

/// 모든 스테이지를 기다리고 첫 번째 장애를 반환합니다.
async fn join_stages(tasks: &mut [StageTask]) -> Option<PipelineFault> {
    let mut first_fault = None;
    for task in tasks.iter_mut().filter(|t| !t.joined) {
        let joined = (&mut task.handle).await;
        task.joined = true;
        let outcome = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(fault)) => fault,
            Err(e) => PipelineFault(format!("stage '{}' failed: {e}", task.name)),
        };
        first_fault.get_or_insert(outcome);
    }
    first_fault
}

fn record_fault(slot: &Mutex<Option<PipelineFault>>, fault: &PipelineFault) {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.is_none() {
        *guard = Some(fault.clone());
    }
}

/// 입력 이벤트를 헤드 큐로 넣는 관찰자
struct HeadObserver {
    input: String,
    head: StageQueue<EventData>,
    counter: InFlightCounter,
    health: Arc<dyn HealthReporter>,
}

impl EventObserver for HeadObserver {
    fn on_next(&self, event: EventData) {
        // 배처가 먼저 감소시키지 않도록 넣기 전에 증가
        self.counter.increment(1);
        match self.head.try_offer(event) {
            Ok(()) => {
                metrics::counter!(m::PIPELINE_EVENTS_INGESTED_TOTAL).increment(1);
            }
            Err(OfferError::Full(_)) => {
                self.counter.decrement(1);
                metrics::counter!(m::PIPELINE_EVENTS_THROTTLED_TOTAL, m::LABEL_STAGE => "head")
                    .increment(1);
                self.health.report_warning(
                    &format!(
                        "pipeline buffer is full, event from input '{}' was dropped",
                        self.input
                    ),
                    Some(CONTEXT_THROTTLING),
                );
            }
            Err(OfferError::Closed(_)) => {
                self.counter.decrement(1);
                tracing::debug!(input = %self.input, "pipeline is closed, event dropped");
            }
        }
    }

    fn on_completed(&self) {
        tracing::debug!(input = %self.input, "input completed");
    }

    fn on_error(&self, error: &str) {
        self.health
            .report_warning(&format!("input '{}' failed: {error}", self.input), None);
    }
}

/// 스테이지 태스크를 생성하고 연결하는 도우미
struct StageSpawner {
    cancel: CancellationToken,
    counter: InFlightCounter,
    health: Arc<dyn HealthReporter>,
    fault: Arc<Mutex<Option<PipelineFault>>>,
    queue_capacity: usize,
    max_concurrency: usize,
    tasks: Vec<StageTask>,
}

impl StageSpawner {
    fn spawn<F>(&mut self, name: impl Into<String>, stage: F)
    where
        F: Future<Output = Result<(), PipelineFault>> + Send + 'static,
    {
        let name = name.into();
        let slot = Arc::clone(&self.fault);
        let stage_name = name.clone();
        let handle = tokio::spawn(async move {
            let result = stage.await;
            if let Err(fault) = &result {
                tracing::warn!(stage = %stage_name, reason = %fault, "pipeline stage faulted");
                record_fault(&slot, fault);
            }
            result
        });
        self.tasks.push(StageTask {
            name,
            handle,
            joined: false,
        });
    }

    /// 스테이지 사이의 큐. 대기하다 버려진 배치는 한 번만 스로틀링으로 보고됩니다.
    fn queue<T>(&self, name: impl Into<String>) -> (StageQueue<T>, StageReceiver<T>) {
        loss_reporting_queue(
            name,
            self.queue_capacity,
            self.cancel.clone(),
            Arc::clone(&self.health),
        )
    }

    fn filter_stage(&self, name: &str, filters: Vec<Arc<dyn Filter>>) -> FilterStage {
        FilterStage::new(
            name,
            filters,
            self.counter.clone(),
            Arc::clone(&self.health),
            self.max_concurrency,
        )
    }

    /// 싱크 전용 필터 스테이지(있으면)와 출력 스테이지를 연결합니다.
    fn wire_sink(&mut self, sink: EventSink, mut upstream: StageReceiver<Vec<EventData>>) {
        if !sink.filters.is_empty() {
            let stage_name = format!("{}-filters", sink.name);
            let (queue, rx) = self.queue(stage_name.clone());
            let stage = self.filter_stage(&sink.name, sink.filters);
            self.spawn(stage_name, stage.run(upstream, queue));
            upstream = rx;
        }

        let stage = OutputStage::new(
            sink.name.clone(),
            sink.output,
            self.counter.clone(),
            Arc::clone(&self.health),
            self.cancel.clone(),
            self.max_concurrency,
        );
        self.spawn(format!("{}-output", sink.name), stage.run(upstream));
    }
}

/// 이벤트 파이프라인 빌더
///
/// `build()`는 스테이지 태스크를 생성하므로 tokio 런타임 안에서 호출해야 합니다.
pub struct EventPipelineBuilder {
    settings: PipelineSettings,
    inputs: Vec<Arc<dyn Input>>,
    global_filters: Vec<Arc<dyn Filter>>,
    sinks: Vec<EventSink>,
    health: Option<Arc<dyn HealthReporter>>,
}

impl EventPipelineBuilder {
    pub fn new() -> Self {
        Self {
            settings: PipelineSettings::default(),
            inputs: Vec::new(),
            global_filters: Vec::new(),
            sinks: Vec::new(),
            health: None,
        }
    }

    /// 런타임 설정을 지정합니다.
    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 입력을 추가합니다.
    pub fn input(mut self, input: Arc<dyn Input>) -> Self {
        self.inputs.push(input);
        self
    }

    /// 전역 필터를 추가합니다.
    pub fn global_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.global_filters.push(filter);
        self
    }

    /// 싱크를 추가합니다.
    pub fn sink(mut self, sink: EventSink) -> Self {
        self.sinks.push(sink);
        self
    }

    /// 헬스 리포터를 지정합니다. 지정하지 않으면 [`TracingHealthReporter`]를 사용합니다.
    pub fn health_reporter(mut self, health: Arc<dyn HealthReporter>) -> Self {
        self.health = Some(health);
        self
    }

    /// 스테이지를 연결하고 입력을 구독시켜 실행 중인 파이프라인을 만듭니다.
    pub fn build(self) -> Result<EventPipeline, EventPipelineError> {
        self.settings.validate()?;
        if self.sinks.is_empty() {
            return Err(EventPipelineError::Config {
                field: "outputs".to_owned(),
                reason: "at least one sink is required".to_owned(),
            });
        }

        let settings = self.settings;
        let health = self
            .health
            .unwrap_or_else(|| Arc::new(TracingHealthReporter) as Arc<dyn HealthReporter>);
        let cancel = CancellationToken::new();
        let counter = InFlightCounter::new();
        let fault = Arc::new(Mutex::new(None));

        let mut spawner = StageSpawner {
            cancel: cancel.clone(),
            counter: counter.clone(),
            health: Arc::clone(&health),
            fault: Arc::clone(&fault),
            queue_capacity: settings.max_concurrent_batches(),
            max_concurrency: settings.max_concurrency,
            tasks: Vec::new(),
        };

        let (head, head_rx) = loss_reporting_queue(
            "head",
            settings.buffer_size,
            cancel.clone(),
            Arc::clone(&health),
        );

        let (batches, mut upstream) = spawner.queue("batches");
        let batcher = Batcher::new(settings.max_batch_size, settings.max_batch_delay);
        spawner.spawn("batcher", batcher.run(head_rx, batches));

        if !self.global_filters.is_empty() {
            let (queue, rx) = spawner.queue("global-filters");
            let stage = spawner.filter_stage("global", self.global_filters);
            spawner.spawn("global-filters", stage.run(upstream, queue));
            upstream = rx;
        }

        let sink_names: Vec<String> = self.sinks.iter().map(|s| s.name.clone()).collect();
        let mut sinks = self.sinks;

        if sinks.len() == 1 {
            if let Some(sink) = sinks.pop() {
                spawner.wire_sink(sink, upstream);
            }
        } else {
            let mut branches = Vec::with_capacity(sinks.len());
            let mut receivers = Vec::with_capacity(sinks.len());
            for sink in sinks {
                let (queue, rx) = spawner.queue(format!("{}-branch", sink.name));
                branches.push(BroadcastBranch::new(sink.name.clone(), queue));
                receivers.push((sink, rx));
            }
            let broadcast = BroadcastStage::new(
                branches,
                counter.clone(),
                Arc::clone(&health),
                settings.max_batch_delay,
            );
            spawner.spawn("broadcast", broadcast.run(upstream));
            for (sink, rx) in receivers {
                spawner.wire_sink(sink, rx);
            }
        }

        let pipeline = EventPipeline {
            settings,
            state: Mutex::new(PipelineState::Constructing),
            head,
            counter,
            subscriptions: Mutex::new(Vec::new()),
            tasks: Mutex::new(spawner.tasks),
            fault,
            cancel,
            health,
            sink_names,
        };

        let subscriptions: Vec<Subscription> = self
            .inputs
            .iter()
            .map(|input| {
                let observer = HeadObserver {
                    input: input.name().to_owned(),
                    head: pipeline.head.clone(),
                    counter: pipeline.counter.clone(),
                    health: Arc::clone(&pipeline.health),
                };
                input.subscribe(Arc::new(observer))
            })
            .collect();

        *pipeline
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = subscriptions;
        pipeline.set_state(PipelineState::Running);

        tracing::info!(
            inputs = self.inputs.len(),
            sinks = pipeline.sink_names.len(),
            buffer_size = pipeline.settings.buffer_size,
            max_batch_size = pipeline.settings.max_batch_size,
            "event pipeline started"
        );
        Ok(pipeline)
    }
}

impl Default for EventPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
