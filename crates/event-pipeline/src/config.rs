//! 이벤트 파이프라인 설정
//!
//! [`PipelineSettings`]는 core의
//! [`PipelineSettingsConfig`](diagflow_core::config::PipelineSettingsConfig)를
//! `Duration` 기반의 런타임 설정으로 변환한 것입니다.
//!
//! # 사용 예시
//! ```ignore
//! use diagflow_core::config::DiagflowConfig;
//! use diagflow_event_pipeline::config::PipelineSettings;
//!
//! let core_config = DiagflowConfig::default();
//! let settings = PipelineSettings::from_core(&core_config.pipeline);
//! ```

use std::time::Duration;

use diagflow_core::config::{
    MAX_BATCH_DELAY_MS, MAX_BATCH_SIZE, MAX_BUFFER_SIZE, MAX_COMPLETION_TIMEOUT_MS,
    MAX_CONCURRENCY, PipelineSettingsConfig,
};

use crate::error::EventPipelineError;

/// 파이프라인 런타임 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// 헤드 큐 용량 (이벤트 수)
    pub buffer_size: usize,
    /// 최대 배치 크기
    pub max_batch_size: usize,
    /// 배치 강제 플러시 간격
    pub max_batch_delay: Duration,
    /// 필터/출력 스테이지의 최대 병렬도
    pub max_concurrency: usize,
    /// 드레인 및 완료 대기 제한
    pub completion_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_core(&PipelineSettingsConfig::default())
    }
}

impl PipelineSettings {
    /// core 설정에서 런타임 설정을 생성합니다.
    pub fn from_core(core: &PipelineSettingsConfig) -> Self {
        Self {
            buffer_size: core.buffer_size,
            max_batch_size: core.max_batch_size,
            max_batch_delay: Duration::from_millis(core.max_batch_delay_ms),
            max_concurrency: core.max_concurrency,
            completion_timeout: Duration::from_millis(core.completion_timeout_ms),
        }
    }

    /// 동시에 처리 중일 수 있는 배치 수의 상한
    ///
    /// `max(5 × max_concurrency, buffer_size / max_batch_size)`
    pub fn max_concurrent_batches(&self) -> usize {
        let by_concurrency = self.max_concurrency.saturating_mul(5);
        let by_buffer = self.buffer_size / self.max_batch_size.max(1);
        by_concurrency.max(by_buffer).max(1)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EventPipelineError> {
        check_range("buffer_size", self.buffer_size, MAX_BUFFER_SIZE)?;
        check_range("max_batch_size", self.max_batch_size, MAX_BATCH_SIZE)?;
        if self.max_batch_size > self.buffer_size {
            return Err(config_err("max_batch_size", "must not exceed buffer_size"));
        }
        check_duration(
            "max_batch_delay",
            self.max_batch_delay,
            Duration::from_millis(MAX_BATCH_DELAY_MS),
        )?;
        check_range("max_concurrency", self.max_concurrency, MAX_CONCURRENCY)?;
        check_duration(
            "completion_timeout",
            self.completion_timeout,
            Duration::from_millis(MAX_COMPLETION_TIMEOUT_MS),
        )?;
        Ok(())
    }
}

fn check_range(field: &str, value: usize, max: usize) -> Result<(), EventPipelineError> {
    if value == 0 || value > max {
        return Err(config_err(field, &format!("must be 1-{max}")));
    }
    Ok(())
}

fn check_duration(field: &str, value: Duration, max: Duration) -> Result<(), EventPipelineError> {
    if value.is_zero() || value > max {
        return Err(config_err(
            field,
            &format!("must be between 1ms and {}ms", max.as_millis()),
        ));
    }
    Ok(())
}

fn config_err(field: &str, reason: &str) -> EventPipelineError {
    EventPipelineError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineSettingsBuilder {
    settings: PipelineSettings,
}

impl PipelineSettingsBuilder {
    /// 기본값으로 시작하는 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 헤드 큐 용량을 설정합니다.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.settings.buffer_size = size;
        self
    }

    /// 최대 배치 크기를 설정합니다.
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.settings.max_batch_size = size;
        self
    }

    /// 배치 플러시 간격을 설정합니다.
    pub fn max_batch_delay(mut self, delay: Duration) -> Self {
        self.settings.max_batch_delay = delay;
        self
    }

    /// 최대 병렬도를 설정합니다.
    pub fn max_concurrency(mut self, concurrency: usize) -> Self {
        self.settings.max_concurrency = concurrency;
        self
    }

    /// 완료 대기 제한을 설정합니다.
    pub fn completion_timeout(mut self, timeout: Duration) -> Self {
        self.settings.completion_timeout = timeout;
        self
    }

    /// 설정을 검증하고 `PipelineSettings`를 생성합니다.
    pub fn build(self) -> Result<PipelineSettings, EventPipelineError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
