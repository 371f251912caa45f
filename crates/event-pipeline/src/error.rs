//! 이벤트 파이프라인 에러 타입
//!
//! [`EventPipelineError`]는 파이프라인 구성과 종료 과정에서 발생하는 에러를 표현합니다.
//! `From<EventPipelineError> for DiagflowError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 이벤트 단위의 필터/출력 실패는 에러로 전파되지 않고 헬스 리포터에
//! 경고로 보고됩니다.

use std::fmt;

use diagflow_core::error::{ConfigError, DiagflowError, PipelineError, RegistryError};

/// 이벤트 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EventPipelineError {
    /// 필터 표현식 파싱 실패
    #[error("invalid filter expression '{expression}' at position {position}: {reason}")]
    FilterParse {
        /// 원본 표현식
        expression: String,
        /// 실패 위치 (문자 오프셋)
        position: usize,
        /// 실패 사유
        reason: String,
    },

    /// 필터 구성 실패 (필수 설정 누락 등)
    #[error("filter '{filter}' configuration error: {reason}")]
    FilterConfig {
        /// 필터 종류
        filter: String,
        /// 에러 사유
        reason: String,
    },

    /// 파이프라인 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 컴포넌트 생성 실패
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// 종료 대기 시간 초과
    #[error("pipeline completion timed out after {elapsed_ms}ms")]
    CompletionTimeout {
        /// 대기한 시간 (밀리초)
        elapsed_ms: u64,
    },

    /// 복구 불가능한 스테이지 장애
    #[error("pipeline faulted: {0}")]
    Faulted(String),
}

impl From<EventPipelineError> for DiagflowError {
    fn from(err: EventPipelineError) -> Self {
        match err {
            EventPipelineError::Config { field, reason } => {
                DiagflowError::Config(ConfigError::InvalidValue { field, reason })
            }
            EventPipelineError::Registry(e) => DiagflowError::Registry(e),
            EventPipelineError::Faulted(reason) => {
                DiagflowError::Pipeline(PipelineError::Faulted(reason))
            }
            other => DiagflowError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

/// 큐를 따라 하류로 전파되는 장애 사유
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineFault(pub String);

impl fmt::Display for PipelineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<PipelineFault> for EventPipelineError {
    fn from(fault: PipelineFault) -> Self {
        EventPipelineError::Faulted(fault.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_parse_error_display() {
        let err = EventPipelineError::FilterParse {
            expression: "a == ".to_owned(),
            position: 5,
            reason: "expected a value".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a == "));
        assert!(msg.contains("position 5"));
        assert!(msg.contains("expected a value"));
    }

    #[test]
    fn config_error_converts_to_config() {
        let err = EventPipelineError::Config {
            field: "max_batch_size".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        let diag: DiagflowError = err.into();
        assert!(matches!(
            diag,
            DiagflowError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn fault_converts_to_pipeline_fault() {
        let err: EventPipelineError = PipelineFault("sink exploded".to_owned()).into();
        let diag: DiagflowError = err.into();
        assert!(matches!(
            diag,
            DiagflowError::Pipeline(PipelineError::Faulted(_))
        ));
    }

    #[test]
    fn other_errors_convert_to_init_failed() {
        let err = EventPipelineError::FilterConfig {
            filter: "drop".to_owned(),
            reason: "missing 'include'".to_owned(),
        };
        let diag: DiagflowError = err.into();
        assert!(diag.to_string().contains("missing 'include'"));
    }
}
