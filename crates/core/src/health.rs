//! 헬스 리포터 -- 파이프라인이 운영 상태를 외부에 알리는 통로
//!
//! 파이프라인은 스로틀링 손실, 필터/출력 예외, 설정 오류를
//! [`HealthReporter`]를 통해 보고합니다. 리포터는 절대 파이프라인으로
//! 에러를 되던지지 않습니다.

use std::fmt;

use serde::Serialize;

/// 스로틀링(용량 초과) 손실 컨텍스트
pub const CONTEXT_THROTTLING: &str = "Throttling";
/// 필터 평가 컨텍스트
pub const CONTEXT_FILTERING: &str = "Filtering";
/// 출력 전송 컨텍스트
pub const CONTEXT_OUTPUT: &str = "Output";
/// 설정 오류 컨텍스트
pub const CONTEXT_CONFIGURATION: &str = "Configuration";
/// 이벤트 생성 컨텍스트 (페이로드 키 충돌 등)
pub const CONTEXT_EVENT_CONSTRUCTION: &str = "EventConstruction";

/// 헬스 리포터 협력자 trait
pub trait HealthReporter: Send + Sync {
    /// 정상 상태를 보고합니다.
    fn report_healthy(&self, description: Option<&str>, context: Option<&str>);

    /// 복구 가능한 문제를 경고로 보고합니다.
    fn report_warning(&self, description: &str, context: Option<&str>);

    /// 심각한 문제를 보고합니다.
    fn report_problem(&self, description: &str, context: Option<&str>);
}

/// `tracing` 매크로로 상태를 기록하는 기본 리포터
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHealthReporter;

impl HealthReporter for TracingHealthReporter {
    fn report_healthy(&self, description: Option<&str>, context: Option<&str>) {
        tracing::debug!(
            context = context.unwrap_or_default(),
            description = description.unwrap_or_default(),
            "health: healthy"
        );
    }

    fn report_warning(&self, description: &str, context: Option<&str>) {
        tracing::warn!(context = context.unwrap_or_default(), "{description}");
    }

    fn report_problem(&self, description: &str, context: Option<&str>) {
        tracing::error!(context = context.unwrap_or_default(), "{description}");
    }
}

/// 컴포넌트 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    /// 정상 동작
    Healthy,
    /// 동작하지만 성능 저하 (사유 포함)
    Degraded(String),
    /// 동작 불가 (사유 포함)
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}
