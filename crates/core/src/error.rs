//! 에러 타입 -- 계층별 에러 정의
//!
//! [`DiagflowError`]는 최상위 에러이며, 설정/파이프라인/레지스트리 에러를
//! `#[from]`으로 감싸 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//! [`FilterError`]와 [`OutputError`]는 협력자(필터, 출력)가 반환하는 에러로,
//! 파이프라인은 이들을 스테이지 경계에서 잡아 경고로 보고합니다.

/// Diagflow 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum DiagflowError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 컴포넌트 레지스트리 에러
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 구성 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 복구 불가능한 스테이지 장애
    #[error("pipeline faulted: {0}")]
    Faulted(String),

    /// 이미 해제된 파이프라인
    #[error("pipeline already disposed")]
    AlreadyDisposed,
}

/// 컴포넌트 레지스트리 에러
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// 동일한 이름이 이미 등록됨
    #[error("{category} '{kind}' is already registered")]
    AlreadyRegistered { category: String, kind: String },

    /// 등록되지 않은 컴포넌트 종류
    #[error("unknown {category} type '{kind}'")]
    UnknownComponent { category: String, kind: String },

    /// 컴포넌트 설정이 잘못됨
    #[error("invalid settings for {category} '{kind}': {reason}")]
    InvalidSettings {
        category: String,
        kind: String,
        reason: String,
    },
}

/// 필터 평가 에러
///
/// 필터 스테이지는 이 에러를 "유지 투표를 하지 않음"으로 취급합니다.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// 평가 실패
    #[error("filter evaluation failed: {0}")]
    Evaluation(String),
}

/// 출력(싱크) 전송 에러
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// 취소 토큰에 의해 전송이 중단됨
    #[error("send cancelled")]
    Cancelled,

    /// 전송 실패
    #[error("send failed: {0}")]
    Failed(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
