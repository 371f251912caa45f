//! Diagflow 공통 크레이트
//!
//! 파이프라인을 통과하는 이벤트 레코드와, 파이프라인이 외부 협력자
//! (입력, 필터, 출력, 헬스 리포터)와 통신하기 위한 trait을 정의합니다.
//!
//! # 모듈 구성
//!
//! - [`event`]: 이벤트 레코드 ([`EventData`]), 로그 레벨, 메타데이터
//! - [`value`]: 페이로드 값 태그드 유니온 ([`PayloadValue`])
//! - [`pipeline`]: 입력/필터/출력 협력자 trait
//! - [`health`]: 헬스 리포터 trait 및 tracing 기반 구현
//! - [`subject`]: 다중 구독 입력 헬퍼 ([`EventSubject`])
//! - [`registry`]: 설정 이름 → 컴포넌트 팩토리 레지스트리
//! - [`config`]: `diagflow.toml` 설정
//! - [`metrics`]: 메트릭 이름 상수
//! - [`error`]: 에러 타입

pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod subject;
pub mod value;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    ConfigError, DiagflowError, FilterError, OutputError, PipelineError, RegistryError,
};

// 설정
pub use config::{ComponentConfig, DiagflowConfig, PipelineSettingsConfig, SinkConfig};

// 이벤트
pub use event::{EventData, EventMetadata, LogLevel};
pub use value::PayloadValue;

// 협력자 trait
pub use health::{HealthReporter, HealthStatus, TracingHealthReporter};
pub use pipeline::{BoxFuture, EventObserver, Filter, FilterResult, Input, Output, Subscription};

// 레지스트리
pub use registry::ComponentRegistry;
pub use subject::EventSubject;
