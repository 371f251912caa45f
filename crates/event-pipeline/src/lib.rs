//! Diagflow 이벤트 파이프라인 -- 배치/백프레셔 엔진과 필터 표현식 언어
//!
//! # 모듈 구성
//!
//! - [`filter`]: 필터 표현식 파서, 평가기, 내장 필터 (`drop`, `include`, `metadata`)
//! - [`queue`]: 유한 스테이지 큐 (완료/장애 전파, 손실 보고 변형)
//! - [`batcher`]: 크기/시간 기반 배처
//! - [`stage`]: 필터, 팬아웃, 출력 스테이지
//! - [`pipeline`]: 스테이지 연결과 생명주기 (드레인, 해제, 헬스 체크)
//! - [`factory`]: 설정 + 레지스트리로 파이프라인 조립
//! - [`counter`]: 처리 중 이벤트 카운터
//! - [`config`]: 파이프라인 런타임 설정
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Inputs -> head queue -> Batcher -> [global filters] -> [broadcast]
//!                                                          |
//!                                  per sink: [sink filters] -> Output
//! ```

pub mod batcher;
pub mod config;
pub mod counter;
pub mod error;
pub mod factory;
pub mod filter;
pub mod pipeline;
pub mod queue;
pub mod stage;

#[cfg(test)]
mod test_support;

// --- 주요 타입 re-export ---

// 파이프라인
pub use factory::PipelineFactory;
pub use pipeline::{EventPipeline, EventPipelineBuilder, EventSink};

// 설정
pub use config::{PipelineSettings, PipelineSettingsBuilder};

// 에러
pub use error::{EventPipelineError, PipelineFault};

// 필터 언어
pub use filter::{
    ComparisonEvaluator, ComparisonKind, DropFilter, FilterNode, FilterParser, IncludeFilter,
    MetadataFilter, register_builtin_filters,
};

// 스테이지 구성 요소
pub use batcher::Batcher;
pub use counter::InFlightCounter;
pub use queue::{OfferError, StageQueue, StageReceiver, loss_reporting_queue, stage_queue};
