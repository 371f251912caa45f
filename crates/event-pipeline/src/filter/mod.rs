//! 필터 표현식 언어
//!
//! - [`parser`]: 텍스트 표현식을 [`FilterNode`] 트리로 파싱
//! - [`evaluator`]: 불변 AST와 평가
//! - [`comparison`]: 속성 비교 리프 평가기
//! - [`builtin`]: 설정에서 생성되는 `drop` / `include` / `metadata` 필터
//!
//! # 사용 예시
//! ```ignore
//! use diagflow_event_pipeline::filter::FilterParser;
//!
//! let node = FilterParser::parse(r#"Level <= Warning && Message ~= "timeout""#)?;
//! if node.evaluate(&event) {
//!     // ...
//! }
//! ```

pub mod builtin;
pub mod comparison;
pub mod evaluator;
pub mod parser;

pub use builtin::{DropFilter, IncludeFilter, MetadataFilter, register_builtin_filters};
pub use comparison::{ComparisonEvaluator, ComparisonKind, InvalidLiteral, REGEX_TIMEOUT};
pub use evaluator::FilterNode;
pub use parser::FilterParser;
