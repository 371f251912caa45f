//! 파이프라인 스테이지
//!
//! 각 스테이지는 상류 [`StageReceiver`](crate::queue::StageReceiver)에서 읽어
//! 하류 [`StageQueue`](crate::queue::StageQueue)로 쓰는 하나의 tokio 태스크입니다.
//! 상류가 완료되면 하류를 완료하고, 장애는 그대로 하류로 전파합니다.

pub mod broadcast;
pub mod filter_stage;
pub mod output_stage;

pub use broadcast::{BroadcastBranch, BroadcastStage};
pub use filter_stage::FilterStage;
pub use output_stage::OutputStage;
