#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use diagflow_core::event::{EventData, LogLevel};
use diagflow_core::value::PayloadValue;
use diagflow_event_pipeline::{ComparisonEvaluator, ComparisonKind};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    kind: FuzzKind,
    property: String,
    literal: String,
    /// 이벤트 페이로드 (최대 8개로 제한)
    payload: Vec<(String, FuzzValue)>,
}

#[derive(Arbitrary, Debug)]
enum FuzzKind {
    Equality,
    Inequality,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Regex,
    BitwiseEquality,
    HasProperty,
    HasNoProperty,
    IsNull,
}

#[derive(Arbitrary, Debug)]
enum FuzzValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl FuzzKind {
    fn to_kind(&self) -> ComparisonKind {
        match self {
            FuzzKind::Equality => ComparisonKind::Equality,
            FuzzKind::Inequality => ComparisonKind::Inequality,
            FuzzKind::GreaterThan => ComparisonKind::GreaterThan,
            FuzzKind::GreaterOrEqual => ComparisonKind::GreaterOrEqual,
            FuzzKind::LessThan => ComparisonKind::LessThan,
            FuzzKind::LessOrEqual => ComparisonKind::LessOrEqual,
            FuzzKind::Regex => ComparisonKind::Regex,
            FuzzKind::BitwiseEquality => ComparisonKind::BitwiseEquality,
            FuzzKind::HasProperty => ComparisonKind::HasProperty,
            FuzzKind::HasNoProperty => ComparisonKind::HasNoProperty,
            FuzzKind::IsNull => ComparisonKind::IsNull,
        }
    }
}

impl From<FuzzValue> for PayloadValue {
    fn from(value: FuzzValue) -> Self {
        match value {
            FuzzValue::Int(v) => v.into(),
            FuzzValue::UInt(v) => v.into(),
            FuzzValue::Float(v) => v.into(),
            FuzzValue::Bool(v) => v.into(),
            FuzzValue::Text(v) => v.into(),
            FuzzValue::Null => PayloadValue::Null,
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    // 잘못된 리터럴은 생성 에러일 뿐 크래시가 아님
    let Ok(evaluator) =
        ComparisonEvaluator::new(input.kind.to_kind(), &input.property, &input.literal)
    else {
        return;
    };

    let mut event = EventData::new("fuzz", LogLevel::Informational);
    for (key, value) in input.payload.into_iter().take(8) {
        event.payload.insert(key, value.into());
    }

    // 평가는 모든 입력에 대해 bool을 반환해야 함
    let _ = evaluator.evaluate(&event);
});
