//! 페이로드 값 -- 이벤트 페이로드에 저장되는 타입 있는 값
//!
//! 필터 평가기는 속성의 런타임 타입을 보고 리터럴 문자열을 같은 타입으로
//! 변환한 뒤 비교합니다. 이를 위해 페이로드 값은 열린 "any" 타입이 아니라
//! 태그드 유니온 [`PayloadValue`]로 표현됩니다.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use uuid::Uuid;

/// 페이로드 값
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    String(String),
    Uuid(Uuid),
    /// 오프셋을 포함한 시각
    Timestamp(DateTime<FixedOffset>),
    /// 명시적 null
    Null,
    /// 위 타입으로 표현되지 않는 구조화된 값 (배열, 객체 등)
    Other(serde_json::Value),
}

impl PayloadValue {
    /// 값의 타입 이름을 반환합니다 (로깅용).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int8(_) => "int8",
            Self::Int16(_) => "int16",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::UInt8(_) => "uint8",
            Self::UInt16(_) => "uint16",
            Self::UInt32(_) => "uint32",
            Self::UInt64(_) => "uint64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
            Self::Null => "null",
            Self::Other(_) => "other",
        }
    }

    /// 문자열 값이면 참조를 반환합니다.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// 정수 타입이면 비트 패턴을 유지한 채 `u64`로 반환합니다.
    ///
    /// 비트 마스크 비교에 사용됩니다. 음수는 2의 보수 비트 패턴으로 변환됩니다.
    pub fn as_bits(&self) -> Option<u64> {
        match *self {
            Self::Int8(v) => Some(v as u64),
            Self::Int16(v) => Some(v as u64),
            Self::Int32(v) => Some(v as u64),
            Self::Int64(v) => Some(v as u64),
            Self::UInt8(v) => Some(u64::from(v)),
            Self::UInt16(v) => Some(u64::from(v)),
            Self::UInt32(v) => Some(u64::from(v)),
            Self::UInt64(v) => Some(v),
            _ => None,
        }
    }

    /// null 값인지 확인합니다.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null) || matches!(self, Self::Other(serde_json::Value::Null))
    }
}

impl fmt::Display for PayloadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int8(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt8(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Null => write!(f, "null"),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PayloadValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    bool => Bool,
    String => String,
    Uuid => Uuid,
    DateTime<FixedOffset> => Timestamp,
);

impl From<&str> for PayloadValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<serde_json::Value> for PayloadValue {
    /// JSON 스칼라는 대응하는 변형으로, 나머지는 [`PayloadValue::Other`]로 변환합니다.
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int64(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt64(u)
                } else {
                    n.as_f64()
                        .map(Self::Float64)
                        .unwrap_or(Self::Other(serde_json::Value::Number(n)))
                }
            }
            other => Self::Other(other),
        }
    }
}
