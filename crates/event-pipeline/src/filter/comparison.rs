//! 속성 비교 평가기 -- 필터 표현식 AST의 리프 노드
//!
//! [`ComparisonEvaluator`]는 (속성 이름, 리터럴 문자열) 쌍과 연산자 종류를 가지며,
//! 이벤트에서 속성을 찾아 리터럴을 속성의 런타임 타입으로 변환한 뒤 비교합니다.
//!
//! # 속성 조회 순서
//! 1. 잘 알려진 필드 (`Timestamp`, `ProviderName`, `Level`, `Keywords`, 대소문자 무시)
//! 2. 페이로드 (정확히 일치하는 키, 없으면 대소문자 무시)
//!
//! # 평가 규칙
//! - 리터럴 변환 실패 또는 속성 없음 ⇒ `false` (평가는 절대 실패하지 않음)
//! - 문자열 비교는 소문자 변환 후 서수 비교
//! - 정규식은 문자열 속성에만 적용되며 [`REGEX_TIMEOUT`]을 넘기면 `false`

use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{
    DateTime, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
};
use regex::{Regex, RegexBuilder};
use uuid::Uuid;

use diagflow_core::event::{EventData, LogLevel};
use diagflow_core::metrics as m;
use diagflow_core::value::PayloadValue;

/// 정규식 매칭 시간 제한
pub const REGEX_TIMEOUT: Duration = Duration::from_millis(100);

/// 컴파일된 정규식의 최대 크기 (바이트)
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// 비교 연산자 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonKind {
    /// `==`
    Equality,
    /// `!=`
    Inequality,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessOrEqual,
    /// `~=`
    Regex,
    /// `&==`
    BitwiseEquality,
    /// `hasproperty(Name)`
    HasProperty,
    /// `hasnoproperty(Name)`
    HasNoProperty,
    /// `Name == null`
    IsNull,
}

impl ComparisonKind {
    /// 시맨틱 문자열에 쓰이는 평가기 이름
    pub fn evaluator_name(self) -> &'static str {
        match self {
            Self::Equality => "EqualityEvaluator",
            Self::Inequality => "InequalityEvaluator",
            Self::GreaterThan => "GreaterThanEvaluator",
            Self::GreaterOrEqual => "GreaterOrEqualEvaluator",
            Self::LessThan => "LessThanEvaluator",
            Self::LessOrEqual => "LessOrEqualEvaluator",
            Self::Regex => "RegexEvaluator",
            Self::BitwiseEquality => "BitwiseEqualityEvaluator",
            Self::HasProperty => "HasPropertyEvaluator",
            Self::HasNoProperty => "HasNoPropertyEvaluator",
            Self::IsNull => "IsNullEvaluator",
        }
    }

    /// 연산자 토큰 (구조 검사 연산자는 `None`)
    pub fn operator(self) -> Option<&'static str> {
        match self {
            Self::Equality | Self::IsNull => Some("=="),
            Self::Inequality => Some("!="),
            Self::GreaterThan => Some(">"),
            Self::GreaterOrEqual => Some(">="),
            Self::LessThan => Some("<"),
            Self::LessOrEqual => Some("<="),
            Self::Regex => Some("~="),
            Self::BitwiseEquality => Some("&=="),
            Self::HasProperty | Self::HasNoProperty => None,
        }
    }

    /// 연산자 토큰에서 종류를 찾습니다.
    pub fn from_operator(token: &str) -> Option<Self> {
        match token {
            "==" => Some(Self::Equality),
            "!=" => Some(Self::Inequality),
            ">" => Some(Self::GreaterThan),
            ">=" => Some(Self::GreaterOrEqual),
            "<" => Some(Self::LessThan),
            "<=" => Some(Self::LessOrEqual),
            "~=" => Some(Self::Regex),
            "&==" => Some(Self::BitwiseEquality),
            _ => None,
        }
    }
}

/// 평가기 생성 시 리터럴이 연산자와 맞지 않음
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvalidLiteral(pub String);

/// 연산자별로 미리 준비된 리터럴
#[derive(Clone)]
enum Prepared {
    /// 값 비교: 소문자 리터럴을 함께 보관
    Value { lowered: String },
    /// 비트 마스크
    Mask(u64),
    /// 정규식 (잘못된 패턴이면 `None`, 항상 불일치)
    Pattern(Option<Regex>),
    /// 구조 검사
    Structural,
}

/// 속성 비교 평가기
#[derive(Clone)]
pub struct ComparisonEvaluator {
    kind: ComparisonKind,
    property: String,
    literal: String,
    prepared: Prepared,
}

impl ComparisonEvaluator {
    /// 평가기를 생성합니다.
    ///
    /// - `BitwiseEquality`: 리터럴은 10진수 또는 `0x` 16진수 정수여야 합니다.
    /// - `IsNull`: 리터럴은 `null`이어야 합니다.
    /// - `Regex`: 잘못된 패턴은 에러가 아니라 경고 후 항상 불일치로 처리됩니다.
    pub fn new(
        kind: ComparisonKind,
        property: impl Into<String>,
        literal: impl Into<String>,
    ) -> Result<Self, InvalidLiteral> {
        let property = property.into();
        let literal = literal.into();

        let prepared = match kind {
            ComparisonKind::BitwiseEquality => {
                let mask = parse_int_literal(&literal).ok_or_else(|| {
                    InvalidLiteral(format!(
                        "bitwise literal '{literal}' must be a decimal or 0x-prefixed hexadecimal integer"
                    ))
                })?;
                Prepared::Mask(mask)
            }
            ComparisonKind::Regex => {
                let regex = RegexBuilder::new(&literal)
                    .size_limit(REGEX_SIZE_LIMIT)
                    .build();
                match regex {
                    Ok(regex) => Prepared::Pattern(Some(regex)),
                    Err(e) => {
                        tracing::warn!(
                            property = %property,
                            pattern = %literal,
                            error = %e,
                            "invalid regex in filter expression, comparison will never match"
                        );
                        Prepared::Pattern(None)
                    }
                }
            }
            ComparisonKind::IsNull => {
                if !literal.eq_ignore_ascii_case("null") {
                    return Err(InvalidLiteral(format!(
                        "is-null comparison requires the literal 'null', found '{literal}'"
                    )));
                }
                Prepared::Structural
            }
            ComparisonKind::HasProperty | ComparisonKind::HasNoProperty => Prepared::Structural,
            _ => Prepared::Value {
                lowered: literal.to_lowercase(),
            },
        };

        Ok(Self {
            kind,
            property,
            literal,
            prepared,
        })
    }

    /// 연산자 종류
    pub fn kind(&self) -> ComparisonKind {
        self.kind
    }

    /// 속성 이름
    pub fn property(&self) -> &str {
        &self.property
    }

    /// 리터럴 문자열
    pub fn literal(&self) -> &str {
        &self.literal
    }

    /// 이벤트에 대해 평가합니다. 절대 실패하지 않습니다.
    pub fn evaluate(&self, event: &EventData) -> bool {
        let operand = lookup(event, &self.property);

        match (&self.prepared, self.kind) {
            (Prepared::Structural, ComparisonKind::HasProperty) => operand.is_some(),
            (Prepared::Structural, ComparisonKind::HasNoProperty) => operand.is_none(),
            (Prepared::Structural, _) => match operand {
                None => true,
                Some(Operand::Value(v)) => v.is_null(),
                Some(_) => false,
            },
            (Prepared::Mask(mask), _) => operand
                .and_then(|o| o.as_bits())
                .is_some_and(|bits| bits & mask == *mask),
            (Prepared::Pattern(regex), _) => match (regex, operand) {
                (Some(regex), Some(operand)) => operand
                    .as_str()
                    .is_some_and(|s| match_with_timeout(regex, s)),
                _ => false,
            },
            (Prepared::Value { lowered }, kind) => {
                let Some(ordering) = operand.and_then(|o| o.compare(&self.literal, lowered))
                else {
                    return false;
                };
                match kind {
                    ComparisonKind::Equality => ordering == Ordering::Equal,
                    ComparisonKind::Inequality => ordering != Ordering::Equal,
                    ComparisonKind::GreaterThan => ordering == Ordering::Greater,
                    ComparisonKind::GreaterOrEqual => ordering != Ordering::Less,
                    ComparisonKind::LessThan => ordering == Ordering::Less,
                    ComparisonKind::LessOrEqual => ordering != Ordering::Greater,
                    _ => false,
                }
            }
        }
    }

    /// 디버그/테스트용 시맨틱 문자열
    pub fn semantics_string(&self) -> String {
        let name = self.kind.evaluator_name();
        match self.kind.operator() {
            Some(op) => format!("(__{name}:{}{op}{})", self.property, self.literal),
            None => format!("(__{name}:{})", self.property),
        }
    }
}

impl fmt::Debug for ComparisonEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.semantics_string())
    }
}

/// 이벤트에서 찾은 속성 값
enum Operand<'a> {
    Timestamp(DateTime<FixedOffset>),
    ProviderName(&'a str),
    Level(LogLevel),
    Keywords(u64),
    Value(&'a PayloadValue),
}

impl Operand<'_> {
    fn as_str(&self) -> Option<&str> {
        match self {
            Self::ProviderName(s) => Some(*s),
            Self::Value(v) => v.as_str(),
            _ => None,
        }
    }

    fn as_bits(&self) -> Option<u64> {
        match self {
            Self::Keywords(k) => Some(*k),
            Self::Level(l) => Some(u64::from(l.as_number())),
            Self::Value(v) => v.as_bits(),
            _ => None,
        }
    }

    /// 리터럴을 이 값의 타입으로 변환해 비교합니다 (`self`가 왼쪽).
    fn compare(&self, literal: &str, lowered: &str) -> Option<Ordering> {
        match self {
            Self::Timestamp(ts) => parse_timestamp(literal).map(|lit| ts.cmp(&lit)),
            Self::ProviderName(s) => Some(s.to_lowercase().as_str().cmp(lowered)),
            Self::Level(level) => LogLevel::from_str_loose(literal).map(|lit| level.cmp(&lit)),
            Self::Keywords(k) => parse_int_literal(literal).map(|lit| k.cmp(&lit)),
            Self::Value(value) => compare_value(value, literal, lowered),
        }
    }
}

fn compare_value(value: &PayloadValue, literal: &str, lowered: &str) -> Option<Ordering> {
    let lit = literal.trim();
    match value {
        PayloadValue::Int8(v) => lit.parse::<i8>().ok().map(|l| v.cmp(&l)),
        PayloadValue::Int16(v) => lit.parse::<i16>().ok().map(|l| v.cmp(&l)),
        PayloadValue::Int32(v) => lit.parse::<i32>().ok().map(|l| v.cmp(&l)),
        PayloadValue::Int64(v) => lit.parse::<i64>().ok().map(|l| v.cmp(&l)),
        PayloadValue::UInt8(v) => lit.parse::<u8>().ok().map(|l| v.cmp(&l)),
        PayloadValue::UInt16(v) => lit.parse::<u16>().ok().map(|l| v.cmp(&l)),
        PayloadValue::UInt32(v) => lit.parse::<u32>().ok().map(|l| v.cmp(&l)),
        PayloadValue::UInt64(v) => lit.parse::<u64>().ok().map(|l| v.cmp(&l)),
        PayloadValue::Float32(v) => lit.parse::<f32>().ok().and_then(|l| v.partial_cmp(&l)),
        PayloadValue::Float64(v) => lit.parse::<f64>().ok().and_then(|l| v.partial_cmp(&l)),
        PayloadValue::Bool(v) => parse_bool(lit).map(|l| v.cmp(&l)),
        PayloadValue::String(s) => Some(s.to_lowercase().as_str().cmp(lowered)),
        PayloadValue::Uuid(v) => Uuid::parse_str(lit).ok().map(|l| v.cmp(&l)),
        PayloadValue::Timestamp(v) => parse_timestamp(lit).map(|l| v.cmp(&l)),
        PayloadValue::Null | PayloadValue::Other(_) => None,
    }
}

/// 이벤트에서 속성을 찾습니다.
fn lookup<'a>(event: &'a EventData, property: &str) -> Option<Operand<'a>> {
    if property.eq_ignore_ascii_case("timestamp") {
        return Some(Operand::Timestamp(event.timestamp));
    }
    if property.eq_ignore_ascii_case("providername") {
        return Some(Operand::ProviderName(&event.provider_name));
    }
    if property.eq_ignore_ascii_case("level") {
        return Some(Operand::Level(event.level));
    }
    if property.eq_ignore_ascii_case("keywords") {
        return Some(Operand::Keywords(event.keywords));
    }

    event
        .payload
        .get(property)
        .or_else(|| {
            event
                .payload
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(property))
                .map(|(_, v)| v)
        })
        .map(Operand::Value)
}

fn match_with_timeout(regex: &Regex, haystack: &str) -> bool {
    let started = Instant::now();
    let matched = regex.is_match(haystack);
    if started.elapsed() > REGEX_TIMEOUT {
        metrics::counter!(m::FILTER_REGEX_TIMEOUTS_TOTAL).increment(1);
        tracing::warn!(
            pattern = regex.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "regex match exceeded time limit, treating as no match"
        );
        return false;
    }
    matched
}

/// 10진수 또는 `0x` 16진수 정수 리터럴을 파싱합니다.
pub(crate) fn parse_int_literal(literal: &str) -> Option<u64> {
    let s = literal.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse::<u64>().ok(),
    }
}

fn parse_bool(literal: &str) -> Option<bool> {
    if literal.eq_ignore_ascii_case("true") {
        Some(true)
    } else if literal.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// 여러 ISO-8601 유사 형식의 시각 리터럴을 파싱합니다.
///
/// 오프셋이 없는 형식은 로컬 시간대로 해석하며, 시각만 있는 형식은
/// 오늘 날짜(로컬)에 붙입니다. 자정 근처에서는 날짜가 모호할 수 있습니다.
pub(crate) fn parse_timestamp(literal: &str) -> Option<DateTime<FixedOffset>> {
    const WITH_OFFSET: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f %z"];
    const NAIVE_DATE_TIME: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    const TIME_OF_DAY: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

    let s = literal.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts);
    }
    if let Some(ts) = WITH_OFFSET
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    {
        return Some(ts);
    }
    if let Some(ndt) = NAIVE_DATE_TIME
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return local(ndt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).and_then(local);
    }
    TIME_OF_DAY
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .and_then(|time| local(Local::now().date_naive().and_time(time)))
}

fn local(ndt: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    match Local.from_local_datetime(&ndt) {
        LocalResult::Single(ts) => Some(ts.fixed_offset()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.fixed_offset()),
        LocalResult::None => None,
    }
}
