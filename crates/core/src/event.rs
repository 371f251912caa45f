//! 이벤트 레코드 -- 파이프라인을 흐르는 데이터의 기본 단위
//!
//! 입력 어댑터가 로그/트레이스/메트릭 발생 시 [`EventData`]를 생성하고,
//! 파이프라인은 이를 필터, 배치, 팬아웃을 거쳐 출력으로 전달합니다.
//! 여러 싱크로 팬아웃할 때는 `Clone`으로 독립된 복사본을 만듭니다.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};

use crate::health::HealthReporter;
use crate::value::PayloadValue;

/// 이벤트 심각도 레벨
///
/// 숫자가 작을수록 심각합니다 (`Critical=1 < ... < Verbose=5`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LogLevel {
    /// 치명적 오류
    Critical = 1,
    /// 오류
    Error = 2,
    /// 경고
    Warning = 3,
    /// 정보성 이벤트
    #[default]
    Informational = 4,
    /// 상세 진단
    Verbose = 5,
}

impl LogLevel {
    /// 이름(대소문자 무시) 또는 숫자 문자열에서 레벨을 파싱합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return Self::from_number(n);
        }
        match s.to_lowercase().as_str() {
            "critical" | "crit" => Some(Self::Critical),
            "error" | "err" => Some(Self::Error),
            "warning" | "warn" => Some(Self::Warning),
            "informational" | "info" => Some(Self::Informational),
            "verbose" | "debug" => Some(Self::Verbose),
            _ => None,
        }
    }

    /// 숫자 레벨(1..=5)에서 변환합니다.
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Critical),
            2 => Some(Self::Error),
            3 => Some(Self::Warning),
            4 => Some(Self::Informational),
            5 => Some(Self::Verbose),
            _ => None,
        }
    }

    /// 숫자 레벨을 반환합니다.
    pub fn as_number(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Critical => "Critical",
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Informational => "Informational",
            Self::Verbose => "Verbose",
        };
        f.write_str(name)
    }
}

/// 이벤트에 부착되는 메타데이터 레코드
///
/// "이 이벤트는 메트릭이기도 하다" 같은 부가 해석을 나타냅니다.
/// `metadata` 필터가 설정에 따라 부착합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 메타데이터 종류 (예: "metric", "request")
    pub metadata_type: String,
    /// 종류별 속성
    pub properties: HashMap<String, String>,
}

impl EventMetadata {
    /// 속성 없는 메타데이터를 생성합니다.
    pub fn new(metadata_type: impl Into<String>) -> Self {
        Self {
            metadata_type: metadata_type.into(),
            properties: HashMap::new(),
        }
    }

    /// 속성을 추가합니다 (빌더 스타일).
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// 이벤트 레코드
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventData {
    /// 발생 시각 (오프셋 포함)
    pub timestamp: DateTime<FixedOffset>,
    /// 이벤트 제공자 이름
    pub provider_name: String,
    /// 심각도
    pub level: LogLevel,
    /// 키워드 비트마스크
    pub keywords: u64,
    /// 페이로드 (키는 유일)
    pub payload: HashMap<String, PayloadValue>,
    /// 종류별 메타데이터 목록
    pub metadata: HashMap<String, Vec<EventMetadata>>,
}

impl EventData {
    /// 현재 시각으로 새 이벤트를 생성합니다.
    pub fn new(provider_name: impl Into<String>, level: LogLevel) -> Self {
        Self {
            timestamp: Local::now().fixed_offset(),
            provider_name: provider_name.into(),
            level,
            keywords: 0,
            payload: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// 페이로드 값을 설정합니다 (빌더 스타일, 기존 값을 덮어씀).
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// 키워드 비트마스크를 설정합니다 (빌더 스타일).
    pub fn with_keywords(mut self, keywords: u64) -> Self {
        self.keywords = keywords;
        self
    }

    /// 페이로드에 속성을 추가하고 실제로 저장된 키를 반환합니다.
    ///
    /// - 키가 비어 있으면 그대로 저장합니다.
    /// - 같은 키에 같은 값이 이미 있으면 아무것도 하지 않고 경고합니다.
    /// - 같은 키에 다른 값이 있으면 `key_1`, `key_2`, ... 중 비어 있는 첫 키에
    ///   저장하고 경고합니다.
    pub fn add_payload_property(
        &mut self,
        key: &str,
        value: PayloadValue,
        reporter: &dyn HealthReporter,
        context: &str,
    ) -> String {
        let Some(existing) = self.payload.get(key) else {
            self.payload.insert(key.to_owned(), value);
            return key.to_owned();
        };

        if *existing == value {
            reporter.report_warning(
                &format!(
                    "property '{key}' already exists with the same value; duplicate ignored"
                ),
                Some(context),
            );
            return key.to_owned();
        }

        let mut suffix = 1u32;
        let new_key = loop {
            let candidate = format!("{key}_{suffix}");
            if !self.payload.contains_key(&candidate) {
                break candidate;
            }
            suffix += 1;
        };
        reporter.report_warning(
            &format!(
                "property '{key}' already exists with a different value; stored as '{new_key}'"
            ),
            Some(context),
        );
        self.payload.insert(new_key.clone(), value);
        new_key
    }

    /// 메타데이터 레코드를 종류별 목록 뒤에 추가합니다.
    pub fn set_metadata(&mut self, metadata: EventMetadata) {
        self.metadata
            .entry(metadata.metadata_type.clone())
            .or_default()
            .push(metadata);
    }

    /// 주어진 종류의 메타데이터 목록을 반환합니다.
    pub fn metadata_of(&self, metadata_type: &str) -> Option<&[EventMetadata]> {
        self.metadata.get(metadata_type).map(Vec::as_slice)
    }
}

impl fmt::Display for EventData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} payload={}",
            self.timestamp.to_rfc3339(),
            self.level,
            self.provider_name,
            self.payload.len(),
        )
    }
}
