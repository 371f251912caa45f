//! 설정 관리 -- diagflow.toml 파싱 및 런타임 설정
//!
//! [`DiagflowConfig`]는 파이프라인 설정과 입력/필터/출력 구성을 담는
//! 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`DIAGFLOW_PIPELINE_MAX_BATCH_SIZE=50` 형식)
//! 3. 설정 파일 (`diagflow.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 설정 예시
//! ```toml
//! [pipeline]
//! max_batch_delay_ms = 1000
//!
//! [[inputs]]
//! type = "heartbeat"
//! interval_ms = 1000
//!
//! [[filters]]
//! type = "drop"
//! include = "Level > Warning"
//!
//! [[outputs]]
//! type = "stdout"
//!
//! [[outputs.filters]]
//! type = "include"
//! include = "ProviderName == heartbeat"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, DiagflowError};

/// Diagflow 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagflowConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 파이프라인 수치 설정
    #[serde(default)]
    pub pipeline: PipelineSettingsConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 입력 목록
    #[serde(default)]
    pub inputs: Vec<ComponentConfig>,
    /// 전역 필터 목록 (모든 싱크 이전에 적용)
    #[serde(default)]
    pub filters: Vec<ComponentConfig>,
    /// 출력(싱크) 목록
    #[serde(default)]
    pub outputs: Vec<SinkConfig>,
}

impl DiagflowConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DiagflowError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DiagflowError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DiagflowError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DiagflowError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, DiagflowError> {
        toml::from_str(toml_str).map_err(|e| {
            DiagflowError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `DIAGFLOW_{SECTION}_{FIELD}`
    /// 예: `DIAGFLOW_PIPELINE_BUFFER_SIZE=5000`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "DIAGFLOW_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DIAGFLOW_GENERAL_LOG_FORMAT");

        // Pipeline
        override_usize(
            &mut self.pipeline.buffer_size,
            "DIAGFLOW_PIPELINE_BUFFER_SIZE",
        );
        override_usize(
            &mut self.pipeline.max_batch_size,
            "DIAGFLOW_PIPELINE_MAX_BATCH_SIZE",
        );
        override_u64(
            &mut self.pipeline.max_batch_delay_ms,
            "DIAGFLOW_PIPELINE_MAX_BATCH_DELAY_MS",
        );
        override_usize(
            &mut self.pipeline.max_concurrency,
            "DIAGFLOW_PIPELINE_MAX_CONCURRENCY",
        );
        override_u64(
            &mut self.pipeline.completion_timeout_ms,
            "DIAGFLOW_PIPELINE_COMPLETION_TIMEOUT_MS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "DIAGFLOW_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "DIAGFLOW_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "DIAGFLOW_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DiagflowError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.pipeline.validate()?;

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid(
                "metrics.port",
                "must be greater than 0 when metrics are enabled".to_owned(),
            ));
        }

        if self.inputs.is_empty() {
            return Err(invalid(
                "inputs",
                "at least one input must be configured".to_owned(),
            ));
        }
        if self.outputs.is_empty() {
            return Err(invalid(
                "outputs",
                "at least one output must be configured".to_owned(),
            ));
        }

        let components = self
            .inputs
            .iter()
            .map(|c| ("inputs", c.kind.as_str()))
            .chain(self.filters.iter().map(|c| ("filters", c.kind.as_str())))
            .chain(self.outputs.iter().map(|s| ("outputs", s.kind.as_str())))
            .chain(
                self.outputs
                    .iter()
                    .flat_map(|s| s.filters.iter())
                    .map(|c| ("outputs.filters", c.kind.as_str())),
            );
        for (section, kind) in components {
            if kind.trim().is_empty() {
                return Err(invalid(
                    &format!("{section}.type"),
                    "component type must not be empty".to_owned(),
                ));
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 헤드 큐 용량 상한 (이벤트 수)
pub const MAX_BUFFER_SIZE: usize = 10_000_000;
/// 배치 크기 상한
pub const MAX_BATCH_SIZE: usize = 100_000;
/// 배치 지연 상한 (1시간)
pub const MAX_BATCH_DELAY_MS: u64 = 3_600_000;
/// 병렬도 상한
pub const MAX_CONCURRENCY: usize = 1024;
/// 완료 대기 상한 (1시간)
pub const MAX_COMPLETION_TIMEOUT_MS: u64 = 3_600_000;

/// 파이프라인 수치 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettingsConfig {
    /// 헤드 큐 용량 (이벤트 수)
    pub buffer_size: usize,
    /// 최대 배치 크기
    pub max_batch_size: usize,
    /// 최대 배치 지연 (밀리초) -- 이 간격마다 배치가 강제로 플러시됩니다
    pub max_batch_delay_ms: u64,
    /// 필터/출력 스테이지의 최대 병렬도
    pub max_concurrency: usize,
    /// 종료 시 드레인 및 완료 대기 제한 (밀리초)
    pub completion_timeout_ms: u64,
}

impl Default for PipelineSettingsConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            max_batch_size: 100,
            max_batch_delay_ms: 500,
            max_concurrency: 8,
            completion_timeout_ms: 30_000,
        }
    }
}

impl PipelineSettingsConfig {
    /// 수치 설정의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DiagflowError> {
        let bounded = [
            ("pipeline.buffer_size", self.buffer_size as u64, MAX_BUFFER_SIZE as u64),
            ("pipeline.max_batch_size", self.max_batch_size as u64, MAX_BATCH_SIZE as u64),
            ("pipeline.max_batch_delay_ms", self.max_batch_delay_ms, MAX_BATCH_DELAY_MS),
            ("pipeline.max_concurrency", self.max_concurrency as u64, MAX_CONCURRENCY as u64),
            (
                "pipeline.completion_timeout_ms",
                self.completion_timeout_ms,
                MAX_COMPLETION_TIMEOUT_MS,
            ),
        ];
        for (field, value, max) in bounded {
            if value == 0 || value > max {
                return Err(invalid(field, format!("must be 1-{max}")));
            }
        }

        if self.max_batch_size > self.buffer_size {
            return Err(invalid(
                "pipeline.max_batch_size",
                format!(
                    "must not exceed pipeline.buffer_size ({})",
                    self.buffer_size
                ),
            ));
        }

        Ok(())
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 익스포터 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
        }
    }
}

/// 컴포넌트(입력/필터) 설정
///
/// `type` 키로 레지스트리의 팩토리를 선택하고, 나머지 키는
/// 그대로 `settings`에 보관되어 팩토리가 해석합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// 컴포넌트 종류
    #[serde(rename = "type")]
    pub kind: String,
    /// 종류별 설정
    #[serde(flatten)]
    pub settings: toml::Table,
}

impl ComponentConfig {
    /// 설정 없는 컴포넌트 구성을 생성합니다.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            settings: toml::Table::new(),
        }
    }

    /// 설정 값을 추가합니다 (빌더 스타일).
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// 문자열 설정을 조회합니다.
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        setting_str(&self.settings, key)
    }

    /// 음이 아닌 정수 설정을 조회합니다.
    pub fn setting_u64(&self, key: &str) -> Option<u64> {
        setting_u64(&self.settings, key)
    }
}

/// 싱크(출력 + 싱크 전용 필터) 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// 출력 종류
    #[serde(rename = "type")]
    pub kind: String,
    /// 로그에 표시할 이름 (없으면 종류를 사용)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 이 싱크에만 적용되는 필터
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<ComponentConfig>,
    /// 출력별 설정
    #[serde(flatten)]
    pub settings: toml::Table,
}

impl SinkConfig {
    /// 설정 없는 싱크 구성을 생성합니다.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// 싱크 전용 필터를 추가합니다 (빌더 스타일).
    pub fn with_filter(mut self, filter: ComponentConfig) -> Self {
        self.filters.push(filter);
        self
    }

    /// 설정 값을 추가합니다 (빌더 스타일).
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// 로그용 이름
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }

    /// 문자열 설정을 조회합니다.
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        setting_str(&self.settings, key)
    }

    /// 음이 아닌 정수 설정을 조회합니다.
    pub fn setting_u64(&self, key: &str) -> Option<u64> {
        setting_u64(&self.settings, key)
    }
}

fn setting_str<'a>(settings: &'a toml::Table, key: &str) -> Option<&'a str> {
    settings.get(key).and_then(toml::Value::as_str)
}

fn setting_u64(settings: &toml::Table, key: &str) -> Option<u64> {
    settings
        .get(key)
        .and_then(toml::Value::as_integer)
        .and_then(|v| u64::try_from(v).ok())
}

fn invalid(field: &str, reason: String) -> DiagflowError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
