//! 내장 필터 -- `drop`, `include`, `metadata`
//!
//! 설정 예시:
//! ```toml
//! [[filters]]
//! type = "drop"
//! include = "Level == Verbose"
//!
//! [[filters]]
//! type = "metadata"
//! metadata = "metric"
//! include = "hasproperty(Duration)"
//! metricName = "request-latency"
//! ```

use std::sync::Arc;

use diagflow_core::config::ComponentConfig;
use diagflow_core::error::{FilterError, RegistryError};
use diagflow_core::event::{EventData, EventMetadata};
use diagflow_core::pipeline::{Filter, FilterResult};
use diagflow_core::registry::ComponentRegistry;

use crate::error::EventPipelineError;

use super::evaluator::FilterNode;
use super::parser::FilterParser;

/// `drop` 필터 종류 이름
pub const DROP_FILTER: &str = "drop";
/// `include` 필터 종류 이름
pub const INCLUDE_FILTER: &str = "include";
/// `metadata` 필터 종류 이름
pub const METADATA_FILTER: &str = "metadata";

const SETTING_INCLUDE: &str = "include";
const SETTING_METADATA: &str = "metadata";

/// 표현식과 일치하는 이벤트를 버립니다.
#[derive(Debug)]
pub struct DropFilter {
    condition: FilterNode,
}

impl DropFilter {
    /// 파싱된 조건으로 필터를 생성합니다.
    pub fn new(condition: FilterNode) -> Self {
        Self { condition }
    }

    /// 설정 항목에서 필터를 생성합니다. `include` 표현식이 필수입니다.
    pub fn from_config(config: &ComponentConfig) -> Result<Self, EventPipelineError> {
        required_expression(DROP_FILTER, config).map(Self::new)
    }
}

impl Filter for DropFilter {
    fn evaluate(&self, event: &mut EventData) -> Result<FilterResult, FilterError> {
        Ok(if self.condition.evaluate(event) {
            FilterResult::DropEvent
        } else {
            FilterResult::KeepEvent
        })
    }
}

/// 표현식과 일치하는 이벤트만 유지합니다.
#[derive(Debug)]
pub struct IncludeFilter {
    condition: FilterNode,
}

impl IncludeFilter {
    pub fn new(condition: FilterNode) -> Self {
        Self { condition }
    }

    /// 설정 항목에서 필터를 생성합니다. `include` 표현식이 필수입니다.
    pub fn from_config(config: &ComponentConfig) -> Result<Self, EventPipelineError> {
        required_expression(INCLUDE_FILTER, config).map(Self::new)
    }
}

impl Filter for IncludeFilter {
    fn evaluate(&self, event: &mut EventData) -> Result<FilterResult, FilterError> {
        Ok(if self.condition.evaluate(event) {
            FilterResult::KeepEvent
        } else {
            FilterResult::DropEvent
        })
    }
}

/// 일치하는 이벤트에 메타데이터 레코드를 붙입니다. 이벤트는 항상 유지됩니다.
///
/// `metadata`(종류 이름)와 `include`를 제외한 나머지 설정은 모두
/// 메타데이터 속성이 됩니다.
#[derive(Debug)]
pub struct MetadataFilter {
    condition: Option<FilterNode>,
    template: EventMetadata,
}

impl MetadataFilter {
    pub fn new(condition: Option<FilterNode>, template: EventMetadata) -> Self {
        Self {
            condition,
            template,
        }
    }

    /// 설정 항목에서 필터를 생성합니다.
    pub fn from_config(config: &ComponentConfig) -> Result<Self, EventPipelineError> {
        let metadata_type = config
            .setting_str(SETTING_METADATA)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EventPipelineError::FilterConfig {
                filter: METADATA_FILTER.to_owned(),
                reason: format!("'{SETTING_METADATA}' setting is required"),
            })?;

        let condition = match config.setting_str(SETTING_INCLUDE) {
            Some(expr) if !expr.trim().is_empty() => Some(FilterParser::parse(expr)?),
            _ => None,
        };

        let mut template = EventMetadata::new(metadata_type);
        for (key, value) in &config.settings {
            if key == SETTING_METADATA || key == SETTING_INCLUDE {
                continue;
            }
            let rendered = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(d) => d.to_string(),
                toml::Value::Array(_) | toml::Value::Table(_) => {
                    tracing::debug!(
                        filter = METADATA_FILTER,
                        setting = %key,
                        "ignoring non-scalar metadata setting"
                    );
                    continue;
                }
            };
            template.properties.insert(key.clone(), rendered);
        }

        Ok(Self::new(condition, template))
    }
}

impl Filter for MetadataFilter {
    fn evaluate(&self, event: &mut EventData) -> Result<FilterResult, FilterError> {
        let matches = self
            .condition
            .as_ref()
            .is_none_or(|condition| condition.evaluate(event));
        if matches {
            event.set_metadata(self.template.clone());
        }
        Ok(FilterResult::KeepEvent)
    }
}

fn required_expression(
    filter: &str,
    config: &ComponentConfig,
) -> Result<FilterNode, EventPipelineError> {
    let expr = config
        .setting_str(SETTING_INCLUDE)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| EventPipelineError::FilterConfig {
            filter: filter.to_owned(),
            reason: format!("'{SETTING_INCLUDE}' setting is required"),
        })?;
    FilterParser::parse(expr)
}

fn invalid_settings(kind: &str, err: EventPipelineError) -> RegistryError {
    RegistryError::InvalidSettings {
        category: "filter".to_owned(),
        kind: kind.to_owned(),
        reason: err.to_string(),
    }
}

/// 내장 필터를 레지스트리에 등록합니다.
pub fn register_builtin_filters(registry: &mut ComponentRegistry) -> Result<(), RegistryError> {
    registry.register_filter(DROP_FILTER, |config, _health| {
        DropFilter::from_config(config)
            .map(|f| Arc::new(f) as Arc<dyn Filter>)
            .map_err(|e| invalid_settings(DROP_FILTER, e))
    })?;
    registry.register_filter(INCLUDE_FILTER, |config, _health| {
        IncludeFilter::from_config(config)
            .map(|f| Arc::new(f) as Arc<dyn Filter>)
            .map_err(|e| invalid_settings(INCLUDE_FILTER, e))
    })?;
    registry.register_filter(METADATA_FILTER, |config, _health| {
        MetadataFilter::from_config(config)
            .map(|f| Arc::new(f) as Arc<dyn Filter>)
            .map_err(|e| invalid_settings(METADATA_FILTER, e))
    })?;
    Ok(())
}
