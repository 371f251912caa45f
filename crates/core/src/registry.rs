//! 컴포넌트 레지스트리 -- 설정의 `type` 이름을 팩토리로 매핑
//!
//! 호스트 애플리케이션은 사용 가능한 입력/필터/출력 종류를 팩토리 클로저로
//! 등록하고, 파이프라인 팩토리는 설정 항목의 `type` 값으로 팩토리를 찾아
//! 컴포넌트를 생성합니다.
//!
//! # 사용 예시
//! ```ignore
//! let mut registry = ComponentRegistry::new();
//! registry.register_output("stdout", |_config, _health| Ok(Arc::new(StdoutOutput::new())))?;
//!
//! let output = registry.create_output(&SinkConfig::new("stdout"), health)?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{ComponentConfig, SinkConfig};
use crate::error::RegistryError;
use crate::health::HealthReporter;
use crate::pipeline::{Filter, Input, Output};

/// 입력 팩토리
pub type InputFactory = Box<
    dyn Fn(&ComponentConfig, Arc<dyn HealthReporter>) -> Result<Arc<dyn Input>, RegistryError>
        + Send
        + Sync,
>;

/// 필터 팩토리
pub type FilterFactory = Box<
    dyn Fn(&ComponentConfig, Arc<dyn HealthReporter>) -> Result<Arc<dyn Filter>, RegistryError>
        + Send
        + Sync,
>;

/// 출력 팩토리
pub type OutputFactory = Box<
    dyn Fn(&SinkConfig, Arc<dyn HealthReporter>) -> Result<Arc<dyn Output>, RegistryError>
        + Send
        + Sync,
>;

const CATEGORY_INPUT: &str = "input";
const CATEGORY_FILTER: &str = "filter";
const CATEGORY_OUTPUT: &str = "output";

/// 컴포넌트 레지스트리
///
/// 종류 이름은 대소문자를 구분하지 않습니다.
#[derive(Default)]
pub struct ComponentRegistry {
    inputs: HashMap<String, InputFactory>,
    filters: HashMap<String, FilterFactory>,
    outputs: HashMap<String, OutputFactory>,
}

impl ComponentRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 입력 팩토리를 등록합니다.
    pub fn register_input<F>(&mut self, kind: &str, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&ComponentConfig, Arc<dyn HealthReporter>) -> Result<Arc<dyn Input>, RegistryError>
            + Send
            + Sync
            + 'static,
    {
        insert_unique(&mut self.inputs, CATEGORY_INPUT, kind, Box::new(factory))
    }

    /// 필터 팩토리를 등록합니다.
    pub fn register_filter<F>(&mut self, kind: &str, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&ComponentConfig, Arc<dyn HealthReporter>) -> Result<Arc<dyn Filter>, RegistryError>
            + Send
            + Sync
            + 'static,
    {
        insert_unique(&mut self.filters, CATEGORY_FILTER, kind, Box::new(factory))
    }

    /// 출력 팩토리를 등록합니다.
    pub fn register_output<F>(&mut self, kind: &str, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&SinkConfig, Arc<dyn HealthReporter>) -> Result<Arc<dyn Output>, RegistryError>
            + Send
            + Sync
            + 'static,
    {
        insert_unique(&mut self.outputs, CATEGORY_OUTPUT, kind, Box::new(factory))
    }

    /// 설정으로 입력을 생성합니다.
    pub fn create_input(
        &self,
        config: &ComponentConfig,
        health: Arc<dyn HealthReporter>,
    ) -> Result<Arc<dyn Input>, RegistryError> {
        let factory = lookup(&self.inputs, CATEGORY_INPUT, &config.kind)?;
        factory(config, health)
    }

    /// 설정으로 필터를 생성합니다.
    pub fn create_filter(
        &self,
        config: &ComponentConfig,
        health: Arc<dyn HealthReporter>,
    ) -> Result<Arc<dyn Filter>, RegistryError> {
        let factory = lookup(&self.filters, CATEGORY_FILTER, &config.kind)?;
        factory(config, health)
    }

    /// 설정으로 출력을 생성합니다.
    pub fn create_output(
        &self,
        config: &SinkConfig,
        health: Arc<dyn HealthReporter>,
    ) -> Result<Arc<dyn Output>, RegistryError> {
        let factory = lookup(&self.outputs, CATEGORY_OUTPUT, &config.kind)?;
        factory(config, health)
    }

    /// 등록된 종류 이름 목록 (카테고리별, 정렬됨)
    pub fn kinds(&self) -> (Vec<&str>, Vec<&str>, Vec<&str>) {
        (
            sorted_keys(&self.inputs),
            sorted_keys(&self.filters),
            sorted_keys(&self.outputs),
        )
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (inputs, filters, outputs) = self.kinds();
        f.debug_struct("ComponentRegistry")
            .field("inputs", &inputs)
            .field("filters", &filters)
            .field("outputs", &outputs)
            .finish()
    }
}

fn insert_unique<V>(
    map: &mut HashMap<String, V>,
    category: &str,
    kind: &str,
    value: V,
) -> Result<(), RegistryError> {
    let key = kind.to_lowercase();
    if map.contains_key(&key) {
        return Err(RegistryError::AlreadyRegistered {
            category: category.to_owned(),
            kind: kind.to_owned(),
        });
    }
    map.insert(key, value);
    Ok(())
}

fn lookup<'a, V>(
    map: &'a HashMap<String, V>,
    category: &str,
    kind: &str,
) -> Result<&'a V, RegistryError> {
    map.get(&kind.to_lowercase())
        .ok_or_else(|| RegistryError::UnknownComponent {
            category: category.to_owned(),
            kind: kind.to_owned(),
        })
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<&str> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::{FilterError, OutputError};
    use crate::event::EventData;
    use crate::health::TracingHealthReporter;
    use crate::pipeline::{BoxFuture, FilterResult};
    use crate::subject::EventSubject;

    struct KeepAll;

    impl Filter for KeepAll {
        fn evaluate(&self, _event: &mut EventData) -> Result<FilterResult, FilterError> {
            Ok(FilterResult::KeepEvent)
        }
    }

    struct NullOutput;

    impl Output for NullOutput {
        fn send_events<'a>(
            &'a self,
            _events: &'a [EventData],
            _seq: u64,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, Result<(), OutputError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn health() -> Arc<dyn HealthReporter> {
        Arc::new(TracingHealthReporter)
    }

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry
            .register_input("subject", |config, _| {
                Ok(Arc::new(EventSubject::new(config.kind.clone())))
            })
            .unwrap();
        registry
            .register_filter("keep", |_, _| Ok(Arc::new(KeepAll)))
            .unwrap();
        registry
            .register_output("null", |_, _| Ok(Arc::new(NullOutput)))
            .unwrap();
        registry
    }

    #[test]
    fn create_registered_components() {
        let registry = registry();
        let input = registry
            .create_input(&ComponentConfig::new("subject"), health())
            .unwrap();
        assert_eq!(input.name(), "subject");
        assert!(
            registry
                .create_filter(&ComponentConfig::new("KEEP"), health())
                .is_ok()
        );
        assert!(
            registry
                .create_output(&SinkConfig::new("null"), health())
                .is_ok()
        );
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = registry();
        let err = registry
            .register_filter("Keep", |_, _| Ok(Arc::new(KeepAll)))
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
        assert_eq!(err.to_string(), "filter 'Keep' is already registered");
    }

    #[test]
    fn unknown_kind_fails() {
        let registry = registry();
        let err = registry
            .create_output(&SinkConfig::new("kafka"), health())
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::UnknownComponent { .. }));
    }

    #[test]
    fn factory_errors_propagate() {
        let mut registry = ComponentRegistry::new();
        registry
            .register_filter("strict", |config, _| {
                Err(RegistryError::InvalidSettings {
                    category: "filter".to_owned(),
                    kind: config.kind.clone(),
                    reason: "always fails".to_owned(),
                })
            })
            .unwrap();
        let err = registry
            .create_filter(&ComponentConfig::new("strict"), health())
            .err()
            .unwrap();
        assert!(err.to_string().contains("always fails"));
    }

    #[test]
    fn kinds_are_sorted() {
        let mut registry = registry();
        registry
            .register_filter("alpha", |_, _| Ok(Arc::new(KeepAll)))
            .unwrap();
        let (_, filters, _) = registry.kinds();
        assert_eq!(filters, vec!["alpha", "keep"]);
    }
}
