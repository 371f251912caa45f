//! 파이프라인 팩토리 -- 설정 + 레지스트리로 파이프라인을 조립합니다.
//!
//! 구성 중 발생한 모든 에러는 반환하기 전에 헬스 리포터에
//! `Configuration` 컨텍스트의 문제로 보고됩니다.

use std::sync::Arc;

use diagflow_core::config::{ComponentConfig, DiagflowConfig};
use diagflow_core::health::{CONTEXT_CONFIGURATION, HealthReporter};
use diagflow_core::pipeline::Filter;
use diagflow_core::registry::ComponentRegistry;

use crate::config::PipelineSettings;
use crate::error::EventPipelineError;
use crate::pipeline::{EventPipeline, EventPipelineBuilder, EventSink};

/// 파이프라인 팩토리
pub struct PipelineFactory;

impl PipelineFactory {
    /// 설정에 따라 입력, 전역 필터, 싱크를 생성하고 파이프라인을 시작합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn create(
        config: &DiagflowConfig,
        registry: &ComponentRegistry,
        health: Arc<dyn HealthReporter>,
    ) -> Result<EventPipeline, EventPipelineError> {
        Self::assemble(config, registry, &health)
            .and_then(EventPipelineBuilder::build)
            .map_err(|e| {
                health.report_problem(
                    &format!("failed to create pipeline: {e}"),
                    Some(CONTEXT_CONFIGURATION),
                );
                e
            })
    }

    fn assemble(
        config: &DiagflowConfig,
        registry: &ComponentRegistry,
        health: &Arc<dyn HealthReporter>,
    ) -> Result<EventPipelineBuilder, EventPipelineError> {
        if config.inputs.is_empty() {
            return Err(EventPipelineError::Config {
                field: "inputs".to_owned(),
                reason: "at least one input is required".to_owned(),
            });
        }
        if config.outputs.is_empty() {
            return Err(EventPipelineError::Config {
                field: "outputs".to_owned(),
                reason: "at least one output is required".to_owned(),
            });
        }

        let settings = PipelineSettings::from_core(&config.pipeline);
        settings.validate()?;

        let mut builder = EventPipelineBuilder::new()
            .settings(settings)
            .health_reporter(Arc::clone(health));

        for input_config in &config.inputs {
            let input = registry.create_input(input_config, Arc::clone(health))?;
            tracing::debug!(kind = %input_config.kind, name = input.name(), "input created");
            builder = builder.input(input);
        }

        for filter in create_filters(&config.filters, registry, health)? {
            builder = builder.global_filter(filter);
        }

        for sink_config in &config.outputs {
            let output = registry.create_output(sink_config, Arc::clone(health))?;
            let filters = create_filters(&sink_config.filters, registry, health)?;
            tracing::debug!(
                sink = sink_config.display_name(),
                filters = filters.len(),
                "sink created"
            );
            builder = builder.sink(
                EventSink::new(sink_config.display_name(), output).with_filters(filters),
            );
        }

        Ok(builder)
    }
}

fn create_filters(
    configs: &[ComponentConfig],
    registry: &ComponentRegistry,
    health: &Arc<dyn HealthReporter>,
) -> Result<Vec<Arc<dyn Filter>>, EventPipelineError> {
    configs
        .iter()
        .map(|c| {
            registry
                .create_filter(c, Arc::clone(health))
                .map_err(EventPipelineError::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use diagflow_core::error::RegistryError;
    use diagflow_core::pipeline::{Input, Output};
    use diagflow_core::subject::EventSubject;

    use super::*;
    use crate::filter::register_builtin_filters;
    use crate::test_support::{CollectingOutput, RecordingReporter, counted_event};

    struct Fixture {
        registry: ComponentRegistry,
        subject: Arc<EventSubject>,
        output: Arc<CollectingOutput>,
    }

    fn fixture() -> Fixture {
        let subject = Arc::new(EventSubject::new("subject"));
        let output = Arc::new(CollectingOutput::default());

        let mut registry = ComponentRegistry::new();
        register_builtin_filters(&mut registry).unwrap();
        let input = Arc::clone(&subject);
        registry
            .register_input("subject", move |_, _| Ok(Arc::clone(&input) as Arc<dyn Input>))
            .unwrap();
        let sink = Arc::clone(&output);
        registry
            .register_output("collect", move |_, _| Ok(Arc::clone(&sink) as Arc<dyn Output>))
            .unwrap();

        Fixture {
            registry,
            subject,
            output,
        }
    }

    const CONFIG: &str = r#"
[pipeline]
buffer_size = 100
max_batch_size = 10
max_batch_delay_ms = 10
completion_timeout_ms = 2000

[[inputs]]
type = "subject"

[[filters]]
type = "drop"
include = "Count == 3"

[[outputs]]
type = "collect"
name = "collector"

[[outputs.filters]]
type = "include"
include = "Count < 5"
"#;

    #[tokio::test]
    async fn creates_pipeline_from_config() {
        let fixture = fixture();
        let config = DiagflowConfig::parse(CONFIG).unwrap();
        let health = Arc::new(RecordingReporter::default());

        let pipeline = PipelineFactory::create(&config, &fixture.registry, health.clone()).unwrap();
        assert_eq!(pipeline.sink_names(), ["collector".to_owned()]);
        assert_eq!(pipeline.settings().max_batch_delay, Duration::from_millis(10));

        for i in 0..10 {
            fixture.subject.push(counted_event(i));
        }
        pipeline.dispose().await.unwrap();

        // 0..5 중 3 제외
        assert_eq!(fixture.output.event_count(), 4);
        assert!(health.problems.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_filter_is_reported_as_configuration_problem() {
        let fixture = fixture();
        let config = DiagflowConfig::parse(&CONFIG.replace("type = \"drop\"", "type = \"nope\"")).unwrap();
        let health = Arc::new(RecordingReporter::default());

        let err = PipelineFactory::create(&config, &fixture.registry, health.clone()).err().unwrap();
        assert!(matches!(
            err,
            EventPipelineError::Registry(RegistryError::UnknownComponent { .. })
        ));
        let problems = health.problems.lock().unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].1.as_deref(), Some(CONTEXT_CONFIGURATION));
    }

    #[tokio::test]
    async fn malformed_expression_fails_construction() {
        let fixture = fixture();
        let config =
            DiagflowConfig::parse(&CONFIG.replace("Count == 3", "(Count == 3")).unwrap();
        let health = Arc::new(RecordingReporter::default());

        let err = PipelineFactory::create(&config, &fixture.registry, health.clone()).err().unwrap();
        assert!(err.to_string().contains("unmatched"));
        assert_eq!(health.problems.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_outputs_is_config_error() {
        let fixture = fixture();
        let mut config = DiagflowConfig::parse(CONFIG).unwrap();
        config.outputs.clear();
        let health = Arc::new(RecordingReporter::default());

        let err = PipelineFactory::create(&config, &fixture.registry, health).err().unwrap();
        assert!(matches!(err, EventPipelineError::Config { ref field, .. } if field == "outputs"));
    }
}
