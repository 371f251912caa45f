//! Pipeline orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `diagflow-daemon`.
//! It validates configuration, installs the metrics recorder, builds the
//! component registry, assembles the event pipeline and runs it until a
//! shutdown signal arrives.
//!
//! # Shutdown
//!
//! 1. Stop background tasks (health monitor)
//! 2. Dispose the pipeline: inputs are unsubscribed, in-flight events are
//!    drained up to `completion_timeout_ms`, then stages are torn down

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use diagflow_core::config::DiagflowConfig;
use diagflow_core::health::{HealthReporter, TracingHealthReporter};
use diagflow_core::registry::ComponentRegistry;
use diagflow_event_pipeline::{EventPipeline, PipelineFactory};

use crate::components;
use crate::health::{DEFAULT_HEALTH_INTERVAL, DaemonHealth, spawn_health_monitor};
use crate::metrics_server;

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: DiagflowConfig,
    /// Running pipeline.
    pipeline: Arc<EventPipeline>,
    /// Signals background tasks to stop.
    shutdown: CancellationToken,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or parsed
    /// - Configuration validation fails
    /// - Any configured component fails to build
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = DiagflowConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration using the daemon's
    /// built-in components.
    pub fn build_from_config(config: DiagflowConfig) -> Result<Self> {
        let registry = components::default_registry()
            .map_err(|e| anyhow::anyhow!("failed to register components: {}", e))?;
        Self::build_with_registry(config, &registry, Arc::new(TracingHealthReporter))
    }

    /// Build with a caller-supplied registry and health reporter.
    ///
    /// Must be called inside a tokio runtime: the pipeline subscribes to
    /// its inputs and spawns its stages immediately.
    pub fn build_with_registry(
        config: DiagflowConfig,
        registry: &ComponentRegistry,
        health: Arc<dyn HealthReporter>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            let addr = metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(listen_addr = %addr, "metrics endpoint enabled");
        }

        let pipeline = PipelineFactory::create(&config, registry, health)
            .map_err(|e| anyhow::anyhow!("failed to build pipeline: {}", e))?;

        tracing::info!(
            inputs = config.inputs.len(),
            global_filters = config.filters.len(),
            sinks = ?pipeline.sink_names(),
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        })
    }

    /// Run until SIGTERM or SIGINT, then shut down gracefully.
    pub async fn run(&self) -> Result<()> {
        let signal = async {
            match wait_for_shutdown_signal().await {
                Ok(name) => name,
                Err(e) => {
                    tracing::error!(error = %e, "signal handlers unavailable, waiting for ctrl-c");
                    let _ = tokio::signal::ctrl_c().await;
                    "ctrl-c"
                }
            }
        };
        self.run_until(signal).await
    }

    /// Run until `shutdown` resolves, then shut down gracefully.
    ///
    /// Returns an error if the pipeline failed to drain cleanly.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = &'static str>,
    {
        let monitor = spawn_health_monitor(
            Arc::clone(&self.pipeline),
            DEFAULT_HEALTH_INTERVAL,
            self.shutdown.clone(),
        );

        tracing::info!("diagflow-daemon running");
        let reason = shutdown.await;
        tracing::info!(signal = reason, "shutdown signal received");

        self.shutdown.cancel();
        if let Err(e) = monitor.await {
            tracing::warn!(error = %e, "health monitor task failed");
        }

        self.shutdown_pipeline().await
    }

    async fn shutdown_pipeline(&self) -> Result<()> {
        tracing::info!(
            events_in_flight = self.pipeline.events_in_flight(),
            "disposing pipeline"
        );
        self.pipeline
            .dispose()
            .await
            .map_err(|e| anyhow::anyhow!("pipeline shutdown failed: {}", e))?;
        tracing::info!("pipeline disposed");
        Ok(())
    }

    /// Current health snapshot.
    pub fn health(&self) -> DaemonHealth {
        DaemonHealth::snapshot(&self.pipeline, self.start_time)
    }

    /// Loaded configuration.
    pub fn config(&self) -> &DiagflowConfig {
        &self.config
    }

    /// The running pipeline.
    pub fn pipeline(&self) -> &Arc<EventPipeline> {
        &self.pipeline
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install ctrl-c handler: {}", e))?;
    Ok("ctrl-c")
}
