//! Daemon health reporting.
//!
//! Periodically polls the pipeline's `health_check()` and logs status
//! transitions. The [`DaemonHealth`] snapshot is what the orchestrator
//! hands out for introspection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use diagflow_core::health::HealthStatus;
use diagflow_event_pipeline::EventPipeline;

/// Default interval between health polls.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(10);

/// Health snapshot for the whole daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Pipeline health status.
    pub status: HealthStatus,
    /// Pipeline lifecycle state name.
    pub state: &'static str,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Events accepted but not yet delivered to every sink.
    pub events_in_flight: i64,
    /// Configured sink names.
    pub sinks: Vec<String>,
}

impl DaemonHealth {
    /// Take a snapshot of the pipeline.
    pub fn snapshot(pipeline: &EventPipeline, start_time: Instant) -> Self {
        Self {
            status: pipeline.health_check(),
            state: pipeline.state_name(),
            uptime_secs: start_time.elapsed().as_secs(),
            events_in_flight: pipeline.events_in_flight(),
            sinks: pipeline.sink_names().to_vec(),
        }
    }
}

/// Spawn a background task that polls pipeline health and logs changes.
///
/// Only transitions are logged at info/warn/error; steady state is logged
/// at debug so a healthy daemon stays quiet.
pub fn spawn_health_monitor(
    pipeline: Arc<EventPipeline>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last = HealthStatus::Healthy;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let status = pipeline.health_check();
                    if status != last {
                        log_transition(&last, &status, pipeline.events_in_flight());
                        last = status;
                    } else {
                        tracing::debug!(
                            status = %status,
                            events_in_flight = pipeline.events_in_flight(),
                            "health check tick"
                        );
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("health monitor shutting down");
                    break;
                }
            }
        }
    })
}

fn log_transition(previous: &HealthStatus, current: &HealthStatus, in_flight: i64) {
    match current {
        HealthStatus::Healthy => {
            tracing::info!(previous = %previous, events_in_flight = in_flight, "pipeline recovered");
        }
        HealthStatus::Degraded(reason) => {
            tracing::warn!(reason = %reason, events_in_flight = in_flight, "pipeline degraded");
        }
        HealthStatus::Unhealthy(reason) => {
            tracing::error!(reason = %reason, events_in_flight = in_flight, "pipeline unhealthy");
        }
    }
}
