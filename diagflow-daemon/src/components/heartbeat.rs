//! Heartbeat input.
//!
//! Emits one `Informational` event per interval while at least one
//! observer is subscribed. Useful for smoke-testing a deployment and
//! for keeping time-based sinks alive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use diagflow_core::config::ComponentConfig;
use diagflow_core::error::RegistryError;
use diagflow_core::event::{EventData, LogLevel};
use diagflow_core::pipeline::{EventObserver, Input, Subscription};
use diagflow_core::subject::EventSubject;

/// Default interval between heartbeats.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
/// Default provider name stamped on heartbeat events.
pub const DEFAULT_PROVIDER: &str = "diagflow-heartbeat";

/// Periodic heartbeat event source.
///
/// The ticker task is started by the first subscription and stopped
/// when the last subscription is released.
pub struct HeartbeatInput {
    subject: Arc<EventSubject>,
    provider: String,
    interval: Duration,
    sequence: Arc<AtomicU64>,
    ticker: Arc<Mutex<Option<CancellationToken>>>,
}

impl HeartbeatInput {
    /// Create a heartbeat input.
    pub fn new(name: impl Into<String>, provider: impl Into<String>, interval: Duration) -> Self {
        Self {
            subject: Arc::new(EventSubject::new(name)),
            provider: provider.into(),
            interval,
            sequence: Arc::new(AtomicU64::new(0)),
            ticker: Arc::new(Mutex::new(None)),
        }
    }

    /// Build from a `[[inputs]]` entry.
    pub fn from_config(config: &ComponentConfig) -> Result<Self, RegistryError> {
        let interval_ms = match config.settings.get("interval_ms") {
            None => DEFAULT_INTERVAL.as_millis() as u64,
            Some(_) => config
                .setting_u64("interval_ms")
                .ok_or_else(|| invalid("interval_ms must be a non-negative integer"))?,
        };
        if interval_ms == 0 {
            return Err(invalid("interval_ms must be greater than 0"));
        }

        let provider = config.setting_str("provider").unwrap_or(DEFAULT_PROVIDER);
        if provider.is_empty() {
            return Err(invalid("provider must not be empty"));
        }
        let name = config.setting_str("name").unwrap_or(super::HEARTBEAT_INPUT);

        Ok(Self::new(name, provider, Duration::from_millis(interval_ms)))
    }

    /// Interval between heartbeats.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of heartbeats emitted so far.
    pub fn emitted(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Whether the ticker task is currently running.
    pub fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn start_ticker(&self) {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if ticker.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        *ticker = Some(cancel.clone());

        let subject = Arc::clone(&self.subject);
        let sequence = Arc::clone(&self.sequence);
        let provider = self.provider.clone();
        let period = self.interval;
        let started = Instant::now();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::debug!(input = subject.name(), "heartbeat ticker started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let seq = sequence.fetch_add(1, Ordering::Relaxed) + 1;
                        let event = EventData::new(provider.as_str(), LogLevel::Informational)
                            .with_payload("Message", "heartbeat")
                            .with_payload("Sequence", seq)
                            .with_payload("UptimeMs", started.elapsed().as_millis() as u64);
                        subject.push(event);
                    }
                    _ = cancel.cancelled() => {
                        tracing::debug!(input = subject.name(), "heartbeat ticker stopped");
                        break;
                    }
                }
            }
        });
    }
}

fn invalid(reason: &str) -> RegistryError {
    RegistryError::InvalidSettings {
        category: "input".to_owned(),
        kind: super::HEARTBEAT_INPUT.to_owned(),
        reason: reason.to_owned(),
    }
}

impl Input for HeartbeatInput {
    fn name(&self) -> &str {
        self.subject.name()
    }

    fn subscribe(&self, observer: Arc<dyn EventObserver>) -> Subscription {
        let inner = self.subject.subscribe(observer);
        self.start_ticker();

        let subject = Arc::clone(&self.subject);
        let ticker = Arc::clone(&self.ticker);
        Subscription::new(move || {
            inner.unsubscribe();
            if subject.observer_count() == 0 {
                let stopped = ticker.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(cancel) = stopped {
                    cancel.cancel();
                }
            }
        })
    }
}

impl Drop for HeartbeatInput {
    fn drop(&mut self) {
        let stopped = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = stopped {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect {
        events: Mutex<Vec<EventData>>,
    }

    impl EventObserver for Collect {
        fn on_next(&self, event: EventData) {
            self.events.lock().unwrap().push(event);
        }
        fn on_completed(&self) {}
        fn on_error(&self, _error: &str) {}
    }

    #[test]
    fn from_config_defaults() {
        let input = HeartbeatInput::from_config(&ComponentConfig::new("heartbeat")).unwrap();
        assert_eq!(input.interval(), DEFAULT_INTERVAL);
        assert_eq!(input.name(), "heartbeat");
        assert_eq!(input.provider, DEFAULT_PROVIDER);
    }

    #[test]
    fn from_config_reads_settings() {
        let config = ComponentConfig::new("heartbeat")
            .with_setting("interval_ms", 250i64)
            .with_setting("provider", "sample")
            .with_setting("name", "hb-1");
        let input = HeartbeatInput::from_config(&config).unwrap();
        assert_eq!(input.interval(), Duration::from_millis(250));
        assert_eq!(input.provider, "sample");
        assert_eq!(input.name(), "hb-1");
    }

    #[test]
    fn from_config_rejects_zero_interval() {
        let config = ComponentConfig::new("heartbeat").with_setting("interval_ms", 0i64);
        let err = HeartbeatInput::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("interval_ms"));
    }

    #[test]
    fn from_config_rejects_non_integer_interval() {
        let config = ComponentConfig::new("heartbeat").with_setting("interval_ms", "fast");
        assert!(HeartbeatInput::from_config(&config).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn emits_events_while_subscribed() {
        let input = HeartbeatInput::new("hb", "sample", Duration::from_millis(100));
        let observer = Arc::new(Collect::default());

        let subscription = input.subscribe(observer.clone());
        assert!(input.is_ticking());

        tokio::time::sleep(Duration::from_millis(350)).await;
        {
            let events = observer.events.lock().unwrap();
            assert_eq!(events.len(), 3);
            assert_eq!(events[0].provider_name, "sample");
            assert_eq!(events[2].payload["Sequence"].as_bits(), Some(3));
        }

        subscription.unsubscribe();
        assert!(!input.is_ticking());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(observer.events.lock().unwrap().len(), 3);
        assert_eq!(input.emitted(), 3);
    }
}
