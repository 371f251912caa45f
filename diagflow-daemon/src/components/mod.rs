//! Built-in daemon components.
//!
//! The pipeline crate only knows the collaborator traits. The daemon
//! ships a small set of concrete components and registers them,
//! together with the built-in filters, into a [`ComponentRegistry`].
//!
//! | Kind | Category | Settings |
//! |---|---|---|
//! | `heartbeat` | input | `interval_ms` (default 1000), `provider` (default `"diagflow-heartbeat"`), `name` |
//! | `stdout` | output | none |

pub mod heartbeat;
pub mod stdout;

use std::sync::Arc;

use diagflow_core::error::RegistryError;
use diagflow_core::pipeline::{Input, Output};
use diagflow_core::registry::ComponentRegistry;
use diagflow_event_pipeline::register_builtin_filters;

pub use heartbeat::HeartbeatInput;
pub use stdout::JsonLinesOutput;

/// Kind name of the heartbeat input.
pub const HEARTBEAT_INPUT: &str = "heartbeat";
/// Kind name of the stdout output.
pub const STDOUT_OUTPUT: &str = "stdout";

/// Build a registry with every component the daemon knows about.
pub fn default_registry() -> Result<ComponentRegistry, RegistryError> {
    let mut registry = ComponentRegistry::new();
    register_builtin_filters(&mut registry)?;
    register_daemon_components(&mut registry)?;
    Ok(registry)
}

/// Register the daemon's built-in inputs and outputs.
pub fn register_daemon_components(registry: &mut ComponentRegistry) -> Result<(), RegistryError> {
    registry.register_input(HEARTBEAT_INPUT, |config, _health| {
        let input = HeartbeatInput::from_config(config)?;
        Ok(Arc::new(input) as Arc<dyn Input>)
    })?;
    registry.register_output(STDOUT_OUTPUT, |config, _health| {
        Ok(Arc::new(JsonLinesOutput::stdout(config.display_name())) as Arc<dyn Output>)
    })?;
    Ok(())
}
