//! CLI argument definitions for diagflow-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use diagflow_core::config::DiagflowConfig;

/// Diagflow diagnostics event pipeline daemon.
///
/// Builds the configured inputs, filters and outputs into a batching
/// event pipeline and runs it until SIGINT or SIGTERM.
#[derive(Parser, Debug)]
#[command(name = "diagflow-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to diagflow.toml configuration file.
    #[arg(short, long, default_value = "/etc/diagflow/diagflow.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply CLI overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut DiagflowConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_system_config() {
        let cli = DaemonCli::parse_from(["diagflow-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/diagflow/diagflow.toml"));
        assert!(!cli.validate);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn overrides_replace_general_section() {
        let cli = DaemonCli::parse_from([
            "diagflow-daemon",
            "--config",
            "/tmp/d.toml",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
            "--validate",
        ]);
        assert!(cli.validate);

        let mut config = DiagflowConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "pretty");
    }

    #[test]
    fn missing_overrides_keep_config_values() {
        let cli = DaemonCli::parse_from(["diagflow-daemon"]);
        let mut config = DiagflowConfig::default();
        config.general.log_level = "warn".to_owned();
        cli.apply_overrides(&mut config);
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.general.log_format, "json");
    }
}
