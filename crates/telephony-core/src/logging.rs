//! Logging setup
//!
//! The crate logs through `tracing` under the `telephony_core` target tree;
//! embedding applications install whatever subscriber they like.
//! [`setup_logging`] is a ready-made one driven by a [`LoggingConfig`] that can
//! live in the same YAML file as the rest of the configuration:
//!
//! ```yaml
//! level: info
//! directives:
//!   - telephony_core::orchestrator=debug
//! format: json
//! ```
//!
//! Other crates stay at `warn` unless a directive says otherwise. When
//! `honor_env` is set and `RUST_LOG` is present, `RUST_LOG` wins.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Result, TelephonyError};

/// Target every event of this crate is logged under
pub const LOG_TARGET: &str = "telephony_core";

/// Output format of the fmt subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Json,
}

/// Configuration for [`setup_logging`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for `telephony_core` targets
    pub level: String,
    /// Extra `target=level` directives, applied after `level`
    pub directives: Vec<String>,
    pub format: LogFormat,
    /// Include file and line of the call site
    pub file_info: bool,
    /// Log span open/close
    pub log_spans: bool,
    /// Let `RUST_LOG` replace the directives when it is set
    pub honor_env: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            format: LogFormat::Full,
            file_info: false,
            log_spans: false,
            honor_env: true,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level: level.to_string().to_lowercase(),
            ..Default::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.filter_directives()?;
        Ok(config)
    }

    /// Add a `target=level` directive, e.g. `telephony_core::connection=trace`
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    /// Ignore `RUST_LOG`
    pub fn without_env(mut self) -> Self {
        self.honor_env = false;
        self
    }

    /// The filter directives this configuration stands for, in order
    pub fn filter_directives(&self) -> Result<Vec<Directive>> {
        let level = parse_log_level(&self.level)?;
        let mut directives = vec![
            Directive::from(LevelFilter::WARN),
            directive(&format!("{}={}", LOG_TARGET, level.as_str().to_ascii_lowercase()))?,
        ];
        for raw in &self.directives {
            directives.push(directive(raw)?);
        }
        Ok(directives)
    }

    /// Build the `EnvFilter` used by [`setup_logging`]
    pub fn env_filter(&self) -> Result<EnvFilter> {
        if self.honor_env && std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
            return EnvFilter::try_from_default_env().map_err(|e| TelephonyError::config(format!("Invalid RUST_LOG: {}", e)));
        }
        Ok(self
            .filter_directives()?
            .into_iter()
            .fold(EnvFilter::default(), |filter, d| filter.add_directive(d)))
    }
}

fn directive(raw: &str) -> Result<Directive> {
    Directive::from_str(raw).map_err(|e| TelephonyError::config(format!("Invalid log directive '{}': {}", raw, e)))
}

/// Install a global fmt subscriber
///
/// Fails if a global subscriber is already installed.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let filter = config.env_filter()?;

    let span_events = if config.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = match config.format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };

    installed.map_err(|e| TelephonyError::Logging {
        message: e.to_string(),
    })?;
    tracing::debug!(target: LOG_TARGET, level = %config.level, format = ?config.format, "Logging installed");
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| TelephonyError::config(format!("Invalid log level: {}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parsed(raw: &str) -> Directive {
        raw.parse().unwrap()
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert!(parse_log_level("chatty").is_err());
    }

    #[test]
    fn test_crate_level_over_quiet_default() {
        let config = LoggingConfig::new(Level::DEBUG).with_directive("telephony_core::orchestrator=trace");
        assert_eq!(
            config.filter_directives().unwrap(),
            vec![
                Directive::from(LevelFilter::WARN),
                parsed("telephony_core=debug"),
                parsed("telephony_core::orchestrator=trace"),
            ]
        );
    }

    #[test]
    fn test_bad_directive_is_a_config_error() {
        let config = LoggingConfig::default().with_directive("telephony_core=loud");
        assert!(matches!(
            config.filter_directives(),
            Err(TelephonyError::Configuration { .. })
        ));
        let config = LoggingConfig {
            level: "chatty".to_string(),
            ..Default::default()
        };
        assert!(config.filter_directives().is_err());
    }

    #[test]
    fn test_from_yaml() {
        let config = LoggingConfig::from_yaml_str(
            "level: warn\ndirectives:\n  - telephony_core::connection=debug\nformat: json\nhonor_env: false\n",
        )
        .unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.honor_env);
        assert_eq!(config.filter_directives().unwrap()[1], parsed("telephony_core=warn"));

        assert!(LoggingConfig::from_yaml_str("level: nope\n").is_err());
    }

    #[test]
    fn test_env_filter_without_env() {
        let config = LoggingConfig::default().without_env();
        assert!(config.env_filter().is_ok());
    }
}
