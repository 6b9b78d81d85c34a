use crate::configurator::{ConfigurationError, ParserConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from regexcount.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct HostConfig {
    pub parser: ParserSection,
    pub window: WindowConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ParserSection {
    pub regex: Option<String>,
    pub metric_template: Option<String>,
    /// Legacy `-r <regex> -t <template>` option string.
    pub options: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub duration_secs: f64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub metric_prefix: String,
    pub metric_suffix: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            duration_secs: 60.0,
        }
    }
}

/// Errors from reading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub regex: Option<String>,
    pub metric_template: Option<String>,
    pub parser_options: Option<String>,
    pub duration_secs: Option<f64>,
    pub format: Option<OutputFormat>,
    pub metric_prefix: Option<String>,
    pub metric_suffix: Option<String>,
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<HostConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(HostConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

impl HostConfig {
    pub fn apply_overrides(&mut self, o: Overrides) {
        if let Some(regex) = o.regex {
            self.parser.regex = Some(regex);
        }
        if let Some(template) = o.metric_template {
            self.parser.metric_template = Some(template);
        }
        if let Some(options) = o.parser_options {
            self.parser.options = Some(options);
        }
        if let Some(d) = o.duration_secs {
            self.window.duration_secs = d;
        }
        if let Some(format) = o.format {
            self.output.format = format;
        }
        if let Some(prefix) = o.metric_prefix {
            self.output.metric_prefix = prefix;
        }
        if let Some(suffix) = o.metric_suffix {
            self.output.metric_suffix = suffix;
        }
    }

    /// Resolve the effective parser settings.
    ///
    /// An explicit `regex` wins over the option string. A `metric_template`
    /// given alongside an option string replaces the one inside it.
    pub fn parser_config(&self) -> Result<ParserConfig, ConfigurationError> {
        let mut config = match (&self.parser.regex, &self.parser.options) {
            (Some(regex), _) => ParserConfig::new(regex.clone(), None),
            (None, Some(options)) => ParserConfig::from_option_string(options)?,
            (None, None) => return Err(ConfigurationError::MissingPattern),
        };
        if self.parser.metric_template.is_some() {
            config.metric_template = self.parser.metric_template.clone();
        }
        Ok(config)
    }
}
