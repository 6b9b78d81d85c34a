//! Construction-time parser options: compile the pattern, resolve the template.
use crate::pattern::Pattern;
use crate::template::Template;
use clap::Parser;

/// The two settings a regex-count parser is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserConfig {
    /// Regular expression matched against the start of each line.
    pub regex: String,
    /// Metric-name template; derived from `regex` when absent or empty.
    pub metric_template: Option<String>,
}

/// Errors that prevent a parser from being configured.
#[derive(Debug)]
pub enum ConfigurationError {
    /// No pattern was supplied at all.
    MissingPattern,
    /// The pattern string was empty.
    EmptyPattern,
    /// The pattern does not compile.
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
    /// The legacy option string could not be parsed.
    Options { source: clap::Error },
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::MissingPattern => {
                write!(f, "no regex configured (use --regex or parser options)")
            }
            ConfigurationError::EmptyPattern => write!(f, "regex must not be empty"),
            ConfigurationError::InvalidPattern { pattern, source } => {
                write!(f, "invalid regex {pattern:?}: {source}")
            }
            ConfigurationError::Options { source } => {
                write!(f, "invalid parser options: {source}")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigurationError::InvalidPattern { source, .. } => Some(source),
            ConfigurationError::Options { source } => Some(source),
            ConfigurationError::MissingPattern | ConfigurationError::EmptyPattern => None,
        }
    }
}

/// Flags accepted in a parser option string, e.g.
/// `-r .*HTTP/1.\d"\s(?P<status_code>\d)\d{2}\s.* -t http_<status_code>xx`.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
struct OptionArgs {
    /// Regular expression for matching lines.
    #[arg(short, long, allow_hyphen_values = true)]
    regex: String,

    /// Template used to build the metric name from named groups.
    #[arg(short = 't', long = "metric-template", allow_hyphen_values = true)]
    metric_template: Option<String>,
}

impl ParserConfig {
    pub fn new(regex: impl Into<String>, metric_template: Option<String>) -> Self {
        Self {
            regex: regex.into(),
            metric_template,
        }
    }

    /// Parse a whitespace-separated option string.
    ///
    /// Tokens are split on whitespace only, so a pattern cannot contain a
    /// literal space; use `\s` instead.
    pub fn from_option_string(options: &str) -> Result<Self, ConfigurationError> {
        let args = OptionArgs::try_parse_from(options.split_whitespace())
            .map_err(|source| ConfigurationError::Options { source })?;
        Ok(Self {
            regex: args.regex,
            metric_template: args.metric_template,
        })
    }
}

/// Compile the pattern and resolve the metric template.
pub fn configure(config: &ParserConfig) -> Result<(Pattern, Template), ConfigurationError> {
    if config.regex.is_empty() {
        return Err(ConfigurationError::EmptyPattern);
    }

    let pattern =
        Pattern::compile(&config.regex).map_err(|source| ConfigurationError::InvalidPattern {
            pattern: config.regex.clone(),
            source,
        })?;

    let template = match config.metric_template.as_deref() {
        Some(t) if !t.is_empty() => Template::parse(t),
        _ => Template::derive_from_pattern(&config.regex),
    };

    tracing::debug!(
        pattern = %pattern.as_str(),
        template = %template,
        groups = ?pattern.group_names(),
        "configured regex parser"
    );

    let groups = pattern.group_names();
    for name in template.placeholders() {
        if !groups.contains(&name) {
            tracing::warn!(
                placeholder = name,
                "template placeholder has no matching group, it will always be empty"
            );
        }
    }

    Ok((pattern, template))
}
