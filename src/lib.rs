//! Count log lines by a regex-derived metric name and report them as rates.
//!
//! A [`ParserConfig`] (pattern plus optional `<name>` template) is validated by
//! [`configure`]; an [`Aggregator`] then consumes lines one at a time and turns
//! its counters into per-second [`MetricSample`]s when the host reads a window.
pub mod aggregator;
pub mod config;
pub mod configurator;
pub mod output;
pub mod pattern;
pub mod template;

pub use aggregator::{Aggregator, InvalidDuration, MetricSample, ParsingError};
pub use configurator::{configure, ConfigurationError, ParserConfig};
pub use pattern::Pattern;
pub use template::Template;
