//! Rendering metric samples for stdout.
use crate::aggregator::MetricSample;
use crate::config::{OutputConfig, OutputFormat};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct JsonSample<'a> {
    name: String,
    value: f64,
    timestamp: &'a chrono::DateTime<chrono::Utc>,
}

/// Full metric name with the configured prefix and suffix, dot-joined.
pub fn qualified_name(output: &OutputConfig, name: &str) -> String {
    let mut parts = Vec::with_capacity(3);
    if !output.metric_prefix.is_empty() {
        parts.push(output.metric_prefix.as_str());
    }
    parts.push(name);
    if !output.metric_suffix.is_empty() {
        parts.push(output.metric_suffix.as_str());
    }
    parts.join(".")
}

/// Format one sample as a single output line (no trailing newline).
pub fn format_sample(
    output: &OutputConfig,
    sample: &MetricSample,
) -> Result<String, serde_json::Error> {
    let name = qualified_name(output, &sample.name);
    match output.format {
        OutputFormat::Text => Ok(format!(
            "{} {} {}",
            name,
            sample.value,
            sample.timestamp.timestamp()
        )),
        OutputFormat::Json => serde_json::to_string(&JsonSample {
            name,
            value: sample.value,
            timestamp: &sample.timestamp,
        }),
    }
}

/// Write every sample, one per line.
pub fn write_samples<W: Write>(
    out: &mut W,
    output: &OutputConfig,
    samples: &[MetricSample],
) -> std::io::Result<()> {
    for sample in samples {
        let line = format_sample(output, sample).map_err(std::io::Error::from)?;
        writeln!(out, "{line}")?;
    }
    out.flush()
}
