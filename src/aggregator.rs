//! Per-line metric accumulation and window-to-rate conversion.
//!
//! The host owns window boundaries: it feeds lines with [`Aggregator::consume_line`]
//! (or [`Aggregator::consume_bytes`]), calls [`Aggregator::read_window`] with the
//! elapsed seconds, then [`Aggregator::reset_window`] to start the next window.
//! Reading never clears the counters on its own.
use crate::configurator::{configure, ConfigurationError, ParserConfig};
use crate::pattern::Pattern;
use crate::template::{RenderError, Template};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// One reported metric for a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub name: String,
    /// Occurrences per second over the window.
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// A matching line whose metric name could not be derived.
#[derive(Debug)]
pub struct ParsingError {
    /// The offending line, lossily decoded.
    pub line: String,
    pub source: RenderError,
}

impl std::fmt::Display for ParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "regex match or contents failed for line {:?}: {}", self.line, self.source)
    }
}

impl std::error::Error for ParsingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// `read_window` was given a duration that cannot produce a rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidDuration(pub f64);

impl std::fmt::Display for InvalidDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "window duration must be a positive number of seconds, got {}",
            self.0
        )
    }
}

impl std::error::Error for InvalidDuration {}

/// Counts lines per derived metric name.
#[derive(Debug)]
pub struct Aggregator {
    pattern: Pattern,
    template: Template,
    counters: HashMap<String, f64>,
}

impl Aggregator {
    /// Configure and build an aggregator in one step.
    pub fn new(config: &ParserConfig) -> Result<Self, ConfigurationError> {
        let (pattern, template) = configure(config)?;
        Ok(Self::from_parts(pattern, template))
    }

    pub fn from_parts(pattern: Pattern, template: Template) -> Self {
        Aggregator {
            pattern,
            template,
            counters: HashMap::new(),
        }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Feed one line (without its trailing newline).
    ///
    /// Returns the metric that was incremented, or `None` if the line did not
    /// match. On error the counters are left untouched.
    pub fn consume_line(&mut self, line: &str) -> Result<Option<String>, ParsingError> {
        self.consume_bytes(line.as_bytes())
    }

    /// Same as [`consume_line`](Self::consume_line) for raw, possibly non-UTF-8 input.
    pub fn consume_bytes(&mut self, line: &[u8]) -> Result<Option<String>, ParsingError> {
        let caps = match self.pattern.captures(line) {
            Some(caps) => caps,
            None => return Ok(None),
        };

        let metric = self
            .template
            .render(|name| caps.get(name))
            .map_err(|source| ParsingError {
                line: String::from_utf8_lossy(line).into_owned(),
                source,
            })?;

        *self.counters.entry(metric.clone()).or_insert(0.0) += 1.0;
        Ok(Some(metric))
    }

    /// Rates for every metric seen since creation or the last reset.
    ///
    /// `duration_secs` must be finite and greater than zero. Samples come
    /// back sorted by name.
    pub fn read_window(&self, duration_secs: f64) -> Result<Vec<MetricSample>, InvalidDuration> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(InvalidDuration(duration_secs));
        }

        let timestamp = Utc::now();
        let mut samples: Vec<MetricSample> = self
            .counters
            .iter()
            .map(|(name, count)| MetricSample {
                name: name.clone(),
                value: count / duration_secs,
                timestamp,
            })
            .collect();
        samples.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(
            metrics = samples.len(),
            duration_secs,
            "read metric window"
        );
        Ok(samples)
    }

    /// Clear all counters, starting a new window.
    pub fn reset_window(&mut self) {
        self.counters.clear();
    }

    /// Accumulated count for `name` in the current window.
    pub fn count(&self, name: &str) -> Option<f64> {
        self.counters.get(name).copied()
    }

    /// Number of distinct metrics in the current window.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level_aggregator() -> Aggregator {
        Aggregator::new(&ParserConfig::new(r"^(?P<level>\w+): ", None)).unwrap()
    }

    fn rates(samples: &[MetricSample]) -> Vec<(&str, f64)> {
        samples.iter().map(|s| (s.name.as_str(), s.value)).collect()
    }

    #[test]
    fn test_end_to_end_level_rates() {
        let mut agg = level_aggregator();
        assert_eq!(agg.template().as_str(), "<level>");

        agg.consume_line("ERROR: disk full").unwrap();
        agg.consume_line("ERROR: disk full").unwrap();
        agg.consume_line("INFO: started").unwrap();

        let samples = agg.read_window(10.0).unwrap();
        assert_eq!(rates(&samples), vec![("ERROR", 0.2), ("INFO", 0.1)]);
    }

    #[test]
    fn test_consume_returns_metric_name() {
        let mut agg = level_aggregator();
        assert_eq!(
            agg.consume_line("WARN: low memory").unwrap().as_deref(),
            Some("WARN")
        );
        assert_eq!(agg.consume_line("garbage line").unwrap(), None);
    }

    #[test]
    fn test_unmatched_lines_are_inert() {
        let mut agg = level_aggregator();
        agg.consume_line("ERROR: disk full").unwrap();
        let before = agg.read_window(10.0).unwrap();

        agg.consume_line("garbage line").unwrap();
        agg.consume_line("").unwrap();
        agg.consume_line("  INFO: indented").unwrap();

        assert_eq!(agg.len(), 1);
        assert_eq!(rates(&agg.read_window(10.0).unwrap()), rates(&before));
    }

    #[test]
    fn test_first_increment_starts_from_zero() {
        let mut agg = level_aggregator();
        assert_eq!(agg.count("ERROR"), None);
        agg.consume_line("ERROR: disk full").unwrap();
        assert_eq!(agg.count("ERROR"), Some(1.0));
        agg.consume_line("ERROR: disk full").unwrap();
        assert_eq!(agg.count("ERROR"), Some(2.0));
    }

    #[test]
    fn test_counter_equals_number_of_matches() {
        let mut agg = level_aggregator();
        for _ in 0..250 {
            agg.consume_line("DEBUG: tick").unwrap();
        }
        assert_eq!(agg.count("DEBUG"), Some(250.0));
        assert_eq!(agg.count("INFO"), None);
    }

    #[test]
    fn test_explicit_template() {
        let mut agg = Aggregator::new(&ParserConfig::new(
            r#".*HTTP/1.\d"\s(?P<status_code>\d)\d{2}\s.*"#,
            Some("http_<status_code>xx".to_string()),
        ))
        .unwrap();

        agg.consume_line(r#"127.0.0.1 - - [10/Oct/2000:13:55:36 -0700] "GET /a.gif HTTP/1.0" 200 2326"#)
            .unwrap();
        agg.consume_line(r#"127.0.0.1 - - [10/Oct/2000:13:55:37 -0700] "GET /b.gif HTTP/1.1" 404 12"#)
            .unwrap();
        agg.consume_line(r#"127.0.0.1 - - [10/Oct/2000:13:55:38 -0700] "GET /c.gif HTTP/1.1" 204 0"#)
            .unwrap();

        assert_eq!(agg.count("http_2xx"), Some(2.0));
        assert_eq!(agg.count("http_4xx"), Some(1.0));
    }

    #[test]
    fn test_missing_group_renders_empty() {
        let mut agg = Aggregator::new(&ParserConfig::new(
            r"^(?:(?P<error>E)|(?P<warn>W))\d+",
            Some("codes.<error><warn>.<nope>".to_string()),
        ))
        .unwrap();

        agg.consume_line("E42").unwrap();
        agg.consume_line("W7").unwrap();

        assert_eq!(agg.count("codes.E."), Some(1.0));
        assert_eq!(agg.count("codes.W."), Some(1.0));
    }

    #[test]
    fn test_pattern_without_groups_counts_under_empty_name() {
        let mut agg = Aggregator::new(&ParserConfig::new(r"ERROR", None)).unwrap();
        agg.consume_line("ERROR one").unwrap();
        agg.consume_line("ERROR two").unwrap();
        assert_eq!(agg.count(""), Some(2.0));
    }

    #[test]
    fn test_rates_scale_inversely_with_duration() {
        let mut agg = level_aggregator();
        for _ in 0..3 {
            agg.consume_line("ERROR: x").unwrap();
        }
        let r1 = agg.read_window(2.0).unwrap()[0].value;
        let r2 = agg.read_window(8.0).unwrap()[0].value;
        assert_eq!(r1, 1.5);
        assert_eq!(r2, 0.375);
        assert_eq!(r1 / r2, 8.0 / 2.0);
    }

    #[test]
    fn test_read_window_is_pure() {
        let mut agg = level_aggregator();
        agg.consume_line("INFO: a").unwrap();
        agg.read_window(1.0).unwrap();
        agg.read_window(1.0).unwrap();
        assert_eq!(agg.count("INFO"), Some(1.0));
    }

    #[test]
    fn test_reset_window_clears_counters() {
        let mut agg = level_aggregator();
        agg.consume_line("INFO: a").unwrap();
        agg.reset_window();
        assert!(agg.is_empty());
        assert!(agg.read_window(1.0).unwrap().is_empty());

        agg.consume_line("INFO: b").unwrap();
        assert_eq!(agg.count("INFO"), Some(1.0));
    }

    #[test]
    fn test_degenerate_durations_rejected() {
        let mut agg = level_aggregator();
        agg.consume_line("INFO: a").unwrap();
        assert_eq!(agg.read_window(0.0), Err(InvalidDuration(0.0)));
        assert_eq!(agg.read_window(-5.0), Err(InvalidDuration(-5.0)));
        assert!(agg.read_window(f64::NAN).is_err());
        assert!(agg.read_window(f64::INFINITY).is_err());
    }

    #[test]
    fn test_empty_window_reads_empty() {
        let agg = level_aggregator();
        assert!(agg.read_window(60.0).unwrap().is_empty());
    }

    #[test]
    fn test_samples_share_timestamp() {
        let mut agg = level_aggregator();
        agg.consume_line("INFO: a").unwrap();
        agg.consume_line("WARN: b").unwrap();
        let samples = agg.read_window(1.0).unwrap();
        assert_eq!(samples[0].timestamp, samples[1].timestamp);
    }

    #[test]
    fn test_non_utf8_capture_is_parsing_error() {
        let mut agg = Aggregator::new(&ParserConfig::new(r"(?-u:(?P<raw>.+))", None)).unwrap();

        let err = agg.consume_bytes(b"\xff\xfe bad").unwrap_err();
        assert_eq!(err.source.placeholder, "raw");
        assert!(err.line.contains("bad"));
        assert!(agg.is_empty());

        // The aggregator keeps working after a failed line.
        assert_eq!(
            agg.consume_bytes(b"fine").unwrap().as_deref(),
            Some("fine")
        );
        assert_eq!(agg.count("fine"), Some(1.0));
    }

    #[test]
    fn test_non_utf8_outside_capture_is_fine() {
        let mut agg = level_aggregator();
        agg.consume_bytes(b"INFO: caf\xe9").unwrap();
        assert_eq!(agg.count("INFO"), Some(1.0));
    }

    #[test]
    fn test_invalid_pattern_prevents_creation() {
        let err = Aggregator::new(&ParserConfig::new(r"(unclosed", None)).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPattern { .. }));
    }

    #[test]
    fn test_shareable_behind_mutex() {
        let shared = std::sync::Arc::new(std::sync::Mutex::new(level_aggregator()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        shared.lock().unwrap().consume_line("INFO: x").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(shared.lock().unwrap().count("INFO"), Some(100.0));
    }
}
