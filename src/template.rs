//! Metric-name templates: `<name>` placeholders filled from regex captures.
//!
//! Placeholder recognition is purely textual (`<` followed by anything up to
//! the next `>`). The same scan is used to derive a default template from the
//! raw pattern source, so a literal `<...>` in a pattern that is not a group
//! name still ends up in the derived template and always renders empty.
//! This is a best-effort default, not a parse of the regex syntax.
//! Tokens are not restricted to identifiers: a `<` inside a token is accepted,
//! so `<(?P<b>` scans as one token named `(?P<b`.
use regex::Regex;
use std::sync::LazyLock;

/// Matches a single `<name>` placeholder token.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Separator used when joining tokens into a derived template.
const DERIVED_SEPARATOR: &str = ".";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// An immutable metric-name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

/// A captured value could not be turned into metric-name text.
#[derive(Debug)]
pub struct RenderError {
    pub placeholder: String,
    pub source: std::str::Utf8Error,
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "value captured for <{}> is not valid UTF-8: {}",
            self.placeholder, self.source
        )
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl Template {
    /// Split template text into literal and placeholder segments.
    pub fn parse(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;

        for token in PLACEHOLDER.find_iter(text) {
            if token.start() > last {
                segments.push(Segment::Literal(text[last..token.start()].to_string()));
            }
            let name = &text[token.start() + 1..token.end() - 1];
            segments.push(Segment::Placeholder(name.to_string()));
            last = token.end();
        }
        if last < text.len() {
            segments.push(Segment::Literal(text[last..].to_string()));
        }

        Template {
            source: text.to_string(),
            segments,
        }
    }

    /// Build the default template from a raw pattern source.
    ///
    /// Every `<...>` token found in `pattern_source` is kept (brackets
    /// included, duplicates included, in order of appearance) and the tokens
    /// are joined with `.`. No tokens gives the empty template.
    pub fn derive_from_pattern(pattern_source: &str) -> Self {
        let tokens: Vec<&str> = PLACEHOLDER
            .find_iter(pattern_source)
            .map(|m| m.as_str())
            .collect();
        Self::parse(&tokens.join(DERIVED_SEPARATOR))
    }

    /// The template text as written (or derived).
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Substitute every placeholder using `lookup`.
    ///
    /// A placeholder for which `lookup` returns `None` renders as the empty
    /// string.
    pub fn render<'a, F>(&self, lookup: F) -> Result<String, RenderError>
    where
        F: Fn(&str) -> Option<&'a [u8]>,
    {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    if let Some(bytes) = lookup(name) {
                        let value = std::str::from_utf8(bytes).map_err(|e| RenderError {
                            placeholder: name.clone(),
                            source: e,
                        })?;
                        out.push_str(value);
                    }
                }
            }
        }
        Ok(out)
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
