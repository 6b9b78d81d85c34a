//! Compiled line matcher.
//!
//! Lines are matched as bytes so hosts can pass through whatever the log file
//! contains. A match must start at the first byte of the line; anything after
//! the matched prefix is ignored unless the pattern anchors to `$` itself.
use regex::bytes::Regex;

/// An immutable compiled pattern with named capture groups.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

/// Named-group values from a successful match.
pub struct Captures<'h> {
    inner: regex::bytes::Captures<'h>,
}

impl Pattern {
    /// Compile `source` as written.
    pub fn compile(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(source)?;
        Ok(Pattern {
            source: source.to_string(),
            regex,
        })
    }

    /// The pattern as supplied by the caller.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of all named groups, in group order.
    pub fn group_names(&self) -> Vec<&str> {
        self.regex.capture_names().flatten().collect()
    }

    pub fn is_match(&self, line: &[u8]) -> bool {
        self.regex.find(line).is_some_and(|m| m.start() == 0)
    }

    /// Match `line` from its first byte. `None` means the line did not match.
    ///
    /// Leftmost-first search reports a match at offset 0 whenever one exists,
    /// so any match starting later means the line does not match.
    pub fn captures<'h>(&self, line: &'h [u8]) -> Option<Captures<'h>> {
        self.regex
            .captures(line)
            .filter(|caps| caps.get_match().start() == 0)
            .map(|inner| Captures { inner })
    }
}

impl<'h> Captures<'h> {
    /// Value captured by group `name`.
    ///
    /// Returns `None` both for names that are not groups of the pattern and for
    /// groups that did not take part in the match.
    pub fn get(&self, name: &str) -> Option<&'h [u8]> {
        self.inner.name(name).map(|m| m.as_bytes())
    }

    /// The whole matched prefix of the line.
    pub fn matched(&self) -> &'h [u8] {
        self.inner.get_match().as_bytes()
    }
}
