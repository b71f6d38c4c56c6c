//! Redaction of rendered arguments and error messages

use crate::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Marker substituted for redacted content
pub const REDACTED: &str = "[REDACTED]";

/// A pure, pluggable redaction function applied before anything reaches a sink.
///
/// Cheap to clone; every wrapper holds its own handle.
#[derive(Clone)]
pub struct Sanitizer {
    func: Option<Arc<dyn Fn(&str) -> String + Send + Sync>>,
}

impl Sanitizer {
    /// Sanitizer that returns its input unchanged
    pub fn identity() -> Self {
        Self { func: None }
    }

    /// Wrap an arbitrary redaction function
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            func: Some(Arc::new(func)),
        }
    }

    /// Build a sanitizer from regex redaction patterns
    pub fn from_patterns(patterns: &[String]) -> Result<Self> {
        let regex = RegexSanitizer::new(patterns)?;
        Ok(Self::new(move |text| regex.sanitize_text(text)))
    }

    pub fn is_identity(&self) -> bool {
        self.func.is_none()
    }

    /// Apply the redaction
    pub fn apply(&self, text: &str) -> String {
        match &self.func {
            Some(func) => func(text),
            None => text.to_string(),
        }
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sanitizer")
            .field("identity", &self.is_identity())
            .finish()
    }
}

impl<F> From<F> for Sanitizer
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    fn from(func: F) -> Self {
        Self::new(func)
    }
}

/// Replace every decimal digit with `*`
pub fn mask_digits(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_digit() { '*' } else { c })
        .collect()
}

/// Capture group whose text is kept in front of the redacted value
pub const FIELD_NAME_GROUP: &str = "name";

/// Regex-driven redaction.
///
/// Every match is replaced by [`REDACTED`]. A pattern that captures a named
/// group `name` keeps that text as `name=[REDACTED]`; no other group is ever
/// written back.
#[derive(Debug, Clone)]
pub struct RegexSanitizer {
    patterns: Vec<Regex>,
}

impl RegexSanitizer {
    /// Compile a set of redaction patterns
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());

        for pattern_str in patterns {
            let regex = Regex::new(pattern_str).map_err(|e| Error::Config {
                message: format!("Invalid redaction pattern '{}': {}", pattern_str, e),
            })?;
            compiled.push(regex);
        }

        Ok(Self { patterns: compiled })
    }

    /// Sanitize a text string
    pub fn sanitize_text(&self, text: &str) -> String {
        let mut sanitized = text.to_string();

        for pattern in &self.patterns {
            sanitized = pattern
                .replace_all(&sanitized, |caps: &regex::Captures| {
                    match caps.name(FIELD_NAME_GROUP) {
                        Some(name) => format!("{}={}", name.as_str(), REDACTED),
                        None => REDACTED.to_string(),
                    }
                })
                .into_owned();
        }

        sanitized
    }
}

/// Built-in patterns switched on by the `default_redaction` option
pub struct SanitizationPatterns;

impl SanitizationPatterns {
    /// API keys, tokens and passwords in `name=value` form, and bearer tokens
    pub const CREDENTIALS: &'static [&'static str] = &[
        r"(?i)(?P<name>api_?key|token|secret|password)\s*[:=]\s*['\x22]?[a-zA-Z0-9_\-\.]{4,}['\x22]?",
        r"(?i)bearer\s+[a-zA-Z0-9_\-\.]+",
    ];

    /// Social security numbers, phone numbers, email addresses
    pub const PII: &'static [&'static str] = &[
        r"\b\d{3}-\d{2}-\d{4}\b",
        r"\b\d{3}-\d{3}-\d{4}\b",
        r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b",
    ];

    /// Card and account numbers
    pub const FINANCIAL: &'static [&'static str] = &[
        r"\b\d{4}[\s\-]?\d{4}[\s\-]?\d{4}[\s\-]?\d{4}\b",
        r"\b\d{8,17}\b",
    ];

    pub fn all_default_patterns() -> Vec<String> {
        [Self::CREDENTIALS, Self::PII, Self::FINANCIAL]
            .concat()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}
