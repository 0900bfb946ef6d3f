//! Artifact publishing: turns a stage output directory into one URL.
//!
//! Resolution order for a published directory:
//! 1. exactly one entry: that entry
//! 2. exactly one entry matching the stage's primary artifact rule: that entry
//! 3. otherwise an HTML index linking every entry, itself published

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::cas::{AddedEntry, ContentStore};
use crate::domain::{KontinuumError, Result};

/// Stage name whose debug output is surfaced directly by default.
pub const SPOON_STAGE: &str = "spoon";

/// Default primary artifact pattern for the `spoon` stage. The store
/// publishes files only, so a `debug` report directory is matched through
/// its `index.html`.
pub const SPOON_DEBUG_PATTERN: &str = r"^spoon/.*/debug(/index\.html)?$";

/// Per-stage patterns that pick the primary artifact out of a
/// multi-file stage output.
#[derive(Debug, Clone, Default)]
pub struct PrimaryArtifactRules {
    by_stage: HashMap<String, Regex>,
    fallback: Option<Regex>,
}

impl PrimaryArtifactRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pattern` for `stage`.
    pub fn with_rule(mut self, stage: impl Into<String>, pattern: &str) -> Result<Self> {
        let regex = compile(pattern)?;
        self.by_stage.insert(stage.into(), regex);
        Ok(self)
    }

    /// Pattern used for stages without a rule of their own.
    pub fn with_fallback(mut self, pattern: &str) -> Result<Self> {
        self.fallback = Some(compile(pattern)?);
        Ok(self)
    }

    fn rule_for(&self, stage: &str) -> Option<&Regex> {
        self.by_stage.get(stage).or(self.fallback.as_ref())
    }

    /// The single entry matching the stage rule, if exactly one does.
    pub fn pick<'a>(&self, stage: &str, entries: &'a [AddedEntry]) -> Option<&'a AddedEntry> {
        let rule = self.rule_for(stage)?;
        let mut matching = entries.iter().filter(|e| rule.is_match(&e.name));
        match (matching.next(), matching.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| KontinuumError::Config(format!("invalid artifact pattern {pattern:?}: {e}")))
}

/// The built-in rule set.
pub fn default_rules() -> PrimaryArtifactRules {
    let mut rules = PrimaryArtifactRules::new();
    if let Ok(regex) = Regex::new(SPOON_DEBUG_PATTERN) {
        rules.by_stage.insert(SPOON_STAGE.to_string(), regex);
    }
    rules
}

/// Publishes stage outputs and diagnostics to a [`ContentStore`].
pub struct ArtifactPublisher {
    store: Arc<dyn ContentStore>,
    url_scheme: String,
    rules: PrimaryArtifactRules,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn ContentStore>, url_scheme: impl Into<String>) -> Self {
        Self {
            store,
            url_scheme: url_scheme.into(),
            rules: default_rules(),
        }
    }

    pub fn with_rules(mut self, rules: PrimaryArtifactRules) -> Self {
        self.rules = rules;
        self
    }

    /// Publish `dir` (output of `stage`) and return exactly one URL.
    pub async fn publish(&self, stage: &str, dir: &Path) -> Result<String> {
        let entries = self.store.add_directory(dir).await?;
        debug!(stage = %stage, entries = entries.len(), "published stage output");

        if let [only] = entries.as_slice() {
            return Ok(only.hash.url(&self.url_scheme));
        }

        if let Some(primary) = self.rules.pick(stage, &entries) {
            debug!(stage = %stage, artifact = %primary.name, "using primary artifact");
            return Ok(primary.hash.url(&self.url_scheme));
        }

        let index = self.render_index(&entries);
        let hash = self.store.add_string(&index).await?;
        Ok(hash.url(&self.url_scheme))
    }

    /// Publish a text blob (e.g. a checkout diagnostic) and return its URL.
    pub async fn publish_text(&self, text: &str) -> Result<String> {
        let hash = self.store.add_string(text).await?;
        Ok(hash.url(&self.url_scheme))
    }

    /// HTML index with one link per entry.
    pub fn render_index(&self, entries: &[AddedEntry]) -> String {
        entries
            .iter()
            .map(|e| {
                format!(
                    "<a href='{}'>{}</a>",
                    escape_html(&e.hash.url(&self.url_scheme)),
                    escape_html(&e.name)
                )
            })
            .collect::<Vec<_>>()
            .join("<br/>")
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&#39;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
