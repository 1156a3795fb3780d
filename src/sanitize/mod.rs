//! Redaction of sensitive values before data leaves the process.
//!
//! A [`Sanitizer`] holds an ordered set of regex rules. Rules run by
//! descending priority (ties keep insertion order) and are applied
//! cumulatively: a later rule sees the output of the earlier ones. The order
//! is recomputed on every run because priorities may change between calls.
//!
//! Three modes:
//! - tree mode ([`Sanitizer::sanitize`]) rewrites every string leaf of a
//!   captured structure and returns a new copy
//! - dry run ([`Sanitizer::preview`]) reports what would change without
//!   copying or mutating anything
//! - streaming ([`Sanitizer::sanitize_stream`]) works on serialized text in
//!   bounded chunks; a match straddling a chunk boundary may be missed

mod redact;
mod stream;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use regex::Regex;

use crate::error::{DevtoolsError, Result};

pub(crate) use self::redact::redact_fields;
pub use self::redact::{join_field, join_index, Redact};
pub use self::stream::{SanitizingWriter, DEFAULT_STREAM_BUFFER_SIZE, MIN_STREAM_BUFFER_SIZE};

pub const REDACTED: &str = "[REDACTED]";
pub const DEFAULT_MAX_PREVIEW_LEN: usize = 100;
const ELLIPSIS: &str = "...";

/// One pattern/replacement pair. `replacement` may use `$1`-style groups.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    pattern: Regex,
    replacement: String,
    priority: i32,
    order: u64,
}

impl Rule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// Statistics from the most recent sanitizing run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizeStats {
    /// Total pattern matches replaced.
    pub redacted_count: usize,
    pub per_rule: BTreeMap<String, usize>,
    pub duration: Duration,
    pub bytes_processed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeOptions {
    pub dry_run: bool,
    /// 0 selects [`DEFAULT_MAX_PREVIEW_LEN`].
    pub max_preview_len: usize,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_preview_len: DEFAULT_MAX_PREVIEW_LEN,
        }
    }
}

/// A leaf a dry run found one rule would rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchLocation {
    pub path: String,
    pub rule_name: String,
    pub original: String,
    pub redacted_preview: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewReport {
    pub matches: Vec<MatchLocation>,
    pub would_redact_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SanitizeOutcome<T> {
    Sanitized(T),
    Preview(PreviewReport),
}

pub struct Sanitizer {
    rules: RwLock<Vec<Rule>>,
    next_order: AtomicU64,
    stats: Mutex<SanitizeStats>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer {
    /// A sanitizer with no rules.
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            next_order: AtomicU64::new(0),
            stats: Mutex::new(SanitizeStats::default()),
        }
    }

    pub fn with_default_rules() -> Self {
        let sanitizer = Self::new();
        for (name, pattern, replacement, priority) in default_rules() {
            if let Err(err) = sanitizer.add_pattern(&pattern, replacement, priority, name) {
                tracing::error!(rule = name, error = %err, "built-in sanitizer rule rejected");
            }
        }
        sanitizer
    }

    /// Register a rule, returning an error for an invalid pattern.
    pub fn add_pattern(
        &self,
        pattern: &str,
        replacement: &str,
        priority: i32,
        name: &str,
    ) -> Result<()> {
        let compiled = Regex::new(pattern).map_err(|source| DevtoolsError::InvalidPattern {
            name: name.to_string(),
            source,
        })?;
        let order = self.next_order.fetch_add(1, Ordering::Relaxed);
        self.rules.write().push(Rule {
            name: name.to_string(),
            pattern: compiled,
            replacement: replacement.to_string(),
            priority,
            order,
        });
        tracing::debug!(rule = name, priority, "sanitizer rule registered");
        Ok(())
    }

    /// Register a rule at setup time.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` does not compile.
    pub fn must_add_pattern(&self, pattern: &str, replacement: &str, priority: i32, name: &str) {
        if let Err(err) = self.add_pattern(pattern, replacement, priority, name) {
            panic!("{err}");
        }
    }

    /// Returns `false` if no rule has that name.
    pub fn set_priority(&self, name: &str, priority: i32) -> bool {
        let mut rules = self.rules.write();
        let mut found = false;
        for rule in rules.iter_mut().filter(|r| r.name == name) {
            rule.priority = priority;
            found = true;
        }
        found
    }

    pub fn remove_rule(&self, name: &str) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.name != name);
        rules.len() != before
    }

    /// Rules in application order.
    pub fn rules(&self) -> Vec<Rule> {
        let mut rules = self.rules.read().clone();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.order.cmp(&b.order)));
        rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    pub fn stats(&self) -> SanitizeStats {
        self.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = SanitizeStats::default();
    }

    fn record_stats(&self, stats: SanitizeStats) {
        *self.stats.lock() = stats;
    }

    pub fn sanitize_string(&self, input: &str) -> String {
        let started = Instant::now();
        let rules = self.rules();
        let mut run = SanitizeStats::default();
        let out = apply_rules(&rules, input, &mut run).unwrap_or_else(|| input.to_string());
        run.duration = started.elapsed();
        self.record_stats(run);
        out
    }

    /// Deep-copy `tree` and redact every string leaf of the copy.
    pub fn sanitize<T: Redact + Clone>(&self, tree: &T) -> T {
        let started = Instant::now();
        let rules = self.rules();
        let mut run = SanitizeStats::default();
        let mut copy = tree.clone();
        copy.redact_strings_mut("", &mut |_, leaf| {
            if let Some(rewritten) = apply_rules(&rules, leaf, &mut run) {
                *leaf = rewritten;
            }
        });
        run.duration = started.elapsed();
        tracing::debug!(
            redacted = run.redacted_count,
            bytes = run.bytes_processed,
            "sanitized captured data"
        );
        self.record_stats(run);
        copy
    }

    pub fn sanitize_with_options<T: Redact + Clone>(
        &self,
        tree: &T,
        options: SanitizeOptions,
    ) -> SanitizeOutcome<T> {
        if options.dry_run {
            SanitizeOutcome::Preview(self.preview_with_len(tree, options.max_preview_len))
        } else {
            SanitizeOutcome::Sanitized(self.sanitize(tree))
        }
    }

    /// Dry run with the default preview length.
    pub fn preview<T: Redact>(&self, tree: &T) -> PreviewReport {
        self.preview_with_len(tree, DEFAULT_MAX_PREVIEW_LEN)
    }

    fn preview_with_len<T: Redact>(&self, tree: &T, max_preview_len: usize) -> PreviewReport {
        let max_len = if max_preview_len == 0 {
            DEFAULT_MAX_PREVIEW_LEN
        } else {
            max_preview_len
        };
        let rules = self.rules();
        let mut matches = Vec::new();
        tree.redact_strings("", &mut |path, leaf| {
            let mut current = leaf.to_string();
            for rule in &rules {
                if !rule.pattern.is_match(&current) {
                    continue;
                }
                current = rule
                    .pattern
                    .replace_all(&current, rule.replacement.as_str())
                    .into_owned();
                matches.push(MatchLocation {
                    path: path.to_string(),
                    rule_name: rule.name.clone(),
                    original: truncate_preview(leaf, max_len),
                    redacted_preview: truncate_preview(&current, max_len),
                });
            }
        });
        let would_redact_count = matches.len();
        PreviewReport {
            matches,
            would_redact_count,
        }
    }
}

impl std::fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sanitizer")
            .field("rules", &self.rule_count())
            .finish()
    }
}

/// Apply every rule in order. Returns `None` when nothing matched.
pub(crate) fn apply_rules(rules: &[Rule], input: &str, run: &mut SanitizeStats) -> Option<String> {
    run.bytes_processed += input.len() as u64;
    let mut current: Option<String> = None;
    for rule in rules {
        let text = current.as_deref().unwrap_or(input);
        let hits = rule.pattern.find_iter(text).count();
        if hits == 0 {
            continue;
        }
        let rewritten = rule
            .pattern
            .replace_all(text, rule.replacement.as_str())
            .into_owned();
        run.redacted_count += hits;
        *run.per_rule.entry(rule.name.clone()).or_default() += hits;
        current = Some(rewritten);
    }
    current
}

fn truncate_preview(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &text[..cut]),
        None => text.to_string(),
    }
}

/// (name, key alternation, priority)
const KEY_VALUE_RULES: &[(&str, &str, i32)] = &[
    ("api_key", "api[_-]?key|apikey", 90),
    ("password", "password|passwd|pwd", 80),
    ("secret", "client[_-]?secret|secret", 80),
    (
        "token",
        "access[_-]?token|auth[_-]?token|refresh[_-]?token|token",
        70,
    ),
];

/// Built-in rules as (name, pattern, replacement, priority).
///
/// The `regex` crate has no look-around, so key/value rules capture the key
/// and separator and put them back. Each key/value family has three forms,
/// run in this order under one name:
/// - a JSON string value (`"key": "..."`), replaced up to its closing quote
///   with escapes kept intact
/// - a bare JSON scalar (`"key": 42`, `null`, `true`), replaced by a quoted
///   marker so serialized output stays valid JSON
/// - free text (`key=value`, `key: value`), stopping at quotes, backslashes
///   and separators
///
/// The free-text form never starts on `[` or `{`, so it skips values the
/// first two forms already rewrote along with JSON objects and arrays.
fn default_rules() -> Vec<(&'static str, String, &'static str, i32)> {
    let mut rules = vec![(
        "bearer_token",
        r"(?i)\bbearer\s+[A-Za-z0-9._~+/\-]+=*".to_string(),
        "Bearer [REDACTED]",
        100,
    )];
    for &(name, keys, priority) in KEY_VALUE_RULES {
        rules.push((
            name,
            format!(r#"(?i)\b({keys})("\s*:\s*")(?:[^"\\]|\\.)+"#),
            "${1}${2}[REDACTED]",
            priority,
        ));
        rules.push((
            name,
            format!(r#"(?i)\b({keys})(["']\s*:\s*)(?:-?[0-9][0-9.eE+\-]*|true|false|null)\b"#),
            r#"${1}${2}"[REDACTED]""#,
            priority,
        ));
        rules.push((
            name,
            format!(
                r#"(?i)\b({keys})(["']?\s*[:=]\s*["']?)[^\s"',;}}\\\[{{][^\s"',;}}\\]*"#
            ),
            "${1}${2}[REDACTED]",
            priority,
        ));
    }
    rules.push(("secret_key", r"sk-[A-Za-z0-9]{10,}".to_string(), "[REDACTED]", 60));
    // A card-length JSON number gets quoted before the free-text form sees it.
    rules.push((
        "credit_card",
        r"([:\[,]\s*)-?\d{16}(?:\.\d+)?(?:[eE][+-]?\d+)?\b".to_string(),
        r#"${1}"[REDACTED_CARD]""#,
        50,
    ));
    rules.push((
        "credit_card",
        r"\b(?:\d{4}[- ]?){3}\d{4}\b".to_string(),
        "[REDACTED_CARD]",
        50,
    ));
    rules
}
