//! Rule matching logic.
//!
//! Resolves an inbound `(path, method)` pair to at most one enabled
//! rule. Patterns are plain paths with optional named parameters
//! (`/api/user/:id`); a pattern only matches a path with the same
//! segment count.

use crate::config::{HttpMethod, Rule};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Result of matching a request against the rule table.
#[derive(Debug)]
pub struct RuleMatch<'a> {
    /// The matched rule
    pub rule: &'a Rule,
    /// Named parameters extracted from the pattern, URL-decoded
    pub params: HashMap<String, String>,
}

/// Rule matcher with a compiled-pattern cache.
///
/// Compilation is cached by raw pattern string, so refreshing the rule
/// table does not recompile patterns that survived the refresh.
pub struct RuleMatcher {
    cache: Mutex<HashMap<String, Arc<CompiledPattern>>>,
}

#[derive(Debug)]
enum CompiledPattern {
    /// Fallback for patterns that fail to compile
    Exact(String),
    Segments(Vec<Segment>),
}

#[derive(Debug)]
enum Segment {
    Literal(String),
    Param(String),
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleMatcher {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Find the first enabled rule matching the request.
    ///
    /// Rules are tried in table order; the first match wins, even over
    /// a more specific pattern later in the table.
    pub fn find_match<'a>(
        &self,
        rules: &'a [Rule],
        path: &str,
        method: &str,
    ) -> Option<RuleMatch<'a>> {
        let method: HttpMethod = method.parse().unwrap_or_default();
        let normalized_path = normalize_path(path);

        for rule in rules {
            if !rule.enabled || rule.method != method {
                continue;
            }
            if let Some(params) = self.match_pattern(&rule.url_pattern, &normalized_path) {
                return Some(RuleMatch { rule, params });
            }
        }

        None
    }

    /// Whether a request URL matches a rule's pattern, ignoring method
    /// and enabled state. Exposed standalone for reuse.
    pub fn url_matches(&self, request_url: &str, rule: &Rule) -> bool {
        self.path_matches(&rule.url_pattern, request_url)
    }

    /// Whether a request URL matches a raw pattern string.
    pub fn path_matches(&self, pattern: &str, request_url: &str) -> bool {
        let normalized = normalize_path(request_url);
        self.match_pattern(pattern, &normalized).is_some()
    }

    /// Match an already-normalized path against a pattern, returning
    /// extracted parameters on success.
    fn match_pattern(&self, pattern: &str, path: &str) -> Option<HashMap<String, String>> {
        let normalized_pattern = normalize_path(pattern);

        // Fast path: exact string equality
        if normalized_pattern == *path {
            return Some(HashMap::new());
        }

        let compiled = self.compile(&normalized_pattern, pattern);
        compiled.matches(path)
    }

    fn compile(&self, normalized_pattern: &str, raw_pattern: &str) -> Arc<CompiledPattern> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(compiled) = cache.get(raw_pattern) {
            return Arc::clone(compiled);
        }
        let compiled = Arc::new(CompiledPattern::compile(normalized_pattern));
        cache.insert(raw_pattern.to_string(), Arc::clone(&compiled));
        compiled
    }
}

impl CompiledPattern {
    fn compile(pattern: &str) -> Self {
        let mut segments = Vec::new();
        for part in pattern.split('/').filter(|p| !p.is_empty()) {
            if let Some(name) = part.strip_prefix(':') {
                // A bare ":" or embedded whitespace is not a valid
                // pattern; degrade to exact equality rather than fail
                if name.is_empty() || name.contains(char::is_whitespace) {
                    return CompiledPattern::Exact(pattern.to_string());
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                if part.contains(char::is_whitespace) {
                    return CompiledPattern::Exact(pattern.to_string());
                }
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        CompiledPattern::Segments(segments)
    }

    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        match self {
            CompiledPattern::Exact(value) => {
                if value == path {
                    Some(HashMap::new())
                } else {
                    None
                }
            }
            CompiledPattern::Segments(segments) => {
                let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
                // A rule never matches a path with extra or missing
                // segments
                if parts.len() != segments.len() {
                    return None;
                }

                let mut params = HashMap::new();
                for (segment, part) in segments.iter().zip(&parts) {
                    match segment {
                        Segment::Literal(lit) => {
                            if lit != part {
                                return None;
                            }
                        }
                        Segment::Param(name) => {
                            params.insert(name.clone(), percent_decode(part));
                        }
                    }
                }
                Some(params)
            }
        }
    }
}

/// Normalize a request URL or rule pattern for matching: reduce
/// absolute URLs to their path, drop the query string and fragment,
/// and strip a trailing slash (except for root).
pub fn normalize_path(url: &str) -> String {
    let mut path = url;

    // Absolute URL -> pathname
    if let Some(scheme_end) = path.find("://") {
        let after_authority = &path[scheme_end + 3..];
        path = match after_authority.find('/') {
            Some(idx) => &after_authority[idx..],
            None => "/",
        };
    }

    if let Some(idx) = path.find(['?', '#']) {
        path = &path[..idx];
    }

    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Decode percent escapes and `+` in a path segment.
fn percent_decode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    result.push(byte as char);
                    continue;
                }
            }
            result.push('%');
            result.push_str(&hex);
        } else if ch == '+' {
            result.push(' ');
        } else {
            result.push(ch);
        }
    }

    result
}
