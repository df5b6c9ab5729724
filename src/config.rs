//! Configuration for the interception engine.
//!
//! Defines mock rules, network policies, field-omission policies, and
//! global settings.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Top-level configuration: the rule table plus global settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockWireConfig {
    /// Ordered list of interception rules (earlier entries win)
    #[serde(default)]
    pub rules: Vec<Rule>,

    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,
}

impl MockWireConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, rule) in self.rules.iter().enumerate() {
            rule.validate()
                .map_err(|e| anyhow::anyhow!("Rule {}: {}", i, e))?;
        }
        Ok(())
    }
}

/// A single interception rule.
///
/// Identity is `id`; uniqueness is the caller's responsibility. The
/// pipeline reads a snapshot, so a rule is immutable once matched
/// against a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Unique identifier for this rule
    pub id: String,

    /// Optional name/description
    #[serde(default)]
    pub name: Option<String>,

    /// URL pattern to match, e.g. `/api/user/:id`
    pub url_pattern: String,

    /// HTTP method to match
    #[serde(default)]
    pub method: HttpMethod,

    /// Whether this rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Network-condition simulation
    #[serde(default)]
    pub network: NetworkPolicy,

    /// Response synthesis
    #[serde(default)]
    pub response: ResponsePolicy,

    /// Field omission (partial-data corruption)
    #[serde(default)]
    pub field_omit: FieldOmitPolicy,
}

fn default_true() -> bool {
    true
}

impl Rule {
    /// Validate the rule definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.is_empty() {
            anyhow::bail!("Rule id cannot be empty");
        }
        if self.url_pattern.is_empty() {
            anyhow::bail!("Rule url_pattern cannot be empty");
        }
        self.network.validate()?;
        self.response.validate()?;
        self.field_omit.validate()?;
        Ok(())
    }
}

/// HTTP methods the engine recognizes.
///
/// Unknown method strings normalize to `GET` rather than failing, so a
/// stale rule store never prevents the table from loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl FromStr for HttpMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "DELETE" => HttpMethod::Delete,
            "PATCH" => HttpMethod::Patch,
            _ => HttpMethod::Get,
        })
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        };
        f.write_str(s)
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // FromStr is infallible; unknown strings become GET
        Ok(s.parse().unwrap_or_default())
    }
}

/// Network-condition simulation settings for a rule.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct NetworkPolicy {
    /// Explicit delay override in milliseconds
    #[serde(default)]
    pub delay_ms: Option<u64>,

    /// Named delay profile (looked up in `GlobalConfig::profiles`)
    #[serde(default)]
    pub profile: Option<String>,

    /// Forced failure mode, evaluated before the random-failure draw
    #[serde(default)]
    pub error_mode: ErrorMode,

    /// Probability (0-100) that the call fails with a random
    /// connection error
    #[serde(default)]
    pub fail_rate: u8,
}

impl NetworkPolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fail_rate > 100 {
            anyhow::bail!("fail_rate must be in 0..=100, got {}", self.fail_rate);
        }
        Ok(())
    }
}

/// Forced network error mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    #[default]
    None,
    Timeout,
    Offline,
}

/// Response synthesis settings for a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponsePolicy {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Business error number (0 = success)
    #[serde(default)]
    pub err_no: i64,

    /// Business error message
    #[serde(default)]
    pub err_msg: String,

    /// Detailed business error message
    #[serde(default)]
    pub detail_err_msg: String,

    /// Payload placed in the envelope's `result` field
    #[serde(default)]
    pub result: serde_json::Value,

    /// Raw body returned instead of the envelope when `status >= 400`
    #[serde(default)]
    pub error_body: Option<serde_json::Value>,
}

fn default_status() -> u16 {
    200
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        Self {
            status: default_status(),
            err_no: 0,
            err_msg: String::new(),
            detail_err_msg: String::new(),
            result: serde_json::Value::Null,
            error_body: None,
        }
    }
}

impl ResponsePolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.status < 100 || self.status > 599 {
            anyhow::bail!("Invalid status code: {}", self.status);
        }
        Ok(())
    }
}

/// Field omission settings for a rule.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FieldOmitPolicy {
    /// Whether omission is applied at all
    #[serde(default)]
    pub enabled: bool,

    /// Manual (explicit paths) or random selection
    #[serde(default)]
    pub mode: OmitSelection,

    /// Dot-paths removed in manual mode, e.g. `result.user.email`
    #[serde(default)]
    pub fields: Vec<String>,

    /// Random-mode settings
    #[serde(default)]
    pub random: RandomOmitPolicy,
}

impl FieldOmitPolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.random.probability > 100 {
            anyhow::bail!(
                "omit probability must be in 0..=100, got {}",
                self.random.probability
            );
        }
        Ok(())
    }
}

/// How omission targets are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OmitSelection {
    #[default]
    Manual,
    Random,
}

/// Random-mode omission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RandomOmitPolicy {
    /// Per-candidate omission probability (0-100)
    #[serde(default = "default_probability")]
    pub probability: u8,

    /// Upper bound on omissions per synthesis call
    #[serde(default = "default_max_omit")]
    pub max_omit_count: usize,

    /// Paths protected from omission; protection covers all
    /// descendants of each entry
    #[serde(default)]
    pub exclude_fields: Vec<String>,

    /// Maximum traversal depth (0 = top-level keys only)
    #[serde(default = "default_depth_limit")]
    pub depth_limit: usize,

    /// What "omitting" a field does
    #[serde(default)]
    pub omit_mode: OmitMode,

    /// Seed for reproducible selection; `None` uses ambient entropy
    #[serde(default)]
    pub seed: Option<u32>,
}

fn default_probability() -> u8 {
    50
}

fn default_max_omit() -> usize {
    1
}

fn default_depth_limit() -> usize {
    3
}

impl Default for RandomOmitPolicy {
    fn default() -> Self {
        Self {
            probability: default_probability(),
            max_omit_count: default_max_omit(),
            exclude_fields: Vec::new(),
            depth_limit: default_depth_limit(),
            omit_mode: OmitMode::Delete,
            seed: None,
        }
    }
}

/// What happens to an omitted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OmitMode {
    /// Remove the key entirely
    #[default]
    Delete,
    /// Keep the key, set the value to null (JSON has no undefined)
    Undefined,
    /// Keep the key, set the value to null
    Null,
}

/// Global settings shared by all rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default network profile applied when a rule specifies neither a
    /// delay nor a profile
    #[serde(default)]
    pub default_profile: Option<String>,

    /// Named profile -> delay (ms) table
    #[serde(default = "default_profiles")]
    pub profiles: HashMap<String, u64>,

    /// Path prefixes stripped from the request before matching (e.g. a
    /// dev-proxy prefix)
    #[serde(default)]
    pub strip_prefixes: Vec<String>,

    /// Bypass predicates: any match routes the call past the engine
    #[serde(default)]
    pub bypass: BypassConfig,

    /// Log matched rules
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_profile: None,
            profiles: default_profiles(),
            strip_prefixes: Vec::new(),
            bypass: BypassConfig::default(),
            log_matches: true,
            log_unmatched: true,
        }
    }
}

fn default_profiles() -> HashMap<String, u64> {
    HashMap::from([
        ("fast".to_string(), 100),
        ("normal".to_string(), 500),
        ("slow".to_string(), 2000),
        ("3g".to_string(), 3500),
    ])
}

/// Predicates that exempt a request from interception entirely.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BypassConfig {
    /// Methods passed through unmodified (case-insensitive)
    #[serde(default)]
    pub methods: Vec<String>,

    /// Content-type prefixes passed through (e.g. `multipart/`)
    #[serde(default)]
    pub content_types: Vec<String>,

    /// Origins passed through
    #[serde(default)]
    pub origins: Vec<String>,

    /// URL patterns passed through (same syntax as rule patterns)
    #[serde(default)]
    pub url_patterns: Vec<String>,
}
