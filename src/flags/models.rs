use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

use super::AssignmentValue;

#[allow(missing_docs)]
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Flag configuration document. This is the format served by the
/// configuration endpoint and stored by configuration persistence.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FlagsConfig {
    /// When the configuration was last updated on the server.
    pub created_at: Timestamp,
    /// Environment this configuration belongs to.
    pub environment: Environment,
    /// Flags configuration.
    ///
    /// Values are wrapped in `TryParse` so that a single flag in an unknown
    /// format (e.g., produced by a newer server) does not prevent serving the
    /// rest of the flags.
    pub flags: HashMap<String, TryParse<Flag>>,
    /// Associations from flag variations to bandits, keyed by bandit key.
    /// Actual bandit parameters are served separately.
    #[serde(default)]
    pub bandit_references: HashMap<String, BanditReference>,
}

/// Environment the configuration was built for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Name of the environment.
    pub name: String,
}

/// `TryParse` allows a subfield to fail parsing without failing the parsing
/// of the whole structure.
///
/// This isolates errors in a subtree: if configuration for one flag fails to
/// parse, the rest of the flags are still usable.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Flag {
    pub key: String,
    pub enabled: bool,
    pub variation_type: VariationType,
    pub variations: HashMap<String, Variation>,
    /// Allocation order is evaluation priority: the first matching
    /// allocation wins.
    pub allocations: Vec<Allocation>,
    pub total_shards: u64,
}

/// Type of the flag's variations.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum VariationType {
    String,
    Integer,
    Numeric,
    Boolean,
    Json,
}

/// Subset of [`serde_json::Value`] used for variation and condition values.
///
/// Unlike [`AssignmentValue`], `Value` is untagged: the exact type is only
/// known once combined with the flag-level [`VariationType`].
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum Value {
    /// Boolean maps to [`AssignmentValue::Boolean`].
    Boolean(bool),
    /// Number maps to either [`AssignmentValue::Integer`] or
    /// [`AssignmentValue::Numeric`].
    Number(f64),
    /// String maps to either [`AssignmentValue::String`] or
    /// [`AssignmentValue::Json`].
    String(String),
}

impl Value {
    /// Try to convert `Value` to [`AssignmentValue`] under the given
    /// [`VariationType`].
    pub(crate) fn to_assignment_value(&self, ty: VariationType) -> Option<AssignmentValue> {
        Some(match ty {
            VariationType::String => AssignmentValue::String(self.as_string()?.to_owned()),
            VariationType::Integer => AssignmentValue::Integer(self.as_integer()?),
            VariationType::Numeric => AssignmentValue::Numeric(self.as_number()?),
            VariationType::Boolean => AssignmentValue::Boolean(self.as_boolean()?),
            VariationType::Json => AssignmentValue::Json(self.to_json()?),
        })
    }

    fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        let f = self.as_number()?;
        let i = f as i64;
        if i as f64 == f {
            Some(i)
        } else {
            None
        }
    }

    pub(crate) fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        let s = self.as_string()?;
        serde_json::from_str(s).ok()?
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Variation {
    pub key: String,
    pub value: Value,
}

/// One targeting-plus-rollout rule of a flag.
///
/// An allocation outside its `[start_at, end_at]` window is skipped entirely.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Allocation {
    pub key: String,
    /// Rule-sets are OR'ed: an allocation matches if any rule matches. An
    /// allocation with zero rules always matches.
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub start_at: Option<Timestamp>,
    #[serde(default)]
    pub end_at: Option<Timestamp>,
    pub splits: Vec<Split>,
    #[serde(default = "default_do_log")]
    pub do_log: bool,
}

fn default_do_log() -> bool {
    true
}

/// AND-group of conditions.
#[derive(Debug, Serialize, Deserialize, From, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Rule {
    pub conditions: Vec<Condition>,
}

/// `Condition` is a check that a given subject `attribute` matches the
/// condition `value` under the given `operator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Condition {
    pub operator: ConditionOperator,
    pub attribute: String,
    pub value: ConditionValue,
}

/// Possible condition operators.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionOperator {
    /// Matches regex. Condition value must be a regex string.
    Matches,
    /// Regex does not match. Condition value must be a regex string.
    NotMatches,
    /// Greater than or equal. Attribute and condition value must either be
    /// numbers or semver strings.
    Gte,
    /// Greater than. Attribute and condition value must either be numbers or
    /// semver strings.
    Gt,
    /// Less than or equal. Attribute and condition value must either be
    /// numbers or semver strings.
    Lte,
    /// Less than. Attribute and condition value must either be numbers or
    /// semver strings.
    Lt,
    /// One of values. Condition value must be a list of strings. Match is
    /// case-sensitive.
    OneOf,
    /// Not one of values. Condition value must be a list of strings. Match is
    /// case-sensitive.
    ///
    /// Null/absent attributes fail this condition automatically (i.e.,
    /// `null NOT_ONE_OF ["hello"]` is `false`).
    NotOneOf,
    /// Null check.
    ///
    /// Condition value must be a boolean. If it's `true`, this is a null
    /// check. If it's `false`, this is a not-null check.
    IsNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[allow(missing_docs)]
pub enum ConditionValue {
    Single(Value),
    // Only string arrays are currently supported.
    Multiple(Vec<String>),
}

impl<T: Into<Value>> From<T> for ConditionValue {
    fn from(value: T) -> Self {
        Self::Single(value.into())
    }
}
impl From<Vec<String>> for ConditionValue {
    fn from(value: Vec<String>) -> Self {
        Self::Multiple(value)
    }
}

/// One outcome within an allocation.
///
/// A subject is routed to this split only if it falls in range for *every*
/// shard listed under the split.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Split {
    pub shards: Vec<Shard>,
    pub variation_key: String,
    /// Additional user-defined logging fields attached to assignment events
    /// emitted for this split.
    #[serde(default)]
    pub extra_logging: HashMap<String, String>,
}

/// A hash domain (salt) plus the bucket ranges considered a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Shard {
    pub salt: String,
    pub ranges: Vec<ShardRange>,
}

/// Half-open interval of hash buckets: `start <= value < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ShardRange {
    pub start: u64,
    pub end: u64,
}
impl ShardRange {
    pub(crate) fn contains(&self, v: u64) -> bool {
        self.start <= v && v < self.end
    }
}

/// `BanditReference` links flag variations to a bandit model of a specific
/// version.
///
/// The reference is stale (and the bandit is skipped) when `model_version`
/// does not match the version of the loaded bandit parameters.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BanditReference {
    /// Version of the bandit model the flag document was built against.
    pub model_version: String,
    /// Flag variations that route to this bandit.
    pub flag_variations: Vec<BanditFlagVariation>,
}

/// One flag variation that routes to a bandit.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BanditFlagVariation {
    /// Key of the bandit.
    pub key: String,
    /// Key of the flag.
    pub flag_key: String,
    /// Key of the variation within the flag.
    pub variation_key: String,
    /// String variation value. Today it's the same as `variation_key`.
    pub variation_value: String,
}
