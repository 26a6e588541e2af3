use regex::Regex;
use semver::Version;

use crate::{
    flags::{Condition, ConditionOperator, ConditionValue, Rule, Value},
    obfuscation::md5_hex,
    AttributeValue, Attributes,
};

impl Rule {
    pub(crate) fn eval(&self, attributes: &Attributes, obfuscated: bool) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.eval(attributes, obfuscated))
    }
}

impl Condition {
    fn eval(&self, attributes: &Attributes, obfuscated: bool) -> bool {
        let attribute = if obfuscated {
            // Attribute names in obfuscated payloads are digests, so the
            // candidate names have to be hashed before lookup.
            attributes
                .iter()
                .find(|(name, _)| md5_hex(name) == self.attribute)
                .map(|(_, value)| value)
        } else {
            attributes.get(&self.attribute)
        };

        self.operator.eval(attribute, &self.value, obfuscated)
    }
}

impl ConditionOperator {
    /// Apply the operator to the values. Returns `false` if the operator
    /// cannot be applied or there's a misconfiguration.
    pub(crate) fn eval(
        &self,
        attribute: Option<&AttributeValue>,
        condition_value: &ConditionValue,
        obfuscated: bool,
    ) -> bool {
        self.try_eval(attribute, condition_value, obfuscated)
            .unwrap_or(false)
    }

    /// Try applying the operator to the values, returning `None` if the
    /// operator cannot be applied.
    fn try_eval(
        &self,
        attribute: Option<&AttributeValue>,
        condition_value: &ConditionValue,
        obfuscated: bool,
    ) -> Option<bool> {
        match self {
            Self::Matches | Self::NotMatches => {
                let s = match attribute {
                    Some(AttributeValue::String(s)) => s,
                    _ => return None,
                };
                let condition = match condition_value {
                    ConditionValue::Single(Value::String(s)) => s,
                    _ => return None,
                };
                let matches = if obfuscated {
                    // In obfuscated payloads the server precomputed the hash
                    // of the full expected string, so regex matching reduces
                    // to an equality check of digests.
                    md5_hex(s) == *condition
                } else {
                    Regex::new(condition).ok()?.is_match(s)
                };
                Some(if matches!(self, Self::Matches) {
                    matches
                } else {
                    !matches
                })
            }

            Self::OneOf | Self::NotOneOf => {
                let s = attribute?.to_comparison_string()?;
                let s = if obfuscated { md5_hex(&s) } else { s };
                let values = match condition_value {
                    ConditionValue::Multiple(v) => v,
                    _ => return None,
                };
                let is_one_of = values.iter().any(|v| v == &s);
                let has_to_be_one_of = *self == Self::OneOf;
                Some(is_one_of == has_to_be_one_of)
            }

            Self::IsNull => {
                let is_null = attribute.is_none() || attribute == Some(&AttributeValue::Null);
                let expected_null = match condition_value {
                    ConditionValue::Single(Value::Boolean(expected_null)) => *expected_null,
                    // Obfuscated payloads carry the boolean as a digest of
                    // its string form.
                    ConditionValue::Single(Value::String(digest)) if obfuscated => {
                        if *digest == md5_hex("true") {
                            true
                        } else if *digest == md5_hex("false") {
                            false
                        } else {
                            return None;
                        }
                    }
                    _ => return None,
                };
                Some(is_null == expected_null)
            }

            // Ordering comparisons cannot be meaningfully hashed. Obfuscated
            // payloads carry these values raw, so evaluation is identical in
            // both modes.
            Self::Gte | Self::Gt | Self::Lte | Self::Lt => {
                let condition_version = match condition_value {
                    ConditionValue::Single(Value::String(s)) => Version::parse(s).ok(),
                    _ => None,
                };

                if let Some(condition_version) = condition_version {
                    // semver comparison
                    let attribute_version = match attribute {
                        Some(AttributeValue::String(s)) => Version::parse(s).ok(),
                        _ => None,
                    }?;

                    Some(match self {
                        Self::Gt => attribute_version > condition_version,
                        Self::Gte => attribute_version >= condition_version,
                        Self::Lt => attribute_version < condition_version,
                        Self::Lte => attribute_version <= condition_version,
                        _ => {
                            // unreachable
                            return None;
                        }
                    })
                } else {
                    // numeric comparison
                    let condition_value = match condition_value {
                        ConditionValue::Single(Value::Number(n)) => *n,
                        ConditionValue::Single(Value::String(s)) => s.parse().ok()?,
                        _ => return None,
                    };

                    let attribute_value = match attribute {
                        Some(AttributeValue::Number(n)) => *n,
                        Some(AttributeValue::String(s)) => s.parse().ok()?,
                        _ => return None,
                    };

                    Some(match self {
                        Self::Gt => attribute_value > condition_value,
                        Self::Gte => attribute_value >= condition_value,
                        Self::Lt => attribute_value < condition_value,
                        Self::Lte => attribute_value <= condition_value,
                        _ => {
                            // unreachable
                            return None;
                        }
                    })
                }
            }
        }
    }
}
