use chrono::{DateTime, Utc};

use crate::{
    error::{EvaluationError, EvaluationFailure},
    events::{AssignmentEvent, EventMetaData},
    flags::{
        Allocation, Assignment, Flag, Shard, Split, Timestamp, TryParse, VariationType,
    },
    sharder::{Md5Sharder, Sharder},
    Attributes, Configuration,
};

/// Evaluate the specified feature flag for the given subject and return the
/// assigned variation and an optional assignment event for logging.
///
/// This is a pure function: `Ok(None)` means "no assignment, use your
/// default" (unknown flag, disabled flag, no matching allocation, or missing
/// configuration), while `Err` signals an abnormal condition (type mismatch,
/// broken configuration).
pub fn get_assignment(
    configuration: Option<&Configuration>,
    flag_key: &str,
    subject_key: &str,
    subject_attributes: &Attributes,
    expected_type: Option<VariationType>,
    now: DateTime<Utc>,
) -> Result<Option<Assignment>, EvaluationError> {
    match eval_assignment(
        configuration,
        flag_key,
        subject_key,
        subject_attributes,
        expected_type,
        now,
    ) {
        Ok(assignment) => {
            log::trace!(target: "flagrant",
                        flag_key,
                        subject_key,
                        assignment:serde = assignment.value;
                        "evaluated a flag");
            Ok(Some(assignment))
        }

        Err(EvaluationFailure::ConfigurationMissing) => {
            log::warn!(target: "flagrant",
                       flag_key,
                       subject_key;
                       "evaluating a flag before configuration has been fetched");
            Ok(None)
        }

        Err(EvaluationFailure::Error(err)) => {
            log::warn!(target: "flagrant",
                       flag_key,
                       subject_key;
                       "error occurred while evaluating a flag: {err}");
            Err(err)
        }

        // Non-Error failures are normal conditions and don't need extra
        // attention, so they are remapped to Ok(None) before returning to
        // the user.
        Err(err) => {
            log::trace!(target: "flagrant",
                        flag_key,
                        subject_key;
                        "returning default assignment because of: {err}");
            Ok(None)
        }
    }
}

/// Same as [`get_assignment`] but preserving the precise failure reason.
pub(crate) fn eval_assignment(
    configuration: Option<&Configuration>,
    flag_key: &str,
    subject_key: &str,
    subject_attributes: &Attributes,
    expected_type: Option<VariationType>,
    now: DateTime<Utc>,
) -> Result<Assignment, EvaluationFailure> {
    let Some(configuration) = configuration else {
        return Err(EvaluationFailure::ConfigurationMissing);
    };

    let flag = configuration.get_flag(flag_key)?;

    if let Some(ty) = expected_type {
        flag.verify_type(ty)?;
    }

    flag.eval(
        subject_key,
        subject_attributes,
        configuration.is_obfuscated,
        &Md5Sharder,
        now,
    )
}

impl Configuration {
    fn get_flag<'a>(&'a self, flag_key: &str) -> Result<&'a Flag, EvaluationFailure> {
        let flag = self
            .flags
            .flags
            .get(flag_key)
            .ok_or(EvaluationFailure::FlagUnrecognizedOrDisabled)?;
        match flag {
            TryParse::Parsed(flag) if flag.enabled => Ok(flag),
            TryParse::Parsed(_) => Err(EvaluationFailure::FlagUnrecognizedOrDisabled),
            TryParse::ParseFailed(_) => {
                Err(EvaluationError::ConfigurationParseError.into())
            }
        }
    }
}

impl Flag {
    fn verify_type(&self, ty: VariationType) -> Result<(), EvaluationFailure> {
        if self.variation_type == ty {
            Ok(())
        } else {
            Err(EvaluationFailure::Error(EvaluationError::TypeMismatch {
                expected: ty,
                found: self.variation_type,
            }))
        }
    }

    fn eval(
        &self,
        subject_key: &str,
        subject_attributes: &Attributes,
        obfuscated: bool,
        sharder: &impl Sharder,
        now: DateTime<Utc>,
    ) -> Result<Assignment, EvaluationFailure> {
        // Augment subject_attributes with `id`, so that subject_key can be
        // targeted by the rules.
        let augmented_subject_attributes = {
            let mut sa = subject_attributes.clone();
            sa.entry("id".into()).or_insert_with(|| subject_key.into());
            sa
        };

        let Some((allocation, split)) = self.allocations.iter().find_map(|allocation| {
            allocation
                .get_matching_split(
                    subject_key,
                    &augmented_subject_attributes,
                    obfuscated,
                    sharder,
                    self.total_shards,
                    now,
                )
                .map(|split| (allocation, split))
        }) else {
            return Err(EvaluationFailure::NoMatchingAllocation);
        };

        let variation = self.variations.get(&split.variation_key).ok_or_else(|| {
            log::warn!(target: "flagrant",
                       flag_key:display = self.key,
                       subject_key,
                       variation_key:display = split.variation_key;
                       "internal: unable to find variation");
            EvaluationError::UnexpectedConfigurationError
        })?;

        let value = variation
            .value
            .to_assignment_value(self.variation_type)
            .ok_or_else(|| {
                log::warn!(target: "flagrant",
                           flag_key:display = self.key,
                           subject_key,
                           variation_key:display = split.variation_key;
                           "internal: variation value is not coercible to the flag type");
                EvaluationError::UnexpectedConfigurationError
            })?;

        let event = allocation.do_log.then(|| AssignmentEvent {
            feature_flag: self.key.clone(),
            allocation: allocation.key.clone(),
            experiment: format!("{}-{}", self.key, allocation.key),
            variation: variation.key.clone(),
            subject: subject_key.to_owned(),
            subject_attributes: subject_attributes.clone(),
            timestamp: now,
            meta_data: EventMetaData::default(),
            extra_logging: split.extra_logging.clone(),
        });

        Ok(Assignment { value, event })
    }
}

impl Allocation {
    fn get_matching_split(
        &self,
        subject_key: &str,
        augmented_subject_attributes: &Attributes,
        obfuscated: bool,
        sharder: &impl Sharder,
        total_shards: u64,
        now: Timestamp,
    ) -> Option<&Split> {
        if self.is_allowed_by_time(now)
            && self.is_allowed_by_rules(augmented_subject_attributes, obfuscated)
        {
            // No matching split is distinct from no matching rule, but both
            // fall through to the next allocation.
            self.splits
                .iter()
                .find(|split| split.matches(subject_key, sharder, total_shards))
        } else {
            None
        }
    }

    fn is_allowed_by_time(&self, now: Timestamp) -> bool {
        let forbidden = matches!(self.start_at, Some(t) if now < t)
            || matches!(self.end_at, Some(t) if now > t);
        !forbidden
    }

    fn is_allowed_by_rules(
        &self,
        augmented_subject_attributes: &Attributes,
        obfuscated: bool,
    ) -> bool {
        self.rules.is_empty()
            || self
                .rules
                .iter()
                .any(|rule| rule.eval(augmented_subject_attributes, obfuscated))
    }
}

impl Split {
    /// Return `true` if `subject_key` matches the given split.
    ///
    /// To match a split, the subject must match *all* underlying shards.
    fn matches(&self, subject_key: &str, sharder: &impl Sharder, total_shards: u64) -> bool {
        self.shards
            .iter()
            .all(|shard| shard.matches(subject_key, sharder, total_shards))
    }
}

impl Shard {
    /// Return `true` if `subject_key` matches the given shard.
    fn matches(&self, subject_key: &str, sharder: &impl Sharder, total_shards: u64) -> bool {
        let h = sharder.get_shard(format!("{}-{}", self.salt, subject_key), total_shards);
        self.ranges.iter().any(|range| range.contains(h))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration, Utc};

    use super::{eval_assignment, get_assignment};
    use crate::error::{EvaluationError, EvaluationFailure};
    use crate::flags::{
        Allocation, Condition, ConditionOperator, Environment, Flag, FlagsConfig, Rule, Shard,
        ShardRange, Split, TryParse, Variation, VariationType,
    };
    use crate::{AssignmentValue, Attributes, Configuration};

    fn full_range_split(variation_key: &str, salt: &str) -> Split {
        Split {
            shards: vec![Shard {
                salt: salt.to_owned(),
                ranges: vec![ShardRange {
                    start: 0,
                    end: 10_000,
                }],
            }],
            variation_key: variation_key.to_owned(),
            extra_logging: HashMap::new(),
        }
    }

    fn boolean_flag(key: &str, enabled: bool, allocations: Vec<Allocation>) -> Flag {
        Flag {
            key: key.to_owned(),
            enabled,
            variation_type: VariationType::Boolean,
            variations: [
                (
                    "on".to_owned(),
                    Variation {
                        key: "on".to_owned(),
                        value: true.into(),
                    },
                ),
                (
                    "off".to_owned(),
                    Variation {
                        key: "off".to_owned(),
                        value: false.into(),
                    },
                ),
            ]
            .into(),
            allocations,
            total_shards: 10_000,
        }
    }

    fn configuration(flags: Vec<Flag>) -> Configuration {
        Configuration::from_server_response(
            FlagsConfig {
                created_at: Utc::now(),
                environment: Environment {
                    name: "test".to_owned(),
                },
                flags: flags
                    .into_iter()
                    .map(|flag| (flag.key.clone(), TryParse::Parsed(flag)))
                    .collect(),
                bandit_references: HashMap::new(),
            },
            None,
            false,
        )
    }

    fn country_rule() -> Rule {
        Rule {
            conditions: vec![Condition {
                attribute: "country".to_owned(),
                operator: ConditionOperator::OneOf,
                value: vec![
                    "US".to_owned(),
                    "Canada".to_owned(),
                    "Mexico".to_owned(),
                ]
                .into(),
            }],
        }
    }

    #[test]
    fn kill_switch_scenario() {
        let config = configuration(vec![boolean_flag(
            "kill-switch",
            true,
            vec![Allocation {
                key: "on-for-NA".to_owned(),
                rules: vec![country_rule()],
                start_at: None,
                end_at: None,
                splits: vec![full_range_split("on", "some-salt")],
                do_log: true,
            }],
        )]);

        for subject in ["alice", "bob", "charlie"] {
            let attributes: Attributes = [("country".to_owned(), "US".into())].into();
            let assignment = get_assignment(
                Some(&config),
                "kill-switch",
                subject,
                &attributes,
                Some(VariationType::Boolean),
                Utc::now(),
            )
            .unwrap()
            .unwrap();
            assert_eq!(assignment.value, AssignmentValue::Boolean(true));
        }

        // Non-matching country gets no assignment.
        let attributes: Attributes = [("country".to_owned(), "UK".into())].into();
        let result = get_assignment(
            Some(&config),
            "kill-switch",
            "alice",
            &attributes,
            Some(VariationType::Boolean),
            Utc::now(),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn disabled_flag_returns_none_regardless_of_attributes() {
        let config = configuration(vec![boolean_flag(
            "disabled",
            false,
            vec![Allocation {
                key: "default".to_owned(),
                rules: vec![],
                start_at: None,
                end_at: None,
                splits: vec![full_range_split("on", "salt")],
                do_log: true,
            }],
        )]);

        let attributes: Attributes = [("country".to_owned(), "US".into())].into();
        let failure = eval_assignment(
            Some(&config),
            "disabled",
            "alice",
            &attributes,
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(failure, EvaluationFailure::FlagUnrecognizedOrDisabled);
    }

    #[test]
    fn unknown_flag_returns_none() {
        let config = configuration(vec![]);
        let failure =
            eval_assignment(Some(&config), "missing", "alice", &HashMap::new(), None, Utc::now())
                .unwrap_err();
        assert_eq!(failure, EvaluationFailure::FlagUnrecognizedOrDisabled);
    }

    #[test]
    fn missing_configuration_returns_none() {
        let result =
            get_assignment(None, "flag", "alice", &HashMap::new(), None, Utc::now()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn first_matching_allocation_wins() {
        let config = configuration(vec![boolean_flag(
            "flag",
            true,
            vec![
                Allocation {
                    key: "first".to_owned(),
                    rules: vec![],
                    start_at: None,
                    end_at: None,
                    splits: vec![full_range_split("on", "salt")],
                    do_log: true,
                },
                Allocation {
                    key: "second".to_owned(),
                    rules: vec![],
                    start_at: None,
                    end_at: None,
                    splits: vec![full_range_split("off", "salt")],
                    do_log: true,
                },
            ],
        )]);

        let assignment = get_assignment(
            Some(&config),
            "flag",
            "alice",
            &HashMap::new(),
            None,
            Utc::now(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(assignment.value, AssignmentValue::Boolean(true));
        assert_eq!(assignment.event.unwrap().allocation, "first");
    }

    #[test]
    fn shard_miss_falls_through_to_next_allocation() {
        let empty_range_split = Split {
            shards: vec![Shard {
                salt: "salt".to_owned(),
                ranges: vec![],
            }],
            variation_key: "on".to_owned(),
            extra_logging: HashMap::new(),
        };
        let config = configuration(vec![boolean_flag(
            "flag",
            true,
            vec![
                Allocation {
                    key: "experiment".to_owned(),
                    rules: vec![],
                    start_at: None,
                    end_at: None,
                    splits: vec![empty_range_split],
                    do_log: true,
                },
                Allocation {
                    key: "rollout".to_owned(),
                    rules: vec![],
                    start_at: None,
                    end_at: None,
                    splits: vec![full_range_split("off", "salt")],
                    do_log: true,
                },
            ],
        )]);

        let assignment = get_assignment(
            Some(&config),
            "flag",
            "alice",
            &HashMap::new(),
            None,
            Utc::now(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(assignment.value, AssignmentValue::Boolean(false));
        assert_eq!(assignment.event.unwrap().allocation, "rollout");
    }

    #[test]
    fn allocation_outside_time_window_is_skipped() {
        let now = Utc::now();
        let config = configuration(vec![boolean_flag(
            "flag",
            true,
            vec![
                Allocation {
                    key: "past".to_owned(),
                    rules: vec![],
                    start_at: None,
                    end_at: Some(now - Duration::hours(1)),
                    splits: vec![full_range_split("on", "salt")],
                    do_log: true,
                },
                Allocation {
                    key: "future".to_owned(),
                    rules: vec![],
                    start_at: Some(now + Duration::hours(1)),
                    end_at: None,
                    splits: vec![full_range_split("on", "salt")],
                    do_log: true,
                },
            ],
        )]);

        let failure = eval_assignment(
            Some(&config),
            "flag",
            "alice",
            &HashMap::new(),
            None,
            now,
        )
        .unwrap_err();
        assert_eq!(failure, EvaluationFailure::NoMatchingAllocation);
    }

    #[test]
    fn subject_key_is_targetable_as_id_attribute() {
        let config = configuration(vec![boolean_flag(
            "flag",
            true,
            vec![Allocation {
                key: "vip".to_owned(),
                rules: vec![Rule {
                    conditions: vec![Condition {
                        attribute: "id".to_owned(),
                        operator: ConditionOperator::OneOf,
                        value: vec!["alice".to_owned()].into(),
                    }],
                }],
                start_at: None,
                end_at: None,
                splits: vec![full_range_split("on", "salt")],
                do_log: true,
            }],
        )]);

        let on = get_assignment(Some(&config), "flag", "alice", &HashMap::new(), None, Utc::now())
            .unwrap();
        assert!(on.is_some());
        let off = get_assignment(Some(&config), "flag", "bob", &HashMap::new(), None, Utc::now())
            .unwrap();
        assert!(off.is_none());
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let config = configuration(vec![boolean_flag("flag", true, vec![])]);
        let err = get_assignment(
            Some(&config),
            "flag",
            "alice",
            &HashMap::new(),
            Some(VariationType::String),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            EvaluationError::TypeMismatch {
                expected: VariationType::String,
                found: VariationType::Boolean,
            }
        );
    }

    #[test]
    fn unparseable_flag_is_an_error() {
        let mut config = configuration(vec![]);
        config.flags.flags.insert(
            "broken".to_owned(),
            TryParse::ParseFailed(serde_json::json!({"key": "broken"})),
        );
        let err = get_assignment(
            Some(&config),
            "broken",
            "alice",
            &HashMap::new(),
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, EvaluationError::ConfigurationParseError);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let config = configuration(vec![boolean_flag(
            "flag",
            true,
            vec![Allocation {
                key: "fifty-fifty".to_owned(),
                rules: vec![],
                start_at: None,
                end_at: None,
                splits: vec![
                    Split {
                        shards: vec![Shard {
                            salt: "split-salt".to_owned(),
                            ranges: vec![ShardRange {
                                start: 0,
                                end: 5_000,
                            }],
                        }],
                        variation_key: "on".to_owned(),
                        extra_logging: HashMap::new(),
                    },
                    Split {
                        shards: vec![Shard {
                            salt: "split-salt".to_owned(),
                            ranges: vec![ShardRange {
                                start: 5_000,
                                end: 10_000,
                            }],
                        }],
                        variation_key: "off".to_owned(),
                        extra_logging: HashMap::new(),
                    },
                ],
                do_log: true,
            }],
        )]);

        let now = Utc::now();
        for subject in ["alice", "bob", "charlie", "dave"] {
            let first = get_assignment(Some(&config), "flag", subject, &HashMap::new(), None, now)
                .unwrap()
                .unwrap();
            for _ in 0..10 {
                let again =
                    get_assignment(Some(&config), "flag", subject, &HashMap::new(), None, now)
                        .unwrap()
                        .unwrap();
                assert_eq!(first.value, again.value);
            }
        }
    }
}
