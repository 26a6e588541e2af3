use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bandits::{
    BanditModelData, CategoricalAttributeCoefficient, NumericAttributeCoefficient,
};
use crate::error::{BanditEvaluationError, EvaluationError};
use crate::events::{AssignmentEvent, BanditEvent, EventMetaData};
use crate::flags::{Assignment, AssignmentValue, VariationType};
use crate::sharder::{Md5Sharder, Sharder};
use crate::{Configuration, ContextAttributes};

use super::eval_assignment::eval_assignment;

// Total shards for bandit action selection. Not configurable.
const TOTAL_SHARDS: u64 = 10_000;

/// Result of evaluating a bandit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BanditResult {
    /// Selected variation from the feature flag.
    pub variation: String,
    /// Selected action if any.
    pub action: Option<String>,
    /// Flag assignment event that needs to be logged to analytics storage.
    pub assignment_event: Option<AssignmentEvent>,
    /// Bandit assignment event that needs to be logged to analytics storage.
    pub bandit_event: Option<BanditEvent>,
}

#[derive(Debug)]
struct BanditEvaluation {
    /// Selected action.
    action_key: String,
    /// Probability with which the action was selected.
    action_weight: f64,
    /// Distance between the best and the selected actions' scores.
    optimality_gap: f64,
}

struct Action<'a> {
    key: &'a str,
    attributes: &'a ContextAttributes,
}

/// Evaluate the specified string feature flag for the given subject. If the
/// resulting variation is backed by a current bandit model, evaluate the
/// bandit to select an action.
///
/// Bandit evaluation failures (e.g., an empty action set) are surfaced as
/// errors; callers that prefer graceful degradation should substitute the
/// flag's ordinary variation (see
/// [`Client::get_bandit_action`](crate::Client::get_bandit_action)).
pub fn get_bandit_action(
    configuration: Option<&Configuration>,
    flag_key: &str,
    subject_key: &str,
    subject_attributes: &ContextAttributes,
    actions: &HashMap<String, ContextAttributes>,
    default_variation: &str,
    now: DateTime<Utc>,
) -> Result<BanditResult, EvaluationError> {
    let (result, failure) = eval_bandit_action(
        configuration,
        flag_key,
        subject_key,
        subject_attributes,
        actions,
        default_variation,
        now,
    );
    match failure {
        Some(err) => Err(err),
        None => Ok(result),
    }
}

/// Evaluate a bandit flag, always producing a usable fallback result. The
/// second element carries the error when bandit evaluation failed and the
/// result is the non-bandit fallback.
pub(crate) fn eval_bandit_action(
    configuration: Option<&Configuration>,
    flag_key: &str,
    subject_key: &str,
    subject_attributes: &ContextAttributes,
    actions: &HashMap<String, ContextAttributes>,
    default_variation: &str,
    now: DateTime<Utc>,
) -> (BanditResult, Option<EvaluationError>) {
    let Some(configuration) = configuration else {
        return (
            BanditResult {
                variation: default_variation.to_owned(),
                action: None,
                assignment_event: None,
                bandit_event: None,
            },
            None,
        );
    };

    let assignment = eval_assignment(
        Some(configuration),
        flag_key,
        subject_key,
        &subject_attributes.to_generic_attributes(),
        Some(VariationType::String),
        now,
    )
    .ok()
    .unwrap_or_else(|| Assignment {
        value: AssignmentValue::String(default_variation.to_owned()),
        event: None,
    });

    let variation = assignment
        .value
        .into_string()
        .expect("flag assignment in bandit evaluation is always a string");

    let Some(bandit_key) = configuration.get_bandit_key(flag_key, &variation) else {
        // It's not a bandit variation (or the model is stale), just return it.
        return (
            BanditResult {
                variation,
                action: None,
                assignment_event: assignment.event,
                bandit_event: None,
            },
            None,
        );
    };

    let Some(bandit) = configuration.get_bandit(bandit_key) else {
        // We've evaluated a flag that resulted in a bandit but now we cannot
        // find the bandit parameters. This should normally never happen as it
        // means a mismatch between the flag config and bandit config.
        log::warn!(target: "flagrant", bandit_key; "unable to find bandit parameters");
        return (
            BanditResult {
                variation,
                action: None,
                assignment_event: assignment.event,
                bandit_event: None,
            },
            Some(EvaluationError::UnexpectedConfigurationError),
        );
    };

    let evaluation =
        match bandit
            .model_data
            .evaluate(flag_key, subject_key, subject_attributes, actions)
        {
            Ok(evaluation) => evaluation,
            Err(err) => {
                // Flag evaluation succeeded but the bandit cannot be
                // evaluated (likely an empty action set). Return the
                // non-bandit fallback alongside the error.
                log::warn!(target: "flagrant",
                           flag_key,
                           subject_key,
                           bandit_key;
                           "bandit evaluation failed: {err}");
                return (
                    BanditResult {
                        variation,
                        action: None,
                        assignment_event: assignment.event,
                        bandit_event: None,
                    },
                    Some(err.into()),
                );
            }
        };

    let action_attributes = &actions[&evaluation.action_key];
    let bandit_event = BanditEvent {
        flag_key: flag_key.to_owned(),
        bandit_key: bandit_key.to_owned(),
        subject: subject_key.to_owned(),
        action: evaluation.action_key.clone(),
        action_probability: evaluation.action_weight,
        optimality_gap: evaluation.optimality_gap,
        model_version: bandit.model_version.clone(),
        timestamp: now,
        subject_numeric_attributes: subject_attributes.numeric.clone(),
        subject_categorical_attributes: subject_attributes.categorical.clone(),
        action_numeric_attributes: action_attributes.numeric.clone(),
        action_categorical_attributes: action_attributes.categorical.clone(),
        meta_data: EventMetaData::default(),
    };

    (
        BanditResult {
            variation,
            action: Some(evaluation.action_key),
            assignment_event: assignment.event,
            bandit_event: Some(bandit_event),
        },
        None,
    )
}

impl BanditModelData {
    fn evaluate(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &ContextAttributes,
        actions: &HashMap<String, ContextAttributes>,
    ) -> Result<BanditEvaluation, BanditEvaluationError> {
        if actions.is_empty() {
            return Err(BanditEvaluationError::NoActions);
        }

        let scores = actions
            .iter()
            .map(|(key, attributes)| {
                (
                    key,
                    self.score_action(Action { key, attributes }, subject_attributes),
                )
            })
            .collect::<HashMap<_, _>>();

        let best = scores
            .iter()
            .max_by(|a, b| {
                f64::total_cmp(a.1, b.1).then_with(|| {
                    // Multiple actions may share the best score; the tie has
                    // to be broken deterministically, so compare action keys
                    // next. The comparison is reversed so that the
                    // before-ordered key is considered higher and wins.
                    Ord::cmp(a.0, b.0).reverse()
                })
            })
            .map(|(k, v)| (*k, *v))
            .ok_or(BanditEvaluationError::NoActions)?;

        let weights = self.weigh_actions(&scores, best);

        // Pseudo-random deterministic shuffle of actions. Shuffling is unique
        // per subject, so that a small weight change does not reassign large
        // swaths of subjects from one action to the same other action.
        let shuffled_actions = {
            let mut shuffled_actions = actions.keys().collect::<Vec<_>>();
            // Sort actions by their shard value. Use action key as tie breaker.
            shuffled_actions.sort_by_cached_key(|&action_key| {
                let hash = Md5Sharder.get_shard(
                    format!("{flag_key}-{subject_key}-{action_key}"),
                    TOTAL_SHARDS,
                );
                (hash, action_key)
            });
            shuffled_actions
        };

        let selection_hash = (Md5Sharder
            .get_shard(format!("{flag_key}-{subject_key}"), TOTAL_SHARDS)
            as f64)
            / (TOTAL_SHARDS as f64);

        let selected_action = {
            let mut cumulative_weight = 0.0;
            *shuffled_actions
                .iter()
                .find(|&action_key| {
                    cumulative_weight += weights[action_key];
                    cumulative_weight > selection_hash
                })
                .or_else(|| shuffled_actions.last())
                .ok_or(BanditEvaluationError::NoActions)?
        };

        let optimality_gap = best.1 - scores[selected_action];

        Ok(BanditEvaluation {
            action_key: selected_action.to_owned(),
            action_weight: weights[selected_action],
            optimality_gap,
        })
    }

    /// Weigh actions depending on their scores. Higher-scored actions receive
    /// more weight, except the best action which receives the remainder
    /// weight.
    fn weigh_actions<'a>(
        &self,
        scores: &HashMap<&'a String, f64>,
        (best_action, best_score): (&'a String, f64),
    ) -> HashMap<&'a String, f64> {
        let mut weights = HashMap::<&String, f64>::new();

        let n_actions = scores.len() as f64;

        let mut remainder_weight = 1.0;
        for (&action, &score) in scores {
            if action != best_action {
                let min_probability = self.action_probability_floor / n_actions;
                let weight =
                    min_probability.max(1.0 / (n_actions + self.gamma * (best_score - score)));

                weights.insert(action, weight);
                remainder_weight -= weight;
            }
        }

        weights.insert(best_action, f64::max(remainder_weight, 0.0));

        weights
    }

    fn score_action(&self, action: Action, subject_attributes: &ContextAttributes) -> f64 {
        let Some(coefficients) = self.coefficients.get(action.key) else {
            return self.default_action_score;
        };

        coefficients.intercept
            + score_attributes(
                action.attributes,
                &coefficients.action_numeric_coefficients,
                &coefficients.action_categorical_coefficients,
            )
            + score_attributes(
                subject_attributes,
                &coefficients.subject_numeric_coefficients,
                &coefficients.subject_categorical_coefficients,
            )
    }
}

fn score_attributes(
    attributes: &ContextAttributes,
    numeric_coefficients: &[NumericAttributeCoefficient],
    categorical_coefficients: &[CategoricalAttributeCoefficient],
) -> f64 {
    numeric_coefficients
        .iter()
        .map(|coef| {
            attributes
                .numeric
                .get(coef.attribute_key.as_str())
                .copied()
                // fend against infinite/NaN attributes as they poison the calculation down the line
                .filter(|n| n.is_finite())
                .map(|value| value * coef.coefficient)
                .unwrap_or(coef.missing_value_coefficient)
        })
        .chain(categorical_coefficients.iter().map(|coef| {
            attributes
                .categorical
                .get(coef.attribute_key.as_str())
                .and_then(|value| coef.value_coefficients.get(value.as_str()))
                .copied()
                .unwrap_or(coef.missing_value_coefficient)
        }))
        .sum()
}
