//! Bandit model parameters.
//!
//! Bandit parameters are served separately from the flag configuration.
//! [`crate::flags::BanditReference`] in the flag document links flag
//! variations to a bandit key and model version; this module holds the
//! scoring model itself.
#![allow(missing_docs)]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::flags::Timestamp;

/// Response format of the bandit parameters endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BanditResponse {
    pub bandits: HashMap<String, BanditConfiguration>,
    pub updated_at: Timestamp,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BanditConfiguration {
    pub bandit_key: String,
    pub model_name: String,
    pub model_version: String,
    pub model_data: BanditModelData,
    pub updated_at: Timestamp,
}

/// Linear scoring model of one bandit.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BanditModelData {
    /// Exploration parameter. Higher gamma concentrates probability on the
    /// best action faster. Always non-negative.
    pub gamma: f64,
    /// Score assigned to actions with no configured coefficients.
    pub default_action_score: f64,
    /// Lower bound (divided by the number of actions) on any action's
    /// selection probability, in `[0, 1]`.
    pub action_probability_floor: f64,
    pub coefficients: HashMap<String, BanditCoefficients>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BanditCoefficients {
    pub action_key: String,
    pub intercept: f64,
    pub subject_numeric_coefficients: Vec<NumericAttributeCoefficient>,
    pub subject_categorical_coefficients: Vec<CategoricalAttributeCoefficient>,
    pub action_numeric_coefficients: Vec<NumericAttributeCoefficient>,
    pub action_categorical_coefficients: Vec<CategoricalAttributeCoefficient>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NumericAttributeCoefficient {
    pub attribute_key: String,
    pub coefficient: f64,
    /// Used when the attribute is absent or non-finite.
    pub missing_value_coefficient: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CategoricalAttributeCoefficient {
    pub attribute_key: String,
    pub value_coefficients: HashMap<String, f64>,
    /// Used when the attribute is absent or its value is unrecognized.
    pub missing_value_coefficient: f64,
}
