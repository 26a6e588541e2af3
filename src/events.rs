//! Log records emitted during evaluation. They need to be submitted to the
//! user's analytics storage for further analysis; the crate never delivers
//! them itself.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::Attributes;

/// Represents an event capturing the assignment of a feature flag to a
/// subject and its logging details.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEvent {
    /// The key of the feature flag being assigned.
    pub feature_flag: String,
    /// The key of the allocation that the subject was assigned to.
    pub allocation: String,
    /// The key of the experiment associated with the assignment.
    pub experiment: String,
    /// The specific variation assigned to the subject.
    pub variation: String,
    /// The key identifying the subject receiving the assignment.
    pub subject: String,
    /// Custom attributes of the subject relevant to the assignment.
    pub subject_attributes: Attributes,
    /// When the assignment occurred.
    pub timestamp: DateTime<Utc>,
    /// Additional metadata such as SDK language and version.
    pub meta_data: EventMetaData,
    /// Additional user-defined logging fields for capturing extra
    /// information related to the assignment.
    #[serde(flatten)]
    pub extra_logging: HashMap<String, String>,
}

/// Bandit evaluation event that needs to be logged to analytics storage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct BanditEvent {
    pub flag_key: String,
    pub bandit_key: String,
    pub subject: String,
    pub action: String,
    pub action_probability: f64,
    pub optimality_gap: f64,
    pub model_version: String,
    pub timestamp: DateTime<Utc>,
    pub subject_numeric_attributes: HashMap<String, f64>,
    pub subject_categorical_attributes: HashMap<String, String>,
    pub action_numeric_attributes: HashMap<String, f64>,
    pub action_categorical_attributes: HashMap<String, String>,
    pub meta_data: EventMetaData,
}

/// SDK name and version attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct EventMetaData {
    pub sdk_name: &'static str,
    pub sdk_version: &'static str,
}

impl Default for EventMetaData {
    fn default() -> EventMetaData {
        EventMetaData {
            sdk_name: env!("CARGO_PKG_NAME"),
            sdk_version: env!("CARGO_PKG_VERSION"),
        }
    }
}
