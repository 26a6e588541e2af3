use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::assignment_logger::{AssignmentLogger, NoopAssignmentLogger};
use crate::cache::{
    AssignmentCache, AssignmentCacheEntry, AssignmentCacheValue, NonExpiringAssignmentCache,
};
use crate::configuration_store::ConfigurationStore;
use crate::error::{EvaluationFailure, Result};
use crate::eval::{eval_assignment, eval_bandit_action, BanditResult};
use crate::events::{AssignmentEvent, BanditEvent};
use crate::flags::{AssignmentValue, VariationType};
use crate::{Attributes, Configuration, ContextAttributes};

/// Configuration for [`Client`]. Built via the chained setters and passed to
/// [`Client::new`].
pub struct ClientOptions {
    assignment_logger: Arc<dyn AssignmentLogger + Send + Sync>,
    assignment_cache: Option<Box<dyn AssignmentCache>>,
    graceful_mode: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            assignment_logger: Arc::new(NoopAssignmentLogger),
            assignment_cache: Some(Box::new(NonExpiringAssignmentCache::new())),
            graceful_mode: true,
        }
    }
}

impl ClientOptions {
    /// Create options with the default logger (no-op), the default
    /// deduplication cache (non-expiring), and graceful mode enabled.
    pub fn new() -> Self {
        ClientOptions::default()
    }

    /// Set the logger that receives assignment and bandit events destined for
    /// the user's analytics storage.
    pub fn assignment_logger(mut self, logger: Arc<dyn AssignmentLogger + Send + Sync>) -> Self {
        self.assignment_logger = logger;
        self
    }

    /// Replace the event deduplication cache. Pass `None` to log every
    /// evaluation without deduplication.
    pub fn assignment_cache(mut self, cache: Option<Box<dyn AssignmentCache>>) -> Self {
        self.assignment_cache = cache;
        self
    }

    /// When graceful mode is on (the default), evaluation errors are logged
    /// and the caller's default value is returned instead of an `Err`.
    pub fn graceful_mode(mut self, graceful: bool) -> Self {
        self.graceful_mode = graceful;
        self
    }

    /// Build a client from these options.
    pub fn to_client(self) -> Client {
        Client::new(self)
    }
}

/// Why an evaluation produced the value it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentReason {
    /// An allocation matched the subject and the variation was assigned.
    Match,
    /// No configuration has been set on the client yet.
    ConfigurationMissing,
    /// The flag does not exist or is disabled.
    FlagUnrecognizedOrDisabled,
    /// All allocations were scanned and none matched.
    NoMatchingAllocation,
    /// Evaluation failed and graceful mode substituted the default value.
    Error,
}

/// Outcome of an assignment evaluation: the value to use, and why.
#[derive(Debug, Clone)]
pub struct AssignmentResult {
    /// The assigned (or default) value.
    pub value: AssignmentValue,
    /// Why this value was chosen.
    pub reason: AssignmentReason,
    /// The event that was (subject to deduplication) handed to the
    /// assignment logger. `None` when the default value was returned or the
    /// matched allocation has logging disabled.
    pub event: Option<AssignmentEvent>,
}

/// A client for assigning feature flag variations and bandit actions.
///
/// The client is cheap to share: all methods take `&self` and evaluation is
/// lock-free apart from a read-lock on the configuration snapshot.
pub struct Client {
    configuration_store: Arc<ConfigurationStore>,
    assignment_logger: Arc<dyn AssignmentLogger + Send + Sync>,
    assignment_cache: Option<Box<dyn AssignmentCache>>,
    graceful_mode: bool,
}

impl Client {
    /// Create a new client. It starts without a configuration; every
    /// evaluation returns the default value until one is set with
    /// [`Client::set_configuration`].
    pub fn new(options: ClientOptions) -> Client {
        Client {
            configuration_store: Arc::new(ConfigurationStore::new()),
            assignment_logger: options.assignment_logger,
            assignment_cache: options.assignment_cache,
            graceful_mode: options.graceful_mode,
        }
    }

    /// Atomically replace the active configuration. In-flight evaluations
    /// keep the snapshot they started with.
    pub fn set_configuration(&self, configuration: Configuration) {
        self.configuration_store
            .set_configuration(Arc::new(configuration));
    }

    /// Currently-active configuration snapshot, if any.
    pub fn configuration(&self) -> Option<Arc<Configuration>> {
        self.configuration_store.get_configuration()
    }

    /// Evaluate a feature flag for the given subject without constraining the
    /// flag's type. Prefer the typed methods
    /// ([`get_string_assignment`](Client::get_string_assignment) etc.) when
    /// the expected type is known.
    pub fn get_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default_value: AssignmentValue,
    ) -> Result<AssignmentResult> {
        self.evaluate(flag_key, subject_key, subject_attributes, None, default_value)
    }

    /// Evaluate a string feature flag.
    pub fn get_string_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default_value: String,
    ) -> Result<String> {
        Ok(self
            .evaluate(
                flag_key,
                subject_key,
                subject_attributes,
                Some(VariationType::String),
                AssignmentValue::String(default_value),
            )?
            .value
            .into_string()
            .expect("the type of assignment value should match the requested type"))
    }

    /// Evaluate an integer feature flag.
    pub fn get_integer_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default_value: i64,
    ) -> Result<i64> {
        Ok(self
            .evaluate(
                flag_key,
                subject_key,
                subject_attributes,
                Some(VariationType::Integer),
                AssignmentValue::Integer(default_value),
            )?
            .value
            .as_integer()
            .expect("the type of assignment value should match the requested type"))
    }

    /// Evaluate a numeric (floating-point) feature flag.
    pub fn get_numeric_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default_value: f64,
    ) -> Result<f64> {
        Ok(self
            .evaluate(
                flag_key,
                subject_key,
                subject_attributes,
                Some(VariationType::Numeric),
                AssignmentValue::Numeric(default_value),
            )?
            .value
            .as_numeric()
            .expect("the type of assignment value should match the requested type"))
    }

    /// Evaluate a boolean feature flag.
    pub fn get_boolean_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default_value: bool,
    ) -> Result<bool> {
        Ok(self
            .evaluate(
                flag_key,
                subject_key,
                subject_attributes,
                Some(VariationType::Boolean),
                AssignmentValue::Boolean(default_value),
            )?
            .value
            .as_boolean()
            .expect("the type of assignment value should match the requested type"))
    }

    /// Evaluate a JSON feature flag.
    pub fn get_json_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default_value: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let result = self.evaluate(
            flag_key,
            subject_key,
            subject_attributes,
            Some(VariationType::Json),
            AssignmentValue::Json(default_value),
        )?;
        match result.value {
            AssignmentValue::Json(value) => Ok(value),
            _ => unreachable!("the type of assignment value should match the requested type"),
        }
    }

    /// Evaluate a bandit-backed string flag and select an action for the
    /// subject from the supplied candidates.
    ///
    /// If the flag's variation is not backed by a (current) bandit model, the
    /// variation is returned with no action. In graceful mode a bandit
    /// evaluation failure also degrades to the plain variation.
    pub fn get_bandit_action(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &ContextAttributes,
        actions: &HashMap<String, ContextAttributes>,
        default_variation: &str,
    ) -> Result<BanditResult> {
        let configuration = self.configuration_store.get_configuration();
        let (mut result, failure) = eval_bandit_action(
            configuration.as_deref(),
            flag_key,
            subject_key,
            subject_attributes,
            actions,
            default_variation,
            Utc::now(),
        );

        if let Some(err) = failure {
            if !self.graceful_mode {
                return Err(err);
            }
            log::warn!(target: "flagrant",
                       flag_key,
                       subject_key;
                       "returning non-bandit variation due to evaluation error: {err}");
        }

        if let Some(event) = result.assignment_event.take() {
            self.log_assignment_event(event);
        }
        if let Some(event) = result.bandit_event.take() {
            self.log_bandit_event(event);
        }

        Ok(result)
    }

    fn evaluate(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        expected_type: Option<VariationType>,
        default_value: AssignmentValue,
    ) -> Result<AssignmentResult> {
        let configuration = self.configuration_store.get_configuration();
        let result = eval_assignment(
            configuration.as_deref(),
            flag_key,
            subject_key,
            subject_attributes,
            expected_type,
            Utc::now(),
        );

        match result {
            Ok(assignment) => {
                if let Some(event) = &assignment.event {
                    self.log_assignment_event(event.clone());
                }
                Ok(AssignmentResult {
                    value: assignment.value,
                    reason: AssignmentReason::Match,
                    event: assignment.event,
                })
            }
            Err(EvaluationFailure::Error(err)) => {
                if !self.graceful_mode {
                    return Err(err);
                }
                log::warn!(target: "flagrant",
                           flag_key,
                           subject_key;
                           "returning default assignment due to evaluation error: {err}");
                Ok(AssignmentResult {
                    value: default_value,
                    reason: AssignmentReason::Error,
                    event: None,
                })
            }
            Err(failure) => {
                log::trace!(target: "flagrant",
                            flag_key,
                            subject_key;
                            "returning default assignment: {failure}");
                let reason = match failure {
                    EvaluationFailure::ConfigurationMissing => {
                        AssignmentReason::ConfigurationMissing
                    }
                    EvaluationFailure::FlagUnrecognizedOrDisabled => {
                        AssignmentReason::FlagUnrecognizedOrDisabled
                    }
                    EvaluationFailure::NoMatchingAllocation => {
                        AssignmentReason::NoMatchingAllocation
                    }
                    EvaluationFailure::Error(_) => AssignmentReason::Error,
                };
                Ok(AssignmentResult {
                    value: default_value,
                    reason,
                    event: None,
                })
            }
        }
    }

    fn log_assignment_event(&self, event: AssignmentEvent) {
        let should_log = match &self.assignment_cache {
            Some(cache) => cache.should_log(&AssignmentCacheEntry {
                subject_key: event.subject.clone(),
                flag_key: event.feature_flag.clone(),
                value: AssignmentCacheValue::Variation {
                    allocation_key: event.allocation.clone(),
                    variation_key: event.variation.clone(),
                },
            }),
            None => true,
        };
        if should_log {
            self.assignment_logger.log_assignment(event);
        }
    }

    fn log_bandit_event(&self, event: BanditEvent) {
        let should_log = match &self.assignment_cache {
            Some(cache) => cache.should_log(&AssignmentCacheEntry {
                subject_key: event.subject.clone(),
                flag_key: event.flag_key.clone(),
                value: AssignmentCacheValue::Bandit {
                    bandit_key: event.bandit_key.clone(),
                    action_key: event.action.clone(),
                },
            }),
            None => true,
        };
        if should_log {
            self.assignment_logger.log_bandit_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::Utc;

    use super::{AssignmentReason, ClientOptions};
    use crate::assignment_logger::AssignmentLogger;
    use crate::error::EvaluationError;
    use crate::events::{AssignmentEvent, BanditEvent};
    use crate::flags::{
        Allocation, AssignmentValue, Environment, Flag, FlagsConfig, Shard, ShardRange, Split,
        TryParse, Variation, VariationType,
    };
    use crate::{Attributes, Configuration};

    fn init_log_capture() {
        // Route evaluation warnings through env_logger's test capture.
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[derive(Default)]
    struct CountingLogger {
        assignments: AtomicUsize,
        bandit_events: AtomicUsize,
    }

    impl AssignmentLogger for CountingLogger {
        fn log_assignment(&self, _event: AssignmentEvent) {
            self.assignments.fetch_add(1, Ordering::SeqCst);
        }

        fn log_bandit_event(&self, _event: BanditEvent) {
            self.bandit_events.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_flag(key: &str, enabled: bool) -> Flag {
        Flag {
            key: key.to_owned(),
            enabled,
            variation_type: VariationType::Boolean,
            variations: [(
                "on".to_owned(),
                Variation {
                    key: "on".to_owned(),
                    value: true.into(),
                },
            )]
            .into(),
            allocations: vec![Allocation {
                key: "rollout".to_owned(),
                rules: vec![],
                start_at: None,
                end_at: None,
                splits: vec![Split {
                    shards: vec![Shard {
                        salt: "salt".to_owned(),
                        ranges: vec![ShardRange {
                            start: 0,
                            end: 10_000,
                        }],
                    }],
                    variation_key: "on".to_owned(),
                    extra_logging: HashMap::new(),
                }],
                do_log: true,
            }],
            total_shards: 10_000,
        }
    }

    fn configuration(flag: Flag) -> Configuration {
        Configuration::from_server_response(
            FlagsConfig {
                created_at: Utc::now(),
                environment: Environment {
                    name: "test".to_owned(),
                },
                flags: [(flag.key.clone(), TryParse::Parsed(flag))].into(),
                bandit_references: HashMap::new(),
            },
            None,
            false,
        )
    }

    #[test]
    fn missing_configuration_reports_reason() {
        init_log_capture();
        let client = ClientOptions::new().to_client();
        let result = client
            .get_assignment("on-flag", "alice", &Attributes::new(), true.into())
            .unwrap();
        assert_eq!(result.reason, AssignmentReason::ConfigurationMissing);
        assert_eq!(result.value, AssignmentValue::Boolean(true));
    }

    #[test]
    fn disabled_flag_reports_reason() {
        let client = ClientOptions::new().to_client();
        client.set_configuration(configuration(on_flag("on-flag", false)));
        let result = client
            .get_assignment("on-flag", "alice", &Attributes::new(), false.into())
            .unwrap();
        assert_eq!(result.reason, AssignmentReason::FlagUnrecognizedOrDisabled);
    }

    #[test]
    fn typed_getter_returns_assigned_value() {
        let client = ClientOptions::new().to_client();
        client.set_configuration(configuration(on_flag("on-flag", true)));
        let value = client
            .get_boolean_assignment("on-flag", "alice", &Attributes::new(), false)
            .unwrap();
        assert!(value);
    }

    #[test]
    fn repeated_assignments_are_logged_once() {
        let logger = Arc::new(CountingLogger::default());
        let client = ClientOptions::new()
            .assignment_logger(logger.clone())
            .to_client();
        client.set_configuration(configuration(on_flag("on-flag", true)));

        for _ in 0..5 {
            client
                .get_boolean_assignment("on-flag", "alice", &Attributes::new(), false)
                .unwrap();
        }

        assert_eq!(logger.assignments.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabled_cache_logs_every_assignment() {
        let logger = Arc::new(CountingLogger::default());
        let client = ClientOptions::new()
            .assignment_logger(logger.clone())
            .assignment_cache(None)
            .to_client();
        client.set_configuration(configuration(on_flag("on-flag", true)));

        for _ in 0..5 {
            client
                .get_boolean_assignment("on-flag", "alice", &Attributes::new(), false)
                .unwrap();
        }

        assert_eq!(logger.assignments.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn graceful_mode_swallows_type_mismatch() {
        init_log_capture();
        let client = ClientOptions::new().to_client();
        client.set_configuration(configuration(on_flag("on-flag", true)));
        let value = client
            .get_string_assignment(
                "on-flag",
                "alice",
                &Attributes::new(),
                "fallback".to_owned(),
            )
            .unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn non_graceful_mode_surfaces_type_mismatch() {
        let client = ClientOptions::new().graceful_mode(false).to_client();
        client.set_configuration(configuration(on_flag("on-flag", true)));
        let err = client
            .get_string_assignment(
                "on-flag",
                "alice",
                &Attributes::new(),
                "fallback".to_owned(),
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
}
