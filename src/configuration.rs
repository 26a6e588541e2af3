use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::{bandits::BanditConfiguration, bandits::BanditResponse, flags::FlagsConfig};

/// Remote configuration for the client. It's a central piece that defines
/// evaluation behavior.
///
/// `Configuration` is immutable: a refresh builds a brand-new instance and
/// publishes it through
/// [`ConfigurationStore`](crate::configuration_store::ConfigurationStore).
#[derive(Debug)]
pub struct Configuration {
    /// Timestamp when the configuration was fetched by the SDK.
    pub fetched_at: DateTime<Utc>,
    /// Flags configuration.
    pub flags: FlagsConfig,
    /// Bandits configuration.
    pub bandits: Option<BanditResponse>,
    /// Whether identifiers and comparison values in `flags` are obfuscated
    /// (hashed) rather than plaintext.
    pub is_obfuscated: bool,
}

impl Configuration {
    /// Create a new configuration from server responses.
    pub fn from_server_response(
        flags: FlagsConfig,
        bandits: Option<BanditResponse>,
        is_obfuscated: bool,
    ) -> Configuration {
        Configuration {
            fetched_at: Utc::now(),
            flags,
            bandits,
            is_obfuscated,
        }
    }

    /// Return the bandit key for the specified flag key and string flag
    /// variation, provided the reference's model version matches the loaded
    /// bandit parameters (stale references are skipped).
    pub(crate) fn get_bandit_key<'a>(&'a self, flag_key: &str, variation: &str) -> Option<&'a str> {
        self.flags
            .bandit_references
            .iter()
            .find(|(_, reference)| {
                reference
                    .flag_variations
                    .iter()
                    .any(|v| v.flag_key == flag_key && v.variation_value == variation)
            })
            .filter(|(bandit_key, reference)| {
                self.get_bandit(bandit_key)
                    .is_some_and(|bandit| bandit.model_version == reference.model_version)
            })
            .map(|(bandit_key, _)| bandit_key.as_str())
    }

    /// Return bandit configuration for the given key.
    ///
    /// Returns `None` if bandits are missing or the bandit does not exist.
    pub(crate) fn get_bandit<'a>(&'a self, bandit_key: &str) -> Option<&'a BanditConfiguration> {
        self.bandits.as_ref()?.bandits.get(bandit_key)
    }

    /// Get a set of all available flags. Note that this may return both
    /// disabled flags and flags with bad configuration.
    pub fn flag_keys(&self) -> HashSet<String> {
        self.flags.flags.keys().cloned().collect()
    }
}
