//! Configuration of the negotiator

use serde::{Deserialize, Serialize};

use crate::{
    constants::{DEFAULT_PSEUDO_SALT_LEN, DEFAULT_UNKNOWN_USER_ITERATIONS},
    mechanism::Mechanism,
};

/// Configuration of a [`Negotiator`](crate::negotiator::Negotiator).
///
/// Every field has a default so that a partial document can be deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SaslConfig {
    /// Realm used when the client doesn't send a hostname
    pub default_domain: String,

    /// Iteration count advertised for users without a SCRAM credential
    pub unknown_user_iterations: u32,

    /// Length of the salt advertised for users without a SCRAM credential
    pub pseudo_salt_len: usize,

    /// Names of the mechanisms to enable. Every built-in mechanism is enabled if `None`
    pub mechanisms: Option<Vec<String>>,

    /// Only advertise mechanisms that can verify the password hashes configured in the store
    pub filter_by_password_policy: bool,
}

impl Default for SaslConfig {
    fn default() -> Self {
        Self {
            default_domain: String::new(),
            unknown_user_iterations: DEFAULT_UNKNOWN_USER_ITERATIONS,
            pseudo_salt_len: DEFAULT_PSEUDO_SALT_LEN,
            mechanisms: None,
            filter_by_password_policy: true,
        }
    }
}

impl SaslConfig {
    /// Enabled mechanisms ordered by priority. Unknown names are skipped.
    pub fn enabled_mechanisms(&self) -> Vec<Mechanism> {
        let mut mechanisms: Vec<Mechanism> = match &self.mechanisms {
            Some(names) => names
                .iter()
                .filter_map(|name| {
                    let mechanism = Mechanism::from_name(name);
                    if mechanism.is_none() {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(name = %name, "Ignoring unknown SASL mechanism");
                        #[cfg(feature = "log")]
                        log::warn!("Ignoring unknown SASL mechanism {}", name);
                    }
                    mechanism
                })
                .collect(),
            None => Mechanism::ALL.to_vec(),
        };
        mechanisms.sort_by_key(Mechanism::priority);
        mechanisms.dedup();
        mechanisms
    }
}
