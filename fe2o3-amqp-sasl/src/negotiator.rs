//! Mechanism advertisement and selection

use std::{marker::PhantomData, sync::Arc};

use crate::{
    config::SaslConfig,
    mechanism::{Mechanism, MechanismContext},
    scram::ServerSecret,
    session::ChannelSecurity,
    store::{with_transaction, CredentialStore},
    util::{Initialized, Uninitialized},
};

/// Registry of the enabled mechanisms.
///
/// Built once at startup and shared by every [`SaslSession`](crate::session::SaslSession)
/// through an `Arc`.
#[derive(Debug)]
pub struct Negotiator {
    mechanisms: Vec<Mechanism>,
    store: Arc<dyn CredentialStore>,
    secret: Arc<ServerSecret>,
    config: SaslConfig,
}

impl Negotiator {
    /// Creates a builder for [`Negotiator`]
    pub fn builder() -> Builder<(), Uninitialized> {
        Builder::new()
    }

    /// Enabled mechanisms ordered by priority
    pub fn supported_mechanisms(&self) -> &[Mechanism] {
        &self.mechanisms
    }

    /// Configuration
    pub fn config(&self) -> &SaslConfig {
        &self.config
    }

    /// Mechanisms to advertise on `channel`, ordered by priority.
    ///
    /// EXTERNAL is only offered on a mutually authenticated channel. Unless disabled in the
    /// configuration, a SCRAM mechanism is only offered if it can verify at least one of the
    /// password hash algorithms reported by the store.
    pub fn offered_mechanisms(&self, channel: ChannelSecurity) -> Vec<Mechanism> {
        let eligible = self
            .mechanisms
            .iter()
            .copied()
            .filter(|mechanism| !mechanism.requires_mutual_tls() || channel.is_mutually_authenticated());

        if !self.config.filter_by_password_policy {
            return eligible.collect();
        }

        let algorithms = match with_transaction(self.store.as_ref(), |txn| {
            txn.password_hash_algorithms()
        }) {
            Ok(algorithms) => algorithms,
            Err(_error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_error, "Failed to read password hash algorithms");
                #[cfg(feature = "log")]
                log::warn!("Failed to read password hash algorithms: {}", _error);
                Default::default()
            }
        };

        if algorithms.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::warn!("No password hash algorithm found, only universally accepted SASL mechanisms will be offered");
            #[cfg(feature = "log")]
            log::warn!("No password hash algorithm found, only universally accepted SASL mechanisms will be offered");
            return eligible.filter(Mechanism::is_universal).collect();
        }

        eligible
            .filter(|mechanism| {
                algorithms
                    .iter()
                    .any(|algorithm| mechanism.is_supported(algorithm))
            })
            .collect()
    }

    /// Names of [`offered_mechanisms`](Self::offered_mechanisms)
    pub fn offered_mechanism_names(&self, channel: ChannelSecurity) -> Vec<&'static str> {
        self.offered_mechanisms(channel)
            .iter()
            .map(Mechanism::name)
            .collect()
    }

    /// First mechanism in the client's list that is offered on `channel`
    pub fn select<S>(&self, client_mechanisms: &[S], channel: ChannelSecurity) -> Option<Mechanism>
    where
        S: AsRef<str>,
    {
        select_from(&self.offered_mechanisms(channel), client_mechanisms)
    }

    /// Realm selected by the hostname sent by the client
    pub fn realm_for(&self, hostname: Option<&str>) -> String {
        match hostname {
            Some(hostname) => hostname.to_string(),
            None => self.config.default_domain.clone(),
        }
    }

    pub(crate) fn context(&self, realm: String, channel: ChannelSecurity) -> MechanismContext {
        MechanismContext {
            store: self.store.clone(),
            realm,
            channel,
            secret: self.secret.clone(),
            unknown_user_iterations: self.config.unknown_user_iterations,
            pseudo_salt_len: self.config.pseudo_salt_len,
        }
    }
}

/// First mechanism in `client_mechanisms` that is also in `offered`
pub(crate) fn select_from<S>(offered: &[Mechanism], client_mechanisms: &[S]) -> Option<Mechanism>
where
    S: AsRef<str>,
{
    client_mechanisms
        .iter()
        .filter_map(|name| Mechanism::from_name(name.as_ref()))
        .find(|mechanism| offered.contains(mechanism))
}

/// Builder for [`Negotiator`]
#[derive(Debug)]
pub struct Builder<S, M> {
    store: S,
    config: SaslConfig,
    secret: Option<Arc<ServerSecret>>,
    marker: PhantomData<M>,
}

impl Default for Builder<(), Uninitialized> {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder<(), Uninitialized> {
    /// Creates a new builder with the default configuration
    pub fn new() -> Self {
        Self {
            store: (),
            config: SaslConfig::default(),
            secret: None,
            marker: PhantomData,
        }
    }
}

impl<S, M> Builder<S, M> {
    /// The store users and credentials are looked up in
    pub fn credential_store<C>(self, store: C) -> Builder<Arc<dyn CredentialStore>, Initialized>
    where
        C: CredentialStore + 'static,
    {
        Builder {
            store: Arc::new(store),
            config: self.config,
            secret: self.secret,
            marker: PhantomData,
        }
    }

    /// Replaces the whole configuration
    pub fn config(mut self, config: SaslConfig) -> Self {
        self.config = config;
        self
    }

    /// Realm used when the client doesn't send a hostname
    pub fn default_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.default_domain = domain.into();
        self
    }

    /// Iteration count advertised for users without a SCRAM credential
    pub fn unknown_user_iterations(mut self, iterations: u32) -> Self {
        self.config.unknown_user_iterations = iterations;
        self
    }

    /// Length of the salt advertised for users without a SCRAM credential
    pub fn pseudo_salt_len(mut self, len: usize) -> Self {
        self.config.pseudo_salt_len = len;
        self
    }

    /// Restricts the registry to `mechanisms`
    pub fn mechanisms(mut self, mechanisms: impl IntoIterator<Item = Mechanism>) -> Self {
        let names = mechanisms
            .into_iter()
            .map(|mechanism| mechanism.name().to_string())
            .collect();
        self.config.mechanisms = Some(names);
        self
    }

    /// Whether to filter advertised mechanisms by the password hash policy of the store
    pub fn filter_by_password_policy(mut self, value: bool) -> Self {
        self.config.filter_by_password_policy = value;
        self
    }

    /// Uses `secret` instead of the process wide [`ServerSecret`]
    pub fn server_secret(mut self, secret: Arc<ServerSecret>) -> Self {
        self.secret = Some(secret);
        self
    }
}

impl Builder<Arc<dyn CredentialStore>, Initialized> {
    /// Builds the [`Negotiator`]
    pub fn build(self) -> Negotiator {
        Negotiator {
            mechanisms: self.config.enabled_mechanisms(),
            store: self.store,
            secret: self.secret.unwrap_or_else(ServerSecret::process_wide),
            config: self.config,
        }
    }
}
