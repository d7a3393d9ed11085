//! SASL exchange of a single connection

use std::{cell::OnceCell, sync::Arc};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    identity::AuthenticatedIdentity,
    mechanism::{Mechanism, MechanismInstance},
    negotiator::{select_from, Negotiator},
};

/// Security of the transport the SASL exchange runs on, as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelSecurity {
    /// No TLS
    #[default]
    Plaintext,

    /// TLS without a client certificate
    Tls,

    /// TLS with a client certificate that the transport has verified
    MutualTls,
}

impl ChannelSecurity {
    /// Whether the client has been authenticated by the transport
    pub fn is_mutually_authenticated(&self) -> bool {
        matches!(self, ChannelSecurity::MutualTls)
    }
}

/// Code of a terminal SASL outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaslCode {
    /// Connection authentication succeeded
    Ok,

    /// Connection authentication failed due to an unspecified problem with the supplied
    /// credentials
    Auth,

    /// Connection authentication failed due to a system error
    Sys,
}

/// Result of feeding a message from the client into a [`SaslSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslOutcome {
    /// Send the challenge and wait for the next response
    Continue(Bytes),

    /// The client is authenticated
    Success,

    /// The exchange failed
    Failure(SaslCode),
}

impl SaslOutcome {
    /// Terminal code, `None` if the exchange continues
    pub fn code(&self) -> Option<SaslCode> {
        match self {
            SaslOutcome::Continue(_) => None,
            SaslOutcome::Success => Some(SaslCode::Ok),
            SaslOutcome::Failure(code) => Some(*code),
        }
    }
}

/// Drives one SASL exchange on one connection.
///
/// Dropping the session abandons the exchange.
#[derive(Debug)]
pub struct SaslSession {
    negotiator: Arc<Negotiator>,
    channel: ChannelSecurity,
    realm: String,
    offered: OnceCell<Vec<Mechanism>>,
    mechanism: Option<(Mechanism, Box<dyn MechanismInstance>)>,
    code: Option<SaslCode>,
}

impl SaslSession {
    /// Creates a session for a new connection.
    ///
    /// `hostname` is the hostname sent by the client and selects the realm. The configured
    /// default domain is used if it is `None`.
    pub fn new(negotiator: Arc<Negotiator>, channel: ChannelSecurity, hostname: Option<&str>) -> Self {
        let realm = negotiator.realm_for(hostname);
        Self {
            negotiator,
            channel,
            realm,
            offered: OnceCell::new(),
            mechanism: None,
            code: None,
        }
    }

    /// Mechanisms to advertise, in advertisement order.
    ///
    /// The list is computed once per session and [`start`](Self::start) selects from the same list.
    pub fn mechanisms(&self) -> Vec<&'static str> {
        self.offered().iter().map(Mechanism::name).collect()
    }

    fn offered(&self) -> &[Mechanism] {
        self.offered
            .get_or_init(|| self.negotiator.offered_mechanisms(self.channel))
    }

    /// Realm the exchange authenticates against
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Selects the first mechanism in `client_mechanisms` that is offered on this channel and
    /// processes the initial response with it
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn start<S>(&mut self, client_mechanisms: &[S], initial_response: &[u8]) -> SaslOutcome
    where
        S: AsRef<str>,
    {
        if self.code.is_some() {
            return SaslOutcome::Failure(SaslCode::Sys);
        }
        if self.mechanism.is_some() {
            #[cfg(feature = "tracing")]
            tracing::warn!("SASL exchange has already started");
            #[cfg(feature = "log")]
            log::warn!("SASL exchange has already started");
            return self.finish(SaslCode::Sys);
        }

        let mechanism = match select_from(self.offered(), client_mechanisms) {
            Some(mechanism) => mechanism,
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(realm = %self.realm, "No mutually supported mechanism");
                #[cfg(feature = "log")]
                log::debug!("No mutually supported mechanism for realm {}", self.realm);
                return self.finish(SaslCode::Sys);
            }
        };

        let context = self.negotiator.context(self.realm.clone(), self.channel);
        self.mechanism = Some((mechanism, mechanism.instantiate(context)));
        self.step(initial_response)
    }

    /// Processes a response to the last challenge
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn process(&mut self, response: &[u8]) -> SaslOutcome {
        if self.code.is_some() {
            return SaslOutcome::Failure(SaslCode::Sys);
        }
        if self.mechanism.is_none() {
            #[cfg(feature = "tracing")]
            tracing::warn!("SASL response received before a mechanism was selected");
            #[cfg(feature = "log")]
            log::warn!("SASL response received before a mechanism was selected");
            return self.finish(SaslCode::Sys);
        }
        self.step(response)
    }

    fn step(&mut self, response: &[u8]) -> SaslOutcome {
        let (_mechanism, instance) = match self.mechanism.as_mut() {
            Some((mechanism, instance)) => (*mechanism, instance),
            None => return self.finish(SaslCode::Sys),
        };

        match instance.process_response(response) {
            Ok(challenge) => {
                let challenge = challenge.unwrap_or_default();
                if !instance.is_complete() || !challenge.is_empty() {
                    return SaslOutcome::Continue(challenge);
                }

                if instance.is_authenticated() {
                    self.finish(SaslCode::Ok)
                } else {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(realm = %self.realm, mechanism = %_mechanism, "Authentication failed");
                    #[cfg(feature = "log")]
                    log::debug!(
                        "Authentication failed, realm={}, mechanism={}",
                        self.realm,
                        _mechanism
                    );
                    self.finish(SaslCode::Auth)
                }
            }
            Err(_error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(realm = %self.realm, mechanism = %_mechanism, error = %_error, "SASL exchange failed");
                #[cfg(feature = "log")]
                log::warn!(
                    "SASL exchange failed, realm={}, mechanism={}: {}",
                    self.realm,
                    _mechanism,
                    _error
                );
                self.finish(SaslCode::Sys)
            }
        }
    }

    fn finish(&mut self, code: SaslCode) -> SaslOutcome {
        self.code = Some(code);
        match code {
            SaslCode::Ok => SaslOutcome::Success,
            code => SaslOutcome::Failure(code),
        }
    }

    /// Whether the exchange has reached a terminal outcome
    pub fn is_done(&self) -> bool {
        self.code.is_some()
    }

    /// Terminal outcome, `None` while the exchange is in progress
    pub fn outcome(&self) -> Option<SaslCode> {
        self.code
    }

    /// Whether the exchange ended with [`SaslCode::Ok`]
    pub fn succeeded(&self) -> bool {
        self.code == Some(SaslCode::Ok)
    }

    /// Selected mechanism
    pub fn mechanism(&self) -> Option<Mechanism> {
        self.mechanism.as_ref().map(|(mechanism, _)| *mechanism)
    }

    /// Identity of the authenticated client. `None` unless the exchange succeeded, and always
    /// `None` for EXTERNAL.
    pub fn identity(&self) -> Option<&AuthenticatedIdentity> {
        if !self.succeeded() {
            return None;
        }
        self.mechanism
            .as_ref()
            .and_then(|(_, instance)| instance.authenticated_identity())
    }
}
