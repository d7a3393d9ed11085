//! Mechanism registry and the contract shared by mechanism instances

use std::{fmt, sync::Arc};

use bytes::Bytes;

use crate::{
    constants::{EXTERNAL, PLAIN},
    error::MechanismError,
    external::ExternalAuthenticator,
    identity::AuthenticatedIdentity,
    plain::PlainAuthenticator,
    scram::{ScramAuthenticator, ScramVersion, ServerSecret},
    session::ChannelSecurity,
    store::CredentialStore,
};

/// Server side state of one mechanism for one authentication attempt.
///
/// An instance is created fresh for every attempt and is never reused.
pub trait MechanismInstance: Send + fmt::Debug {
    /// Processes a response from the client.
    ///
    /// Returns the next challenge, or `None` once the mechanism has completed. After completion
    /// an empty response returns `Ok(None)` and any other response is an error.
    fn process_response(&mut self, response: &[u8]) -> Result<Option<Bytes>, MechanismError>;

    /// Whether the exchange has reached a terminal state
    fn is_complete(&self) -> bool;

    /// Whether the exchange completed with the client authenticated
    fn is_authenticated(&self) -> bool;

    /// The identity proven by the exchange, if any
    fn authenticated_identity(&self) -> Option<&AuthenticatedIdentity>;
}

/// Built-in SASL mechanisms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// SASL PLAIN
    Plain,

    /// SASL SCRAM-SHA-*
    Scram(ScramVersion),

    /// SASL EXTERNAL
    External,
}

impl Mechanism {
    /// Every built-in mechanism
    pub const ALL: [Mechanism; 5] = [
        Mechanism::Plain,
        Mechanism::Scram(ScramVersion::Sha1),
        Mechanism::Scram(ScramVersion::Sha256),
        Mechanism::Scram(ScramVersion::Sha512),
        Mechanism::External,
    ];

    /// Name of the mechanism on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::Plain => PLAIN,
            Mechanism::Scram(version) => version.mechanism(),
            Mechanism::External => EXTERNAL,
        }
    }

    /// Position in the advertised list, lower first
    pub fn priority(&self) -> u32 {
        match self {
            Mechanism::Plain => 10,
            Mechanism::Scram(ScramVersion::Sha1) => 50,
            Mechanism::Scram(ScramVersion::Sha256) => 60,
            Mechanism::Scram(ScramVersion::Sha512) => 70,
            Mechanism::External => 80,
        }
    }

    /// Looks up a mechanism by its exact wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mechanism| mechanism.name() == name)
    }

    /// Whether the mechanism can verify users whose passwords are hashed with `algorithm`
    pub fn is_supported(&self, algorithm: &str) -> bool {
        match self {
            Mechanism::Plain | Mechanism::External => true,
            Mechanism::Scram(version) => version.supports_algorithm(algorithm),
        }
    }

    /// Whether the mechanism works regardless of the password hash policy
    pub fn is_universal(&self) -> bool {
        matches!(self, Mechanism::Plain | Mechanism::External)
    }

    /// Whether the mechanism may only be offered on a mutually authenticated channel
    pub fn requires_mutual_tls(&self) -> bool {
        matches!(self, Mechanism::External)
    }

    pub(crate) fn instantiate(&self, context: MechanismContext) -> Box<dyn MechanismInstance> {
        match self {
            Mechanism::Plain => Box::new(PlainAuthenticator::new(context)),
            Mechanism::Scram(version) => Box::new(ScramAuthenticator::new(*version, context)),
            Mechanism::External => Box::new(ExternalAuthenticator::new(context.channel)),
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared, read-only state handed to a mechanism instance
#[derive(Debug, Clone)]
pub(crate) struct MechanismContext {
    pub store: Arc<dyn CredentialStore>,
    pub realm: String,
    pub channel: ChannelSecurity,
    pub secret: Arc<ServerSecret>,
    pub unknown_user_iterations: u32,
    pub pseudo_salt_len: usize,
}
