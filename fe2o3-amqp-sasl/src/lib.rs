#![deny(missing_docs, missing_debug_implementations)]

//! Server side SASL negotiation for AMQP 1.0 listeners
//!
//! A connection must complete a SASL exchange before it may send or receive messages. This
//! crate advertises mechanisms, verifies credentials against a [`CredentialStore`] and yields
//! the [`AuthenticatedIdentity`] of the client.
//!
//! Supported mechanisms
//!
//! - PLAIN
//! - SCRAM-SHA-1, SCRAM-SHA-256 and SCRAM-SHA-512
//! - EXTERNAL, on mutually authenticated TLS connections
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use fe2o3_amqp_sasl::{
//!     AuthenticatedIdentity, ChannelSecurity, InMemoryCredentialStore, Negotiator, SaslOutcome,
//!     SaslSession, ScramVersion,
//! };
//!
//! let store = InMemoryCredentialStore::new();
//! store.set_password_hash_algorithm("myspace", "scram-sha-256");
//! store
//!     .insert_user_with_password(
//!         "myspace",
//!         AuthenticatedIdentity::new("1", "alice", ["send_queue1"]),
//!         ScramVersion::Sha256,
//!         "wonderland",
//!     )
//!     .unwrap();
//!
//! let negotiator = Arc::new(
//!     Negotiator::builder()
//!         .default_domain("myspace")
//!         .credential_store(store)
//!         .build(),
//! );
//!
//! let mut session = SaslSession::new(negotiator, ChannelSecurity::Tls, None);
//! assert_eq!(session.mechanisms(), vec!["PLAIN", "SCRAM-SHA-256"]);
//!
//! let outcome = session.start(&["PLAIN"], b"\0alice\0wonderland");
//! assert_eq!(outcome, SaslOutcome::Success);
//! assert_eq!(session.identity().unwrap().username(), "alice");
//! ```
//!
//! # Feature flags
//!
//! ```toml
//! default = []
//! ```
//!
//! |Feature|Description|
//! |-------|-----------|
//! |`"tracing"`|enables logging with `tracing`|
//! |`"log"`|enables logging with `log`|

pub mod config;
pub mod constants;
pub mod error;
pub mod external;
pub mod identity;
pub mod mechanism;
pub mod negotiator;
pub mod plain;
pub mod scram;
pub mod session;
pub mod store;
pub mod util;

pub use config::SaslConfig;
pub use error::{CredentialError, MechanismError, StoreError};
pub use identity::AuthenticatedIdentity;
pub use mechanism::{Mechanism, MechanismInstance};
pub use negotiator::Negotiator;
pub use scram::{ScramVersion, ServerSecret};
pub use session::{ChannelSecurity, SaslCode, SaslOutcome, SaslSession};
pub use store::{
    Credential, CredentialSecret, CredentialStore, InMemoryCredentialStore, StoreTransaction,
    StoredUser,
};
