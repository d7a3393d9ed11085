//! Credential store consumed by the mechanisms

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use base64::Engine;
use parking_lot::RwLock;
use rand::RngCore;

use crate::{
    constants::{DEFAULT_SALT_LEN, DEFAULT_SCRAM_ITERATIONS},
    error::{CredentialError, StoreError},
    identity::AuthenticatedIdentity,
    scram::{constant_time_eq, ScramVersion},
};

/// Length of the PBKDF2 output kept for a salted hash credential
const SALTED_HASH_LEN: usize = 64;

/// Secret part of a [`Credential`]
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSecret {
    /// Native SCRAM credential
    Scram {
        /// StoredKey := H(ClientKey)
        stored_key: Vec<u8>,

        /// ServerKey := HMAC(SaltedPassword, "Server Key")
        server_key: Vec<u8>,
    },

    /// PBKDF2 password hash. The first `H()`-length bytes are the SCRAM `SaltedPassword`.
    SaltedHash {
        /// PBKDF2 output
        hash: Vec<u8>,
    },
}

impl fmt::Debug for CredentialSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scram { .. } => f.write_str("Scram { .. }"),
            Self::SaltedHash { .. } => f.write_str("SaltedHash { .. }"),
        }
    }
}

/// Password material of a user. The engine never modifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    algorithm: String,
    salt: Vec<u8>,
    iterations: u32,
    secret: CredentialSecret,
}

impl Credential {
    /// Creates a credential from already derived material
    pub fn new(
        algorithm: impl Into<String>,
        salt: Vec<u8>,
        iterations: u32,
        secret: CredentialSecret,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            salt,
            iterations,
            secret,
        }
    }

    /// Derives a native SCRAM credential from a cleartext password
    pub fn new_scram(
        version: ScramVersion,
        password: &str,
        salt: Vec<u8>,
        iterations: u32,
    ) -> Result<Self, CredentialError> {
        let salted_password = version.compute_salted_password(password, &salt, iterations)?;
        let keys = version.keys_from_salted_password(&salted_password)?;
        Ok(Self {
            algorithm: version.scram_algorithm().to_string(),
            salt,
            iterations,
            secret: CredentialSecret::Scram {
                stored_key: keys.stored_key,
                server_key: keys.server_key,
            },
        })
    }

    /// Derives a native SCRAM credential with a random salt and the default iteration count
    pub fn generate_scram(version: ScramVersion, password: &str) -> Result<Self, CredentialError> {
        let mut salt = vec![0u8; DEFAULT_SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::new_scram(version, password, salt, DEFAULT_SCRAM_ITERATIONS)
    }

    /// Derives a PBKDF2 password hash credential from a cleartext password
    pub fn new_salted_hash(
        version: ScramVersion,
        password: &str,
        salt: Vec<u8>,
        iterations: u32,
    ) -> Result<Self, CredentialError> {
        let normalized_password = stringprep::saslprep(password)?;
        let hash = version.h_i_with_len(
            normalized_password.as_bytes(),
            &salt,
            iterations,
            SALTED_HASH_LEN,
        )?;
        Ok(Self {
            algorithm: version.pbkdf2_algorithm().to_string(),
            salt,
            iterations,
            secret: CredentialSecret::SaltedHash { hash },
        })
    }

    /// Decodes a native SCRAM credential stored as `base64(StoredKey)|base64(ServerKey)`
    pub fn from_encoded_scram_value(
        algorithm: impl Into<String>,
        salt: Vec<u8>,
        iterations: u32,
        value: &str,
    ) -> Result<Self, CredentialError> {
        let algorithm = algorithm.into();
        if ScramVersion::from_algorithm(&algorithm).is_none() {
            return Err(CredentialError::UnsupportedAlgorithm(algorithm));
        }

        let (stored_key, server_key) = value
            .split_once('|')
            .ok_or(CredentialError::MissingServerKey)?;
        let engine = base64::engine::general_purpose::STANDARD;
        Ok(Self {
            algorithm,
            salt,
            iterations,
            secret: CredentialSecret::Scram {
                stored_key: engine.decode(stored_key)?,
                server_key: engine.decode(server_key)?,
            },
        })
    }

    /// Algorithm id
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Salt
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Iteration count
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Secret material
    pub fn secret(&self) -> &CredentialSecret {
        &self.secret
    }

    /// Checks a cleartext password against this credential
    pub fn verify_password(&self, password: &str) -> Result<bool, CredentialError> {
        let version = ScramVersion::from_algorithm(&self.algorithm)
            .ok_or_else(|| CredentialError::UnsupportedAlgorithm(self.algorithm.clone()))?;
        let normalized_password = stringprep::saslprep(password)?;

        match &self.secret {
            CredentialSecret::Scram { stored_key, .. } => {
                let salted_password =
                    version.h_i(normalized_password.as_bytes(), &self.salt, self.iterations)?;
                let keys = version.keys_from_salted_password(&salted_password)?;
                Ok(constant_time_eq(&keys.stored_key, stored_key))
            }
            CredentialSecret::SaltedHash { hash } => {
                let computed = version.h_i_with_len(
                    normalized_password.as_bytes(),
                    &self.salt,
                    self.iterations,
                    hash.len(),
                )?;
                Ok(constant_time_eq(&computed, hash))
            }
        }
    }
}

/// A user found in the store
#[derive(Debug, Clone)]
pub struct StoredUser {
    /// Identity published when the user authenticates
    pub identity: AuthenticatedIdentity,

    /// Password credential, `None` if the user has no password
    pub credential: Option<Credential>,
}

/// A transaction scoped to a single lookup.
///
/// The engine begins it right before the lookup and commits it right after; it is never held
/// across SASL rounds.
pub trait StoreTransaction {
    /// Looks up `username` in `realm`. An unknown realm or user is `Ok(None)`.
    fn find_user(&mut self, realm: &str, username: &str) -> Result<Option<StoredUser>, StoreError>;

    /// Verifies a cleartext password with the store's own verification
    fn verify_password(
        &mut self,
        realm: &str,
        user: &StoredUser,
        password: &str,
    ) -> Result<bool, StoreError>;

    /// Checks that the user returned by the store is the user that was asked for. The default
    /// implementation requires both to be equal
    fn is_username_match(&self, claimed: &str, stored: &str) -> bool {
        claimed == stored
    }

    /// Password hash algorithm ids configured for the realms this store serves
    fn password_hash_algorithms(&mut self) -> Result<BTreeSet<String>, StoreError> {
        Ok(BTreeSet::new())
    }

    /// Commits the transaction
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Provide users and their credentials
pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// Begins a transaction
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;
}

impl<T> CredentialStore for Arc<T>
where
    T: CredentialStore + ?Sized,
{
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        self.as_ref().begin()
    }
}

/// Runs `f` inside a transaction. The transaction is committed even if `f` fails, in which
/// case the error of `f` is returned.
pub(crate) fn with_transaction<'s, T, F>(
    store: &'s dyn CredentialStore,
    f: F,
) -> Result<T, StoreError>
where
    F: FnOnce(&mut (dyn StoreTransaction + 's)) -> Result<T, StoreError>,
{
    let mut txn = store.begin()?;
    let result = f(txn.as_mut());
    let committed = txn.commit();
    let value = result?;
    committed?;
    Ok(value)
}

#[derive(Debug, Default)]
struct InMemoryRealm {
    password_hash_algorithm: Option<String>,
    users: HashMap<String, StoredUser>,
}

/// A [`CredentialStore`] that keeps its realms in memory
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    realms: RwLock<HashMap<String, InMemoryRealm>>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `realm` if it doesn't exist and sets the password hash algorithm of its policy
    pub fn set_password_hash_algorithm(&self, realm: impl Into<String>, algorithm: impl Into<String>) {
        self.realms
            .write()
            .entry(realm.into())
            .or_default()
            .password_hash_algorithm = Some(algorithm.into());
    }

    /// Inserts or replaces a user, creating `realm` if it doesn't exist
    pub fn insert_user(
        &self,
        realm: impl Into<String>,
        identity: AuthenticatedIdentity,
        credential: Option<Credential>,
    ) {
        let username = identity.username().to_string();
        self.realms.write().entry(realm.into()).or_default().users.insert(
            username,
            StoredUser {
                identity,
                credential,
            },
        );
    }

    /// Inserts a user with a native SCRAM credential derived from `password`
    pub fn insert_user_with_password(
        &self,
        realm: impl Into<String>,
        identity: AuthenticatedIdentity,
        version: ScramVersion,
        password: &str,
    ) -> Result<(), CredentialError> {
        let credential = Credential::generate_scram(version, password)?;
        self.insert_user(realm, identity, Some(credential));
        Ok(())
    }

    /// Removes a user
    pub fn remove_user(&self, realm: &str, username: &str) -> Option<StoredUser> {
        self.realms
            .write()
            .get_mut(realm)
            .and_then(|realm| realm.users.remove(username))
    }
}

#[derive(Debug)]
struct InMemoryTransaction<'a> {
    store: &'a InMemoryCredentialStore,
}

impl<'a> StoreTransaction for InMemoryTransaction<'a> {
    fn find_user(&mut self, realm: &str, username: &str) -> Result<Option<StoredUser>, StoreError> {
        let realms = self.store.realms.read();
        Ok(realms
            .get(realm)
            .and_then(|realm| realm.users.get(username))
            .cloned())
    }

    fn verify_password(
        &mut self,
        _realm: &str,
        user: &StoredUser,
        password: &str,
    ) -> Result<bool, StoreError> {
        match user.credential.as_ref().map(|c| c.verify_password(password)) {
            Some(Ok(verified)) => Ok(verified),
            Some(Err(CredentialError::UnsupportedAlgorithm(_algorithm))) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(algorithm = %_algorithm, "Unsupported credential algorithm");
                #[cfg(feature = "log")]
                log::warn!("Unsupported credential algorithm: {}", _algorithm);
                Ok(false)
            }
            Some(Err(err)) => Err(StoreError::MalformedCredential(err.to_string())),
            None => Ok(false),
        }
    }

    fn password_hash_algorithms(&mut self) -> Result<BTreeSet<String>, StoreError> {
        let realms = self.store.realms.read();
        Ok(realms
            .values()
            .filter_map(|realm| realm.password_hash_algorithm.clone())
            .collect())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        Ok(Box::new(InMemoryTransaction { store: self }))
    }
}
