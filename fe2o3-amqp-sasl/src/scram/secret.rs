//! Server side secret material used for users that do not exist

use std::sync::{Arc, OnceLock};

use hmac::digest::InvalidLength;
use rand::RngCore;

use super::{ScramVersion, StoredAndServerKey};

static PROCESS_SECRET: OnceLock<Arc<ServerSecret>> = OnceLock::new();

const HMAC_KEY_LEN: usize = 32;

/// Long enough for the largest supported `H()` output (SHA-512)
const SALTED_PASSWORD_LEN: usize = 64;

/// Random secret that makes the exchange for an unknown user look like the exchange for a
/// known one.
///
/// The HMAC key derives a stable pseudo-salt per username and the random salted password
/// derives keys that can never validate a client proof. Neither is ever persisted.
pub struct ServerSecret {
    hmac_key: [u8; HMAC_KEY_LEN],
    salted_password: [u8; SALTED_PASSWORD_LEN],
}

impl std::fmt::Debug for ServerSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSecret").finish_non_exhaustive()
    }
}

impl ServerSecret {
    /// Creates a new secret from the thread local CSPRNG
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let mut hmac_key = [0u8; HMAC_KEY_LEN];
        let mut salted_password = [0u8; SALTED_PASSWORD_LEN];
        rng.fill_bytes(&mut hmac_key);
        rng.fill_bytes(&mut salted_password);
        Self {
            hmac_key,
            salted_password,
        }
    }

    /// The secret shared by every negotiator of this process.
    ///
    /// It is generated on first use and stays the same until the process exits, so
    /// repeated probes for one unknown username always see the same salt.
    pub fn process_wide() -> Arc<Self> {
        PROCESS_SECRET
            .get_or_init(|| Arc::new(Self::random()))
            .clone()
    }

    /// Deterministic salt of `len` bytes for `username`.
    ///
    /// `HMAC(key, username)` is truncated to `len`; if a single block is too short the key is
    /// re-derived from `username + "1"`, `username + "11"`, ... and the blocks are concatenated.
    pub fn pseudo_salt(
        &self,
        version: ScramVersion,
        username: &str,
        len: usize,
    ) -> Result<Vec<u8>, InvalidLength> {
        let mut salt = Vec::with_capacity(len);
        let mut input = String::from(username);
        while salt.len() < len {
            let block = version.hmac(&self.hmac_key, input.as_bytes())?;
            let take = block.len().min(len - salt.len());
            salt.extend_from_slice(&block[..take]);
            input.push('1');
        }
        Ok(salt)
    }

    /// Keys derived from the random salted password
    pub fn unknown_user_keys(
        &self,
        version: ScramVersion,
    ) -> Result<StoredAndServerKey, InvalidLength> {
        version.keys_from_salted_password(&self.salted_password[..version.output_len()])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::ServerSecret;
    use crate::scram::ScramVersion;

    #[test]
    fn test_pseudo_salt_is_stable_per_username() {
        let secret = ServerSecret::random();
        let first = secret.pseudo_salt(ScramVersion::Sha256, "mallory", 16).unwrap();
        let second = secret.pseudo_salt(ScramVersion::Sha256, "mallory", 16).unwrap();
        let other = secret.pseudo_salt(ScramVersion::Sha256, "trudy", 16).unwrap();
        assert_eq!(first.len(), 16);
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn test_pseudo_salt_extends_past_one_block() {
        let secret = ServerSecret::random();
        let salt = secret.pseudo_salt(ScramVersion::Sha1, "mallory", 50).unwrap();
        assert_eq!(salt.len(), 50);

        let first_block = ScramVersion::Sha1.hmac(&secret.hmac_key, b"mallory").unwrap();
        let second_block = ScramVersion::Sha1.hmac(&secret.hmac_key, b"mallory1").unwrap();
        assert_eq!(&salt[..20], &first_block[..]);
        assert_eq!(&salt[20..40], &second_block[..]);
    }

    #[test]
    fn test_process_wide_secret_is_generated_once() {
        let first = ServerSecret::process_wide();
        let second = ServerSecret::process_wide();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unknown_user_keys_have_digest_length() {
        let secret = ServerSecret::random();
        for version in [ScramVersion::Sha1, ScramVersion::Sha256, ScramVersion::Sha512] {
            let keys = secret.unknown_user_keys(version).unwrap();
            assert_eq!(keys.stored_key.len(), version.output_len());
            assert_eq!(keys.server_key.len(), version.output_len());
        }
    }
}
