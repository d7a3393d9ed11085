//! SASL-SCRAM-SHA-1, SASL-SCRAM-SHA-256 and SASL-SCRAM-SHA-512 (RFC 5802, RFC 7677)

use std::ops::BitXor;

use hmac::{
    digest::{Digest, FixedOutput, InvalidLength, KeyInit},
    Hmac, Mac,
};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::{
    constants::{
        PBKDF2_ALGORITHM, PBKDF2_SHA256_ALGORITHM, PBKDF2_SHA512_ALGORITHM, SCRAM_SHA_1,
        SCRAM_SHA_1_ALGORITHM, SCRAM_SHA_256, SCRAM_SHA_256_ALGORITHM, SCRAM_SHA_512,
        SCRAM_SHA_512_ALGORITHM,
    },
    error::CredentialError,
    store::{Credential, CredentialSecret},
};

pub(crate) mod attributes;
mod secret;
mod server;

pub use secret::ServerSecret;
pub use server::ScramAuthenticator;

/// SCRAM version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScramVersion {
    /// SHA-1
    ///
    /// The SHA-1 hash function should be considered cryptographically
    /// broken and unsuitable for further use in any security critical capacity,
    /// as it is practically vulnerable to chosen-prefix collisions.
    Sha1,

    /// SHA-256
    Sha256,

    /// SHA-512
    Sha512,
}

/// `StoredKey` and `ServerKey` of a user
#[derive(Clone)]
pub struct StoredAndServerKey {
    /// StoredKey := H(ClientKey)
    pub stored_key: Vec<u8>,

    /// ServerKey := HMAC(SaltedPassword, "Server Key")
    pub server_key: Vec<u8>,
}

impl std::fmt::Debug for StoredAndServerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredAndServerKey").finish_non_exhaustive()
    }
}

impl ScramVersion {
    /// Get the mechanism string
    pub fn mechanism(&self) -> &'static str {
        match self {
            ScramVersion::Sha1 => SCRAM_SHA_1,
            ScramVersion::Sha256 => SCRAM_SHA_256,
            ScramVersion::Sha512 => SCRAM_SHA_512,
        }
    }

    /// Algorithm id of a credential that stores `StoredKey` and `ServerKey` directly
    pub fn scram_algorithm(&self) -> &'static str {
        match self {
            ScramVersion::Sha1 => SCRAM_SHA_1_ALGORITHM,
            ScramVersion::Sha256 => SCRAM_SHA_256_ALGORITHM,
            ScramVersion::Sha512 => SCRAM_SHA_512_ALGORITHM,
        }
    }

    /// Algorithm id of a PBKDF2 password hash computed with the same hash function
    pub fn pbkdf2_algorithm(&self) -> &'static str {
        match self {
            ScramVersion::Sha1 => PBKDF2_ALGORITHM,
            ScramVersion::Sha256 => PBKDF2_SHA256_ALGORITHM,
            ScramVersion::Sha512 => PBKDF2_SHA512_ALGORITHM,
        }
    }

    /// Finds the version whose native or PBKDF2 algorithm id is `algorithm`
    pub fn from_algorithm(algorithm: &str) -> Option<Self> {
        [ScramVersion::Sha1, ScramVersion::Sha256, ScramVersion::Sha512]
            .into_iter()
            .find(|version| version.supports_algorithm(algorithm))
    }

    /// Whether keys for this version can be retrieved from a credential of `algorithm`
    pub fn supports_algorithm(&self, algorithm: &str) -> bool {
        algorithm == self.scram_algorithm() || algorithm == self.pbkdf2_algorithm()
    }

    /// Output length of `H()` and `HMAC()`
    pub fn output_len(&self) -> usize {
        match self {
            ScramVersion::Sha1 => 160 / 8,
            ScramVersion::Sha256 => 256 / 8,
            ScramVersion::Sha512 => 512 / 8,
        }
    }

    /// Hi(str, salt, i) with dkLen == output length of H()
    pub fn h_i(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
    ) -> Result<Vec<u8>, InvalidLength> {
        self.h_i_with_len(password, salt, iterations, self.output_len())
    }

    pub(crate) fn h_i_with_len(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        output_size: usize,
    ) -> Result<Vec<u8>, InvalidLength> {
        match self {
            ScramVersion::Sha1 => h_i::<Hmac<Sha1>>(password, salt, iterations, output_size),
            ScramVersion::Sha256 => h_i::<Hmac<Sha256>>(password, salt, iterations, output_size),
            ScramVersion::Sha512 => h_i::<Hmac<Sha512>>(password, salt, iterations, output_size),
        }
    }

    /// SaltedPassword := Hi(Normalize(password), salt, i)
    pub fn compute_salted_password(
        &self,
        password: &str,
        salt: &[u8],
        iterations: u32,
    ) -> Result<Vec<u8>, CredentialError> {
        let normalized_password = stringprep::saslprep(password)?;
        let salted_password = self.h_i(normalized_password.as_bytes(), salt, iterations)?;
        Ok(salted_password)
    }

    /// HMAC function used as part of SCRAM authentication.
    pub fn hmac(&self, key: &[u8], input: &[u8]) -> Result<Vec<u8>, InvalidLength> {
        let bytes = match self {
            ScramVersion::Sha1 => mac::<Hmac<Sha1>>(key, input)?.as_ref().into(),
            ScramVersion::Sha256 => mac::<Hmac<Sha256>>(key, input)?.as_ref().into(),
            ScramVersion::Sha512 => mac::<Hmac<Sha512>>(key, input)?.as_ref().into(),
        };

        Ok(bytes)
    }

    /// The "h" function defined in the SCRAM RFC.
    ///
    /// H(str): Apply the cryptographic hash function to the octet string "str", producing an octet
    /// string as a result. The size of the result depends on the hash result size for the hash
    /// function in use.
    pub fn h(&self, str: &[u8]) -> Vec<u8> {
        match self {
            ScramVersion::Sha1 => hash::<Sha1>(str),
            ScramVersion::Sha256 => hash::<Sha256>(str),
            ScramVersion::Sha512 => hash::<Sha512>(str),
        }
    }

    /// ClientKey := HMAC(SaltedPassword, "Client Key")
    /// StoredKey := H(ClientKey)
    /// ServerKey := HMAC(SaltedPassword, "Server Key")
    pub fn keys_from_salted_password(
        &self,
        salted_password: &[u8],
    ) -> Result<StoredAndServerKey, InvalidLength> {
        let client_key = self.hmac(salted_password, b"Client Key")?;
        let stored_key = self.h(&client_key);
        let server_key = self.hmac(salted_password, b"Server Key")?;
        Ok(StoredAndServerKey {
            stored_key,
            server_key,
        })
    }

    /// Retrieves the keys of a stored credential.
    ///
    /// Returns `Ok(None)` if the credential was not produced for this version.
    pub(crate) fn retrieve_keys(
        &self,
        credential: &Credential,
    ) -> Result<Option<StoredAndServerKey>, InvalidLength> {
        if !self.supports_algorithm(credential.algorithm()) {
            return Ok(None);
        }

        match credential.secret() {
            CredentialSecret::Scram {
                stored_key,
                server_key,
            } => {
                if credential.algorithm() != self.scram_algorithm() {
                    return Ok(None);
                }
                Ok(Some(StoredAndServerKey {
                    stored_key: stored_key.clone(),
                    server_key: server_key.clone(),
                }))
            }
            CredentialSecret::SaltedHash { hash } => {
                if credential.algorithm() != self.pbkdf2_algorithm() {
                    return Ok(None);
                }
                // The first block of a PBKDF2 output is Hi() regardless of the derived key length
                match hash.get(..self.output_len()) {
                    Some(salted_password) => self.keys_from_salted_password(salted_password).map(Some),
                    None => Ok(None),
                }
            }
        }
    }
}

/// AuthMessage := client-first-message-bare + "," +
///                server-first-message + "," +
///                client-final-message-without-proof
pub(crate) fn auth_message(
    client_first_message_bare: &[u8],
    server_first_message: &[u8],
    client_final_message_without_proof: &[u8],
) -> Vec<u8> {
    let total_len = client_first_message_bare.len()
        + 1
        + server_first_message.len()
        + 1
        + client_final_message_without_proof.len();
    let mut buf = Vec::with_capacity(total_len);

    buf.extend_from_slice(client_first_message_bare);
    buf.push(b',');
    buf.extend_from_slice(server_first_message);
    buf.push(b',');
    buf.extend_from_slice(client_final_message_without_proof);
    buf
}

// Hi() is, essentially, PBKDF2 [RFC2898] with HMAC() as the pseudorandom function (PRF) and with
// dkLen == output length of HMAC() == output length of H().
fn h_i<M>(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_size: usize,
) -> Result<Vec<u8>, InvalidLength>
where
    M: KeyInit + hmac::digest::Update + FixedOutput + Sync + Clone,
{
    let mut buf = vec![0u8; output_size];
    pbkdf2::pbkdf2::<M>(password, salt, iterations, buf.as_mut_slice())?;
    Ok(buf)
}

fn mac<M: Mac + KeyInit>(key: &[u8], input: &[u8]) -> Result<impl AsRef<[u8]>, InvalidLength> {
    let mut mac = <M as Mac>::new_from_slice(key)?;
    mac.update(input);
    Ok(mac.finalize().into_bytes())
}

fn hash<D: Digest>(val: &[u8]) -> Vec<u8> {
    let mut hash = D::new();
    hash.update(val);
    hash.finalize().to_vec()
}

/// Returns `None` if the two sides have different length
pub(crate) fn xor(lhs: &[u8], rhs: &[u8]) -> Option<Vec<u8>> {
    if lhs.len() != rhs.len() {
        return None;
    }

    Some(
        lhs.iter()
            .zip(rhs.iter())
            .map(|(l, r)| l.bitxor(r))
            .collect(),
    )
}

pub(crate) fn constant_time_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    bool::from(lhs.ct_eq(rhs))
}
