//! Mechanism names, credential algorithm ids and defaults

/// SASL PLAIN
pub const PLAIN: &str = "PLAIN";

/// SASL EXTERNAL
pub const EXTERNAL: &str = "EXTERNAL";

/// SASL SCRAM-SHA-1
pub const SCRAM_SHA_1: &str = "SCRAM-SHA-1";

/// SASL SCRAM-SHA-256
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// SASL SCRAM-SHA-512
pub const SCRAM_SHA_512: &str = "SCRAM-SHA-512";

/// Credential algorithm id of a native SCRAM-SHA-1 credential
pub const SCRAM_SHA_1_ALGORITHM: &str = "scram-sha-1";

/// Credential algorithm id of a native SCRAM-SHA-256 credential
pub const SCRAM_SHA_256_ALGORITHM: &str = "scram-sha-256";

/// Credential algorithm id of a native SCRAM-SHA-512 credential
pub const SCRAM_SHA_512_ALGORITHM: &str = "scram-sha-512";

/// Credential algorithm id of a PBKDF2-HMAC-SHA1 password hash
pub const PBKDF2_ALGORITHM: &str = "pbkdf2";

/// Credential algorithm id of a PBKDF2-HMAC-SHA256 password hash
pub const PBKDF2_SHA256_ALGORITHM: &str = "pbkdf2-sha256";

/// Credential algorithm id of a PBKDF2-HMAC-SHA512 password hash
pub const PBKDF2_SHA512_ALGORITHM: &str = "pbkdf2-sha512";

/// Iteration count used when deriving new credentials from a cleartext password
pub const DEFAULT_SCRAM_ITERATIONS: u32 = 20000;

/// Length of the salt used when deriving new credentials from a cleartext password
pub const DEFAULT_SALT_LEN: usize = 16;

/// Iteration count advertised for users that do not exist.
///
/// Must stay equal to [`DEFAULT_SCRAM_ITERATIONS`] so that unknown users are indistinguishable
/// from users created with the default settings.
pub const DEFAULT_UNKNOWN_USER_ITERATIONS: u32 = DEFAULT_SCRAM_ITERATIONS;

/// Length of the salt advertised for users that do not exist
pub const DEFAULT_PSEUDO_SALT_LEN: usize = DEFAULT_SALT_LEN;
