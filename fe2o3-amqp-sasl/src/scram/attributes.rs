/// gs2-cbind-flag "n": the client doesn't support channel binding
pub const GS2_CBIND_FLAG: &str = "n";

/// a: This is an optional attribute, and is part of the GS2 [RFC5801] bridge between the GSS-API
/// and SASL.
pub const AUTHZID_KEY: &str = "a=";

/// n: This attribute specifies the name of the user whose password is used for authentication
pub const USERNAME_KEY: &str = "n=";

/// r: This attribute specifies a sequence of random printable ASCII characters excluding ',' (which
/// forms the nonce used as input to the hash function).
pub const NONCE_KEY: &str = "r=";

/// c: This REQUIRED attribute specifies the base64-encoded GS2 header and channel binding data.
pub const CHANNEL_BINDING_KEY: &str = "c=";

/// s: This attribute specifies the base64-encoded salt used by the server for the user
pub const SALT_KEY: &str = "s=";

/// i: This attribute specifies an iteration count for the selected hash function and user, and MUST
/// be sent by the server along with the user's salt.
pub const ITERATION_COUNT_KEY: &str = "i=";

/// p: This attribute specifies a base64-encoded ClientProof
pub const PROOF_KEY: &str = "p=";

/// v: This attribute specifies a base64-encoded ServerSignature.
pub const VERIFIER_KEY: &str = "v=";

/// Escaped form of ',' in a saslname
pub const ESCAPED_COMMA: &str = "=2C";

/// Escaped form of '=' in a saslname
pub const ESCAPED_EQUALS: &str = "=3D";
