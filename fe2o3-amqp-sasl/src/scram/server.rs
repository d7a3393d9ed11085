use std::mem;

use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::{
    attributes::{
        AUTHZID_KEY, CHANNEL_BINDING_KEY, ESCAPED_COMMA, ESCAPED_EQUALS, GS2_CBIND_FLAG,
        ITERATION_COUNT_KEY, NONCE_KEY, PROOF_KEY, SALT_KEY, USERNAME_KEY, VERIFIER_KEY,
    },
    auth_message, constant_time_eq, xor, ScramVersion,
};
use crate::{
    error::MechanismError,
    identity::AuthenticatedIdentity,
    mechanism::{MechanismContext, MechanismInstance},
    store::{with_transaction, StoredUser},
};

#[derive(Debug)]
struct ServerFirst {
    gs2_header: String,
    client_first_message_bare: Bytes,
    client_server_nonce: String,
    server_first_message: Bytes,
    user: Option<StoredUser>,
}

#[derive(Debug)]
enum ScramAuthenticatorState {
    Initial,
    ServerFirstSent(ServerFirst),
    Complete {
        identity: Option<AuthenticatedIdentity>,
    },
}

/// Server side of a SCRAM exchange
#[derive(Debug)]
pub struct ScramAuthenticator {
    scram: ScramVersion,
    context: MechanismContext,
    state: ScramAuthenticatorState,
}

impl ScramAuthenticator {
    pub(crate) fn new(scram: ScramVersion, context: MechanismContext) -> Self {
        Self {
            scram,
            context,
            state: ScramAuthenticatorState::Initial,
        }
    }

    /// Handles the client first message. `server_nonce` is appended to the client nonce.
    pub(crate) fn compute_server_first_message(
        &mut self,
        client_first: &[u8],
        server_nonce: &str,
    ) -> Result<Bytes, MechanismError> {
        let client_first = std::str::from_utf8(client_first)?;
        let parts: Vec<&str> = client_first.split(',').collect();
        if parts.len() < 4 {
            return Err(MechanismError::CannotParseClientFirstMessage);
        }
        if parts[0] != GS2_CBIND_FLAG {
            return Err(MechanismError::CannotParseGs2Header);
        }
        if !parts[1].is_empty() && !parts[1].starts_with(AUTHZID_KEY) {
            return Err(MechanismError::CannotParseGs2Header);
        }

        let gs2_header = format!("{},{},", GS2_CBIND_FLAG, parts[1]);
        let client_first_message_bare = &client_first[gs2_header.len()..];

        let username = parts[2]
            .strip_prefix(USERNAME_KEY)
            .ok_or(MechanismError::CannotParseClientFirstMessage)
            .and_then(decode_username)?;
        let client_nonce = parts[3]
            .strip_prefix(NONCE_KEY)
            .ok_or(MechanismError::CannotParseClientFirstMessage)?;

        let realm = &self.context.realm;
        let user = with_transaction(self.context.store.as_ref(), |txn| {
            txn.find_user(realm, &username)
        })?;

        let (salt, iterations) = match user.as_ref().and_then(|user| user.credential.as_ref()) {
            Some(credential) => (credential.salt().to_vec(), credential.iterations()),
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(realm = %realm, "No SCRAM credential for user, using pseudo salt");
                #[cfg(feature = "log")]
                log::debug!("No SCRAM credential for user in realm {}, using pseudo salt", realm);

                let salt = self.context.secret.pseudo_salt(
                    self.scram,
                    &username,
                    self.context.pseudo_salt_len,
                )?;
                (salt, self.context.unknown_user_iterations)
            }
        };

        let base64_salt = base64::engine::general_purpose::STANDARD.encode(salt);
        let iterations = iterations.to_string();
        let client_server_nonce = format!("{}{}", client_nonce, server_nonce);

        let mut buf = BytesMut::new();

        // nonce
        buf.put_slice(NONCE_KEY.as_bytes());
        buf.put_slice(client_server_nonce.as_bytes());
        buf.put_u8(b',');

        // salt
        buf.put_slice(SALT_KEY.as_bytes());
        buf.put_slice(base64_salt.as_bytes());
        buf.put_u8(b',');

        // iterations
        buf.put_slice(ITERATION_COUNT_KEY.as_bytes());
        buf.put_slice(iterations.as_bytes());

        let server_first_message = buf.freeze();
        self.state = ScramAuthenticatorState::ServerFirstSent(ServerFirst {
            gs2_header,
            client_first_message_bare: Bytes::copy_from_slice(
                client_first_message_bare.as_bytes(),
            ),
            client_server_nonce,
            server_first_message: server_first_message.clone(),
            user,
        });

        Ok(server_first_message)
    }

    /// Verifies the client final message. `Ok(None)` means the client is not authenticated.
    fn compute_server_final_message(
        &mut self,
        server_first: ServerFirst,
        client_final: &[u8],
    ) -> Result<Option<Bytes>, MechanismError> {
        let client_final = std::str::from_utf8(client_final)?;
        let parts: Vec<&str> = client_final.split(',').collect();

        let channel_binding = parts
            .first()
            .and_then(|s| s.strip_prefix(CHANNEL_BINDING_KEY))
            .ok_or(MechanismError::CannotParseClientFinalMessage)?;
        let channel_binding = decode_base64(channel_binding)?;
        if channel_binding != server_first.gs2_header.as_bytes() {
            self.authentication_failed("channel binding mismatch");
            return Ok(None);
        }

        let nonce = parts
            .get(1)
            .and_then(|s| s.strip_prefix(NONCE_KEY))
            .ok_or(MechanismError::CannotParseClientFinalMessage)?;
        if nonce != server_first.client_server_nonce {
            self.authentication_failed("nonce mismatch");
            return Ok(None);
        }

        let proof_part = parts.last().copied().unwrap_or_default();
        let client_proof = proof_part
            .strip_prefix(PROOF_KEY)
            .ok_or(MechanismError::ProofNotFoundInClientFinal)?;
        let client_proof = decode_base64(client_proof)?;

        let without_proof_message_len = client_final.len() - (proof_part.len() + 1);
        let client_final_message_without_proof = &client_final[..without_proof_message_len];

        let auth_message = auth_message(
            &server_first.client_first_message_bare,
            &server_first.server_first_message,
            client_final_message_without_proof.as_bytes(),
        );

        let credential = server_first
            .user
            .as_ref()
            .and_then(|user| user.credential.as_ref());
        let keys = match credential {
            Some(credential) => {
                let keys = self.scram.retrieve_keys(credential)?;
                if keys.is_none() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        algorithm = credential.algorithm(),
                        mechanism = self.scram.mechanism(),
                        "Stored credential cannot be used with this mechanism"
                    );
                    #[cfg(feature = "log")]
                    log::warn!(
                        "Stored credential with algorithm {} cannot be used with {}",
                        credential.algorithm(),
                        self.scram.mechanism()
                    );
                }
                keys
            }
            None => None,
        };
        let found = keys.is_some();
        let keys = match keys {
            Some(keys) => keys,
            None => self.context.secret.unknown_user_keys(self.scram)?,
        };

        // ClientProof := ClientKey XOR ClientSignature
        // ClientSignature := HMAC(StoredKey, AuthMessage)
        let client_signature = self.scram.hmac(&keys.stored_key, &auth_message)?;
        let client_key = match xor(&client_proof, &client_signature) {
            Some(client_key) => client_key,
            None => {
                self.authentication_failed("proof length mismatch");
                return Ok(None);
            }
        };

        // StoredKey := H(ClientKey)
        let stored_key_from_client = self.scram.h(&client_key);
        let proof_matches = constant_time_eq(&stored_key_from_client, &keys.stored_key);
        let user = match server_first.user {
            Some(user) if found && proof_matches => user,
            _ => {
                self.authentication_failed("invalid proof");
                return Ok(None);
            }
        };

        let server_signature = self.scram.hmac(&keys.server_key, &auth_message)?;
        let server_signature = base64::engine::general_purpose::STANDARD.encode(server_signature);

        let mut server_final = BytesMut::new();
        server_final.put_slice(VERIFIER_KEY.as_bytes());
        server_final.put_slice(server_signature.as_bytes());

        #[cfg(feature = "tracing")]
        tracing::debug!(realm = %self.context.realm, mechanism = self.scram.mechanism(), "Authenticated");
        #[cfg(feature = "log")]
        log::debug!(
            "Authenticated with {} in realm {}",
            self.scram.mechanism(),
            self.context.realm
        );

        self.state = ScramAuthenticatorState::Complete {
            identity: Some(user.identity),
        };
        Ok(Some(server_final.freeze()))
    }

    fn authentication_failed(&self, _reason: &str) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            realm = %self.context.realm,
            mechanism = self.scram.mechanism(),
            reason = _reason,
            "Authentication failed"
        );
        #[cfg(feature = "log")]
        log::debug!(
            "Authentication failed with {} in realm {}: {}",
            self.scram.mechanism(),
            self.context.realm,
            _reason
        );
    }
}

impl MechanismInstance for ScramAuthenticator {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn process_response(&mut self, response: &[u8]) -> Result<Option<Bytes>, MechanismError> {
        let state = mem::replace(
            &mut self.state,
            ScramAuthenticatorState::Complete { identity: None },
        );
        match state {
            ScramAuthenticatorState::Initial => {
                let server_nonce = Uuid::new_v4().to_string();
                self.compute_server_first_message(response, &server_nonce)
                    .map(Some)
            }
            ScramAuthenticatorState::ServerFirstSent(server_first) => {
                self.compute_server_final_message(server_first, response)
            }
            ScramAuthenticatorState::Complete { identity } => {
                self.state = ScramAuthenticatorState::Complete { identity };
                if response.is_empty() {
                    Ok(None)
                } else {
                    Err(MechanismError::IllegalState("complete"))
                }
            }
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self.state, ScramAuthenticatorState::Complete { .. })
    }

    fn is_authenticated(&self) -> bool {
        matches!(
            self.state,
            ScramAuthenticatorState::Complete {
                identity: Some(_)
            }
        )
    }

    fn authenticated_identity(&self) -> Option<&AuthenticatedIdentity> {
        match &self.state {
            ScramAuthenticatorState::Complete { identity } => identity.as_ref(),
            _ => None,
        }
    }
}

/// saslname with `=2C` and `=3D` replaced by `,` and `=`
fn decode_username(value: &str) -> Result<String, MechanismError> {
    let mut decoded = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('=') {
        decoded.push_str(&rest[..pos]);
        let escaped = &rest[pos..];
        if escaped.starts_with(ESCAPED_COMMA) {
            decoded.push(',');
        } else if escaped.starts_with(ESCAPED_EQUALS) {
            decoded.push('=');
        } else {
            return Err(MechanismError::InvalidUsername);
        }
        rest = &escaped[ESCAPED_COMMA.len()..];
    }
    decoded.push_str(rest);
    Ok(decoded)
}

fn decode_base64(value: &str) -> Result<Vec<u8>, MechanismError> {
    let value: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = base64::engine::general_purpose::STANDARD.decode(value)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::Engine;

    use super::{decode_username, ScramAuthenticator};
    use crate::{
        error::MechanismError,
        identity::AuthenticatedIdentity,
        mechanism::{MechanismContext, MechanismInstance},
        scram::{ScramVersion, ServerSecret},
        session::ChannelSecurity,
        store::{Credential, InMemoryCredentialStore},
    };

    const REALM: &str = "test";

    mod scram_sha1 {
        use super::super::super::ScramVersion;

        pub(super) static ITERATIONS: u32 = 4096;
        pub(super) static TEST_USERNAME: &str = "user";
        pub(super) static TEST_PASSWORD: &str = "pencil";
        pub(super) static SALT: &str = "QSXCR+Q6sek8bf92";
        pub(super) static SERVER_NONCE: &str = "3rfcNHYJY1ZVvWVs7j";
        pub(super) static CLIENT_FIRST_MESSAGE: &str = "n,,n=user,r=fyko+d2lbbFgONRv9qkxdawL";
        pub(super) static SERVER_FIRST_MESSAGE: &str =
            "r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096";
        pub(super) static CLIENT_FINAL_MESSAGE: &str =
            "c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts=";
        pub(super) static SERVER_FINAL_MESSAGE: &str = "v=rmF9pqV8S7suAoZWja4dJRkFsKQ=";
        pub(super) static VERSION: ScramVersion = ScramVersion::Sha1;
    }

    mod scram_sha256 {
        use super::super::super::ScramVersion;

        pub(super) static ITERATIONS: u32 = 4096;
        pub(super) static TEST_USERNAME: &str = "user";
        pub(super) static TEST_PASSWORD: &str = "pencil";
        pub(super) static SALT: &str = "W22ZaJ0SNY7soEsUEjb6gQ==";
        pub(super) static SERVER_NONCE: &str = "%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0";
        pub(super) static CLIENT_FIRST_MESSAGE: &str = "n,,n=user,r=rOprNGfwEbeRWgbNEkqO";
        pub(super) static SERVER_FIRST_MESSAGE: &str =
            "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
        pub(super) static CLIENT_FINAL_MESSAGE: &str = "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";
        pub(super) static SERVER_FINAL_MESSAGE: &str =
            "v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";
        pub(super) static VERSION: ScramVersion = ScramVersion::Sha256;
    }

    mod scram_sha512 {
        use super::super::super::ScramVersion;

        pub(super) static ITERATIONS: u32 = 4096;
        pub(super) static TEST_USERNAME: &str = "user";
        pub(super) static TEST_PASSWORD: &str = "pencil";
        pub(super) static SALT: &str = "Yin2FuHTt/M0kJWb0t9OI32n2VmOGi3m+JfjOvuDF88=";
        pub(super) static SERVER_NONCE: &str = "02431b08-2f89-4bad-a4e6-80c0564ec865";
        pub(super) static CLIENT_FIRST_MESSAGE: &str = "n,,n=user,r=rOprNGfwEbeRWgbNEkqO";
        pub(super) static SERVER_FIRST_MESSAGE: &str = "r=rOprNGfwEbeRWgbNEkqO02431b08-2f89-4bad-a4e6-80c0564ec865,s=Yin2FuHTt/M0kJWb0t9OI32n2VmOGi3m+JfjOvuDF88=,i=4096";
        pub(super) static CLIENT_FINAL_MESSAGE: &str = "c=biws,r=rOprNGfwEbeRWgbNEkqO02431b08-2f89-4bad-a4e6-80c0564ec865,p=Hc5yec3NmCD7t+kFRw4/3yD6/F3SQHc7AVYschRja+Bc3sbdjlA0eH1OjJc0DD4ghn1tnXN5/Wr6qm9xmaHt4A==";
        pub(super) static SERVER_FINAL_MESSAGE: &str = "v=BQuhnKHqYDwQWS5jAw4sZed+C9KFUALsbrq81bB0mh+bcUUbbMPNNmBIupnS2AmyyDnG5CTBQtkjJ9kyY4kzmw==";
        pub(super) static VERSION: ScramVersion = ScramVersion::Sha512;
    }

    fn authenticator(
        version: ScramVersion,
        username: &str,
        password: &str,
        salt: &str,
        iterations: u32,
    ) -> ScramAuthenticator {
        let salt = base64::engine::general_purpose::STANDARD
            .decode(salt)
            .unwrap();
        let credential = Credential::new_scram(version, password, salt, iterations).unwrap();
        let store = InMemoryCredentialStore::new();
        store.insert_user(
            REALM,
            AuthenticatedIdentity::new("id-1", username, ["readers"]),
            Some(credential),
        );
        let context = MechanismContext {
            store: Arc::new(store),
            realm: String::from(REALM),
            channel: ChannelSecurity::Plaintext,
            secret: Arc::new(ServerSecret::random()),
            unknown_user_iterations: 20000,
            pseudo_salt_len: 16,
        };
        ScramAuthenticator::new(version, context)
    }

    fn run_vector(
        version: ScramVersion,
        username: &str,
        password: &str,
        salt: &str,
        iterations: u32,
        server_nonce: &str,
        client_first: &str,
        server_first: &str,
        client_final: &str,
        server_final: &str,
    ) {
        let mut authenticator = authenticator(version, username, password, salt, iterations);

        let message = authenticator
            .compute_server_first_message(client_first.as_bytes(), server_nonce)
            .unwrap();
        assert_eq!(message, server_first.as_bytes());
        assert!(!authenticator.is_complete());

        let message = authenticator
            .process_response(client_final.as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(message, server_final.as_bytes());
        assert!(authenticator.is_complete());
        assert!(authenticator.is_authenticated());
        assert_eq!(
            authenticator.authenticated_identity().unwrap().username(),
            username
        );

        assert!(authenticator.process_response(b"").unwrap().is_none());
        assert!(matches!(
            authenticator.process_response(client_final.as_bytes()),
            Err(MechanismError::IllegalState(_))
        ));
    }

    #[test]
    fn test_sasl_scram_sha1_server() {
        use scram_sha1::*;

        run_vector(
            VERSION,
            TEST_USERNAME,
            TEST_PASSWORD,
            SALT,
            ITERATIONS,
            SERVER_NONCE,
            CLIENT_FIRST_MESSAGE,
            SERVER_FIRST_MESSAGE,
            CLIENT_FINAL_MESSAGE,
            SERVER_FINAL_MESSAGE,
        );
    }

    #[test]
    fn test_sasl_scram_sha256_server() {
        use scram_sha256::*;

        run_vector(
            VERSION,
            TEST_USERNAME,
            TEST_PASSWORD,
            SALT,
            ITERATIONS,
            SERVER_NONCE,
            CLIENT_FIRST_MESSAGE,
            SERVER_FIRST_MESSAGE,
            CLIENT_FINAL_MESSAGE,
            SERVER_FINAL_MESSAGE,
        );
    }

    #[test]
    fn test_sasl_scram_sha512_server() {
        use scram_sha512::*;

        run_vector(
            VERSION,
            TEST_USERNAME,
            TEST_PASSWORD,
            SALT,
            ITERATIONS,
            SERVER_NONCE,
            CLIENT_FIRST_MESSAGE,
            SERVER_FIRST_MESSAGE,
            CLIENT_FINAL_MESSAGE,
            SERVER_FINAL_MESSAGE,
        );
    }

    #[test]
    fn test_wrong_password_fails_without_error() {
        use scram_sha1::*;

        let mut authenticator =
            authenticator(VERSION, TEST_USERNAME, "not pencil", SALT, ITERATIONS);
        authenticator
            .compute_server_first_message(CLIENT_FIRST_MESSAGE.as_bytes(), SERVER_NONCE)
            .unwrap();
        let message = authenticator
            .process_response(CLIENT_FINAL_MESSAGE.as_bytes())
            .unwrap();
        assert!(message.is_none());
        assert!(authenticator.is_complete());
        assert!(!authenticator.is_authenticated());
        assert!(authenticator.authenticated_identity().is_none());
    }

    #[test]
    fn test_replayed_final_with_other_nonce_fails() {
        use scram_sha1::*;

        let mut authenticator =
            authenticator(VERSION, TEST_USERNAME, TEST_PASSWORD, SALT, ITERATIONS);
        authenticator
            .compute_server_first_message(CLIENT_FIRST_MESSAGE.as_bytes(), "another-nonce")
            .unwrap();
        let message = authenticator
            .process_response(CLIENT_FINAL_MESSAGE.as_bytes())
            .unwrap();
        assert!(message.is_none());
        assert!(!authenticator.is_authenticated());
    }

    #[test]
    fn test_tampered_channel_binding_fails() {
        use scram_sha1::*;

        let mut authenticator =
            authenticator(VERSION, TEST_USERNAME, TEST_PASSWORD, SALT, ITERATIONS);
        authenticator
            .compute_server_first_message(CLIENT_FIRST_MESSAGE.as_bytes(), SERVER_NONCE)
            .unwrap();
        // base64("y,,")
        let tampered = CLIENT_FINAL_MESSAGE.replacen("c=biws", "c=eSws", 1);
        let message = authenticator.process_response(tampered.as_bytes()).unwrap();
        assert!(message.is_none());
        assert!(!authenticator.is_authenticated());
    }

    #[test]
    fn test_client_first_framing_errors() {
        use scram_sha1::*;

        let cases: [(&str, fn(&MechanismError) -> bool); 5] = [
            ("n,,n=user", |e| {
                matches!(e, MechanismError::CannotParseClientFirstMessage)
            }),
            ("y,,n=user,r=abc", |e| {
                matches!(e, MechanismError::CannotParseGs2Header)
            }),
            ("n,x=foo,n=user,r=abc", |e| {
                matches!(e, MechanismError::CannotParseGs2Header)
            }),
            ("n,,u=user,r=abc", |e| {
                matches!(e, MechanismError::CannotParseClientFirstMessage)
            }),
            ("n,,n=us=3Eer,r=abc", |e| {
                matches!(e, MechanismError::InvalidUsername)
            }),
        ];

        for (client_first, is_expected) in cases {
            let mut authenticator =
                authenticator(VERSION, TEST_USERNAME, TEST_PASSWORD, SALT, ITERATIONS);
            let err = authenticator
                .process_response(client_first.as_bytes())
                .unwrap_err();
            assert!(is_expected(&err), "{}: {:?}", client_first, err);
            assert!(authenticator.is_complete());
            assert!(!authenticator.is_authenticated());
        }
    }

    #[test]
    fn test_client_final_without_proof() {
        use scram_sha1::*;

        let mut authenticator =
            authenticator(VERSION, TEST_USERNAME, TEST_PASSWORD, SALT, ITERATIONS);
        authenticator
            .compute_server_first_message(CLIENT_FIRST_MESSAGE.as_bytes(), SERVER_NONCE)
            .unwrap();
        let result = authenticator
            .process_response(b"c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j");
        assert!(matches!(
            result,
            Err(MechanismError::ProofNotFoundInClientFinal)
        ));
    }

    #[test]
    fn test_authzid_is_part_of_gs2_header() {
        use scram_sha1::*;

        let mut authenticator =
            authenticator(VERSION, TEST_USERNAME, TEST_PASSWORD, SALT, ITERATIONS);
        let message = authenticator
            .compute_server_first_message(b"n,a=admin,n=user,r=fyko+d2lbbFgONRv9qkxdawL", "xyz")
            .unwrap();
        assert!(message.starts_with(b"r=fyko+d2lbbFgONRv9qkxdawLxyz,"));

        // "c=biws" encodes "n,,", not "n,a=admin,"
        let message = authenticator
            .process_response(b"c=biws,r=fyko+d2lbbFgONRv9qkxdawLxyz,p=AAAA")
            .unwrap();
        assert!(message.is_none());
        assert!(!authenticator.is_authenticated());
    }

    #[test]
    fn test_decode_username() {
        assert_eq!(decode_username("user").unwrap(), "user");
        assert_eq!(decode_username("a=2Cb=3Dc").unwrap(), "a,b=c");
        assert_eq!(decode_username("=3D=3D").unwrap(), "==");
        assert!(decode_username("a=").is_err());
        assert!(decode_username("a=2c").is_err());
    }
}
