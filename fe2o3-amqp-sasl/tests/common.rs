#![allow(dead_code)]

use std::sync::Arc;

use base64::Engine;
use fe2o3_amqp_sasl::{
    AuthenticatedIdentity, Credential, InMemoryCredentialStore, Negotiator, ScramVersion,
    ServerSecret,
};

pub const REALM: &str = "myspace";
pub const ITERATIONS: u32 = 4096;

/// A minimal SCRAM client driving the server under test
#[derive(Debug)]
pub struct ScramClient {
    version: ScramVersion,
    username: String,
    password: String,
    gs2_header: String,
    client_nonce: String,
    client_first_message_bare: String,
}

impl ScramClient {
    pub fn new(version: ScramVersion, username: &str, password: &str) -> Self {
        Self {
            version,
            username: username.to_string(),
            password: password.to_string(),
            gs2_header: String::from("n,,"),
            client_nonce: uuid::Uuid::new_v4().simple().to_string(),
            client_first_message_bare: String::new(),
        }
    }

    pub fn with_gs2_header(mut self, gs2_header: &str) -> Self {
        self.gs2_header = gs2_header.to_string();
        self
    }

    pub fn client_first(&mut self) -> Vec<u8> {
        let username = self.username.replace('=', "=3D").replace(',', "=2C");
        self.client_first_message_bare = format!("n={},r={}", username, self.client_nonce);
        format!("{}{}", self.gs2_header, self.client_first_message_bare).into_bytes()
    }

    /// Returns the client final message and the server final message the client expects
    pub fn client_final(&self, server_first: &[u8]) -> (Vec<u8>, Vec<u8>) {
        self.client_final_with_binding(server_first, "n,,")
    }

    pub fn client_final_with_binding(
        &self,
        server_first: &[u8],
        gs2_header: &str,
    ) -> (Vec<u8>, Vec<u8>) {
        let engine = base64::engine::general_purpose::STANDARD;
        let server_first = std::str::from_utf8(server_first).unwrap();
        let fields = parse_server_first(server_first);
        assert!(fields.nonce.starts_with(&self.client_nonce));

        let salt = engine.decode(&fields.salt).unwrap();
        let salted_password = self
            .version
            .compute_salted_password(&self.password, &salt, fields.iterations)
            .unwrap();
        let keys = self
            .version
            .keys_from_salted_password(&salted_password)
            .unwrap();
        let client_key = self
            .version
            .hmac(&salted_password, b"Client Key")
            .unwrap();

        let without_proof = format!("c={},r={}", engine.encode(gs2_header), fields.nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_message_bare, server_first, without_proof
        );
        let client_signature = self
            .version
            .hmac(&keys.stored_key, auth_message.as_bytes())
            .unwrap();
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();
        let server_signature = self
            .version
            .hmac(&keys.server_key, auth_message.as_bytes())
            .unwrap();

        let client_final = format!("{},p={}", without_proof, engine.encode(proof));
        let server_final = format!("v={}", engine.encode(server_signature));
        (client_final.into_bytes(), server_final.into_bytes())
    }
}

#[derive(Debug)]
pub struct ServerFirstFields {
    pub nonce: String,
    pub salt: String,
    pub iterations: u32,
}

pub fn parse_server_first(server_first: &str) -> ServerFirstFields {
    let parts: Vec<&str> = server_first.split(',').collect();
    assert_eq!(parts.len(), 3, "{}", server_first);
    ServerFirstFields {
        nonce: parts[0].strip_prefix("r=").unwrap().to_string(),
        salt: parts[1].strip_prefix("s=").unwrap().to_string(),
        iterations: parts[2].strip_prefix("i=").unwrap().parse().unwrap(),
    }
}

pub fn identity(username: &str) -> AuthenticatedIdentity {
    AuthenticatedIdentity::new(
        format!("id-{}", username),
        username,
        [format!("send_{}", username), String::from("recv_all")],
    )
}

fn salt(username: &str) -> Vec<u8> {
    let mut salt = format!("salt-of-{}", username).into_bytes();
    salt.resize(16, b'#');
    salt
}

/// Realm `myspace` with
///
/// - `alice`: native SCRAM-SHA-256 credential, password `wonderland`
/// - `bob`: PBKDF2-SHA512 hash, password `builder`
/// - `carol`: native SCRAM-SHA-1 credential, password `singer`
/// - `dave`: no credential
pub fn populated_store() -> InMemoryCredentialStore {
    let store = InMemoryCredentialStore::new();
    store.set_password_hash_algorithm(REALM, "scram-sha-256");
    store.set_password_hash_algorithm("legacy", "pbkdf2-sha512");
    store.set_password_hash_algorithm("old", "scram-sha-1");

    let alice = Credential::new_scram(ScramVersion::Sha256, "wonderland", salt("alice"), ITERATIONS)
        .unwrap();
    store.insert_user(REALM, identity("alice"), Some(alice));

    let bob =
        Credential::new_salted_hash(ScramVersion::Sha512, "builder", salt("bob"), ITERATIONS)
            .unwrap();
    store.insert_user(REALM, identity("bob"), Some(bob));

    let carol =
        Credential::new_scram(ScramVersion::Sha1, "singer", salt("carol"), ITERATIONS).unwrap();
    store.insert_user(REALM, identity("carol"), Some(carol));

    store.insert_user(REALM, identity("dave"), None);
    store
}

pub fn negotiator() -> Arc<Negotiator> {
    negotiator_with_store(populated_store())
}

pub fn negotiator_with_store<S>(store: S) -> Arc<Negotiator>
where
    S: fe2o3_amqp_sasl::CredentialStore + 'static,
{
    let negotiator = Negotiator::builder()
        .default_domain(REALM)
        .unknown_user_iterations(ITERATIONS)
        .server_secret(Arc::new(ServerSecret::random()))
        .credential_store(store)
        .build();
    Arc::new(negotiator)
}
