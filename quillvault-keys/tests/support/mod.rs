#![allow(dead_code)]

use quillvault_crypto::{generate_identity_keypair, wrap_private_key, IdentityKeyPair, KdfParams};
use quillvault_keys::api_client::ApiClient;
use quillvault_keys::config::KeysConfig;
use quillvault_keys::types::KeyBundle;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Builds an authenticated client against a mock server.
pub async fn client(server: &MockServer) -> Arc<ApiClient> {
    let api = ApiClient::new(KeysConfig::test(&server.uri()));
    api.set_tokens("at".into(), "rt".into(), 1).await;
    Arc::new(api)
}

/// Generates a keypair and its publishable bundle wrapped under `password`.
pub fn make_identity(password: &str) -> (IdentityKeyPair, KeyBundle) {
    let keypair = generate_identity_keypair();
    let protected = wrap_private_key(&keypair.secret, password, &KdfParams::default()).unwrap();
    let bundle = KeyBundle::from_parts(&keypair, &protected);
    (keypair, bundle)
}

/// Full key record response, as served to the record's own user.
pub fn full_record_json(bundle: &KeyBundle) -> serde_json::Value {
    serde_json::to_value(bundle).unwrap()
}

/// Public-key-only record response, as served to other users.
pub fn partial_record_json(bundle: &KeyBundle) -> serde_json::Value {
    serde_json::json!({
        "public_key": bundle.public_key,
        "public_key_id": bundle.public_key_id,
    })
}

/// Stateful fake of the server's identity registry: first setup wins,
/// later setups get 409, and the record endpoint serves whatever was
/// registered. Models the optimistic-concurrency serialization point the
/// real control plane provides.
#[derive(Clone, Default)]
pub struct FakeKeyServer {
    bundle: Arc<Mutex<Option<serde_json::Value>>>,
}

struct SetupResponder(FakeKeyServer);

impl Respond for SetupResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut slot = self.0.bundle.lock().unwrap();
        if slot.is_some() {
            ResponseTemplate::new(409)
        } else {
            let body: serde_json::Value =
                serde_json::from_slice(&request.body).expect("setup body is JSON");
            *slot = Some(body);
            ResponseTemplate::new(201)
        }
    }
}

struct RecordResponder(FakeKeyServer);

impl Respond for RecordResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        match &*self.0.bundle.lock().unwrap() {
            Some(bundle) => ResponseTemplate::new(200).set_body_json(bundle.clone()),
            None => ResponseTemplate::new(404),
        }
    }
}

struct CheckResponder(FakeKeyServer);

impl Respond for CheckResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let has = self.0.bundle.lock().unwrap().is_some();
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "has_encryption": has }))
    }
}

impl FakeKeyServer {
    /// Mounts the fake registry for `user_id` on the mock server.
    pub async fn mount(server: &MockServer, user_id: i64) -> Self {
        let fake = FakeKeyServer::default();
        Mock::given(method("POST"))
            .and(path("/encryption/setup"))
            .respond_with(SetupResponder(fake.clone()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/encryption/user/{user_id}")))
            .respond_with(RecordResponder(fake.clone()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/encryption/check"))
            .respond_with(CheckResponder(fake.clone()))
            .mount(server)
            .await;
        fake
    }

    /// Fingerprint of the registered identity, if any.
    pub fn registered_public_key_id(&self) -> Option<String> {
        self.bundle
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|b| b.get("public_key_id"))
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    /// Number of registered identities (0 or 1).
    pub fn registration_count(&self) -> usize {
        usize::from(self.bundle.lock().unwrap().is_some())
    }
}
