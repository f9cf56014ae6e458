//! Sender-side helpers for exercising the pipeline in tests.
//!
//! These construct conforming sealed messages with the same primitives the
//! recipient uses, so round-trip, rotation and tamper scenarios need no
//! external fixtures.

use crate::clock::Clock;
use crate::util;
use crate::version::ProtocolVersion;
use aes::cipher::{KeyIvInit, StreamCipher};
use aes::{Aes128, Aes256};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{EncodePrivateKey, EncodePublicKey};
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;
type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// A signing key plus its base64 SubjectPublicKeyInfo.
pub(crate) struct SigningPair {
    pub(crate) key: SigningKey,
    pub(crate) spki_b64: String,
}

pub(crate) fn signing_pair() -> SigningPair {
    let key = SigningKey::random(&mut OsRng);
    let spki_b64 = spki_b64(key.verifying_key());
    SigningPair { key, spki_b64 }
}

pub(crate) fn spki_b64(key: &VerifyingKey) -> String {
    util::b64_encode(key.to_public_key_der().unwrap().as_bytes())
}

/// A recipient private key (as base64 PKCS#8) plus its public half.
pub(crate) struct RecipientPair {
    pub(crate) pkcs8_b64: String,
    pub(crate) public: PublicKey,
}

pub(crate) fn recipient_pair() -> RecipientPair {
    let secret = SecretKey::random(&mut OsRng);
    RecipientPair {
        pkcs8_b64: util::b64_encode(secret.to_pkcs8_der().unwrap().as_bytes()),
        public: secret.public_key(),
    }
}

/// ECIES-encrypt `plaintext` for `recipient` under `version`'s DEM and
/// wrap it as the encrypted-payload JSON.
pub(crate) fn seal(
    plaintext: &[u8],
    recipient: &PublicKey,
    version: ProtocolVersion,
    context_info: &[u8],
) -> String {
    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let ephemeral_point = ephemeral.public_key().to_encoded_point(false);
    let shared = ephemeral.diffie_hellman(recipient);

    let mut ikm = ephemeral_point.as_bytes().to_vec();
    ikm.extend_from_slice(shared.raw_secret_bytes());
    let mut dem_key = vec![0u8; version.dem_key_len()];
    Hkdf::<Sha256>::new(None, &ikm)
        .expand(context_info, &mut dem_key)
        .unwrap();
    let (aes_key, hmac_key) = dem_key.split_at(version.aes_ctr_key_len());

    let mut encrypted = plaintext.to_vec();
    match aes_key.len() {
        16 => Aes128Ctr::new_from_slices(aes_key, &[0u8; 16])
            .unwrap()
            .apply_keystream(&mut encrypted),
        _ => Aes256Ctr::new_from_slices(aes_key, &[0u8; 16])
            .unwrap()
            .apply_keystream(&mut encrypted),
    }

    let mut mac = HmacSha256::new_from_slice(hmac_key).unwrap();
    mac.update(&encrypted);
    let tag = mac.finalize().into_bytes();

    serde_json::json!({
        "encryptedMessage": util::b64_encode(&encrypted),
        "ephemeralPublicKey": util::b64_encode(ephemeral_point.as_bytes()),
        "tag": util::b64_encode(&tag),
    })
    .to_string()
}

/// Sign the length-value encoding of `chunks`; base64 DER signature.
pub(crate) fn sign(key: &SigningKey, chunks: &[&str]) -> String {
    let signature: Signature = key.sign(&util::to_length_value(chunks));
    util::b64_encode(signature.to_der().as_bytes())
}

/// A complete ECv1 sealed message.
pub(crate) fn seal_v1(
    signing: &SigningKey,
    sender_id: &str,
    recipient_id: &str,
    signed_message: &str,
) -> String {
    let signature = sign(
        signing,
        &[
            sender_id,
            recipient_id,
            ProtocolVersion::EcV1.as_str(),
            signed_message,
        ],
    );
    serde_json::json!({
        "protocolVersion": "ECv1",
        "signature": signature,
        "signedMessage": signed_message,
    })
    .to_string()
}

/// The `signedKey` JSON an ECv2 sender publishes for its intermediate key.
pub(crate) fn signed_key_json(intermediate_spki_b64: &str, key_expiration_millis: i64) -> String {
    serde_json::json!({
        "keyValue": intermediate_spki_b64,
        "keyExpiration": key_expiration_millis.to_string(),
    })
    .to_string()
}

/// A complete ECv2 sealed message: `root` signs the intermediate key,
/// `intermediate` signs the message.
pub(crate) fn seal_v2(
    root: &SigningKey,
    intermediate: &SigningKey,
    signed_key: &str,
    sender_id: &str,
    recipient_id: &str,
    signed_message: &str,
) -> String {
    let key_signature = sign(root, &[sender_id, ProtocolVersion::EcV2.as_str(), signed_key]);
    let signature = sign(
        intermediate,
        &[
            sender_id,
            recipient_id,
            ProtocolVersion::EcV2.as_str(),
            signed_message,
        ],
    );
    serde_json::json!({
        "protocolVersion": "ECv2",
        "signature": signature,
        "signedMessage": signed_message,
        "intermediateSigningKey": {
            "signedKey": signed_key,
            "signatures": [key_signature],
        },
    })
    .to_string()
}

/// Flip one bit of a base64 field inside a JSON object.
pub(crate) fn tamper_b64_field(json: &str, field: &str) -> String {
    let mut value: serde_json::Value = serde_json::from_str(json).unwrap();
    let encoded = value[field].as_str().unwrap();
    let mut bytes = util::b64_decode(encoded).unwrap();
    bytes[0] ^= 0x01;
    value[field] = serde_json::Value::String(util::b64_encode(&bytes));
    value.to_string()
}

/// A clock pinned to a fixed instant.
pub(crate) struct FixedClock(pub(crate) i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}
