//! Wire structures of a sealed token.
//!
//! Parsing is strict: duplicate fields are rejected everywhere, and the
//! outer envelope, the intermediate signing key and the encrypted payload
//! reject unknown fields, so the protocol's exact key-set rules fall out
//! of deserialization. `signedKey` is the one forward-compatible
//! structure; senders may extend it with fields this crate ignores.
//!
//! Binary fields (signatures, the ephemeral key, the ciphertext, the MAC
//! tag) are base64 on the wire and decoded during deserialization.

use crate::util;
use serde::de::{Error as DError, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

fn b64_value<'de, A>(map: &mut A, field: &'static str) -> Result<Vec<u8>, A::Error>
where
    A: MapAccess<'de>,
{
    let value: String = map.next_value()?;
    util::b64_decode(&value).map_err(|_| DError::custom(format!("invalid base64 in {field}")))
}

/// A parsed sealed message, prior to any verification.
#[derive(Clone, Debug)]
pub(crate) struct SealedMessage {
    /// The version the sender claims; compared against the configured one.
    pub(crate) protocol_version: String,
    /// DER-encoded ECDSA signature over the outer signed bytes.
    pub(crate) signature: Vec<u8>,
    /// The signed (and still encrypted) payload, kept opaque until the
    /// signature has been checked.
    pub(crate) signed_message: String,
    /// Present exactly when the message is ECv2.
    pub(crate) intermediate_signing_key: Option<IntermediateSigningKey>,
}

impl<'de> Deserialize<'de> for SealedMessage {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SealedMessageVisitor;

        impl<'de> Visitor<'de> for SealedMessageVisitor {
            type Value = SealedMessage;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a sealed payment token object")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut protocol_version: Option<String> = None;
                let mut signature: Option<Vec<u8>> = None;
                let mut signed_message: Option<String> = None;
                let mut intermediate_signing_key: Option<IntermediateSigningKey> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "protocolVersion" => {
                            if protocol_version.is_some() {
                                return Err(DError::duplicate_field("protocolVersion"));
                            }
                            protocol_version = Some(map.next_value()?);
                        }
                        "signature" => {
                            if signature.is_some() {
                                return Err(DError::duplicate_field("signature"));
                            }
                            signature = Some(b64_value(&mut map, "signature")?);
                        }
                        "signedMessage" => {
                            if signed_message.is_some() {
                                return Err(DError::duplicate_field("signedMessage"));
                            }
                            signed_message = Some(map.next_value()?);
                        }
                        "intermediateSigningKey" => {
                            if intermediate_signing_key.is_some() {
                                return Err(DError::duplicate_field("intermediateSigningKey"));
                            }
                            intermediate_signing_key = Some(map.next_value()?);
                        }
                        _ => {
                            return Err(DError::unknown_field(
                                &key,
                                &[
                                    "protocolVersion",
                                    "signature",
                                    "signedMessage",
                                    "intermediateSigningKey",
                                ],
                            ));
                        }
                    }
                }

                Ok(SealedMessage {
                    protocol_version: protocol_version
                        .ok_or_else(|| DError::missing_field("protocolVersion"))?,
                    signature: signature.ok_or_else(|| DError::missing_field("signature"))?,
                    signed_message: signed_message
                        .ok_or_else(|| DError::missing_field("signedMessage"))?,
                    intermediate_signing_key,
                })
            }
        }

        d.deserialize_struct(
            "SealedMessage",
            &[
                "protocolVersion",
                "signature",
                "signedMessage",
                "intermediateSigningKey",
            ],
            SealedMessageVisitor,
        )
    }
}

/// The `intermediateSigningKey` block of an ECv2 message: a signed key
/// string and the root signatures vouching for it.
#[derive(Clone, Debug)]
pub(crate) struct IntermediateSigningKey {
    /// The key payload, kept as the exact string the signatures cover.
    pub(crate) signed_key: String,
    /// DER-encoded candidate signatures; any one verifying is enough.
    pub(crate) signatures: Vec<Vec<u8>>,
}

impl<'de> Deserialize<'de> for IntermediateSigningKey {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IntermediateSigningKeyVisitor;

        impl<'de> Visitor<'de> for IntermediateSigningKeyVisitor {
            type Value = IntermediateSigningKey;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "an object with exactly signedKey and signatures")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut signed_key: Option<String> = None;
                let mut signatures: Option<Vec<Vec<u8>>> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "signedKey" => {
                            if signed_key.is_some() {
                                return Err(DError::duplicate_field("signedKey"));
                            }
                            signed_key = Some(map.next_value()?);
                        }
                        "signatures" => {
                            if signatures.is_some() {
                                return Err(DError::duplicate_field("signatures"));
                            }
                            let encoded: Vec<String> = map.next_value()?;
                            let mut decoded = Vec::with_capacity(encoded.len());
                            for value in &encoded {
                                decoded.push(util::b64_decode(value).map_err(|_| {
                                    DError::custom("invalid base64 in signatures")
                                })?);
                            }
                            signatures = Some(decoded);
                        }
                        _ => {
                            return Err(DError::unknown_field(&key, &["signedKey", "signatures"]));
                        }
                    }
                }

                Ok(IntermediateSigningKey {
                    signed_key: signed_key.ok_or_else(|| DError::missing_field("signedKey"))?,
                    signatures: signatures.ok_or_else(|| DError::missing_field("signatures"))?,
                })
            }
        }

        d.deserialize_struct(
            "IntermediateSigningKey",
            &["signedKey", "signatures"],
            IntermediateSigningKeyVisitor,
        )
    }
}

/// The JSON carried inside `intermediateSigningKey.signedKey`.
#[derive(Clone, Debug)]
pub(crate) struct SignedKey {
    /// Base64 X.509 `SubjectPublicKeyInfo` of the intermediate key.
    pub(crate) key_value: String,
    /// Decimal milliseconds since the epoch.
    pub(crate) key_expiration: String,
}

impl<'de> Deserialize<'de> for SignedKey {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SignedKeyVisitor;

        impl<'de> Visitor<'de> for SignedKeyVisitor {
            type Value = SignedKey;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "an object with keyValue and keyExpiration")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut key_value: Option<String> = None;
                let mut key_expiration: Option<String> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "keyValue" => {
                            if key_value.is_some() {
                                return Err(DError::duplicate_field("keyValue"));
                            }
                            key_value = Some(map.next_value()?);
                        }
                        "keyExpiration" => {
                            if key_expiration.is_some() {
                                return Err(DError::duplicate_field("keyExpiration"));
                            }
                            key_expiration = Some(map.next_value()?);
                        }
                        _ => {
                            // Senders may extend the signed key.
                            let _: IgnoredAny = map.next_value()?;
                        }
                    }
                }

                Ok(SignedKey {
                    key_value: key_value.ok_or_else(|| DError::missing_field("keyValue"))?,
                    key_expiration: key_expiration
                        .ok_or_else(|| DError::missing_field("keyExpiration"))?,
                })
            }
        }

        d.deserialize_struct("SignedKey", &["keyValue", "keyExpiration"], SignedKeyVisitor)
    }
}

/// The hybrid ciphertext carried (as JSON text) in `signedMessage`: the
/// ephemeral key of the key encapsulation, the AES-CTR payload and its
/// HMAC-SHA256 tag.
#[derive(Clone, Debug)]
pub(crate) struct EncryptedMessage {
    pub(crate) encrypted_message: Vec<u8>,
    pub(crate) ephemeral_public_key: Vec<u8>,
    pub(crate) tag: Vec<u8>,
}

impl<'de> Deserialize<'de> for EncryptedMessage {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EncryptedMessageVisitor;

        impl<'de> Visitor<'de> for EncryptedMessageVisitor {
            type Value = EncryptedMessage;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    f,
                    "an object with exactly encryptedMessage, ephemeralPublicKey and tag"
                )
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut encrypted_message: Option<Vec<u8>> = None;
                let mut ephemeral_public_key: Option<Vec<u8>> = None;
                let mut tag: Option<Vec<u8>> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "encryptedMessage" => {
                            if encrypted_message.is_some() {
                                return Err(DError::duplicate_field("encryptedMessage"));
                            }
                            encrypted_message = Some(b64_value(&mut map, "encryptedMessage")?);
                        }
                        "ephemeralPublicKey" => {
                            if ephemeral_public_key.is_some() {
                                return Err(DError::duplicate_field("ephemeralPublicKey"));
                            }
                            ephemeral_public_key =
                                Some(b64_value(&mut map, "ephemeralPublicKey")?);
                        }
                        "tag" => {
                            if tag.is_some() {
                                return Err(DError::duplicate_field("tag"));
                            }
                            tag = Some(b64_value(&mut map, "tag")?);
                        }
                        _ => {
                            return Err(DError::unknown_field(
                                &key,
                                &["encryptedMessage", "ephemeralPublicKey", "tag"],
                            ));
                        }
                    }
                }

                Ok(EncryptedMessage {
                    encrypted_message: encrypted_message
                        .ok_or_else(|| DError::missing_field("encryptedMessage"))?,
                    ephemeral_public_key: ephemeral_public_key
                        .ok_or_else(|| DError::missing_field("ephemeralPublicKey"))?,
                    tag: tag.ok_or_else(|| DError::missing_field("tag"))?,
                })
            }
        }

        d.deserialize_struct(
            "EncryptedMessage",
            &["encryptedMessage", "ephemeralPublicKey", "tag"],
            EncryptedMessageVisitor,
        )
    }
}
