//! The recipient side of the token protocol: verify, decrypt, validate.

use crate::clock::{Clock, SystemClock};
use crate::envelope::{IntermediateSigningKey, SealedMessage, SignedKey};
use crate::hybrid::HybridDecrypter;
use crate::kem::{EcdhKem, RecipientKem};
use crate::keys::{RecipientKey, SenderVerifyingKey};
use crate::provider::{SenderKeySource, TrustedKeysSource};
use crate::version::ProtocolVersion;
use crate::{util, Error, Result, GOOGLE_CONTEXT_INFO, GOOGLE_SENDER_ID};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Verifies and decrypts sealed payment tokens.
///
/// A recipient is built once via [`RecipientBuilder`], holds only
/// read-only configuration afterwards, and is safe to share across
/// threads for concurrent [`unseal`](Recipient::unseal) calls.
///
/// Multiple sender key sources and multiple recipient private keys (or
/// [`RecipientKem`]s) can be configured so both sides rotate keys without
/// downtime: verification succeeds when any configured key verifies any
/// carried signature, and decryption succeeds when any configured key
/// decrypts the payload.
pub struct Recipient {
    protocol_version: ProtocolVersion,
    sender_id: String,
    recipient_id: String,
    key_sources: Vec<SenderKeySource>,
    decrypters: Vec<HybridDecrypter>,
    clock: Arc<dyn Clock>,
}

impl Recipient {
    /// Start building a recipient.
    pub fn builder() -> RecipientBuilder {
        RecipientBuilder::new()
    }

    /// Unseal `sealed_message`: verify its signature chain, decrypt the
    /// payload and reject it when expired.
    ///
    /// Returns the decrypted payload, or the first security failure. The
    /// signature is always checked before any decryption is attempted.
    pub fn unseal(&self, sealed_message: &str) -> Result<String> {
        let message: SealedMessage = serde_json::from_str(sealed_message)
            .map_err(|e| Error::invalid_message(e.to_string()))?;
        match self.protocol_version {
            ProtocolVersion::EcV1 => self.unseal_v1(&message),
            ProtocolVersion::EcV2 => self.unseal_v2(&message),
        }
    }

    fn unseal_v1(&self, message: &SealedMessage) -> Result<String> {
        self.validate_v1(message)?;
        self.verify_message(&self.key_sources, message)?;
        let plaintext = self.decrypt(&message.signed_message)?;
        self.validate_decrypted_message(&plaintext)?;
        Ok(plaintext)
    }

    fn unseal_v2(&self, message: &SealedMessage) -> Result<String> {
        let intermediate = self.validate_v2(message)?;
        let verified_key = self.verify_intermediate_signing_key(intermediate)?;
        self.verify_message(std::slice::from_ref(&verified_key), message)?;
        let plaintext = self.decrypt(&message.signed_message)?;
        self.validate_decrypted_message(&plaintext)?;
        Ok(plaintext)
    }

    fn validate_v1(&self, message: &SealedMessage) -> Result<()> {
        if message.intermediate_signing_key.is_some() {
            return Err(Error::invalid_message(
                "ECv1 message must contain exactly protocolVersion, signature and signedMessage",
            ));
        }
        if message.protocol_version != ProtocolVersion::EcV1.as_str() {
            return Err(Error::invalid_message(format!(
                "invalid version: {}",
                message.protocol_version
            )));
        }
        Ok(())
    }

    fn validate_v2<'a>(&self, message: &'a SealedMessage) -> Result<&'a IntermediateSigningKey> {
        let intermediate = message.intermediate_signing_key.as_ref().ok_or_else(|| {
            Error::invalid_message(
                "ECv2 message must contain exactly protocolVersion, intermediateSigningKey, \
                 signature and signedMessage",
            )
        })?;
        if message.protocol_version != ProtocolVersion::EcV2.as_str() {
            return Err(Error::invalid_message(format!(
                "invalid version: {}",
                message.protocol_version
            )));
        }
        Ok(intermediate)
    }

    /// Verify the outer signature of `message` against `sources`.
    fn verify_message(&self, sources: &[SenderKeySource], message: &SealedMessage) -> Result<()> {
        let signed_bytes = util::to_length_value(&[
            &self.sender_id,
            &self.recipient_id,
            self.protocol_version.as_str(),
            &message.signed_message,
        ]);
        self.verify(
            sources,
            std::slice::from_ref(&message.signature),
            &signed_bytes,
        )
    }

    /// At-least-one-success trial verification across sources × keys ×
    /// signatures. Individual trial failures are swallowed; a failing key
    /// source aborts the whole verification.
    fn verify(
        &self,
        sources: &[SenderKeySource],
        signatures: &[Vec<u8>],
        signed_bytes: &[u8],
    ) -> Result<()> {
        let now = self.clock.now_millis();
        for source in sources {
            for key in source.get(self.protocol_version, now)? {
                for signature in signatures {
                    if key.verify_signed_bytes(signed_bytes, signature).is_ok() {
                        return Ok(());
                    }
                }
            }
        }
        Err(Error::SignatureInvalid)
    }

    /// The ECv2 sub-protocol: check the intermediate key's own signatures
    /// against the configured sources, enforce its expiration, and hand
    /// the key back as a source bound to the configured version.
    fn verify_intermediate_signing_key(
        &self,
        intermediate: &IntermediateSigningKey,
    ) -> Result<SenderKeySource> {
        let signed_bytes = util::to_length_value(&[
            &self.sender_id,
            self.protocol_version.as_str(),
            &intermediate.signed_key,
        ]);
        self.verify(&self.key_sources, &intermediate.signatures, &signed_bytes)?;

        let signed_key: SignedKey = serde_json::from_str(&intermediate.signed_key)
            .map_err(|e| Error::invalid_message(e.to_string()))?;
        let expiration = util::parse_millis(&signed_key.key_expiration)
            .ok_or(Error::Expired("intermediateSigningKey"))?;
        if expiration <= self.clock.now_millis() {
            return Err(Error::Expired("intermediateSigningKey"));
        }

        let key = SenderVerifyingKey::from_base64_spki(&signed_key.key_value)?;
        Ok(SenderKeySource::VersionBound {
            version: self.protocol_version,
            key,
        })
    }

    /// Trial decryption in decrypter order; the first plaintext wins.
    fn decrypt(&self, signed_message: &str) -> Result<String> {
        for decrypter in &self.decrypters {
            if let Ok(plaintext) = decrypter.decrypt(signed_message.as_bytes(), GOOGLE_CONTEXT_INFO)
            {
                return String::from_utf8(plaintext).map_err(|_| Error::DecryptionFailed);
            }
        }
        Err(Error::DecryptionFailed)
    }

    /// Reject the decrypted payload when it carries an expired (or
    /// unusable) `messageExpiration`. Payloads that are not JSON objects
    /// have nothing to validate.
    fn validate_decrypted_message(&self, plaintext: &str) -> Result<()> {
        let Ok(decoded) = serde_json::from_str::<serde_json::Value>(plaintext) else {
            return Ok(());
        };
        let Some(object) = decoded.as_object() else {
            return Ok(());
        };
        let Some(expiration) = object.get("messageExpiration") else {
            return Ok(());
        };
        let millis = expiration
            .as_str()
            .and_then(util::parse_millis)
            .ok_or(Error::Expired("payload"))?;
        if millis <= self.clock.now_millis() {
            return Err(Error::Expired("payload"));
        }
        Ok(())
    }
}

impl Debug for Recipient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipient")
            .field("protocol_version", &self.protocol_version)
            .field("sender_id", &self.sender_id)
            .field("recipient_id", &self.recipient_id)
            .field("key_sources", &self.key_sources.len())
            .field("decrypters", &self.decrypters.len())
            .finish()
    }
}

/// Builder for [`Recipient`].
pub struct RecipientBuilder {
    protocol_version: ProtocolVersion,
    sender_id: String,
    recipient_id: Option<String>,
    key_sources: Vec<SenderKeySource>,
    recipient_keys: Vec<RecipientKey>,
    recipient_kems: Vec<Arc<dyn RecipientKem>>,
    clock: Arc<dyn Clock>,
}

impl RecipientBuilder {
    /// Start from the defaults: `ECv1`, sender `"Google"`, wall clock.
    pub fn new() -> Self {
        Self {
            protocol_version: ProtocolVersion::default(),
            sender_id: GOOGLE_SENDER_ID.to_string(),
            recipient_id: None,
            key_sources: Vec::new(),
            recipient_keys: Vec::new(),
            recipient_kems: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the protocol version.
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// Set the sender id. Rarely needed: tokens are normally sealed under
    /// the default sender.
    pub fn sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = sender_id.into();
        self
    }

    /// Set the recipient id. Required; it is bound into the signature.
    pub fn recipient_id(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }

    /// Fetch the sender's verifying keys from an external store on every
    /// unseal.
    ///
    /// This is the preferred way to configure sender keys: a store that
    /// honours the key endpoint's cache headers picks up rotations
    /// automatically.
    pub fn fetch_sender_verifying_keys_with(mut self, store: Arc<dyn TrustedKeysSource>) -> Self {
        self.key_sources.push(SenderKeySource::Fetched(store));
        self
    }

    /// Use a fixed trusted-keys JSON document as a source of the sender's
    /// verifying keys. Key rotation becomes the caller's concern.
    pub fn sender_verifying_keys(mut self, trusted_keys_json: impl Into<String>) -> Self {
        self.key_sources
            .push(SenderKeySource::TrustedJson(trusted_keys_json.into()));
        self
    }

    /// Add a single sender verifying key. May be called repeatedly to
    /// cover sender key rotation.
    pub fn add_sender_verifying_key(mut self, key: SenderVerifyingKey) -> Self {
        self.key_sources.push(SenderKeySource::Literal(vec![key]));
        self
    }

    /// Add a single sender verifying key from base64
    /// `SubjectPublicKeyInfo`.
    pub fn add_sender_verifying_key_base64(self, spki_b64: &str) -> Result<Self> {
        Ok(self.add_sender_verifying_key(SenderVerifyingKey::from_base64_spki(spki_b64)?))
    }

    /// Add a recipient private key. May be called repeatedly to support
    /// graceful key rotation.
    pub fn add_recipient_private_key(mut self, key: RecipientKey) -> Self {
        self.recipient_keys.push(key);
        self
    }

    /// Add a recipient private key from base64 PKCS#8.
    pub fn add_recipient_private_key_base64(self, pkcs8_b64: &str) -> Result<Self> {
        Ok(self.add_recipient_private_key(RecipientKey::from_base64_pkcs8(pkcs8_b64)?))
    }

    /// Add a custom KEM, for recipients that keep the private key in an
    /// HSM. Otherwise prefer
    /// [`add_recipient_private_key`](Self::add_recipient_private_key).
    pub fn add_recipient_kem(mut self, kem: Arc<dyn RecipientKem>) -> Self {
        self.recipient_kems.push(kem);
        self
    }

    /// Replace the clock used for expiration checks.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and build the recipient, eagerly
    /// constructing one decrypter per private key and per KEM.
    pub fn build(self) -> Result<Recipient> {
        if self.key_sources.is_empty() {
            return Err(Error::Configuration(
                "must set at least one way to get the sender's verifying keys using \
                 sender_verifying_keys, add_sender_verifying_key or \
                 fetch_sender_verifying_keys_with"
                    .into(),
            ));
        }
        let recipient_id = self
            .recipient_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Configuration("must set the recipient id".into()))?;
        if self.recipient_keys.is_empty() && self.recipient_kems.is_empty() {
            return Err(Error::Configuration(
                "must add at least one recipient private key or KEM".into(),
            ));
        }

        let mut decrypters =
            Vec::with_capacity(self.recipient_keys.len() + self.recipient_kems.len());
        for key in self.recipient_keys {
            decrypters.push(HybridDecrypter::new(
                Arc::new(EcdhKem::new(key)),
                self.protocol_version,
            ));
        }
        for kem in self.recipient_kems {
            decrypters.push(HybridDecrypter::new(kem, self.protocol_version));
        }

        Ok(Recipient {
            protocol_version: self.protocol_version,
            sender_id: self.sender_id,
            recipient_id,
            key_sources: self.key_sources,
            decrypters,
            clock: self.clock,
        })
    }
}

impl Default for RecipientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for RecipientBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipientBuilder")
            .field("protocol_version", &self.protocol_version)
            .field("sender_id", &self.sender_id)
            .field("recipient_id", &self.recipient_id)
            .field("key_sources", &self.key_sources.len())
            .field("recipient_keys", &self.recipient_keys.len())
            .field("recipient_kems", &self.recipient_kems.len())
            .finish()
    }
}
