//! P-256 key material.
//!
//! Sender verifying keys arrive as X.509 `SubjectPublicKeyInfo`, recipient
//! private keys as PKCS#8, both usually base64-wrapped. Anything that does
//! not decode onto the NIST P-256 curve is rejected.

use crate::{util, Error, Result};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey};
use p256::SecretKey;
use std::fmt::{self, Debug, Formatter};

/// A sender ECDSA-SHA256 verifying key.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct SenderVerifyingKey(VerifyingKey);

impl SenderVerifyingKey {
    /// Decode a base64 (standard, padded) X.509 `SubjectPublicKeyInfo` key.
    pub fn from_base64_spki(value: &str) -> Result<Self> {
        let der = util::b64_decode(value)
            .map_err(|_| Error::InvalidKey("verifying key is not valid base64".into()))?;
        Self::from_spki_der(&der)
    }

    /// Decode an X.509 `SubjectPublicKeyInfo` DER key.
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        VerifyingKey::from_public_key_der(der)
            .map(Self)
            .map_err(|e| Error::InvalidKey(format!("not a P-256 SubjectPublicKeyInfo key: {e}")))
    }

    /// Verify a DER-encoded ECDSA-SHA256 signature over `signed_bytes`.
    ///
    /// Fails with the one opaque signature error; which check failed is
    /// not reported.
    pub(crate) fn verify_signed_bytes(&self, signed_bytes: &[u8], signature_der: &[u8]) -> Result<()> {
        let signature = Signature::from_der(signature_der).map_err(|_| Error::SignatureInvalid)?;
        self.0
            .verify(signed_bytes, &signature)
            .map_err(|_| Error::SignatureInvalid)
    }
}

impl Debug for SenderVerifyingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SenderVerifyingKey(")?;
        for byte in self.0.to_encoded_point(true).as_bytes() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// A recipient P-256 private key, used for the ECDH half of decryption.
#[derive(Clone)]
pub struct RecipientKey(SecretKey);

impl RecipientKey {
    /// Decode a base64 (standard, padded) PKCS#8 private key.
    pub fn from_base64_pkcs8(value: &str) -> Result<Self> {
        let der = util::b64_decode(value)
            .map_err(|_| Error::InvalidKey("private key is not valid base64".into()))?;
        Self::from_pkcs8_der(&der)
    }

    /// Decode a PKCS#8 DER private key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        SecretKey::from_pkcs8_der(der)
            .map(Self)
            .map_err(|e| Error::InvalidKey(format!("not a P-256 PKCS#8 key: {e}")))
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.0
    }
}

impl Debug for RecipientKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // The scalar stays out of Debug output.
        f.write_str("RecipientKey(P-256)")
    }
}
