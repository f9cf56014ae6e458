//! Hybrid decryption of the signed message.
//!
//! The signed message is itself a small JSON object: the sender's
//! ephemeral P-256 public key, an AES-CTR ciphertext and an HMAC-SHA256
//! tag. Decryption is ECIES:
//!
//! 1. ECDH between the ephemeral key and the recipient private key (or a
//!    delegated [`RecipientKem`](crate::RecipientKem)).
//! 2. HKDF-SHA256 with an empty salt over `ephemeral || shared_secret`,
//!    bound to the caller's context info, sized for the protocol
//!    version's key pair and split into AES key and MAC key.
//! 3. Constant-time tag check over the ciphertext, then AES-CTR with a
//!    zero IV. The IV can be fixed because every message derives a fresh
//!    key from a fresh ephemeral.

use crate::envelope::EncryptedMessage;
use crate::kem::RecipientKem;
use crate::version::ProtocolVersion;
use crate::{Error, Result};
use aes::cipher::{KeyIvInit, StreamCipher};
use aes::{Aes128, Aes256};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;
type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const ZERO_IV: [u8; 16] = [0u8; 16];

/// One recipient decryption key behind the DEM of a protocol version.
pub(crate) struct HybridDecrypter {
    kem: Arc<dyn RecipientKem>,
    version: ProtocolVersion,
}

impl HybridDecrypter {
    pub(crate) fn new(kem: Arc<dyn RecipientKem>, version: ProtocolVersion) -> Self {
        Self { kem, version }
    }

    /// Decrypt `ciphertext` (the UTF-8 bytes of the encrypted-payload
    /// JSON) bound to `context_info`.
    ///
    /// Every internal failure collapses into the one opaque decryption
    /// error: callers trial-decrypt across keys and must not learn why a
    /// particular key failed.
    pub(crate) fn decrypt(&self, ciphertext: &[u8], context_info: &[u8]) -> Result<Vec<u8>> {
        let text = std::str::from_utf8(ciphertext).map_err(|_| Error::DecryptionFailed)?;
        let message: EncryptedMessage =
            serde_json::from_str(text).map_err(|_| Error::DecryptionFailed)?;

        let shared_secret = Zeroizing::new(
            self.kem
                .compute_shared_secret(&message.ephemeral_public_key)
                .map_err(|_| Error::DecryptionFailed)?,
        );
        let dem_key =
            self.derive_dem_key(&message.ephemeral_public_key, &shared_secret, context_info)?;
        let (aes_key, hmac_key) = dem_key.split_at(self.version.aes_ctr_key_len());

        let mut mac = HmacSha256::new_from_slice(hmac_key).map_err(|_| Error::DecryptionFailed)?;
        mac.update(&message.encrypted_message);
        mac.verify_slice(&message.tag)
            .map_err(|_| Error::DecryptionFailed)?;

        let mut plaintext = message.encrypted_message.clone();
        match aes_key.len() {
            16 => Aes128Ctr::new_from_slices(aes_key, &ZERO_IV)
                .map_err(|_| Error::DecryptionFailed)?
                .apply_keystream(&mut plaintext),
            _ => Aes256Ctr::new_from_slices(aes_key, &ZERO_IV)
                .map_err(|_| Error::DecryptionFailed)?
                .apply_keystream(&mut plaintext),
        }
        Ok(plaintext)
    }

    /// HKDF-SHA256 over `ephemeral || shared_secret`, bound to
    /// `context_info`, sized for the version's DEM.
    fn derive_dem_key(
        &self,
        ephemeral: &[u8],
        shared_secret: &[u8],
        context_info: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let mut ikm = Zeroizing::new(Vec::with_capacity(ephemeral.len() + shared_secret.len()));
        ikm.extend_from_slice(ephemeral);
        ikm.extend_from_slice(shared_secret);

        let mut dem_key = Zeroizing::new(vec![0u8; self.version.dem_key_len()]);
        Hkdf::<Sha256>::new(None, &ikm)
            .expand(context_info, &mut dem_key)
            .map_err(|_| Error::DecryptionFailed)?;
        Ok(dem_key)
    }
}
