//! The key-encapsulation seam of the hybrid decrypter.
//!
//! The symmetric keys protecting a token are derived from the ECDH shared
//! secret between the token's ephemeral public key and the recipient's
//! long-term private key. That private-key operation sits behind
//! [`RecipientKem`] so recipients can keep the key in an HSM; [`EcdhKem`]
//! is the in-process implementation backing keys added through the
//! builder.

use crate::keys::RecipientKey;
use p256::ecdh;
use p256::PublicKey;

/// Computes the ECDH shared secret for one recipient private key.
///
/// `ephemeral_public_key` is the token's ephemeral P-256 public key as an
/// uncompressed SEC1 point; the return value is the raw shared secret (the
/// 32-byte x-coordinate). Errors are opaque to token submitters: the
/// trial-decryption loop swallows them.
pub trait RecipientKem: Send + Sync {
    /// ECDH between `ephemeral_public_key` and the long-term private key.
    fn compute_shared_secret(
        &self,
        ephemeral_public_key: &[u8],
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Software KEM over an in-memory recipient private key.
pub(crate) struct EcdhKem {
    key: RecipientKey,
}

impl EcdhKem {
    pub(crate) fn new(key: RecipientKey) -> Self {
        Self { key }
    }
}

impl RecipientKem for EcdhKem {
    fn compute_shared_secret(
        &self,
        ephemeral_public_key: &[u8],
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        let ephemeral = PublicKey::from_sec1_bytes(ephemeral_public_key)?;
        let shared =
            ecdh::diffie_hellman(self.key.secret().to_nonzero_scalar(), ephemeral.as_affine());
        Ok(shared.raw_secret_bytes().to_vec())
    }
}
