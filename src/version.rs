use derive_more::{Display, FromStr};

/// The protocol versions supported by this crate.
///
/// Both versions share the envelope shape and the hybrid decryption
/// primitive; they differ in the trust chain and in the symmetric key
/// sizes of the data encapsulation:
///
/// * `EcV1`: tokens are signed directly with the sender's root signing
///   keys. The payload is protected with AES-128-CTR and an HMAC-SHA256
///   tag under a 128-bit MAC key.
/// * `EcV2`: tokens are signed with an intermediate key, which is itself
///   signed (and expiration-bounded) by the sender's root signing keys.
///   The payload is protected with AES-256-CTR and an HMAC-SHA256 tag
///   under a 256-bit MAC key.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, FromStr,
)]
pub enum ProtocolVersion {
    /// Tokens signed directly by the sender's root signing keys.
    #[default]
    #[display("ECv1")]
    EcV1,
    /// Tokens signed by an expiring intermediate signing key.
    #[display("ECv2")]
    EcV2,
}

impl ProtocolVersion {
    /// The wire spelling of the version.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::EcV1 => "ECv1",
            ProtocolVersion::EcV2 => "ECv2",
        }
    }

    /// AES-CTR key length of the version's data encapsulation, in bytes.
    pub(crate) const fn aes_ctr_key_len(&self) -> usize {
        match self {
            ProtocolVersion::EcV1 => 16,
            ProtocolVersion::EcV2 => 32,
        }
    }

    /// HMAC-SHA256 key length of the version's data encapsulation, in bytes.
    pub(crate) const fn hmac_key_len(&self) -> usize {
        match self {
            ProtocolVersion::EcV1 => 16,
            ProtocolVersion::EcV2 => 32,
        }
    }

    /// Total key material drawn from the KDF: AES key followed by MAC key.
    pub(crate) const fn dem_key_len(&self) -> usize {
        self.aes_ctr_key_len() + self.hmac_key_len()
    }
}
