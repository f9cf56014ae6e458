//! Recipient-side verification and decryption of Google Payment Method
//! Tokens.
//!
//! A sealed token is a small JSON envelope carrying an ECDSA signature,
//! signed metadata and a hybrid-encrypted payload. Unsealing runs four
//! steps:
//!
//! 1. The envelope is parsed and its shape checked against the configured
//!    protocol version (`ECv1` or `ECv2`): an exact key set, and a
//!    `protocolVersion` field matching the configuration.
//! 2. The signature is checked with ECDSA-SHA256 over a length-value
//!    concatenation of the sender id, the recipient id, the protocol
//!    version and the signed message. `ECv2` first verifies an expiring
//!    intermediate signing key against the sender's root keys, then uses
//!    that key for the outer check.
//! 3. The signed message is itself a JSON structure carrying an ECIES
//!    ciphertext: an ephemeral P-256 public key, an AES-CTR payload and
//!    an HMAC-SHA256 tag. ECDH against a recipient private key feeds
//!    HKDF-SHA256, the tag is checked in constant time, and the payload
//!    is decrypted.
//! 4. If the decrypted payload is a JSON object carrying
//!    `messageExpiration`, expired payloads are rejected.
//!
//! Multiple sender key sources and multiple recipient private keys can be
//! configured so both sides rotate keys gracefully: each stage succeeds
//! when any configured candidate succeeds.
//!
//! # Usage
//!
//! ```no_run
//! use payment_token_recipient::{ProtocolVersion, Recipient};
//!
//! # fn main() -> payment_token_recipient::Result<()> {
//! let recipient = Recipient::builder()
//!     .protocol_version(ProtocolVersion::EcV2)
//!     .recipient_id("merchant:12345678901234567890")
//!     .sender_verifying_keys(r#"{"keys":[]}"#)
//!     // Multiple private keys support graceful key rotation.
//!     .add_recipient_private_key_base64("<base64 PKCS#8 key>")?
//!     .build()?;
//! let plaintext = recipient.unseal("<sealed message>")?;
//! # let _ = plaintext;
//! # Ok(())
//! # }
//! ```
//!
//! Recipients that keep their private key in an HSM implement
//! [`RecipientKem`] and register it with
//! [`RecipientBuilder::add_recipient_kem`]; everything else, including the
//! key-derivation and tag-check steps, stays in this crate.
//!
//! Sender verifying keys are normally fetched and cached by an external
//! collaborator implementing [`TrustedKeysSource`]; fixed keys can be
//! pinned instead for tests or air-gapped setups.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused,
    clippy::mod_module_files
)]
#![deny(clippy::unwrap_used)]

mod clock;
mod envelope;
mod error;
mod hybrid;
mod kem;
mod keys;
mod provider;
mod recipient;
#[cfg(test)]
pub(crate) mod testing;
mod util;
mod version;

/// The default sender id.
pub const GOOGLE_SENDER_ID: &str = "Google";

/// Context info bound into the key derivation of the payload encryption.
/// Deliberately the same bytes for both protocol versions; the sender uses
/// the `ECv1` value everywhere.
pub const GOOGLE_CONTEXT_INFO: &[u8] = b"Google";

pub use clock::{Clock, SystemClock};
pub use error::{Error, Result};
pub use kem::RecipientKem;
pub use keys::{RecipientKey, SenderVerifyingKey};
pub use provider::TrustedKeysSource;
pub use recipient::{Recipient, RecipientBuilder};
pub use version::ProtocolVersion;
