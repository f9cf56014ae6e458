//! Sources of sender verifying keys.
//!
//! A recipient holds an ordered list of key sources and verification walks
//! them in insertion order. Literal keys are carried as-is; JSON-backed
//! sources re-parse the trusted-keys document on every call, so rotations
//! picked up by an external cache take effect without rebuilding the
//! recipient.

use crate::keys::SenderVerifyingKey;
use crate::version::ProtocolVersion;
use crate::{util, Error, Result};
use serde::Deserialize;
use std::sync::Arc;

/// Hands out the sender's current trusted-keys JSON document.
///
/// This is the seam for an external fetching/caching collaborator. The
/// recipient calls it on every unseal and surfaces its errors as key-fetch
/// failures; freshness, caching and timeouts are the implementer's
/// concern.
pub trait TrustedKeysSource: Send + Sync {
    /// The trusted-keys JSON document, as served by the sender's key
    /// distribution endpoint.
    fn trusted_signing_keys_json(
        &self,
    ) -> std::result::Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

/// One configured way of obtaining sender verifying keys.
pub(crate) enum SenderKeySource {
    /// Keys handed to the builder already parsed. Never fails.
    Literal(Vec<SenderVerifyingKey>),
    /// A trusted-keys JSON document, re-parsed on every call.
    TrustedJson(String),
    /// Trusted-keys JSON pulled from an external store on every call.
    Fetched(Arc<dyn TrustedKeysSource>),
    /// A single freshly verified key, valid for one version only. Produced
    /// by the intermediate-signing-key step of ECv2 verification.
    VersionBound {
        version: ProtocolVersion,
        key: SenderVerifyingKey,
    },
}

impl SenderKeySource {
    /// The keys this source offers for `version`, judged at `now_millis`.
    pub(crate) fn get(
        &self,
        version: ProtocolVersion,
        now_millis: i64,
    ) -> Result<Vec<SenderVerifyingKey>> {
        match self {
            SenderKeySource::Literal(keys) => Ok(keys.clone()),
            SenderKeySource::TrustedJson(json) => parse_trusted_keys(json, version, now_millis),
            SenderKeySource::Fetched(store) => {
                let json = store.trusted_signing_keys_json().map_err(|e| Error::KeyFetch {
                    message: "Failed to fetch keys!".into(),
                    source: Some(e),
                })?;
                parse_trusted_keys(&json, version, now_millis)
            }
            SenderKeySource::VersionBound { version: bound, key } => {
                if *bound == version {
                    Ok(vec![*key])
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct TrustedKeys {
    keys: Vec<TrustedKeyEntry>,
}

/// One entry of the trusted-keys document. Entries may carry fields this
/// crate does not know about.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrustedKeyEntry {
    #[serde(default)]
    key_value: Option<String>,
    protocol_version: String,
    #[serde(default)]
    key_expiration: Option<String>,
}

/// Extract the usable verifying keys for `version` from a trusted-keys
/// document.
///
/// Expired entries are skipped, as are entries whose expiration cannot be
/// parsed. A missing `keyExpiration` is accepted only for ECv1, where the
/// HTTP cache lifetime of the document is authoritative; for every other
/// version such entries are skipped too.
fn parse_trusted_keys(
    json: &str,
    version: ProtocolVersion,
    now_millis: i64,
) -> Result<Vec<SenderVerifyingKey>> {
    let parsed: TrustedKeys = serde_json::from_str(json).map_err(|e| Error::KeyFetch {
        message: "failed to extract trusted signing public keys".into(),
        source: Some(Box::new(e)),
    })?;

    let mut keys = Vec::new();
    for entry in &parsed.keys {
        if entry.protocol_version != version.as_str() {
            continue;
        }
        match &entry.key_expiration {
            Some(expiration) => {
                let usable = util::parse_millis(expiration).is_some_and(|t| t > now_millis);
                if !usable {
                    continue;
                }
            }
            None if version != ProtocolVersion::EcV1 => continue,
            None => {}
        }
        let value = entry
            .key_value
            .as_deref()
            .ok_or_else(|| Error::key_fetch("failed to extract trusted signing public keys"))?;
        let key = SenderVerifyingKey::from_base64_spki(value).map_err(|e| Error::KeyFetch {
            message: "failed to extract trusted signing public keys".into(),
            source: Some(Box::new(e)),
        })?;
        keys.push(key);
    }

    if keys.is_empty() {
        return Err(Error::key_fetch(
            "no trusted keys are available for this protocol version",
        ));
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use rstest::*;

    fn entry(spki: &str, version: &str, expiration: Option<&str>) -> serde_json::Value {
        match expiration {
            Some(expiration) => serde_json::json!({
                "keyValue": spki,
                "protocolVersion": version,
                "keyExpiration": expiration,
            }),
            None => serde_json::json!({
                "keyValue": spki,
                "protocolVersion": version,
            }),
        }
    }

    fn keys_json(entries: &[serde_json::Value]) -> String {
        serde_json::json!({ "keys": entries }).to_string()
    }

    #[test]
    fn returns_matching_unexpired_keys() {
        let pair = testing::signing_pair();
        let json = keys_json(&[
            entry(&pair.spki_b64, "ECv2", Some("9999999999999")),
            entry(&pair.spki_b64, "ECv1", Some("9999999999999")),
        ]);
        let source = SenderKeySource::TrustedJson(json);
        assert_eq!(source.get(ProtocolVersion::EcV2, 0).unwrap().len(), 1);
        assert_eq!(source.get(ProtocolVersion::EcV1, 0).unwrap().len(), 1);
    }

    #[rstest]
    #[case::expired(Some("100"))]
    #[case::expires_now(Some("1000"))]
    #[case::malformed(Some("not-a-number"))]
    #[case::missing(None)]
    fn skips_unusable_v2_entries(#[case] expiration: Option<&str>) {
        let good = testing::signing_pair();
        let skipped = testing::signing_pair();
        let json = keys_json(&[
            entry(&skipped.spki_b64, "ECv2", expiration),
            entry(&good.spki_b64, "ECv2", Some("2000")),
        ]);
        let source = SenderKeySource::TrustedJson(json);
        let keys = source.get(ProtocolVersion::EcV2, 1000).unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn missing_expiration_is_accepted_for_v1_only() {
        let pair = testing::signing_pair();
        let json = keys_json(&[entry(&pair.spki_b64, "ECv1", None)]);
        let source = SenderKeySource::TrustedJson(json.clone());
        assert_eq!(source.get(ProtocolVersion::EcV1, 0).unwrap().len(), 1);

        let json = keys_json(&[entry(&pair.spki_b64, "ECv2", None)]);
        let source = SenderKeySource::TrustedJson(json);
        assert!(source.get(ProtocolVersion::EcV2, 0).is_err());
    }

    #[test]
    fn no_surviving_keys_is_an_error() {
        let pair = testing::signing_pair();
        let json = keys_json(&[entry(&pair.spki_b64, "ECv1", Some("100"))]);
        let source = SenderKeySource::TrustedJson(json);
        let err = source.get(ProtocolVersion::EcV1, 1000).unwrap_err();
        assert!(err
            .to_string()
            .contains("no trusted keys are available for this protocol version"));
    }

    #[test]
    fn structural_errors_fold_to_key_fetch() {
        let source = SenderKeySource::TrustedJson("not json".into());
        assert!(matches!(
            source.get(ProtocolVersion::EcV1, 0),
            Err(Error::KeyFetch { .. })
        ));

        // A selected entry without keyValue cannot be used.
        let json = keys_json(&[serde_json::json!({
            "protocolVersion": "ECv1",
            "keyExpiration": "9999999999999",
        })]);
        let source = SenderKeySource::TrustedJson(json);
        assert!(matches!(
            source.get(ProtocolVersion::EcV1, 0),
            Err(Error::KeyFetch { .. })
        ));
    }

    #[test]
    fn fetch_failures_wrap_the_store_error() {
        struct FailingStore;
        impl TrustedKeysSource for FailingStore {
            fn trusted_signing_keys_json(
                &self,
            ) -> std::result::Result<String, Box<dyn std::error::Error + Send + Sync>> {
                Err("connection refused".into())
            }
        }

        let source = SenderKeySource::Fetched(Arc::new(FailingStore));
        match source.get(ProtocolVersion::EcV1, 0) {
            Err(Error::KeyFetch { message, source }) => {
                assert_eq!(message, "Failed to fetch keys!");
                assert_eq!(source.unwrap().to_string(), "connection refused");
            }
            other => panic!("expected a key fetch error, got {other:?}"),
        }
    }

    #[test]
    fn version_bound_source_only_answers_for_its_version() {
        let pair = testing::signing_pair();
        let key = SenderVerifyingKey::from_base64_spki(&pair.spki_b64).unwrap();
        let source = SenderKeySource::VersionBound {
            version: ProtocolVersion::EcV2,
            key,
        };
        assert_eq!(source.get(ProtocolVersion::EcV2, 0).unwrap().len(), 1);
        assert!(source.get(ProtocolVersion::EcV1, 0).unwrap().is_empty());
    }
}
