//! Versioned envelope for persisted documents.
//!
//! Every execution context written by a store is wrapped in an envelope so
//! the stored format can evolve. Decoding reads the version first and only
//! then the payload, so an unknown version is reported as such instead of
//! as a confusing field error.

use crate::error::StoreError;
use rootcause::prelude::Report;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The envelope version written by this build.
pub const CURRENT_VERSION: u32 = 1;

/// A versioned wrapper around a stored payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: u32,
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps a payload at the current version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serializes the envelope to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the payload cannot be encoded.
    pub fn encode(&self) -> Result<Vec<u8>, Report<StoreError>> {
        Ok(serde_json::to_vec_pretty(self).map_err(|e| StoreError::Serialization {
            message: e.to_string(),
        })?)
    }
}

/// Envelope with the payload left undecoded.
#[derive(Deserialize)]
struct RawEnvelope {
    version: u32,
    payload: serde_json::Value,
}

/// Decodes an envelope written by [`Envelope::encode`] and returns its payload.
///
/// # Errors
///
/// Returns `StoreError::UnsupportedVersion` for envelopes newer than this
/// build, or `StoreError::Serialization` for malformed documents.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Report<StoreError>> {
    let raw: RawEnvelope =
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization {
            message: e.to_string(),
        })?;
    if raw.version == 0 || raw.version > CURRENT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            version: raw.version,
        }
        .into());
    }
    Ok(serde_json::from_value(raw.payload).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Checkpoint {
        step: String,
        attempt: u32,
    }

    #[test]
    fn encoded_envelope_carries_version_at_top_level() {
        let bytes = Envelope::new(Checkpoint {
            step: "fetch".to_string(),
            attempt: 2,
        })
        .encode()
        .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["version"], CURRENT_VERSION);
        assert_eq!(json["payload"]["step"], "fetch");

        let decoded: Checkpoint = decode(&bytes).unwrap();
        assert_eq!(decoded.attempt, 2);
    }

    #[test]
    fn future_version_is_rejected_before_payload() {
        let bytes = br#"{"version": 9, "payload": {"unexpected": true}}"#;
        let err = decode::<Checkpoint>(bytes).unwrap_err();
        assert_eq!(
            err.current_context(),
            &StoreError::UnsupportedVersion { version: 9 }
        );
    }

    #[test]
    fn malformed_document_is_a_serialization_error() {
        let err = decode::<Checkpoint>(b"not json").unwrap_err();
        assert!(matches!(
            err.current_context(),
            StoreError::Serialization { .. }
        ));
    }
}
