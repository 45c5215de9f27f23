//! Idempotency records
//!
//! Stored as the JSON `meta` payload of the ledger entry that carries the
//! caller's reference.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{LedgerEntry, OperationContext};

/// Longest reference accepted from callers. Transfers derive `-out` and
/// `-in` references from it, which must still fit the column.
pub const MAX_REFERENCE_LEN: usize = 128;

/// Operation a reference was first used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Transfer,
    Deposit,
    Withdraw,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Transfer => "transfer",
            OperationKind::Deposit => "deposit",
            OperationKind::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 of the normalized request, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// Fingerprint of the JSON encoding of a normalized command
    pub fn of<T: Serialize>(request: &T) -> Result<Self, IdempotencyError> {
        let body = serde_json::to_vec(request).map_err(IdempotencyError::Encode)?;
        Ok(Self::compute(&body))
    }

    pub fn compute(body: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(body);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("Failed to encode idempotency record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode idempotency record for {reference}: {source}")]
    Decode {
        reference: String,
        #[source]
        source: serde_json::Error,
    },

    /// The reference is held by a ledger entry that carries no record
    #[error("Reference {0} is already used by another ledger entry")]
    Taken(String),

    #[error("Reference {reference} was first used for a {found}, not a {expected}")]
    KindMismatch {
        reference: String,
        expected: OperationKind,
        found: OperationKind,
    },

    #[error("Reference {0} was first used with a different request")]
    FingerprintMismatch(String),
}

impl IdempotencyError {
    /// The reference belongs to a different request
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            IdempotencyError::Taken(_)
                | IdempotencyError::KindMismatch { .. }
                | IdempotencyError::FingerprintMismatch(_)
        )
    }
}

/// What a completed operation leaves behind for replays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub kind: OperationKind,
    pub fingerprint: RequestFingerprint,
    pub outcome: serde_json::Value,
    #[serde(default)]
    pub context: OperationContext,
    pub recorded_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new<T: Serialize>(
        kind: OperationKind,
        fingerprint: RequestFingerprint,
        outcome: &T,
        context: &OperationContext,
    ) -> Result<Self, IdempotencyError> {
        Ok(Self {
            kind,
            fingerprint,
            outcome: serde_json::to_value(outcome).map_err(IdempotencyError::Encode)?,
            context: context.clone(),
            recorded_at: Utc::now(),
        })
    }

    pub fn to_meta(&self) -> Result<serde_json::Value, IdempotencyError> {
        serde_json::to_value(self).map_err(IdempotencyError::Encode)
    }

    /// Read the record back from the entry holding `reference`
    pub fn from_entry(reference: &str, entry: &LedgerEntry) -> Result<Self, IdempotencyError> {
        let meta = entry
            .meta
            .clone()
            .ok_or_else(|| IdempotencyError::Taken(reference.to_string()))?;

        // Entries written by other tools may carry unrelated metadata
        if meta.get("fingerprint").is_none() {
            return Err(IdempotencyError::Taken(reference.to_string()));
        }

        serde_json::from_value(meta).map_err(|source| IdempotencyError::Decode {
            reference: reference.to_string(),
            source,
        })
    }

    /// Check that a new attempt is the same request as the recorded one
    pub fn verify(
        &self,
        reference: &str,
        kind: OperationKind,
        fingerprint: &RequestFingerprint,
    ) -> Result<(), IdempotencyError> {
        if self.kind != kind {
            return Err(IdempotencyError::KindMismatch {
                reference: reference.to_string(),
                expected: kind,
                found: self.kind,
            });
        }
        if &self.fingerprint != fingerprint {
            return Err(IdempotencyError::FingerprintMismatch(reference.to_string()));
        }
        Ok(())
    }

    pub fn outcome<T: DeserializeOwned>(&self, reference: &str) -> Result<T, IdempotencyError> {
        serde_json::from_value(self.outcome.clone()).map_err(|source| IdempotencyError::Decode {
            reference: reference.to_string(),
            source,
        })
    }
}

/// Reject empty, over-long, or whitespace-padded references
pub fn validate_reference(reference: &str) -> Result<(), String> {
    if reference.is_empty() {
        return Err("reference must not be empty".to_string());
    }
    if reference.len() > MAX_REFERENCE_LEN {
        return Err(format!(
            "reference is longer than {} bytes",
            MAX_REFERENCE_LEN
        ));
    }
    if reference.trim() != reference || reference.chars().any(char::is_control) {
        return Err("reference contains surrounding whitespace or control characters".to_string());
    }
    Ok(())
}
