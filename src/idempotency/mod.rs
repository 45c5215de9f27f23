//! Idempotency module
//!
//! Caller-supplied references make ledger operations exactly-once. The
//! first successful attempt stores an [`IdempotencyRecord`] (request
//! fingerprint plus outcome) in the ledger itself; later attempts with the
//! same reference replay that outcome.

mod record;

pub use record::{
    validate_reference, IdempotencyError, IdempotencyRecord, OperationKind, RequestFingerprint,
    MAX_REFERENCE_LEN,
};
