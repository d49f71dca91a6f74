//! Per-account scan watermark

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Newest signature already scanned for an account
///
/// Ledger order is the slot; a cursor never moves to a lower slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCursor {
    pub last_seen_signature: String,
    pub slot: u64,
}

/// Stored cursors keyed by account address
pub type ScanCursors = BTreeMap<String, ScanCursor>;

impl ScanCursor {
    pub fn new(last_seen_signature: impl Into<String>, slot: u64) -> Self {
        Self {
            last_seen_signature: last_seen_signature.into(),
            slot,
        }
    }

    /// The later of the stored cursor and a newly observed one
    ///
    /// On equal slots the stored cursor is kept, so replaying a run is a no-op.
    pub fn advance(stored: Option<&ScanCursor>, observed: &ScanCursor) -> ScanCursor {
        match stored {
            Some(current) if current.slot >= observed.slot => current.clone(),
            _ => observed.clone(),
        }
    }
}
