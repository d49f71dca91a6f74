//! User-approval port
//!
//! Signing requests never reach a private key without an explicit approval. The
//! approving collaborator re-enters the wallet password, which is what unseals
//! the recovery phrase for the one signature.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::result::Result;

/// What the user is asked to approve
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub origin: String,
    pub method: String,
    pub public_key: String,
    /// Short human-readable description of the payload
    pub summary: String,
}

impl ApprovalRequest {
    pub fn new(
        origin: impl Into<String>,
        method: impl Into<String>,
        public_key: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin: origin.into(),
            method: method.into(),
            public_key: public_key.into(),
            summary: summary.into(),
        }
    }
}

pub enum Approval {
    Approved { password: Zeroizing<String> },
    Rejected,
}

#[async_trait]
pub trait Approver: Send + Sync {
    async fn request_approval(&self, request: &ApprovalRequest) -> Result<Approval>;
}
