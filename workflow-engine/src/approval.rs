//! Approval gating for guarded transitions.
//!
//! Whether an actor may perform an approval-gated transition is an
//! authorization decision owned by the host system, so the coordinator
//! takes it as an injectable predicate.

use crate::error::Result;
use crate::models::StatusTransition;
use async_trait::async_trait;
use uuid::Uuid;

/// Decides whether an actor may perform a transition whose edge has
/// `requires_approval` set.
#[async_trait]
pub trait ApprovalPolicy: Send + Sync {
    async fn can_approve(&self, actor: Uuid, transition: &StatusTransition) -> Result<bool>;
}

/// Grants every actor approval capability. The default policy, matching
/// deployments that gate approvals upstream of the engine.
pub struct AllowAllApprovals;

#[async_trait]
impl ApprovalPolicy for AllowAllApprovals {
    async fn can_approve(&self, _actor: Uuid, _transition: &StatusTransition) -> Result<bool> {
        Ok(true)
    }
}

/// Denies every actor. Useful for lockdown and for exercising the
/// approval-required path in tests.
pub struct DenyAllApprovals;

#[async_trait]
impl ApprovalPolicy for DenyAllApprovals {
    async fn can_approve(&self, _actor: Uuid, _transition: &StatusTransition) -> Result<bool> {
        Ok(false)
    }
}
