use super::milestone::{Milestone, MilestoneId, MilestonePatch, MilestoneStatus, ProjectId};
use crate::error::Result;
use async_trait::async_trait;

pub type MilestoneStoreBox = Box<dyn MilestoneStore>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;

/// Durable milestone storage.
///
/// The one non-negotiable contract is `conditional_update`: a compare-and-swap
/// on `status`. Without it two concurrent `pay_milestone` calls could both
/// create payment intents for the same milestone.
#[async_trait]
pub trait MilestoneStore: Send + Sync {
    async fn create(&self, milestone: Milestone) -> Result<()>;

    async fn get(&self, id: MilestoneId) -> Result<Option<Milestone>>;

    async fn list(&self, project_id: &ProjectId) -> Result<Vec<Milestone>>;

    /// Applies `patch` only if the record's current status equals
    /// `expected_status`; returns the updated record. Fails with
    /// `EngineError::Conflict` on a status mismatch and
    /// `EngineError::NotFound` if the id is unknown.
    async fn conditional_update(
        &self,
        id: MilestoneId,
        expected_status: MilestoneStatus,
        patch: MilestonePatch,
    ) -> Result<Milestone>;

    /// Removes a milestone that has never entered payment. Once a milestone
    /// is `paying` or `paid` the record is part of the payment audit trail
    /// and deletion fails with `EngineError::InvalidTransition`.
    async fn delete(&self, id: MilestoneId) -> Result<()>;
}

/// Terminal outcome reported by the payment processor for an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Succeeded,
    Failed,
    Pending,
}

/// The contract required from the external payment processor. It creates a
/// charge intent and later reports that intent's terminal outcome. Delivery
/// is at-least-once and idempotency is keyed by intent id.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount_cents: u64,
        currency: &str,
        description: &str,
    ) -> Result<String>;

    async fn intent_status(&self, intent_id: &str) -> Result<IntentStatus>;
}
