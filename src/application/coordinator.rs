use crate::domain::milestone::{Milestone, MilestoneId, MilestonePatch, MilestoneStatus, ProjectId};
use crate::domain::ports::{IntentStatus, MilestoneStoreBox, PaymentGatewayBox};
use crate::domain::project::{self, ProjectSummary};
use crate::error::{EngineError, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

const CURRENCY: &str = "USD";
const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Orchestrates the pay-milestone saga:
/// CAS to `paying` → create gateway intent → bounded await → finalize to
/// `paid`, or to `failed` with the intent id preserved for audit and retry.
///
/// The coordinator never retries a gateway call on its own; a retry is an
/// explicit caller-initiated `pay_milestone` against a `failed` milestone,
/// which produces a fresh intent.
pub struct PaymentCoordinator {
    store: MilestoneStoreBox,
    gateway: PaymentGatewayBox,
    gateway_timeout: Duration,
}

impl PaymentCoordinator {
    pub fn new(store: MilestoneStoreBox, gateway: PaymentGatewayBox) -> Self {
        Self::with_timeout(store, gateway, DEFAULT_GATEWAY_TIMEOUT)
    }

    /// Bound on each gateway interaction (intent creation, and the wait for
    /// a terminal outcome). No coordinator call blocks past it.
    pub fn with_timeout(
        store: MilestoneStoreBox,
        gateway: PaymentGatewayBox,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            gateway_timeout,
        }
    }

    /// Initiates payment for a `completed` milestone (`failed` is the retry
    /// entry point).
    ///
    /// The transition to `paying` is a conditional update on the observed
    /// status: of two concurrent calls exactly one wins, the other gets
    /// `EngineError::Conflict` and no second intent is ever created.
    pub async fn pay_milestone(&self, id: MilestoneId) -> Result<Milestone> {
        let milestone = self.load(id).await?;
        let prior = milestone.status;
        if !prior.is_payable() {
            return Err(EngineError::InvalidTransition {
                milestone_id: id,
                from: prior,
                action: "pay",
            });
        }

        self.store
            .conditional_update(id, prior, MilestonePatch::status(MilestoneStatus::Paying))
            .await?;
        info!(milestone = %id, amount = %milestone.amount.value(), "payment started");

        let description = format!("{} (milestone {id})", milestone.name);
        let created = timeout(
            self.gateway_timeout,
            self.gateway
                .create_intent(milestone.amount.to_cents(), CURRENCY, &description),
        )
        .await;

        let intent_id = match created {
            Ok(Ok(intent_id)) => intent_id,
            Ok(Err(e)) => return self.abort_before_intent(id, prior, e.to_string()).await,
            Err(_) => {
                return self
                    .abort_before_intent(id, prior, "intent creation timed out".to_string())
                    .await;
            }
        };

        // Bind the intent to the record before waiting on the outcome, so a
        // crash from here on leaves a reconcilable `paying` milestone.
        self.store
            .conditional_update(
                id,
                MilestoneStatus::Paying,
                MilestonePatch::status_with_ref(MilestoneStatus::Paying, intent_id.clone()),
            )
            .await?;

        match self.await_outcome(&intent_id).await {
            Ok(IntentStatus::Succeeded) => {
                let paid = self
                    .store
                    .conditional_update(
                        id,
                        MilestoneStatus::Paying,
                        MilestonePatch::status(MilestoneStatus::Paid),
                    )
                    .await?;
                info!(milestone = %id, intent = %intent_id, "payment settled");
                Ok(paid)
            }
            Ok(IntentStatus::Failed) => {
                self.fail_attempt(id, &intent_id, "gateway declined the charge")
                    .await
            }
            Ok(IntentStatus::Pending) => {
                self.fail_attempt(id, &intent_id, "gateway outcome not available within timeout")
                    .await
            }
            Err(e) => self.fail_attempt(id, &intent_id, &e.to_string()).await,
        }
    }

    /// Repairs a milestone stuck in `paying` (process death between intent
    /// creation and finalization) against the gateway's authoritative intent
    /// status. Externally scheduled; a still-`pending` intent leaves the
    /// record untouched so the UI keeps showing it as processing.
    pub async fn reconcile(&self, id: MilestoneId) -> Result<Milestone> {
        let milestone = self.load(id).await?;
        if milestone.status != MilestoneStatus::Paying {
            return Err(EngineError::InvalidTransition {
                milestone_id: id,
                from: milestone.status,
                action: "reconcile",
            });
        }

        let Some(intent_id) = milestone.payment_ref.clone() else {
            // Died before the intent was created: nothing was charged, the
            // milestone goes back to being payable.
            info!(milestone = %id, "reconcile: no intent recorded, reverting to completed");
            return self
                .store
                .conditional_update(
                    id,
                    MilestoneStatus::Paying,
                    MilestonePatch::status(MilestoneStatus::Completed),
                )
                .await;
        };

        match self.gateway.intent_status(&intent_id).await? {
            IntentStatus::Succeeded => {
                info!(milestone = %id, intent = %intent_id, "reconcile: intent succeeded");
                self.store
                    .conditional_update(
                        id,
                        MilestoneStatus::Paying,
                        MilestonePatch::status(MilestoneStatus::Paid),
                    )
                    .await
            }
            IntentStatus::Failed => {
                warn!(milestone = %id, intent = %intent_id, "reconcile: intent failed");
                self.store
                    .conditional_update(
                        id,
                        MilestoneStatus::Paying,
                        MilestonePatch::status(MilestoneStatus::Failed),
                    )
                    .await
            }
            IntentStatus::Pending => Ok(milestone),
        }
    }

    /// Current budget and progress figures for a project, derived from the
    /// milestone list on every call.
    pub async fn get_project_summary(&self, project_id: &ProjectId) -> Result<ProjectSummary> {
        let milestones = self.store.list(project_id).await?;
        Ok(project::summarize(&milestones))
    }

    /// Polls the gateway until the intent is terminal or the timeout
    /// elapses; an elapsed timeout reports as `Pending`.
    async fn await_outcome(&self, intent_id: &str) -> Result<IntentStatus> {
        let wait = timeout(self.gateway_timeout, async {
            loop {
                match self.gateway.intent_status(intent_id).await? {
                    IntentStatus::Pending => tokio::time::sleep(POLL_INTERVAL).await,
                    terminal => return Ok(terminal),
                }
            }
        })
        .await;
        match wait {
            Ok(result) => result,
            Err(_) => Ok(IntentStatus::Pending),
        }
    }

    /// Compensation for a failure before any intent existed: nothing can
    /// have been charged, so the milestone reverts to the status the saga
    /// started from.
    async fn abort_before_intent(
        &self,
        id: MilestoneId,
        prior: MilestoneStatus,
        reason: String,
    ) -> Result<Milestone> {
        warn!(milestone = %id, %reason, "payment aborted before intent creation");
        self.store
            .conditional_update(id, MilestoneStatus::Paying, MilestonePatch::status(prior))
            .await?;
        Err(EngineError::Payment {
            milestone_id: id,
            reason,
        })
    }

    /// Terminal failure of an attempted charge: `paying → failed`, intent id
    /// kept on the record for audit and retry.
    async fn fail_attempt(
        &self,
        id: MilestoneId,
        intent_id: &str,
        reason: &str,
    ) -> Result<Milestone> {
        warn!(milestone = %id, intent = %intent_id, %reason, "payment failed");
        self.store
            .conditional_update(
                id,
                MilestoneStatus::Paying,
                MilestonePatch::status(MilestoneStatus::Failed),
            )
            .await?;
        Err(EngineError::Payment {
            milestone_id: id,
            reason: reason.to_string(),
        })
    }

    async fn load(&self, id: MilestoneId) -> Result<Milestone> {
        self.store
            .get(id)
            .await?
            .ok_or(EngineError::NotFound { milestone_id: id })
    }
}
