use crate::domain::milestone::{
    Amount, Milestone, MilestoneId, MilestonePatch, MilestoneStatus, MilestoneUpdate, ProjectId,
};
use crate::domain::ports::MilestoneStoreBox;
use crate::error::{EngineError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

/// Owns the milestone state machine: creation, completion, and provider
/// edits. Payment transitions are driven by `PaymentCoordinator`.
///
/// The engine holds no state of its own; every operation is a single logical
/// transaction against one milestone row in the store.
pub struct MilestoneEngine {
    store: MilestoneStoreBox,
}

impl MilestoneEngine {
    pub fn new(store: MilestoneStoreBox) -> Self {
        Self { store }
    }

    /// Creates a `pending` milestone for `project_id`.
    ///
    /// # Errors
    ///
    /// `EngineError::Validation` if `name` is empty or `amount` is negative;
    /// nothing is written to the store in that case.
    pub async fn create(
        &self,
        project_id: ProjectId,
        name: &str,
        description: &str,
        amount: Decimal,
        due_date: Option<NaiveDate>,
    ) -> Result<Milestone> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation(
                "milestone name must not be empty".to_string(),
            ));
        }
        let amount = Amount::try_from(amount)?;

        let milestone = Milestone {
            id: MilestoneId::new(),
            project_id,
            name: name.trim().to_string(),
            description: description.to_string(),
            amount,
            due_date,
            status: MilestoneStatus::Pending,
            payment_ref: None,
        };

        self.store.create(milestone.clone()).await?;
        debug!(milestone = %milestone.id, project = %milestone.project_id, "milestone created");
        Ok(milestone)
    }

    /// Transitions `pending → completed`.
    ///
    /// Idempotent on an already-`completed` milestone: the current record is
    /// returned instead of an error, so retried client requests are harmless.
    /// Any other status is rejected, since completion is no longer meaningful
    /// once payment has started.
    pub async fn mark_completed(&self, id: MilestoneId) -> Result<Milestone> {
        let milestone = self.load(id).await?;
        match milestone.status {
            MilestoneStatus::Pending => {
                let result = self
                    .store
                    .conditional_update(
                        id,
                        MilestoneStatus::Pending,
                        MilestonePatch::status(MilestoneStatus::Completed),
                    )
                    .await;
                match result {
                    Ok(updated) => {
                        debug!(milestone = %id, "milestone completed");
                        Ok(updated)
                    }
                    // A racing caller completed it first; same outcome, but
                    // only as long as the record is still completed. A fast
                    // complete-then-pay interleaving can already have moved
                    // it on, and that is rejected like any other status.
                    Err(EngineError::Conflict {
                        actual: MilestoneStatus::Completed,
                        ..
                    }) => {
                        let current = self.load(id).await?;
                        if current.status == MilestoneStatus::Completed {
                            Ok(current)
                        } else {
                            Err(EngineError::InvalidTransition {
                                milestone_id: id,
                                from: current.status,
                                action: "mark completed",
                            })
                        }
                    }
                    Err(e) => Err(e),
                }
            }
            MilestoneStatus::Completed => Ok(milestone),
            status => Err(EngineError::InvalidTransition {
                milestone_id: id,
                from: status,
                action: "mark completed",
            }),
        }
    }

    /// Edits name, description, and/or due date. Amount and status are not
    /// reachable from here; an amount amendment is a replacement milestone.
    ///
    /// Rejected once the milestone is `paying` or `paid`.
    pub async fn update(&self, id: MilestoneId, update: MilestoneUpdate) -> Result<Milestone> {
        if update.is_empty() {
            return Err(EngineError::Validation(
                "no updatable fields provided".to_string(),
            ));
        }
        if let Some(name) = &update.name
            && name.trim().is_empty()
        {
            return Err(EngineError::Validation(
                "milestone name must not be empty".to_string(),
            ));
        }

        let milestone = self.load(id).await?;
        if milestone.status.is_frozen() {
            return Err(EngineError::InvalidTransition {
                milestone_id: id,
                from: milestone.status,
                action: "update",
            });
        }

        self.store
            .conditional_update(id, milestone.status, update.into())
            .await
    }

    async fn load(&self, id: MilestoneId) -> Result<Milestone> {
        self.store
            .get(id)
            .await?
            .ok_or(EngineError::NotFound { milestone_id: id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MilestoneStore;
    use crate::infrastructure::in_memory::InMemoryMilestoneStore;
    use rust_decimal_macros::dec;

    fn engine_with_store() -> (MilestoneEngine, InMemoryMilestoneStore) {
        let store = InMemoryMilestoneStore::new();
        (MilestoneEngine::new(Box::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_create_pending_milestone() {
        let (engine, store) = engine_with_store();

        let milestone = engine
            .create(
                ProjectId::from("p1"),
                "Demolition",
                "Tear out the old kitchen",
                dec!(500),
                None,
            )
            .await
            .unwrap();

        assert_eq!(milestone.status, MilestoneStatus::Pending);
        assert_eq!(milestone.payment_ref, None);

        let stored = store.get(milestone.id).await.unwrap().unwrap();
        assert_eq!(stored, milestone);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let (engine, store) = engine_with_store();

        let err = engine
            .create(ProjectId::from("p1"), "  ", "", dec!(100), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = engine
            .create(ProjectId::from("p1"), "Framing", "", dec!(-1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // nothing was written
        assert!(store.list(&ProjectId::from("p1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_completed_and_idempotency() {
        let (engine, _store) = engine_with_store();
        let milestone = engine
            .create(ProjectId::from("p1"), "Framing", "", dec!(500), None)
            .await
            .unwrap();

        let first = engine.mark_completed(milestone.id).await.unwrap();
        assert_eq!(first.status, MilestoneStatus::Completed);

        // a second call is a no-op returning the same record
        let second = engine.mark_completed(milestone.id).await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_mark_completed_rejects_paying_and_paid() {
        let (engine, store) = engine_with_store();
        let milestone = engine
            .create(ProjectId::from("p1"), "Framing", "", dec!(500), None)
            .await
            .unwrap();
        engine.mark_completed(milestone.id).await.unwrap();

        store
            .conditional_update(
                milestone.id,
                MilestoneStatus::Completed,
                MilestonePatch::status_with_ref(MilestoneStatus::Paying, "pi_1".to_string()),
            )
            .await
            .unwrap();

        let err = engine.mark_completed(milestone.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                from: MilestoneStatus::Paying,
                ..
            }
        ));
    }

    /// A store double replaying a complete-then-pay race: the first read
    /// still shows `pending`, the CAS loses to a racing completer, and by
    /// the time the engine reloads the record has already moved to `paying`.
    struct RacedStore {
        inner: InMemoryMilestoneStore,
        first_read_done: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl crate::domain::ports::MilestoneStore for RacedStore {
        async fn create(&self, milestone: Milestone) -> crate::error::Result<()> {
            self.inner.create(milestone).await
        }

        async fn get(&self, id: MilestoneId) -> crate::error::Result<Option<Milestone>> {
            let milestone = self.inner.get(id).await?;
            if !self
                .first_read_done
                .swap(true, std::sync::atomic::Ordering::SeqCst)
            {
                return Ok(milestone.map(|mut m| {
                    m.status = MilestoneStatus::Pending;
                    m
                }));
            }
            Ok(milestone)
        }

        async fn list(&self, project_id: &ProjectId) -> crate::error::Result<Vec<Milestone>> {
            self.inner.list(project_id).await
        }

        async fn conditional_update(
            &self,
            id: MilestoneId,
            expected_status: MilestoneStatus,
            patch: MilestonePatch,
        ) -> crate::error::Result<Milestone> {
            if expected_status == MilestoneStatus::Pending {
                return Err(EngineError::Conflict {
                    milestone_id: id,
                    expected: expected_status,
                    actual: MilestoneStatus::Completed,
                });
            }
            self.inner.conditional_update(id, expected_status, patch).await
        }

        async fn delete(&self, id: MilestoneId) -> crate::error::Result<()> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_mark_completed_lost_race_to_advanced_status_is_rejected() {
        let inner = InMemoryMilestoneStore::new();
        let milestone = Milestone {
            id: MilestoneId::new(),
            project_id: ProjectId::from("p1"),
            name: "Framing".to_string(),
            description: String::new(),
            amount: Amount::new(dec!(500)).unwrap(),
            due_date: None,
            status: MilestoneStatus::Paying,
            payment_ref: Some("pi_1".to_string()),
        };
        inner.create(milestone.clone()).await.unwrap();

        let engine = MilestoneEngine::new(Box::new(RacedStore {
            inner,
            first_read_done: std::sync::atomic::AtomicBool::new(false),
        }));

        // the racing completer won and payment already started; the lost
        // race must not report the paying record as a successful completion
        let err = engine.mark_completed(milestone.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                from: MilestoneStatus::Paying,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_mark_completed_unknown_id() {
        let (engine, _store) = engine_with_store();
        let err = engine.mark_completed(MilestoneId::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_editable_fields() {
        let (engine, _store) = engine_with_store();
        let milestone = engine
            .create(ProjectId::from("p1"), "Framing", "rough", dec!(500), None)
            .await
            .unwrap();

        let due = NaiveDate::from_ymd_opt(2026, 9, 30).unwrap();
        let updated = engine
            .update(
                milestone.id,
                MilestoneUpdate {
                    name: Some("Framing and sheathing".to_string()),
                    description: None,
                    due_date: Some(due),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Framing and sheathing");
        assert_eq!(updated.description, "rough");
        assert_eq!(updated.due_date, Some(due));
        // amount and status untouched
        assert_eq!(updated.amount.value(), dec!(500));
        assert_eq!(updated.status, MilestoneStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_frozen_once_paying() {
        let (engine, store) = engine_with_store();
        let milestone = engine
            .create(ProjectId::from("p1"), "Framing", "", dec!(500), None)
            .await
            .unwrap();
        engine.mark_completed(milestone.id).await.unwrap();
        store
            .conditional_update(
                milestone.id,
                MilestoneStatus::Completed,
                MilestonePatch::status_with_ref(MilestoneStatus::Paying, "pi_1".to_string()),
            )
            .await
            .unwrap();

        let err = engine
            .update(
                milestone.id,
                MilestoneUpdate {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_update_rejects_empty_patch_and_empty_name() {
        let (engine, _store) = engine_with_store();
        let milestone = engine
            .create(ProjectId::from("p1"), "Framing", "", dec!(500), None)
            .await
            .unwrap();

        let err = engine
            .update(milestone.id, MilestoneUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = engine
            .update(
                milestone.id,
                MilestoneUpdate {
                    name: Some("   ".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
