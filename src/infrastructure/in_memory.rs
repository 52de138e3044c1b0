use crate::domain::milestone::{Milestone, MilestoneId, MilestonePatch, MilestoneStatus, ProjectId};
use crate::domain::ports::MilestoneStore;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory milestone store.
///
/// Uses `Arc<RwLock<HashMap>>` so clones share state; `conditional_update`
/// performs its compare-and-swap under the write lock, which gives this
/// adapter the per-record CAS guarantee the coordinator depends on.
#[derive(Default, Clone)]
pub struct InMemoryMilestoneStore {
    milestones: Arc<RwLock<HashMap<MilestoneId, Milestone>>>,
}

impl InMemoryMilestoneStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MilestoneStore for InMemoryMilestoneStore {
    async fn create(&self, milestone: Milestone) -> Result<()> {
        let mut milestones = self.milestones.write().await;
        milestones.insert(milestone.id, milestone);
        Ok(())
    }

    async fn get(&self, id: MilestoneId) -> Result<Option<Milestone>> {
        let milestones = self.milestones.read().await;
        Ok(milestones.get(&id).cloned())
    }

    async fn list(&self, project_id: &ProjectId) -> Result<Vec<Milestone>> {
        let milestones = self.milestones.read().await;
        Ok(milestones
            .values()
            .filter(|m| &m.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn conditional_update(
        &self,
        id: MilestoneId,
        expected_status: MilestoneStatus,
        patch: MilestonePatch,
    ) -> Result<Milestone> {
        let mut milestones = self.milestones.write().await;
        let milestone = milestones
            .get_mut(&id)
            .ok_or(EngineError::NotFound { milestone_id: id })?;
        if milestone.status != expected_status {
            return Err(EngineError::Conflict {
                milestone_id: id,
                expected: expected_status,
                actual: milestone.status,
            });
        }
        patch.apply(milestone);
        Ok(milestone.clone())
    }

    async fn delete(&self, id: MilestoneId) -> Result<()> {
        let mut milestones = self.milestones.write().await;
        let milestone = milestones
            .get(&id)
            .ok_or(EngineError::NotFound { milestone_id: id })?;
        if milestone.status.is_frozen() {
            return Err(EngineError::InvalidTransition {
                milestone_id: id,
                from: milestone.status,
                action: "delete",
            });
        }
        milestones.remove(&id);
        Ok(())
    }
}
